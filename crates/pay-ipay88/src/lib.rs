//! # pay-ipay88
//!
//! iPay88 hosted checkout gateway for checkout-session-rs.
//!
//! The payer completes the payment on iPay88's hosted page. This crate:
//!
//! 1. **Signs the entry form** the checkout view submits (`checkout_form`)
//! 2. **Describes the completion URLs** the session watches for (`redirect_patterns`)
//!    and checks the gateway's signature on them (`redirect_verifier`)
//! 3. **Queries payment status** through the enquiry API (`query_status`)
//! 4. **Verifies backend posts** the gateway sends to the merchant server
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pay_ipay88::IPay88Gateway;
//! use pay_core::{CheckoutGateway, PaymentSession, PaymentRequest};
//!
//! let gateway = IPay88Gateway::from_env()?;
//! let mut session = PaymentSession::new(gateway.redirect_patterns(), listener);
//!
//! let request = PaymentRequest::new("M00001", "ORDER-42", "25.50");
//! let form = gateway.checkout_form(&request)?;
//! session.start(request)?;
//!
//! // Load form.to_url()? in the web view
//! ```
//!
//! ## Backend Post Handling
//!
//! ```rust,ignore
//! use pay_ipay88::{BackendPost, dispatch_backend_post, ACKNOWLEDGEMENT};
//!
//! let post = BackendPost::from_form(&body)?;
//! dispatch_backend_post(&MyHandler, gateway.config(), post)?;
//! // respond with ACKNOWLEDGEMENT
//! ```

pub mod callback;
pub mod checkout;
pub mod config;
pub mod redirect;
pub mod signature;

// Re-exports
pub use callback::{
    dispatch_backend_post, BackendPost, BackendPostHandler, LoggingBackendPostHandler,
    ACKNOWLEDGEMENT, STATUS_PAID,
};
pub use checkout::{IPay88Gateway, DEFAULT_LANG};
pub use config::IPay88Config;
pub use redirect::ResponseVerifier;
pub use signature::{constant_time_compare, request_signature, response_signature, SIGNATURE_TYPE};
