//! # pay-core
//!
//! Gateway-agnostic payment-session protocol for hosted web checkouts.
//!
//! This crate provides:
//! - `PaymentRequest`, `Currency` and `Amount` describing what to charge
//! - `PaymentSession`, the one-shot checkout state machine
//! - `RedirectPatterns` classifying the hosted page's navigation events
//! - `ResultListener`, the outcome callbacks an application implements
//! - `SessionRegistry` for routing navigation events and deep links
//! - `requery` for out-of-band status lookups
//! - `CheckoutGateway`, `RequeryBackend` and `RedirectVerifier` traits for providers
//! - `PaymentError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use pay_core::{listener_ref, PaymentRequest, PaymentSession};
//!
//! let listener = Arc::new(MyListener::default());
//! let mut session = PaymentSession::new(gateway.redirect_patterns(), listener_ref(&listener));
//!
//! let request = PaymentRequest::new("M001", "REF123", "25.50").with_currency("MYR");
//! let handle = session.start(request.clone())?;
//!
//! // Open gateway.checkout_form(&request)?.to_url()? in the web view, then
//! // forward every URL it navigates to:
//! session.handle_navigation_event(handle, &url)?;
//! ```

pub mod amount;
pub mod error;
pub mod gateway;
pub mod listener;
pub mod navigation;
pub mod outcome;
pub mod registry;
pub mod requery;
pub mod request;
pub mod session;

// Re-exports for convenience
pub use amount::{decimal_places_for, Amount, Currency, MAX_DECIMAL_PLACES};
pub use error::{PaymentError, PaymentResult};
pub use gateway::{
    BoxedCheckoutGateway, CheckoutForm, CheckoutGateway, RedirectVerifier, RequeryBackend,
    RequeryQuery, RequeryStatus, SharedRedirectVerifier,
};
pub use listener::{
    deliver_payment_outcome, deliver_requery_outcome, detached_listener, listener_ref, Delivery,
    LoggingListener, ResultListener,
};
pub use navigation::{query_params, RedirectPatterns, ResponseFields};
pub use outcome::{
    OutcomeKind, PaymentCancellation, PaymentFailure, PaymentOutcome, PaymentSuccess,
    RequeryFailure, RequeryOutcome, RequerySuccess,
};
pub use registry::{LinkResolution, SessionRegistry};
pub use requery::{requery, RESULT_CODE_PAID, TIMEOUT_DESCRIPTION};
pub use request::{PaymentRequest, ACTION_TYPE_TOKENIZE};
pub use session::{NavigationDisposition, PaymentSession, SessionHandle, SessionState};
