//! # Gateway Traits
//!
//! Seams between the gateway-agnostic session protocol and a concrete
//! hosted-checkout provider.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │          CheckoutGateway (trait)             │
//! │  ├── checkout_form()                         │
//! │  ├── redirect_patterns()                     │
//! │  ├── redirect_verifier()                     │
//! │  └── provider_name()                         │
//! ├──────────────────────────────────────────────┤
//! │          RequeryBackend (supertrait)         │
//! │  └── query_status()                          │
//! └──────────────────────────────────────────────┘
//!                       ▲
//!               ┌───────┴───────┐
//!               │ IPay88Gateway │
//!               └───────────────┘
//! ```

use crate::error::PaymentResult;
use crate::navigation::RedirectPatterns;
use crate::outcome::OutcomeKind;
use crate::request::PaymentRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Status lookup parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequeryQuery {
    pub ref_no: String,
    pub merchant_code: String,
    /// Amount as originally submitted; some gateways require it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

impl RequeryQuery {
    pub fn new(ref_no: impl Into<String>, merchant_code: impl Into<String>) -> Self {
        Self {
            ref_no: ref_no.into(),
            merchant_code: merchant_code.into(),
            amount: None,
        }
    }

    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = Some(amount.into());
        self
    }
}

/// Raw answer of a status lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequeryStatus {
    /// Gateway result code (`"00"` means paid)
    pub result_code: String,
    /// Amount the gateway has on record, if it reports one
    pub amount: Option<String>,
    /// Human-readable status text
    pub message: Option<String>,
}

impl RequeryStatus {
    pub fn new(result_code: impl Into<String>) -> Self {
        Self {
            result_code: result_code.into(),
            amount: None,
            message: None,
        }
    }

    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = Some(amount.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Out-of-band payment status lookup
#[async_trait]
pub trait RequeryBackend: Send + Sync {
    /// Ask the gateway for the status of a reference.
    ///
    /// Transport failures should map to `NetworkError`, elapsed timeouts to
    /// `Timeout`, unreadable answers to `RequeryError`.
    async fn query_status(&self, query: &RequeryQuery) -> PaymentResult<RequeryStatus>;
}

/// A hosted-checkout provider
pub trait CheckoutGateway: RequeryBackend {
    /// Provider name (for logging and routing)
    fn provider_name(&self) -> &'static str;

    /// Build the form the checkout view submits to open the hosted page
    fn checkout_form(&self, request: &PaymentRequest) -> PaymentResult<CheckoutForm>;

    /// Completion URL table for sessions using this gateway
    fn redirect_patterns(&self) -> RedirectPatterns;

    /// Integrity check sessions apply to terminal redirects, if the gateway
    /// signs them
    fn redirect_verifier(&self) -> Option<SharedRedirectVerifier> {
        None
    }
}

/// Type alias for a shared gateway (dynamic dispatch)
pub type BoxedCheckoutGateway = Arc<dyn CheckoutGateway>;

/// Authenticity check for a terminal redirect.
///
/// Runs after a URL was classified and matched against the session's
/// request. An error leaves the session waiting and the event is ignored.
pub trait RedirectVerifier: Send + Sync + std::fmt::Debug {
    fn verify_redirect(
        &self,
        kind: OutcomeKind,
        url: &str,
        request: &PaymentRequest,
    ) -> PaymentResult<()>;
}

pub type SharedRedirectVerifier = Arc<dyn RedirectVerifier>;

/// Outgoing checkout submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutForm {
    /// Page the form is submitted to
    pub action_url: String,
    /// Field name/value pairs in submission order
    pub fields: Vec<(String, String)>,
}

impl CheckoutForm {
    pub fn new(action_url: impl Into<String>) -> Self {
        Self {
            action_url: action_url.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Append a field when a value is present and non-empty
    pub fn push_opt(&mut self, name: &str, value: Option<&str>) {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.push(name, value);
        }
    }

    /// First value of a field
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The submission as a GET URL with query-encoded fields
    pub fn to_url(&self) -> PaymentResult<String> {
        let mut url = Url::parse(&self.action_url)?;
        url.query_pairs_mut()
            .extend_pairs(self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        Ok(url.into())
    }
}
