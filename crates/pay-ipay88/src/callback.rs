//! # Backend Post
//!
//! Server-to-server notification iPay88 sends to the `BackendURL` once a
//! payment settles. It is delivered independently of the payer's browser, so
//! it still arrives when the app was closed before the redirect.
//!
//! The gateway re-sends the post until it reads [`ACKNOWLEDGEMENT`] in the
//! response body.

use crate::config::IPay88Config;
use crate::signature::{constant_time_compare, response_signature};
use chrono::{DateTime, Utc};
use pay_core::{
    decimal_places_for, Amount, PaymentError, PaymentFailure, PaymentOutcome, PaymentResult,
    PaymentSuccess,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Body the gateway expects back from a handled backend post
pub const ACKNOWLEDGEMENT: &str = "RECEIVEOK";

/// Status value of a paid transaction
pub const STATUS_PAID: &str = "1";

/// Parsed backend post
#[derive(Debug, Clone)]
pub struct BackendPost {
    pub merchant_code: String,
    pub payment_id: String,
    pub ref_no: String,
    pub amount: String,
    pub currency: String,
    pub remark: String,
    pub trans_id: String,
    pub auth_code: String,
    pub status: String,
    pub error_description: String,
    pub signature: String,
    pub token_id: String,
    pub card_name: String,
    pub card_number: String,
    pub issuer_bank_name: String,
    pub issuer_country: String,
    pub received_at: DateTime<Utc>,
}

impl BackendPost {
    /// Parse the form-encoded body
    pub fn from_form(body: &[u8]) -> PaymentResult<Self> {
        let fields: HashMap<String, String> = url::form_urlencoded::parse(body)
            .into_owned()
            .collect();

        let required = |name: &str| {
            fields
                .get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| PaymentError::CallbackParseError(format!("Missing {}", name)))
        };
        let optional = |name: &str| fields.get(name).cloned().unwrap_or_default();

        Ok(Self {
            merchant_code: required("MerchantCode")?,
            payment_id: optional("PaymentId"),
            ref_no: required("RefNo")?,
            amount: required("Amount")?,
            currency: required("Currency")?,
            remark: optional("Remark"),
            trans_id: optional("TransId"),
            auth_code: optional("AuthCode"),
            status: required("Status")?,
            error_description: optional("ErrDesc"),
            signature: required("Signature")?,
            token_id: optional("TokenId"),
            card_name: optional("CCName"),
            card_number: optional("CCNo"),
            issuer_bank_name: optional("S_bankname"),
            issuer_country: optional("S_country"),
            received_at: Utc::now(),
        })
    }

    /// Check the post was issued for this merchant and signed with its key
    pub fn verify(&self, config: &IPay88Config) -> PaymentResult<()> {
        if self.merchant_code != config.merchant_code {
            return Err(PaymentError::SignatureMismatch(format!(
                "unexpected merchant code {}",
                self.merchant_code
            )));
        }

        let precision = decimal_places_for(Some(self.currency.as_str()));
        let amount = Amount::parse(&self.amount, precision)
            .map_err(|e| PaymentError::CallbackParseError(e.to_string()))?;

        let expected = response_signature(
            &config.merchant_key,
            &self.merchant_code,
            &self.payment_id,
            &self.ref_no,
            &amount.digits(),
            &self.currency,
            &self.status,
        )?;

        if !constant_time_compare(&self.signature.to_ascii_lowercase(), &expected) {
            return Err(PaymentError::SignatureMismatch(
                "backend post signature does not verify".to_string(),
            ));
        }

        debug!("Verified backend post for {}", self.ref_no);
        Ok(())
    }

    pub fn is_paid(&self) -> bool {
        self.status == STATUS_PAID
    }

    /// Convert into the session outcome it reports
    pub fn into_outcome(self) -> PaymentOutcome {
        if self.is_paid() {
            return PaymentOutcome::Success(PaymentSuccess {
                ref_no: self.ref_no,
                trans_id: self.trans_id,
                amount: self.amount,
                remark: self.remark,
                auth_code: self.auth_code,
                token_id: self.token_id,
                card_name: self.card_name,
                card_number: self.card_number,
                issuer_bank_name: self.issuer_bank_name,
                issuer_country: self.issuer_country,
            });
        }

        let cancelled = self.error_description.to_ascii_lowercase().contains("cancel");
        let failure = PaymentFailure {
            ref_no: self.ref_no,
            trans_id: self.trans_id,
            amount: self.amount,
            remark: self.remark,
            token_id: self.token_id,
            card_name: self.card_name,
            card_number: self.card_number,
            issuer_bank_name: self.issuer_bank_name,
            issuer_country: self.issuer_country,
            error_description: self.error_description,
        };
        if cancelled {
            PaymentOutcome::Cancelled(failure)
        } else {
            PaymentOutcome::Failed(failure)
        }
    }
}

/// Backend post handler trait
///
/// Implement this trait to act on server-side payment notifications.
#[allow(unused_variables)]
pub trait BackendPostHandler: Send + Sync {
    /// Called when the gateway reports a paid transaction
    fn on_payment_paid(&self, success: &PaymentSuccess) -> PaymentResult<()> {
        info!(
            "Backend post paid: ref_no={}, trans_id={}",
            success.ref_no, success.trans_id
        );
        Ok(())
    }

    /// Called when the gateway reports a failed transaction
    fn on_payment_failed(&self, failure: &PaymentFailure) -> PaymentResult<()> {
        warn!(
            "Backend post failed: ref_no={}, error={}",
            failure.ref_no, failure.error_description
        );
        Ok(())
    }

    /// Called when the payer cancelled on the hosted page
    fn on_payment_cancelled(&self, cancellation: &PaymentFailure) -> PaymentResult<()> {
        info!("Backend post cancelled: ref_no={}", cancellation.ref_no);
        Ok(())
    }
}

/// Default handler (just logs posts)
pub struct LoggingBackendPostHandler;

impl BackendPostHandler for LoggingBackendPostHandler {}

/// Verify a backend post and dispatch it to the matching handler method.
///
/// Returns the outcome it reported; answer the gateway with
/// [`ACKNOWLEDGEMENT`] when this succeeds.
pub fn dispatch_backend_post(
    handler: &dyn BackendPostHandler,
    config: &IPay88Config,
    post: BackendPost,
) -> PaymentResult<PaymentOutcome> {
    post.verify(config)?;
    let outcome = post.into_outcome();

    match &outcome {
        PaymentOutcome::Success(success) => handler.on_payment_paid(success)?,
        PaymentOutcome::Failed(failure) => handler.on_payment_failed(failure)?,
        PaymentOutcome::Cancelled(cancellation) => handler.on_payment_cancelled(cancellation)?,
    }
    Ok(outcome)
}
