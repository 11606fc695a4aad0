//! # Redirect Verification
//!
//! The gateway signs the result it appends to its response page. A session
//! only completes from that page when the signature checks out, so a client
//! cannot report a payment the gateway never made.
//!
//! Custom-scheme redirects back into the app are unsigned for failure and
//! cancellation. A success on the app scheme must carry the gateway's
//! signature like the response page does.

use crate::callback::STATUS_PAID;
use crate::config::IPay88Config;
use crate::signature::{constant_time_compare, response_signature};
use pay_core::{
    decimal_places_for, query_params, Amount, OutcomeKind, PaymentError, PaymentRequest,
    PaymentResult, RedirectVerifier,
};
use std::collections::HashMap;
use tracing::debug;

const STATUS_UNPAID: &str = "0";

/// Checks `Signature` on terminal redirects
#[derive(Debug, Clone)]
pub struct ResponseVerifier {
    config: IPay88Config,
}

impl ResponseVerifier {
    pub fn new(config: IPay88Config) -> Self {
        Self { config }
    }

    fn from_response_page(&self, url: &str) -> bool {
        let page = self.config.response_url();
        url.strip_prefix(&page)
            .map(|rest| rest.is_empty() || rest.starts_with(['?', '/', '#']))
            .unwrap_or(false)
    }
}

impl RedirectVerifier for ResponseVerifier {
    fn verify_redirect(
        &self,
        kind: OutcomeKind,
        url: &str,
        request: &PaymentRequest,
    ) -> PaymentResult<()> {
        if kind != OutcomeKind::Success && !self.from_response_page(url) {
            return Ok(());
        }

        let params = query_params(url)
            .map_err(|e| PaymentError::SignatureMismatch(format!("unreadable redirect: {}", e)))?;
        let Some(signature) = params.get("Signature") else {
            return Err(PaymentError::SignatureMismatch(
                "redirect carries no signature".to_string(),
            ));
        };

        let field = |name: &str, fallback: &str| -> String {
            param(&params, name).unwrap_or(fallback).to_string()
        };
        let default_currency = request
            .currency
            .as_deref()
            .unwrap_or(self.config.currency.as_str());
        let currency = field("Currency", default_currency);
        let status = if kind == OutcomeKind::Success {
            STATUS_PAID
        } else {
            STATUS_UNPAID
        };

        let amount = Amount::parse(
            &field("Amount", &request.amount),
            decimal_places_for(Some(currency.as_str())),
        )
        .map_err(|e| PaymentError::SignatureMismatch(e.to_string()))?;

        let expected = response_signature(
            &self.config.merchant_key,
            &field("MerchantCode", &request.merchant_code),
            &field("PaymentId", ""),
            &field("RefNo", &request.ref_no),
            &amount.digits(),
            &currency,
            &field("Status", status),
        )?;

        if !constant_time_compare(&signature.to_ascii_lowercase(), &expected) {
            return Err(PaymentError::SignatureMismatch(
                "redirect signature does not verify".to_string(),
            ));
        }

        debug!("Verified {} redirect for {}", kind, request.ref_no);
        Ok(())
    }
}

fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params.get(name).map(String::as_str).filter(|v| !v.is_empty())
}
