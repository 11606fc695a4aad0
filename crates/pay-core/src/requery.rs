//! # Requery
//!
//! Out-of-band status lookup for a reference number, independent of any live
//! session. It may run after an app restart when no session object exists.
//!
//! The lookup is awaited in the caller's task and the outcome is delivered to
//! the listener from that same task, so it never races a delivery made by a
//! session the caller also drives. Failures of any kind come back as
//! [`RequeryOutcome::RequeryFailed`]; nothing is raised to the caller.

use crate::error::PaymentError;
use crate::gateway::{RequeryBackend, RequeryQuery, RequeryStatus};
use crate::listener::{deliver_requery_outcome, ResultListener};
use crate::outcome::{RequeryFailure, RequeryOutcome, RequerySuccess};
use crate::PaymentResult;
use std::sync::Weak;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Result code meaning the gateway has the payment as paid
pub const RESULT_CODE_PAID: &str = "00";

/// Error description reported when the lookup times out
pub const TIMEOUT_DESCRIPTION: &str = "timeout";

/// Look up the status of `query`, notify `listener`, and return the outcome.
///
/// `timeout` bounds the whole lookup; when it elapses the outcome is
/// `RequeryFailed` with error description `"timeout"`.
#[instrument(skip_all, fields(ref_no = %query.ref_no, merchant_code = %query.merchant_code))]
pub async fn requery<B: RequeryBackend + ?Sized>(
    backend: &B,
    query: &RequeryQuery,
    timeout: Option<Duration>,
    listener: &Weak<dyn ResultListener>,
) -> RequeryOutcome {
    let lookup = backend.query_status(query);
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, lookup)
            .await
            .unwrap_or(Err(PaymentError::Timeout)),
        None => lookup.await,
    };

    let outcome = interpret(query, result);
    match &outcome {
        RequeryOutcome::RequerySuccess(s) => info!("Requery confirmed payment: {}", s.ref_no),
        RequeryOutcome::RequeryFailed(f) => {
            warn!("Requery failed for {}: {}", f.ref_no, f.error_description)
        }
    }

    deliver_requery_outcome(listener, &outcome);
    outcome
}

fn interpret(query: &RequeryQuery, result: PaymentResult<RequeryStatus>) -> RequeryOutcome {
    match result {
        Ok(status) if status.result_code == RESULT_CODE_PAID => {
            RequeryOutcome::RequerySuccess(RequerySuccess {
                ref_no: query.ref_no.clone(),
                merchant_code: query.merchant_code.clone(),
                amount: status
                    .amount
                    .or_else(|| query.amount.clone())
                    .unwrap_or_default(),
                result_code: status.result_code,
            })
        }
        Ok(status) => {
            let description = status
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or(status.result_code);
            failed(query, status.amount, description)
        }
        Err(PaymentError::Timeout) => failed(query, None, TIMEOUT_DESCRIPTION.to_string()),
        Err(e) => failed(query, None, e.to_string()),
    }
}

fn failed(query: &RequeryQuery, amount: Option<String>, description: String) -> RequeryOutcome {
    RequeryOutcome::RequeryFailed(RequeryFailure {
        ref_no: query.ref_no.clone(),
        merchant_code: query.merchant_code.clone(),
        amount: amount.or_else(|| query.amount.clone()).unwrap_or_default(),
        error_description: description,
    })
}
