//! # Outcomes
//!
//! Terminal results of a checkout session and of a requery. Each is created
//! once and handed to the [`ResultListener`](crate::listener::ResultListener);
//! nothing mutates them afterwards.

use serde::{Deserialize, Serialize};

/// Fields reported for a successful payment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSuccess {
    pub ref_no: String,
    pub trans_id: String,
    pub amount: String,
    pub remark: String,
    pub auth_code: String,
    pub token_id: String,
    pub card_name: String,
    /// Masked card number as reported by the gateway
    pub card_number: String,
    pub issuer_bank_name: String,
    pub issuer_country: String,
}

/// Fields reported for a failed or cancelled payment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailure {
    pub ref_no: String,
    pub trans_id: String,
    pub amount: String,
    pub remark: String,
    pub token_id: String,
    pub card_name: String,
    pub card_number: String,
    pub issuer_bank_name: String,
    pub issuer_country: String,
    /// Gateway error text; may be empty for cancellations
    pub error_description: String,
}

/// A cancellation carries the same fields as a failure
pub type PaymentCancellation = PaymentFailure;

/// Which terminal outcome a session reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failed,
    Cancelled,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Failed => "failed",
            OutcomeKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Result of a completed checkout session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Success(PaymentSuccess),
    Failed(PaymentFailure),
    Cancelled(PaymentCancellation),
}

impl PaymentOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            PaymentOutcome::Success(_) => OutcomeKind::Success,
            PaymentOutcome::Failed(_) => OutcomeKind::Failed,
            PaymentOutcome::Cancelled(_) => OutcomeKind::Cancelled,
        }
    }

    pub fn ref_no(&self) -> &str {
        match self {
            PaymentOutcome::Success(s) => &s.ref_no,
            PaymentOutcome::Failed(f) | PaymentOutcome::Cancelled(f) => &f.ref_no,
        }
    }

    pub fn amount(&self) -> &str {
        match self {
            PaymentOutcome::Success(s) => &s.amount,
            PaymentOutcome::Failed(f) | PaymentOutcome::Cancelled(f) => &f.amount,
        }
    }

    pub fn trans_id(&self) -> &str {
        match self {
            PaymentOutcome::Success(s) => &s.trans_id,
            PaymentOutcome::Failed(f) | PaymentOutcome::Cancelled(f) => &f.trans_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PaymentOutcome::Success(_))
    }
}

/// Status lookup confirmed the payment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequerySuccess {
    pub ref_no: String,
    pub merchant_code: String,
    pub amount: String,
    pub result_code: String,
}

/// Status lookup reported failure, or could not be completed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequeryFailure {
    pub ref_no: String,
    pub merchant_code: String,
    pub amount: String,
    pub error_description: String,
}

/// Result of a requery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequeryOutcome {
    RequerySuccess(RequerySuccess),
    RequeryFailed(RequeryFailure),
}

impl RequeryOutcome {
    pub fn ref_no(&self) -> &str {
        match self {
            RequeryOutcome::RequerySuccess(s) => &s.ref_no,
            RequeryOutcome::RequeryFailed(f) => &f.ref_no,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RequeryOutcome::RequerySuccess(_))
    }
}
