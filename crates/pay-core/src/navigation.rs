//! # Redirect Patterns
//!
//! The hosted checkout page signals completion by navigating to URLs the
//! gateway was told about. Which URLs mean success, failure or cancellation is
//! gateway-specific, so it is a table configured per session rather than
//! logic in the session itself.
//!
//! ```toml
//! success = ["myapp://checkout/success"]
//! failure = ["myapp://checkout/failure"]
//! cancel = ["myapp://checkout/cancel"]
//! response = ["https://payment.example.com/epayment/response"]
//!
//! [fields]
//! ref_no = "RefNo"
//! ```

use crate::outcome::{OutcomeKind, PaymentFailure, PaymentOutcome, PaymentSuccess};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// Query parameter names carrying each outcome field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseFields {
    pub merchant_code: String,
    pub ref_no: String,
    pub trans_id: String,
    pub amount: String,
    pub remark: String,
    pub auth_code: String,
    pub token_id: String,
    pub card_name: String,
    pub card_number: String,
    pub issuer_bank_name: String,
    pub issuer_country: String,
    pub error_description: String,
    /// Status parameter consulted for `response` URLs
    pub status: String,
}

impl Default for ResponseFields {
    fn default() -> Self {
        Self {
            merchant_code: "MerchantCode".to_string(),
            ref_no: "RefNo".to_string(),
            trans_id: "TransId".to_string(),
            amount: "Amount".to_string(),
            remark: "Remark".to_string(),
            auth_code: "AuthCode".to_string(),
            token_id: "TokenId".to_string(),
            card_name: "CCName".to_string(),
            card_number: "CCNo".to_string(),
            issuer_bank_name: "S_bankname".to_string(),
            issuer_country: "S_country".to_string(),
            error_description: "ErrDesc".to_string(),
            status: "Status".to_string(),
        }
    }
}

/// URL prefix table classifying navigation events.
///
/// Query string and fragment are ignored when matching. Cancel prefixes are
/// checked first, then failure, then success. URLs matching a `response`
/// prefix carry the result in the status parameter: `success_status` means
/// success, an error description mentioning "cancel" means cancellation, and
/// anything else is a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectPatterns {
    #[serde(default)]
    pub success: Vec<String>,

    #[serde(default)]
    pub failure: Vec<String>,

    #[serde(default)]
    pub cancel: Vec<String>,

    #[serde(default)]
    pub response: Vec<String>,

    #[serde(default = "default_success_status")]
    pub success_status: String,

    #[serde(default)]
    pub fields: ResponseFields,
}

fn default_success_status() -> String {
    "1".to_string()
}

impl Default for RedirectPatterns {
    fn default() -> Self {
        Self::new()
    }
}

impl RedirectPatterns {
    /// Create an empty table (classifies nothing)
    pub fn new() -> Self {
        Self {
            success: Vec::new(),
            failure: Vec::new(),
            cancel: Vec::new(),
            response: Vec::new(),
            success_status: default_success_status(),
            fields: ResponseFields::default(),
        }
    }

    pub fn with_success(mut self, prefix: impl Into<String>) -> Self {
        self.success.push(prefix.into());
        self
    }

    pub fn with_failure(mut self, prefix: impl Into<String>) -> Self {
        self.failure.push(prefix.into());
        self
    }

    pub fn with_cancel(mut self, prefix: impl Into<String>) -> Self {
        self.cancel.push(prefix.into());
        self
    }

    /// Builder: add a prefix whose status parameter decides the outcome
    pub fn with_response(mut self, prefix: impl Into<String>) -> Self {
        self.response.push(prefix.into());
        self
    }

    pub fn with_fields(mut self, fields: ResponseFields) -> Self {
        self.fields = fields;
        self
    }

    /// True when no prefix is configured
    pub fn is_empty(&self) -> bool {
        self.success.is_empty()
            && self.failure.is_empty()
            && self.cancel.is_empty()
            && self.response.is_empty()
    }

    /// Load a table from TOML
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Classify a navigation URL; `None` for anything that is not a terminal signal
    pub fn classify(&self, url: &str) -> Option<OutcomeKind> {
        let parsed = Url::parse(url).ok()?;
        let params = collect_params(&parsed);
        self.classify_parsed(&parsed, &params)
    }

    /// Classify a navigation URL and build the outcome from its query parameters
    pub fn parse_outcome(&self, url: &str) -> Option<PaymentOutcome> {
        let parsed = Url::parse(url).ok()?;
        let params = collect_params(&parsed);
        let kind = self.classify_parsed(&parsed, &params)?;
        Some(self.build_outcome(kind, &params))
    }

    fn classify_parsed(&self, url: &Url, params: &HashMap<String, String>) -> Option<OutcomeKind> {
        let base = strip_query(url);

        if matches_any(&base, &self.cancel) {
            return Some(OutcomeKind::Cancelled);
        }
        if matches_any(&base, &self.failure) {
            return Some(OutcomeKind::Failed);
        }
        if matches_any(&base, &self.success) {
            return Some(OutcomeKind::Success);
        }
        if matches_any(&base, &self.response) {
            let status = params.get(&self.fields.status)?;
            if *status == self.success_status {
                return Some(OutcomeKind::Success);
            }
            let cancelled = params
                .get(&self.fields.error_description)
                .map(|desc| desc.to_ascii_lowercase().contains("cancel"))
                .unwrap_or(false);
            return Some(if cancelled {
                OutcomeKind::Cancelled
            } else {
                OutcomeKind::Failed
            });
        }
        None
    }

    fn build_outcome(&self, kind: OutcomeKind, params: &HashMap<String, String>) -> PaymentOutcome {
        let field = |name: &str| params.get(name).cloned().unwrap_or_default();
        let f = &self.fields;

        match kind {
            OutcomeKind::Success => PaymentOutcome::Success(PaymentSuccess {
                ref_no: field(&f.ref_no),
                trans_id: field(&f.trans_id),
                amount: field(&f.amount),
                remark: field(&f.remark),
                auth_code: field(&f.auth_code),
                token_id: field(&f.token_id),
                card_name: field(&f.card_name),
                card_number: field(&f.card_number),
                issuer_bank_name: field(&f.issuer_bank_name),
                issuer_country: field(&f.issuer_country),
            }),
            OutcomeKind::Failed | OutcomeKind::Cancelled => {
                let failure = PaymentFailure {
                    ref_no: field(&f.ref_no),
                    trans_id: field(&f.trans_id),
                    amount: field(&f.amount),
                    remark: field(&f.remark),
                    token_id: field(&f.token_id),
                    card_name: field(&f.card_name),
                    card_number: field(&f.card_number),
                    issuer_bank_name: field(&f.issuer_bank_name),
                    issuer_country: field(&f.issuer_country),
                    error_description: field(&f.error_description),
                };
                if kind == OutcomeKind::Cancelled {
                    PaymentOutcome::Cancelled(failure)
                } else {
                    PaymentOutcome::Failed(failure)
                }
            }
        }
    }
}

/// Decoded query parameters of a URL (last value wins)
pub fn query_params(url: &str) -> Result<HashMap<String, String>, url::ParseError> {
    Url::parse(url).map(|parsed| collect_params(&parsed))
}

fn collect_params(url: &Url) -> HashMap<String, String> {
    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn strip_query(url: &Url) -> String {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    base.into()
}

fn normalize_prefix(prefix: &str) -> String {
    match Url::parse(prefix) {
        Ok(parsed) => strip_query(&parsed),
        Err(_) => prefix.to_string(),
    }
}

fn matches_any(candidate: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        let prefix = normalize_prefix(prefix);
        candidate == prefix
            || (candidate.starts_with(&prefix)
                && (prefix.ends_with('/') || candidate[prefix.len()..].starts_with('/')))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> RedirectPatterns {
        RedirectPatterns::new()
            .with_success("shopapp://ipay88/success")
            .with_failure("shopapp://ipay88/failure")
            .with_cancel("shopapp://ipay88/cancel")
            .with_response("https://payment.ipay88.com.my/epayment/response")
    }

    #[test]
    fn test_classify_prefixes() {
        let p = patterns();
        assert_eq!(
            p.classify("shopapp://ipay88/success?RefNo=R1"),
            Some(OutcomeKind::Success)
        );
        assert_eq!(
            p.classify("shopapp://ipay88/failure?RefNo=R1"),
            Some(OutcomeKind::Failed)
        );
        assert_eq!(p.classify("shopapp://ipay88/cancel"), Some(OutcomeKind::Cancelled));
        assert_eq!(p.classify("shopapp://ipay88/successful"), None);
        assert_eq!(p.classify("https://bank.example.com/3ds/challenge"), None);
        assert_eq!(p.classify("not a url"), None);
    }

    #[test]
    fn test_classify_response_status() {
        let p = patterns();
        let base = "https://payment.ipay88.com.my/epayment/response";
        assert_eq!(
            p.classify(&format!("{}?Status=1&RefNo=R1", base)),
            Some(OutcomeKind::Success)
        );
        assert_eq!(
            p.classify(&format!("{}?Status=0&ErrDesc=Declined", base)),
            Some(OutcomeKind::Failed)
        );
        assert_eq!(
            p.classify(&format!("{}?Status=0&ErrDesc=Customer%20Cancel%20Transaction", base)),
            Some(OutcomeKind::Cancelled)
        );
        // No status yet: still an intermediate page
        assert_eq!(p.classify(base), None);
    }

    #[test]
    fn test_parse_success_fields() {
        let outcome = patterns()
            .parse_outcome(
                "shopapp://ipay88/success?RefNo=R1&TransId=T99&Amount=1%2C278.99&AuthCode=A1&CCNo=4111********1111",
            )
            .unwrap();

        match outcome {
            PaymentOutcome::Success(s) => {
                assert_eq!(s.ref_no, "R1");
                assert_eq!(s.trans_id, "T99");
                assert_eq!(s.amount, "1,278.99");
                assert_eq!(s.auth_code, "A1");
                assert_eq!(s.card_number, "4111********1111");
                assert_eq!(s.remark, "");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_parse_failure_description() {
        let outcome = patterns()
            .parse_outcome("shopapp://ipay88/failure?RefNo=R2&ErrDesc=Insufficient+funds")
            .unwrap();
        match outcome {
            PaymentOutcome::Failed(f) => assert_eq!(f.error_description, "Insufficient funds"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_from_toml() {
        let toml_str = r#"
            success = ["shopapp://pay/ok"]
            cancel = ["shopapp://pay/cancel"]
            success_status = "00"

            [fields]
            ref_no = "reference"
        "#;
        let p = RedirectPatterns::from_toml(toml_str).unwrap();
        assert_eq!(p.success.len(), 1);
        assert!(p.failure.is_empty());
        assert_eq!(p.success_status, "00");
        assert_eq!(p.fields.ref_no, "reference");
        assert_eq!(p.fields.trans_id, "TransId");

        let outcome = p.parse_outcome("shopapp://pay/ok?reference=R7").unwrap();
        assert_eq!(outcome.ref_no(), "R7");
    }

    #[test]
    fn test_empty_table() {
        let p = RedirectPatterns::new();
        assert!(p.is_empty());
        assert_eq!(p.classify("shopapp://ipay88/success"), None);
    }
}
