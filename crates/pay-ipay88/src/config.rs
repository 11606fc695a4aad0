//! # iPay88 Configuration
//!
//! Merchant credentials and endpoints, loaded from environment variables.

use pay_core::PaymentError;
use std::env;
use std::time::Duration;

/// Production payment host
pub const DEFAULT_API_BASE_URL: &str = "https://payment.ipay88.com.my";

/// URI scheme the host application registers for completion redirects
pub const DEFAULT_APP_SCHEME: &str = "checkoutsession";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// iPay88 merchant configuration
#[derive(Debug, Clone)]
pub struct IPay88Config {
    /// Merchant code assigned by iPay88 (e.g. `M00001`)
    pub merchant_code: String,

    /// Merchant key used to sign requests and verify responses
    pub merchant_key: String,

    /// Payment host (for testing/mocking)
    pub api_base_url: String,

    /// Custom scheme of the completion redirects
    pub app_scheme: String,

    /// Currency this merchant account settles in
    pub currency: String,

    /// Default backend-post URL when a request carries none
    pub backend_url: Option<String>,

    /// Timeout for enquiry calls
    pub request_timeout: Duration,
}

impl IPay88Config {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `IPAY88_MERCHANT_CODE`
    /// - `IPAY88_MERCHANT_KEY`
    ///
    /// Optional: `IPAY88_API_BASE_URL`, `IPAY88_APP_SCHEME`,
    /// `IPAY88_CURRENCY`, `IPAY88_BACKEND_URL`, `IPAY88_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, PaymentError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Self::from_vars(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which resolves the variable
    /// names `from_env` reads
    pub fn from_vars<F>(lookup: F) -> Result<Self, PaymentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &str| {
            optional(name)
                .ok_or_else(|| PaymentError::Configuration(format!("{} not set", name)))
        };

        let merchant_code = required("IPAY88_MERCHANT_CODE")?;
        let merchant_key = required("IPAY88_MERCHANT_KEY")?;

        let request_timeout = match optional("IPAY88_REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map(Duration::from_secs).map_err(|_| {
                PaymentError::Configuration(format!(
                    "IPAY88_REQUEST_TIMEOUT_SECS must be a number of seconds, got {:?}",
                    raw
                ))
            })?,
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let mut config = Self::new(merchant_code, merchant_key);
        if let Some(url) = optional("IPAY88_API_BASE_URL") {
            config = config.with_api_base_url(url);
        }
        if let Some(scheme) = optional("IPAY88_APP_SCHEME") {
            config.app_scheme = scheme;
        }
        if let Some(currency) = optional("IPAY88_CURRENCY") {
            config.currency = currency.to_ascii_uppercase();
        }
        config.backend_url = optional("IPAY88_BACKEND_URL");
        config.request_timeout = request_timeout;

        Ok(config)
    }

    /// Create config with explicit values (for testing)
    pub fn new(merchant_code: impl Into<String>, merchant_key: impl Into<String>) -> Self {
        Self {
            merchant_code: merchant_code.into(),
            merchant_key: merchant_key.into(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            app_scheme: DEFAULT_APP_SCHEME.to_string(),
            currency: "MYR".to_string(),
            backend_url: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Builder: set custom payment host (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_app_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.app_scheme = scheme.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Hosted payment entry page
    pub fn entry_url(&self) -> String {
        format!("{}/epayment/entry.asp", self.api_base_url)
    }

    /// Status enquiry endpoint
    pub fn enquiry_url(&self) -> String {
        format!("{}/epayment/enquiry.asp", self.api_base_url)
    }

    /// Hosted page the gateway lands on with the result in its query
    pub fn response_url(&self) -> String {
        format!("{}/epayment/response", self.api_base_url)
    }

    /// Custom-scheme redirect for an outcome (`success`, `failure`, `cancel`)
    pub fn app_redirect(&self, outcome: &str) -> String {
        format!("{}://ipay88/{}", self.app_scheme, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_endpoints() {
        let config = IPay88Config::new("M001", "key").with_api_base_url("http://localhost:9000/");

        assert_eq!(config.entry_url(), "http://localhost:9000/epayment/entry.asp");
        assert_eq!(config.enquiry_url(), "http://localhost:9000/epayment/enquiry.asp");
        assert_eq!(config.app_redirect("cancel"), "checkoutsession://ipay88/cancel");
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_from_vars_missing_key() {
        let result = IPay88Config::from_vars(vars(&[("IPAY88_MERCHANT_KEY", "secret")]));
        assert!(matches!(result, Err(PaymentError::Configuration(_))));

        let blank = IPay88Config::from_vars(vars(&[
            ("IPAY88_MERCHANT_CODE", "  "),
            ("IPAY88_MERCHANT_KEY", "secret"),
        ]));
        assert!(blank.is_err());
    }

    #[test]
    fn test_from_vars() {
        let config = IPay88Config::from_vars(vars(&[
            ("IPAY88_MERCHANT_CODE", "M001"),
            ("IPAY88_MERCHANT_KEY", "secret"),
            ("IPAY88_API_BASE_URL", "https://sandbox.example.com/"),
            ("IPAY88_CURRENCY", "sgd"),
            ("IPAY88_REQUEST_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.merchant_code, "M001");
        assert_eq!(config.api_base_url, "https://sandbox.example.com");
        assert_eq!(config.app_scheme, DEFAULT_APP_SCHEME);
        assert_eq!(config.currency, "SGD");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(config.backend_url.is_none());

        let bad_timeout = IPay88Config::from_vars(vars(&[
            ("IPAY88_MERCHANT_CODE", "M001"),
            ("IPAY88_MERCHANT_KEY", "secret"),
            ("IPAY88_REQUEST_TIMEOUT_SECS", "soon"),
        ]));
        assert!(matches!(bad_timeout, Err(PaymentError::Configuration(_))));
    }
}
