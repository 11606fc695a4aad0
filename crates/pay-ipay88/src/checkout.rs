//! # iPay88 Hosted Checkout
//!
//! Builds the signed entry-page form, supplies the completion URL table and
//! performs status enquiries against the gateway.

use crate::config::IPay88Config;
use crate::redirect::ResponseVerifier;
use crate::signature::{request_signature, SIGNATURE_TYPE};
use async_trait::async_trait;
use pay_core::{
    CheckoutForm, CheckoutGateway, PaymentError, PaymentRequest, PaymentResult, RedirectPatterns,
    RequeryBackend, RequeryQuery, RequeryStatus, SharedRedirectVerifier,
};
use std::sync::Arc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, instrument};

/// Language sent when the request leaves it unset
pub const DEFAULT_LANG: &str = "UTF-8";

const PROVIDER: &str = "ipay88";

/// iPay88 gateway
///
/// Payers complete the payment on iPay88's hosted page; this type only signs
/// what is submitted and reads back what the gateway reports.
pub struct IPay88Gateway {
    config: IPay88Config,
    client: Client,
}

impl IPay88Gateway {
    /// Create a new gateway
    pub fn new(config: IPay88Config) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                PaymentError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> PaymentResult<Self> {
        let config = IPay88Config::from_env()?;
        Self::new(config)
    }

    pub fn config(&self) -> &IPay88Config {
        &self.config
    }
}

impl CheckoutGateway for IPay88Gateway {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    #[instrument(skip(self, request), fields(ref_no = %request.ref_no))]
    fn checkout_form(&self, request: &PaymentRequest) -> PaymentResult<CheckoutForm> {
        let amount = request.validate()?;

        if request.merchant_code != self.config.merchant_code {
            return Err(PaymentError::InvalidRequest(format!(
                "merchant code {} is not configured",
                request.merchant_code
            )));
        }

        let currency = request
            .currency
            .as_deref()
            .unwrap_or(self.config.currency.as_str())
            .to_ascii_uppercase();
        if currency != self.config.currency {
            return Err(PaymentError::UnsupportedCurrency { currency });
        }

        let signature = request_signature(
            &self.config.merchant_key,
            &request.merchant_code,
            &request.ref_no,
            &amount.digits(),
            &currency,
            request.xfield1.as_deref().unwrap_or_default(),
        )?;

        let backend_url = request
            .backend_post_url
            .as_deref()
            .or(self.config.backend_url.as_deref());

        let mut form = CheckoutForm::new(self.config.entry_url());
        form.push("MerchantCode", request.merchant_code.as_str());
        form.push_opt("PaymentId", request.payment_id.as_deref());
        form.push("RefNo", request.ref_no.as_str());
        form.push("Amount", amount.to_gateway_string());
        form.push("Currency", currency);
        form.push_opt("ProdDesc", request.prod_desc.as_deref());
        form.push_opt("UserName", request.user_name.as_deref());
        form.push_opt("UserEmail", request.user_email.as_deref());
        form.push_opt("UserContact", request.user_contact.as_deref());
        form.push_opt("Remark", request.remark.as_deref());
        form.push("Lang", request.lang.as_deref().unwrap_or(DEFAULT_LANG));
        form.push_opt("Country", request.country.as_deref());
        form.push_opt("BackendURL", backend_url);
        form.push("ResponseURL", self.config.response_url());
        form.push_opt("ActionType", request.action_type.as_deref());
        form.push_opt("TokenId", request.token_id.as_deref());
        form.push_opt("PromoCode", request.promo_code.as_deref());
        for slot in 1..=5 {
            form.push_opt(&format!("Xfield{}", slot), request.xfield(slot));
        }
        form.push_opt("FixPaymentId", request.fix_payment_id.as_deref());
        form.push_opt("appdeeplink", request.app_deeplink.as_deref());
        form.push("SignatureType", SIGNATURE_TYPE);
        form.push("Signature", signature);

        debug!("Built iPay88 checkout form with {} fields", form.fields.len());
        Ok(form)
    }

    fn redirect_patterns(&self) -> RedirectPatterns {
        RedirectPatterns::new()
            .with_success(self.config.app_redirect("success"))
            .with_failure(self.config.app_redirect("failure"))
            .with_cancel(self.config.app_redirect("cancel"))
            .with_cancel(format!("{}/epayment/cancel", self.config.api_base_url))
            .with_response(self.config.response_url())
    }

    fn redirect_verifier(&self) -> Option<SharedRedirectVerifier> {
        Some(Arc::new(ResponseVerifier::new(self.config.clone())))
    }
}

#[async_trait]
impl RequeryBackend for IPay88Gateway {
    #[instrument(skip(self, query), fields(ref_no = %query.ref_no))]
    async fn query_status(&self, query: &RequeryQuery) -> PaymentResult<RequeryStatus> {
        let mut params = vec![
            ("MerchantCode", query.merchant_code.as_str()),
            ("RefNo", query.ref_no.as_str()),
        ];
        if let Some(ref amount) = query.amount {
            params.push(("Amount", amount.as_str()));
        }

        let response = self
            .client
            .get(self.config.enquiry_url())
            .query(&params)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            error!("iPay88 enquiry error: status={}, body={}", status, body);
            return Err(PaymentError::ProviderError {
                provider: PROVIDER.to_string(),
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let result = parse_enquiry_body(&body)?;
        info!("iPay88 enquiry answered: result_code={}", result.result_code);
        Ok(result)
    }
}

fn transport_error(e: reqwest::Error) -> PaymentError {
    if e.is_timeout() {
        PaymentError::Timeout
    } else {
        PaymentError::NetworkError(e.to_string())
    }
}

/// JSON form of an enquiry answer
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnquiryResponse {
    result_code: String,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Enquiry answers are either JSON or a bare status line (`00`, `Record not found`, ...)
fn parse_enquiry_body(body: &str) -> PaymentResult<RequeryStatus> {
    let body = body.trim();
    if body.is_empty() {
        return Err(PaymentError::RequeryError("empty enquiry response".to_string()));
    }

    if body.starts_with('{') {
        let parsed: EnquiryResponse = serde_json::from_str(body).map_err(|e| {
            PaymentError::RequeryError(format!("Failed to parse enquiry response: {}", e))
        })?;
        let mut status = RequeryStatus::new(parsed.result_code);
        status.amount = parsed.amount.filter(|a| !a.is_empty());
        status.message = parsed.error_description.filter(|m| !m.is_empty());
        return Ok(status);
    }

    Ok(RequeryStatus::new(body).with_message(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::response_signature;
    use pay_core::{
        detached_listener, requery, OutcomeKind, PaymentOutcome, PaymentSession, RequeryOutcome,
    };
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(base_url: &str) -> IPay88Gateway {
        let config = IPay88Config::new("M001", "secret")
            .with_api_base_url(base_url)
            .with_app_scheme("shopapp")
            .with_request_timeout(Duration::from_millis(500));
        IPay88Gateway::new(config).unwrap()
    }

    fn request() -> PaymentRequest {
        PaymentRequest::new("M001", "REF123", "1278.99")
            .with_currency("MYR")
            .with_description("Order #42")
            .with_payer("Ali", "ali@example.com")
            .with_backend_post_url("https://merchant.example.com/callback/ipay88")
    }

    #[test]
    fn test_checkout_form_fields() {
        let gw = gateway("https://payment.example.com");
        let form = gw.checkout_form(&request()).unwrap();

        assert_eq!(form.action_url, "https://payment.example.com/epayment/entry.asp");
        assert_eq!(form.field("Amount"), Some("1,278.99"));
        assert_eq!(form.field("Currency"), Some("MYR"));
        assert_eq!(form.field("Lang"), Some("UTF-8"));
        assert_eq!(form.field("SignatureType"), Some("HMACSHA256"));
        assert_eq!(form.field("UserContact"), None);
        assert_eq!(form.field("Xfield1"), None);

        let expected = request_signature("secret", "M001", "REF123", "127899", "MYR", "").unwrap();
        assert_eq!(form.field("Signature"), Some(expected.as_str()));
    }

    #[test]
    fn test_checkout_form_rejections() {
        let gw = gateway("https://payment.example.com");

        let bad_amount = PaymentRequest::new("M001", "REF1", "12.3.4");
        assert!(matches!(
            gw.checkout_form(&bad_amount),
            Err(PaymentError::InvalidRequest(_))
        ));

        let wrong_currency = PaymentRequest::new("M001", "REF1", "10.00").with_currency("USD");
        assert!(matches!(
            gw.checkout_form(&wrong_currency),
            Err(PaymentError::UnsupportedCurrency { .. })
        ));

        let other_merchant = PaymentRequest::new("M999", "REF1", "10.00");
        assert!(gw.checkout_form(&other_merchant).is_err());
    }

    #[test]
    fn test_request_to_redirect_preserves_reference_and_amount() {
        let gw = gateway("https://payment.example.com");
        let request = request();
        let form = gw.checkout_form(&request).unwrap();
        assert!(form.to_url().unwrap().starts_with("https://payment.example.com/epayment/entry.asp?"));

        let mut session = PaymentSession::new(gw.redirect_patterns(), detached_listener());
        let handle = session.start(request).unwrap();

        // The gateway echoes RefNo and Amount back on the hosted response page
        let signature =
            response_signature("secret", "M001", "2", "REF123", "127899", "MYR", "1").unwrap();
        let mut landing = url::Url::parse(&gw.config().response_url()).unwrap();
        landing
            .query_pairs_mut()
            .append_pair("MerchantCode", "M001")
            .append_pair("PaymentId", "2")
            .append_pair("RefNo", form.field("RefNo").unwrap())
            .append_pair("Amount", form.field("Amount").unwrap())
            .append_pair("Currency", "MYR")
            .append_pair("TransId", "T0001")
            .append_pair("Status", "1")
            .append_pair("Signature", &signature);

        session
            .handle_navigation_event(handle, "https://bank.example.com/fpx/redirect")
            .unwrap();
        session
            .handle_navigation_event(handle, landing.as_str())
            .unwrap();

        match session.outcome().unwrap() {
            PaymentOutcome::Success(s) => {
                assert_eq!(s.ref_no, "REF123");
                assert_eq!(s.amount, "1,278.99");
                assert_eq!(s.trans_id, "T0001");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_redirect_patterns() {
        let patterns = gateway("https://payment.example.com").redirect_patterns();
        assert_eq!(
            patterns.classify("shopapp://ipay88/cancel?RefNo=R1"),
            Some(OutcomeKind::Cancelled)
        );
        assert_eq!(
            patterns.classify("https://payment.example.com/epayment/cancel"),
            Some(OutcomeKind::Cancelled)
        );
        assert_eq!(
            patterns.classify("https://payment.example.com/epayment/entry.asp"),
            None
        );
    }

    #[tokio::test]
    async fn test_enquiry_plain_text_paid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/epayment/enquiry.asp"))
            .and(query_param("MerchantCode", "M001"))
            .and(query_param("RefNo", "REF123"))
            .respond_with(ResponseTemplate::new(200).set_body_string("00"))
            .mount(&server)
            .await;

        let gw = gateway(&server.uri());
        let query = RequeryQuery::new("REF123", "M001").with_amount("1,278.99");
        let outcome = requery(&gw, &query, None, &detached_listener()).await;

        match outcome {
            RequeryOutcome::RequerySuccess(s) => {
                assert_eq!(s.result_code, "00");
                assert_eq!(s.amount, "1,278.99");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_enquiry_json_and_text_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/epayment/enquiry.asp"))
            .and(query_param("RefNo", "JSON1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resultCode": "01",
                "amount": "5.00",
                "errorDescription": "Payment Pending"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/epayment/enquiry.asp"))
            .and(query_param("RefNo", "TEXT1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Record not found\r\n"))
            .mount(&server)
            .await;

        let gw = gateway(&server.uri());

        let status = gw
            .query_status(&RequeryQuery::new("JSON1", "M001"))
            .await
            .unwrap();
        assert_eq!(status.result_code, "01");
        assert_eq!(status.amount.as_deref(), Some("5.00"));
        assert_eq!(status.message.as_deref(), Some("Payment Pending"));

        let status = gw
            .query_status(&RequeryQuery::new("TEXT1", "M001"))
            .await
            .unwrap();
        assert_eq!(status.result_code, "Record not found");
    }

    #[tokio::test]
    async fn test_enquiry_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/epayment/enquiry.asp"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let result = gateway(&server.uri())
            .query_status(&RequeryQuery::new("REF123", "M001"))
            .await;
        assert!(matches!(result, Err(PaymentError::ProviderError { .. })));
    }

    #[tokio::test]
    async fn test_enquiry_timeout_surfaces_as_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/epayment/enquiry.asp"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("00")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let gw = gateway(&server.uri());
        let outcome = requery(
            &gw,
            &RequeryQuery::new("REF123", "M001"),
            None,
            &detached_listener(),
        )
        .await;

        match outcome {
            RequeryOutcome::RequeryFailed(f) => assert_eq!(f.error_description, "timeout"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_parse_enquiry_body() {
        assert!(matches!(
            parse_enquiry_body("  "),
            Err(PaymentError::RequeryError(_))
        ));
        assert!(matches!(
            parse_enquiry_body("{not json"),
            Err(PaymentError::RequeryError(_))
        ));
        assert_eq!(parse_enquiry_body("00\n").unwrap().result_code, "00");
    }
}
