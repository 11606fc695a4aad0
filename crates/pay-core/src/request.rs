//! # Payment Request
//!
//! The data contract an integrating application fills in to open one
//! checkout attempt.

use crate::amount::{decimal_places_for, Amount, Currency};
use crate::error::{PaymentError, PaymentResult};
use serde::{Deserialize, Serialize};

/// Action type that stores the card as a token for the customer in `remark`
pub const ACTION_TYPE_TOKENIZE: &str = "BT";

/// Description of one checkout attempt.
///
/// `ref_no` together with `merchant_code` identifies the attempt for requery
/// and deep-link resumption. The application is responsible for making
/// `ref_no` unique per attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Merchant code issued by the gateway
    #[serde(default)]
    pub merchant_code: String,

    /// Merchant reference number for this attempt
    #[serde(default)]
    pub ref_no: String,

    /// Decimal amount as text (e.g. "1,278.99")
    #[serde(default)]
    pub amount: String,

    /// Gateway payment method id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,

    /// ISO 4217 currency code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    /// Product description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prod_desc: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_contact: Option<String>,

    /// Free-form remark (customer id for tokenization)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,

    /// Page encoding/language requested from the gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// Server-to-server callback URL the gateway posts the result to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_post_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xfield1: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xfield2: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xfield3: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xfield4: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xfield5: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,

    /// Pin the checkout to a single payment method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_payment_id: Option<String>,

    /// Custom-scheme URI the gateway returns to (app deep link)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_deeplink: Option<String>,
}

impl PaymentRequest {
    /// Create a request with the required fields
    pub fn new(
        merchant_code: impl Into<String>,
        ref_no: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            merchant_code: merchant_code.into(),
            ref_no: ref_no.into(),
            amount: amount.into(),
            ..Self::default()
        }
    }

    /// Create a request from minor units, formatting the amount the way the
    /// gateway expects
    pub fn from_minor_units(
        merchant_code: impl Into<String>,
        ref_no: impl Into<String>,
        minor_units: i64,
        currency: Currency,
    ) -> PaymentResult<Self> {
        let amount = Amount::from_minor_units(minor_units, currency.decimal_places())?;
        Ok(Self::new(merchant_code, ref_no, amount.to_gateway_string())
            .with_currency(currency.as_str()))
    }

    /// Check required fields and parse the amount.
    pub fn validate(&self) -> PaymentResult<Amount> {
        if self.merchant_code.trim().is_empty() {
            return Err(PaymentError::InvalidRequest(
                "merchant code is required".to_string(),
            ));
        }

        if self.ref_no.trim().is_empty() {
            return Err(PaymentError::InvalidRequest(
                "reference number is required".to_string(),
            ));
        }

        let amount = Amount::parse(&self.amount, self.decimal_places())?;

        if self.action_type.as_deref() == Some(ACTION_TYPE_TOKENIZE)
            && self.remark.as_deref().map_or(true, |r| r.trim().is_empty())
        {
            return Err(PaymentError::InvalidRequest(
                "tokenization requires the customer id in remark".to_string(),
            ));
        }

        Ok(amount)
    }

    /// Minor-unit precision of this request's currency
    pub fn decimal_places(&self) -> u8 {
        decimal_places_for(self.currency.as_deref())
    }

    /// Extension field by 1-based slot
    pub fn xfield(&self, slot: usize) -> Option<&str> {
        match slot {
            1 => self.xfield1.as_deref(),
            2 => self.xfield2.as_deref(),
            3 => self.xfield3.as_deref(),
            4 => self.xfield4.as_deref(),
            5 => self.xfield5.as_deref(),
            _ => None,
        }
    }

    pub fn with_payment_id(mut self, payment_id: impl Into<String>) -> Self {
        self.payment_id = Some(payment_id.into());
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.prod_desc = Some(desc.into());
        self
    }

    /// Builder: set payer name and email
    pub fn with_payer(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self.user_email = Some(email.into());
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.user_contact = Some(contact.into());
        self
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_backend_post_url(mut self, url: impl Into<String>) -> Self {
        self.backend_post_url = Some(url.into());
        self
    }

    pub fn with_action_type(mut self, action_type: impl Into<String>) -> Self {
        self.action_type = Some(action_type.into());
        self
    }

    pub fn with_token_id(mut self, token_id: impl Into<String>) -> Self {
        self.token_id = Some(token_id.into());
        self
    }

    /// Builder: set an extension field by 1-based slot (1..=5).
    /// Slots outside that range are rejected.
    pub fn with_xfield(mut self, slot: usize, value: impl Into<String>) -> PaymentResult<Self> {
        let value = Some(value.into());
        match slot {
            1 => self.xfield1 = value,
            2 => self.xfield2 = value,
            3 => self.xfield3 = value,
            4 => self.xfield4 = value,
            5 => self.xfield5 = value,
            other => {
                return Err(PaymentError::InvalidRequest(format!(
                    "extension field slot {} out of range 1..=5",
                    other
                )))
            }
        }
        Ok(self)
    }

    pub fn with_promo_code(mut self, promo_code: impl Into<String>) -> Self {
        self.promo_code = Some(promo_code.into());
        self
    }

    pub fn with_fix_payment_id(mut self, payment_id: impl Into<String>) -> Self {
        self.fix_payment_id = Some(payment_id.into());
        self
    }

    pub fn with_app_deeplink(mut self, uri: impl Into<String>) -> Self {
        self.app_deeplink = Some(uri.into());
        self
    }
}
