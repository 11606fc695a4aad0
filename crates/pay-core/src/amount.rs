//! # Amounts and Currencies
//!
//! Gateways exchange amounts as decimal text (`"1,278.99"`). This module parses
//! that text into minor units at the currency's precision and renders it back
//! in the gateway's format.

use crate::error::{PaymentError, PaymentResult};
use serde::{Deserialize, Serialize};

/// Currencies accepted by the hosted checkout (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    MYR,
    SGD,
    USD,
    PHP,
    THB,
    IDR,
    VND,
    JPY,
}

impl Currency {
    /// Returns the ISO 4217 currency code
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::MYR => "MYR",
            Currency::SGD => "SGD",
            Currency::USD => "USD",
            Currency::PHP => "PHP",
            Currency::THB => "THB",
            Currency::IDR => "IDR",
            Currency::VND => "VND",
            Currency::JPY => "JPY",
        }
    }

    /// Look up a currency by code (case-insensitive)
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "MYR" => Some(Currency::MYR),
            "SGD" => Some(Currency::SGD),
            "USD" => Some(Currency::USD),
            "PHP" => Some(Currency::PHP),
            "THB" => Some(Currency::THB),
            "IDR" => Some(Currency::IDR),
            "VND" => Some(Currency::VND),
            "JPY" => Some(Currency::JPY),
            _ => None,
        }
    }

    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u8 {
        match self {
            Currency::VND | Currency::JPY => 0,
            _ => 2,
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::MYR
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minor-unit precision for an optional currency code.
/// Absent or unrecognized codes use two decimal places.
pub fn decimal_places_for(code: Option<&str>) -> u8 {
    code.and_then(Currency::from_code)
        .map(|c| c.decimal_places())
        .unwrap_or(2)
}

/// Highest precision an `i64` minor-unit amount can represent
pub const MAX_DECIMAL_PLACES: u8 = 18;

/// A non-negative amount held in minor units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Amount {
    minor_units: i64,
    decimal_places: u8,
}

impl Amount {
    /// Create an amount from minor units (cents, sen, ...)
    pub fn from_minor_units(minor_units: i64, decimal_places: u8) -> PaymentResult<Self> {
        check_precision(decimal_places)?;
        if minor_units < 0 {
            return Err(PaymentError::InvalidRequest(format!(
                "amount must be non-negative, got {} minor units",
                minor_units
            )));
        }
        Ok(Self {
            minor_units,
            decimal_places,
        })
    }

    /// Parse decimal text such as `"1,234.50"` at the given precision.
    ///
    /// Accepts `,` thousands grouping in the integer part and at most
    /// `decimal_places` fractional digits (extra trailing zeros are allowed).
    pub fn parse(text: &str, decimal_places: u8) -> PaymentResult<Self> {
        check_precision(decimal_places)?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(invalid(text, "amount is empty"));
        }

        let (int_part, frac_part) = match trimmed.split_once('.') {
            Some((int_part, frac_part)) => (int_part, Some(frac_part)),
            None => (trimmed, None),
        };

        let int_digits =
            strip_grouping(int_part).ok_or_else(|| invalid(text, "malformed integer part"))?;

        let frac_digits = match frac_part {
            None => "",
            Some(frac) if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) => {
                return Err(invalid(text, "malformed fractional part"));
            }
            Some(frac) => {
                let precision = decimal_places as usize;
                if frac.len() > precision && frac[precision..].bytes().any(|b| b != b'0') {
                    return Err(invalid(
                        text,
                        &format!("more than {} decimal places", decimal_places),
                    ));
                }
                &frac[..frac.len().min(precision)]
            }
        };

        let mut minor: i64 = 0;
        for digit in int_digits.bytes().chain(frac_digits.bytes()) {
            minor = minor
                .checked_mul(10)
                .and_then(|m| m.checked_add(i64::from(digit - b'0')))
                .ok_or_else(|| invalid(text, "amount too large"))?;
        }
        for _ in frac_digits.len()..decimal_places as usize {
            minor = minor
                .checked_mul(10)
                .ok_or_else(|| invalid(text, "amount too large"))?;
        }

        Ok(Self {
            minor_units: minor,
            decimal_places,
        })
    }

    /// Amount in minor units
    pub fn minor_units(&self) -> i64 {
        self.minor_units
    }

    /// Precision this amount was parsed at
    pub fn decimal_places(&self) -> u8 {
        self.decimal_places
    }

    /// Render in the gateway format, e.g. `1,234.50`
    pub fn to_gateway_string(&self) -> String {
        let divisor = 10_i64.pow(u32::from(self.decimal_places));
        let whole = (self.minor_units / divisor).to_string();
        let fraction = self.minor_units % divisor;

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, ch) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }

        if self.decimal_places == 0 {
            grouped
        } else {
            format!(
                "{}.{:0width$}",
                grouped,
                fraction,
                width = self.decimal_places as usize
            )
        }
    }

    /// The gateway string with separators removed (`1,234.50` -> `123450`),
    /// as used in signatures
    pub fn digits(&self) -> String {
        self.to_gateway_string()
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect()
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_gateway_string())
    }
}

fn check_precision(decimal_places: u8) -> PaymentResult<()> {
    if decimal_places > MAX_DECIMAL_PLACES {
        return Err(PaymentError::InvalidRequest(format!(
            "{} decimal places exceeds the supported maximum of {}",
            decimal_places, MAX_DECIMAL_PLACES
        )));
    }
    Ok(())
}

fn invalid(text: &str, reason: &str) -> PaymentError {
    PaymentError::InvalidRequest(format!("invalid amount {:?}: {}", text, reason))
}

/// Validate `,` grouping and return the bare integer digits
fn strip_grouping(int_part: &str) -> Option<String> {
    if int_part.is_empty() {
        return None;
    }
    if !int_part.contains(',') {
        return int_part
            .bytes()
            .all(|b| b.is_ascii_digit())
            .then(|| int_part.to_string());
    }

    let mut digits = String::with_capacity(int_part.len());
    for (i, group) in int_part.split(',').enumerate() {
        let well_formed = if i == 0 {
            (1..=3).contains(&group.len())
        } else {
            group.len() == 3
        };
        if !well_formed || !group.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.push_str(group);
    }
    Some(digits)
}
