use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

/// The only currency this wallet settles in.
pub const CURRENCY_ETB: &str = "ETB";

/// Status of a payment as reported by the gateway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Pending,
    Success,
    Failed,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Success => "success",
            PaymentState::Failed => "failed",
        }
    }

    /// Maps a Chapa status string. Anything not clearly terminal stays pending.
    pub fn from_chapa(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "success" | "successful" | "completed" => PaymentState::Success,
            "failed" | "failure" | "cancelled" | "canceled" | "reversed" => PaymentState::Failed,
            _ => PaymentState::Pending,
        }
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerContact {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customization {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeRequest {
    pub amount: BigDecimal,
    pub currency: String,
    pub customer: CustomerContact,
    pub tx_ref: String,
    pub callback_url: Option<String>,
    pub return_url: Option<String>,
    pub customization: Option<Customization>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResponse {
    pub tx_ref: String,
    pub checkout_url: String,
}

/// Authoritative result of asking the gateway about a reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub tx_ref: String,
    pub status: PaymentState,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub provider_reference: Option<String>,
    /// Gateway payload, returned verbatim by the verify endpoint.
    pub raw: JsonValue,
}

/// What an inbound callback claims. Nothing here is trusted for crediting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackNotice {
    pub tx_ref: Option<String>,
    pub claimed_status: Option<PaymentState>,
    pub claimed_amount: Option<String>,
    pub provider_reference: Option<String>,
    pub event_type: Option<String>,
    pub payload: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookVerificationResult {
    pub valid: bool,
    pub reason: Option<String>,
}

/// Reads a decimal from either a JSON string or number.
pub fn decimal_from_json(value: &JsonValue) -> Option<BigDecimal> {
    match value {
        JsonValue::String(s) => BigDecimal::from_str(s.trim()).ok(),
        JsonValue::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

/// Reads a string field, tolerating numbers.
pub fn string_field(value: &JsonValue, key: &str) -> Option<String> {
    match value.get(key)? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
