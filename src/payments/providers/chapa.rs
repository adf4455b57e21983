use crate::config::{parse_env, ConfigError};
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{
    decimal_from_json, string_field, CallbackNotice, InitializeRequest, InitializeResponse,
    PaymentState, Verification, WebhookVerificationResult,
};
use crate::payments::utils::{verify_hmac_sha256_hex, PaymentHttpClient};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CHAPA_BASE_URL: &str = "https://api.chapa.co/v1";

#[derive(Debug, Clone)]
pub struct ChapaConfig {
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub callback_url: Option<String>,
    pub return_url: Option<String>,
    pub customization_title: String,
    pub timeout_secs: u64,
}

impl Default for ChapaConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: None,
            base_url: DEFAULT_CHAPA_BASE_URL.to_string(),
            callback_url: None,
            return_url: None,
            customization_title: "Bingo Deposit".to_string(),
            timeout_secs: 15,
        }
    }
}

impl ChapaConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret_key = std::env::var("CHAPA_SECRET_KEY")
            .map_err(|_| ConfigError::MissingVariable("CHAPA_SECRET_KEY".to_string()))?;
        let defaults = Self::default();

        Ok(Self {
            secret_key,
            webhook_secret: std::env::var("CHAPA_WEBHOOK_SECRET")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            base_url: std::env::var("CHAPA_BASE_URL").unwrap_or(defaults.base_url),
            callback_url: std::env::var("CHAPA_CALLBACK_URL").ok(),
            return_url: std::env::var("CHAPA_RETURN_URL").ok(),
            customization_title: std::env::var("CHAPA_CUSTOMIZATION_TITLE")
                .unwrap_or(defaults.customization_title),
            timeout_secs: parse_env("CHAPA_TIMEOUT_SECS", defaults.timeout_secs)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "CHAPA_SECRET_KEY cannot be empty".to_string(),
            ));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "CHAPA_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("CHAPA_TIMEOUT_SECS".to_string()));
        }

        Ok(())
    }
}

pub struct ChapaProvider {
    config: ChapaConfig,
    http: PaymentHttpClient,
}

impl ChapaProvider {
    pub fn new(config: ChapaConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl PaymentGateway for ChapaProvider {
    async fn initialize(&self, request: InitializeRequest) -> PaymentResult<InitializeResponse> {
        if request.customer.email.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "email is required for chapa initialization".to_string(),
                field: Some("email".to_string()),
            });
        }

        let mut payload = serde_json::json!({
            "amount": request.amount.to_string(),
            "currency": request.currency,
            "email": request.customer.email,
            "first_name": request.customer.first_name,
            "last_name": request.customer.last_name,
            "tx_ref": request.tx_ref,
        });
        if let Some(phone) = &request.customer.phone {
            payload["phone_number"] = JsonValue::String(phone.clone());
        }
        if let Some(url) = request.callback_url.as_ref().or(self.config.callback_url.as_ref()) {
            payload["callback_url"] = JsonValue::String(url.clone());
        }
        if let Some(url) = request.return_url.as_ref().or(self.config.return_url.as_ref()) {
            payload["return_url"] = JsonValue::String(url.clone());
        }
        payload["customization"] = match &request.customization {
            Some(customization) => serde_json::json!({
                "title": customization.title,
                "description": customization.description,
            }),
            None => serde_json::json!({
                "title": self.config.customization_title,
                "description": format!("Wallet deposit {}", request.tx_ref),
            }),
        };

        let (status, body) = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/transaction/initialize"),
                Some(&self.config.secret_key),
                Some(&payload),
            )
            .await?;

        let envelope: ChapaEnvelope<ChapaInitializeData> =
            serde_json::from_value(body).map_err(|e| PaymentError::InvalidResponse {
                message: format!("unexpected chapa initialize response: {}", e),
            })?;

        if !envelope.is_success() || !status.is_success() {
            warn!(
                tx_ref = %request.tx_ref,
                http_status = %status,
                "chapa rejected payment initialization"
            );
            return Err(PaymentError::ProviderRejected {
                message: envelope.message_text(),
                provider_code: Some(status.as_u16().to_string()),
            });
        }

        let data = envelope.data.ok_or_else(|| PaymentError::InvalidResponse {
            message: "chapa initialize response has no data".to_string(),
        })?;
        info!(tx_ref = %request.tx_ref, "chapa payment initialized");

        Ok(InitializeResponse {
            tx_ref: request.tx_ref,
            checkout_url: data.checkout_url,
        })
    }

    async fn verify(&self, tx_ref: &str) -> PaymentResult<Verification> {
        if tx_ref.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "tx_ref is required".to_string(),
                field: Some("tx_ref".to_string()),
            });
        }

        let (status, body) = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/transaction/verify/{}", tx_ref)),
                Some(&self.config.secret_key),
                None,
            )
            .await?;

        let envelope: ChapaEnvelope<JsonValue> =
            serde_json::from_value(body.clone()).map_err(|e| PaymentError::InvalidResponse {
                message: format!("unexpected chapa verify response: {}", e),
            })?;

        let data = envelope.data.as_ref().filter(|d| d.is_object());
        if status == reqwest::StatusCode::NOT_FOUND || (!envelope.is_success() && data.is_none()) {
            return Err(PaymentError::ReferenceNotFound {
                reference: tx_ref.to_string(),
            });
        }
        if !status.is_success() {
            return Err(PaymentError::ProviderRejected {
                message: envelope.message_text(),
                provider_code: Some(status.as_u16().to_string()),
            });
        }

        let data = data.ok_or_else(|| PaymentError::InvalidResponse {
            message: "chapa verify response has no data".to_string(),
        })?;

        if let Some(reported) = string_field(data, "tx_ref") {
            if reported != tx_ref {
                return Err(PaymentError::InvalidResponse {
                    message: format!("chapa verified {} when asked for {}", reported, tx_ref),
                });
            }
        }

        let payment_status = data
            .get("status")
            .and_then(|v| v.as_str())
            .map(PaymentState::from_chapa)
            .unwrap_or(PaymentState::Pending);

        Ok(Verification {
            tx_ref: tx_ref.to_string(),
            status: payment_status,
            amount: data.get("amount").and_then(decimal_from_json),
            currency: string_field(data, "currency"),
            provider_reference: string_field(data, "reference"),
            raw: body,
        })
    }

    fn name(&self) -> &'static str {
        "chapa"
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> WebhookVerificationResult {
        let Some(secret) = self.config.webhook_secret.as_deref() else {
            return WebhookVerificationResult {
                valid: false,
                reason: Some("webhook secret is not configured".to_string()),
            };
        };
        let valid = verify_hmac_sha256_hex(payload, secret, signature);
        WebhookVerificationResult {
            valid,
            reason: if valid {
                None
            } else {
                Some("invalid chapa signature".to_string())
            },
        }
    }

    fn requires_signature(&self) -> bool {
        self.config.webhook_secret.is_some()
    }

    fn parse_callback(&self, payload: &JsonValue) -> CallbackNotice {
        // Redirect callbacks use `trx_ref`, webhooks use `tx_ref`; some
        // webhook shapes nest the fields under `data`.
        let body = payload
            .get("data")
            .filter(|d| d.is_object() && d.get("tx_ref").is_some())
            .unwrap_or(payload);

        let tx_ref = string_field(body, "tx_ref").or_else(|| string_field(body, "trx_ref"));
        let claimed_status = body
            .get("status")
            .and_then(|v| v.as_str())
            .map(PaymentState::from_chapa);
        let provider_reference =
            string_field(body, "reference").or_else(|| string_field(body, "ref_id"));

        CallbackNotice {
            tx_ref,
            claimed_status,
            claimed_amount: string_field(body, "amount"),
            provider_reference,
            event_type: string_field(payload, "event"),
            payload: payload.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChapaEnvelope<T> {
    #[serde(default)]
    message: Option<JsonValue>,
    #[serde(default)]
    status: Option<String>,
    data: Option<T>,
}

impl<T> ChapaEnvelope<T> {
    fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }

    /// Chapa sends `message` either as a string or as a map of field errors.
    fn message_text(&self) -> String {
        match &self.message {
            Some(JsonValue::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "payment provider reported failure".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChapaInitializeData {
    checkout_url: String,
}
