use crate::payments::error::{PaymentError, PaymentResult};
use reqwest::{Client, StatusCode};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::warn;

/// Thin JSON client with a hard per-request timeout and no retries.
#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    timeout: Duration,
}

impl PaymentHttpClient {
    pub fn new(timeout: Duration) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self { client, timeout })
    }

    /// Sends one request and returns the HTTP status with the parsed JSON body.
    ///
    /// Non-2xx responses are not errors here: providers put their rejection
    /// reason in the body and the caller decides what it means.
    pub async fn request_json(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: Option<&JsonValue>,
    ) -> PaymentResult<(StatusCode, JsonValue)> {
        let mut request = self.client.request(method, url).timeout(self.timeout);
        if let Some(token) = bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(payload) = body {
            request = request.json(payload);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if status.is_server_error() {
            warn!(status = %status, "payment provider returned server error");
            return Err(PaymentError::NetworkError {
                message: format!("provider returned HTTP {}", status),
            });
        }

        let parsed = serde_json::from_str::<JsonValue>(&text).map_err(|e| {
            PaymentError::InvalidResponse {
                message: format!("invalid provider JSON response (HTTP {}): {}", status, e),
            }
        })?;

        Ok((status, parsed))
    }

    fn transport_error(&self, err: reqwest::Error) -> PaymentError {
        if err.is_timeout() {
            PaymentError::TimeoutError {
                message: err.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            PaymentError::NetworkError {
                message: format!("provider request failed: {}", err),
            }
        }
    }
}

pub fn sign_hmac_sha256_hex(payload: &[u8], secret: &str) -> Option<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_hmac_sha256_hex(payload: &[u8], secret: &str, signature: &str) -> bool {
    match sign_hmac_sha256_hex(payload, secret) {
        Some(computed) => secure_eq(
            computed.as_bytes(),
            signature.trim().to_lowercase().as_bytes(),
        ),
        None => false,
    }
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }

    #[test]
    fn webhook_hmac_roundtrip_accepts_own_signature() {
        let payload = br#"{"tx_ref":"DEP-1","status":"success"}"#;
        let signature = sign_hmac_sha256_hex(payload, "whsec").expect("signing should succeed");
        assert!(verify_hmac_sha256_hex(payload, "whsec", &signature));
        assert!(verify_hmac_sha256_hex(
            payload,
            "whsec",
            &signature.to_uppercase()
        ));
    }

    #[test]
    fn webhook_hmac_rejects_tampered_payload_and_wrong_secret() {
        let payload = br#"{"tx_ref":"DEP-1","status":"success"}"#;
        let signature = sign_hmac_sha256_hex(payload, "whsec").expect("signing should succeed");
        assert!(!verify_hmac_sha256_hex(
            br#"{"tx_ref":"DEP-1","status":"success","amount":"9999"}"#,
            "whsec",
            &signature
        ));
        assert!(!verify_hmac_sha256_hex(payload, "other", &signature));
        assert!(!verify_hmac_sha256_hex(payload, "whsec", "not-a-signature"));
    }

    #[test]
    fn client_builds_with_timeout() {
        assert!(PaymentHttpClient::new(Duration::from_secs(5)).is_ok());
    }
}
