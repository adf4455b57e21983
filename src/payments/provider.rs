use crate::payments::error::PaymentResult;
use crate::payments::types::{
    CallbackNotice, InitializeRequest, InitializeResponse, Verification,
    WebhookVerificationResult,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Outbound operations against the hosted payment gateway.
///
/// Implementations must not retry internally; the caller owns retry policy.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: InitializeRequest) -> PaymentResult<InitializeResponse>;

    async fn verify(&self, tx_ref: &str) -> PaymentResult<Verification>;

    fn name(&self) -> &'static str;

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> WebhookVerificationResult;

    /// Whether inbound webhooks must carry a valid signature.
    fn requires_signature(&self) -> bool;

    fn parse_callback(&self, payload: &JsonValue) -> CallbackNotice;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{CustomerContact, PaymentState, CURRENCY_ETB};
    use bigdecimal::BigDecimal;

    struct MockGateway;

    #[async_trait]
    impl PaymentGateway for MockGateway {
        async fn initialize(
            &self,
            request: InitializeRequest,
        ) -> PaymentResult<InitializeResponse> {
            Ok(InitializeResponse {
                checkout_url: format!("https://checkout.example/{}", request.tx_ref),
                tx_ref: request.tx_ref,
            })
        }

        async fn verify(&self, tx_ref: &str) -> PaymentResult<Verification> {
            Ok(Verification {
                tx_ref: tx_ref.to_string(),
                status: PaymentState::Success,
                amount: Some(BigDecimal::from(10)),
                currency: Some(CURRENCY_ETB.to_string()),
                provider_reference: None,
                raw: serde_json::json!({}),
            })
        }

        fn name(&self) -> &'static str {
            "mock"
        }

        fn verify_webhook(&self, _payload: &[u8], _signature: &str) -> WebhookVerificationResult {
            WebhookVerificationResult {
                valid: true,
                reason: None,
            }
        }

        fn requires_signature(&self) -> bool {
            false
        }

        fn parse_callback(&self, payload: &JsonValue) -> CallbackNotice {
            CallbackNotice {
                tx_ref: None,
                claimed_status: None,
                claimed_amount: None,
                provider_reference: None,
                event_type: None,
                payload: payload.clone(),
            }
        }
    }

    #[tokio::test]
    async fn trait_can_be_used_as_trait_object() {
        let gateway: Box<dyn PaymentGateway> = Box::new(MockGateway);
        let response = gateway
            .initialize(InitializeRequest {
                amount: BigDecimal::from(10),
                currency: CURRENCY_ETB.to_string(),
                customer: CustomerContact {
                    email: "player@example.com".to_string(),
                    first_name: "Abebe".to_string(),
                    last_name: "Kebede".to_string(),
                    phone: None,
                },
                tx_ref: "DEP-1".to_string(),
                callback_url: None,
                return_url: None,
                customization: None,
            })
            .await
            .expect("initialize should succeed");
        assert_eq!(response.tx_ref, "DEP-1");

        let verification = gateway.verify("DEP-1").await.expect("verify should succeed");
        assert_eq!(verification.status, PaymentState::Success);
    }
}
