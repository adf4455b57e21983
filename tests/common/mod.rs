//! Shared fixtures: a scripted gateway and a router over in-memory stores.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use bigdecimal::BigDecimal;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use bingo_wallet_backend::api::{router, AppState};
use bingo_wallet_backend::database::memory::{InMemoryTransactionLedger, InMemoryWalletStore};
use bingo_wallet_backend::database::repository::WalletStore;
use bingo_wallet_backend::payments::error::{PaymentError, PaymentResult};
use bingo_wallet_backend::payments::provider::PaymentGateway;
use bingo_wallet_backend::payments::providers::{ChapaConfig, ChapaProvider};
use bingo_wallet_backend::payments::types::{
    CallbackNotice, InitializeRequest, InitializeResponse, PaymentState, Verification,
    WebhookVerificationResult,
};
use bingo_wallet_backend::payments::utils::verify_hmac_sha256_hex;

/// Gateway double. Verification answers are set per reference; unknown
/// references verify as not found. Callback parsing is Chapa's own.
pub struct ScriptedGateway {
    answers: Mutex<HashMap<String, PaymentResult<(PaymentState, BigDecimal)>>>,
    initialize_error: Mutex<Option<PaymentError>>,
    webhook_secret: Option<String>,
    chapa: ChapaProvider,
    pub verify_calls: AtomicUsize,
    pub initialized: Mutex<Vec<InitializeRequest>>,
}

impl ScriptedGateway {
    pub fn new(webhook_secret: Option<&str>) -> Self {
        let chapa = ChapaProvider::new(ChapaConfig {
            secret_key: "CHASECK_TEST-scripted".to_string(),
            webhook_secret: webhook_secret.map(String::from),
            ..ChapaConfig::default()
        })
        .expect("chapa provider should build");

        Self {
            answers: Mutex::new(HashMap::new()),
            initialize_error: Mutex::new(None),
            webhook_secret: webhook_secret.map(String::from),
            chapa,
            verify_calls: AtomicUsize::new(0),
            initialized: Mutex::new(Vec::new()),
        }
    }

    pub fn answer(&self, tx_ref: &str, state: PaymentState, amount: i64) {
        self.answers
            .lock()
            .unwrap()
            .insert(tx_ref.to_string(), Ok((state, BigDecimal::from(amount))));
    }

    pub fn answer_error(&self, tx_ref: &str, error: PaymentError) {
        self.answers
            .lock()
            .unwrap()
            .insert(tx_ref.to_string(), Err(error));
    }

    pub fn fail_initialize(&self, error: PaymentError) {
        *self.initialize_error.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initialize(&self, request: InitializeRequest) -> PaymentResult<InitializeResponse> {
        if let Some(err) = self.initialize_error.lock().unwrap().clone() {
            return Err(err);
        }
        let response = InitializeResponse {
            checkout_url: format!("https://checkout.chapa.test/pay/{}", request.tx_ref),
            tx_ref: request.tx_ref.clone(),
        };
        self.initialized.lock().unwrap().push(request);
        Ok(response)
    }

    async fn verify(&self, tx_ref: &str) -> PaymentResult<Verification> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        let answer = self.answers.lock().unwrap().get(tx_ref).cloned();
        let (status, amount) = match answer {
            Some(answer) => answer?,
            None => {
                return Err(PaymentError::ReferenceNotFound {
                    reference: tx_ref.to_string(),
                })
            }
        };

        Ok(Verification {
            tx_ref: tx_ref.to_string(),
            status,
            amount: Some(amount.clone()),
            currency: Some("ETB".to_string()),
            provider_reference: Some(format!("AP{}", tx_ref)),
            raw: json!({
                "message": "Payment details",
                "status": "success",
                "data": {
                    "tx_ref": tx_ref,
                    "status": status.as_str(),
                    "amount": amount.to_string(),
                    "currency": "ETB"
                }
            }),
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> WebhookVerificationResult {
        let valid = self
            .webhook_secret
            .as_deref()
            .map(|secret| verify_hmac_sha256_hex(payload, secret, signature))
            .unwrap_or(false);
        WebhookVerificationResult {
            valid,
            reason: (!valid).then(|| "signature mismatch".to_string()),
        }
    }

    fn requires_signature(&self) -> bool {
        self.webhook_secret.is_some()
    }

    fn parse_callback(&self, payload: &JsonValue) -> CallbackNotice {
        self.chapa.parse_callback(payload)
    }
}

pub struct TestApp {
    pub router: Router,
    pub ledger: Arc<InMemoryTransactionLedger>,
    pub wallets: Arc<InMemoryWalletStore>,
    pub gateway: Arc<ScriptedGateway>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_gateway(ScriptedGateway::new(None))
    }

    pub fn with_gateway(gateway: ScriptedGateway) -> Self {
        let ledger = Arc::new(InMemoryTransactionLedger::new());
        let wallets = Arc::new(InMemoryWalletStore::new());
        let gateway = Arc::new(gateway);
        let state = AppState::new(ledger.clone(), wallets.clone(), gateway.clone());

        Self {
            router: router(state),
            ledger,
            wallets,
            gateway,
        }
    }

    pub async fn request(&self, request: Request<Body>) -> (StatusCode, JsonValue) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| JsonValue::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, JsonValue) {
        self.request(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: JsonValue) -> (StatusCode, JsonValue) {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn balance(&self, user_id: &str) -> BigDecimal {
        self.wallets.get(user_id).await.unwrap().balance
    }

    /// Starts a deposit through the API and returns its tx_ref.
    pub async fn start_deposit(&self, user_id: &str, amount: i64) -> String {
        let (status, body) = self
            .post_json("/api/wallet/deposit", deposit_body(user_id, amount))
            .await;
        assert_eq!(status, StatusCode::OK, "deposit failed: {}", body);
        body["tx_ref"].as_str().unwrap().to_string()
    }
}

pub fn deposit_body(user_id: &str, amount: i64) -> JsonValue {
    json!({
        "amount": amount,
        "email": "player@example.com",
        "first_name": "Abebe",
        "last_name": "Kebede",
        "userId": user_id,
        "phone": "0911000000"
    })
}
