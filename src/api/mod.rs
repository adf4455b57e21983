//! HTTP surface: routes, shared state and middleware stack

pub mod admin;
pub mod callbacks;
pub mod wallet;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::warn;

use crate::config::ServerConfig;
use crate::database::repository::{TransactionLedger, WalletStore};
use crate::health::{HealthChecker, HealthStatus, Liveness};
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::payments::provider::PaymentGateway;
use crate::services::{Reconciler, WalletService};

#[derive(Clone)]
pub struct AppState {
    pub wallet_service: Arc<WalletService>,
    pub reconciler: Arc<Reconciler>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub health_checker: HealthChecker,
}

impl AppState {
    pub fn new(
        ledger: Arc<dyn TransactionLedger>,
        wallets: Arc<dyn WalletStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            wallet_service: Arc::new(WalletService::new(
                ledger.clone(),
                wallets.clone(),
                gateway.clone(),
            )),
            reconciler: Arc::new(Reconciler::new(ledger.clone(), wallets, gateway.clone())),
            gateway,
            health_checker: HealthChecker::new(ledger),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/api/wallet/deposit", post(wallet::deposit))
        .route("/api/wallet/withdraw", post(wallet::withdraw))
        .route("/api/wallet/{user_id}", get(wallet::get_wallet))
        .route("/api/wallet/{user_id}/transactions", get(wallet::list_transactions))
        .route(
            "/api/payment-callback",
            get(callbacks::payment_callback_get).post(callbacks::payment_callback_post),
        )
        .route("/api/verify-payment/{tx_ref}", get(callbacks::verify_payment))
        .route("/api/admin/withdrawals", get(admin::list_pending_withdrawals))
        .route(
            "/api/admin/withdrawals/{tx_ref}/approve",
            post(admin::approve_withdrawal),
        )
        .route(
            "/api/admin/withdrawals/{tx_ref}/reject",
            post(admin::reject_withdrawal),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

/// `*` allows any origin; otherwise only the listed ones.
pub fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if server.allows_any_origin() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = server
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

async fn root() -> &'static str {
    "Bingo wallet API is running"
}

async fn health() -> Json<Liveness> {
    Json(Liveness::healthy())
}

async fn readiness(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> (axum::http::StatusCode, Json<HealthStatus>) {
    let status = state.health_checker.check_health().await;
    let code = if status.is_healthy() {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}
