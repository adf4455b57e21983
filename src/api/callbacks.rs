//! Provider callback and verification passthrough endpoints

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::api::AppState;
use crate::error::{AppError, AppErrorKind, AppResult, ValidationError};
use crate::services::ReconcileOutcome;

pub const SIGNATURE_HEADERS: [&str; 2] = ["chapa-signature", "x-chapa-signature"];

/// GET /api/payment-callback
///
/// Chapa's browser redirect, carrying `trx_ref`/`tx_ref` and `status` as
/// query parameters.
pub async fn payment_callback_get(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let payload = query_to_json(params);
    process_callback(&state, &payload).await
}

/// POST /api/payment-callback
///
/// Chapa webhook. When a webhook secret is configured the raw body must be
/// signed; query parameters fill in for a body without a reference.
pub async fn payment_callback_post(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if state.gateway.requires_signature() {
        let signature = SIGNATURE_HEADERS
            .iter()
            .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()));

        let Some(signature) = signature else {
            warn!("Payment callback without signature rejected");
            return AppError::validation(ValidationError::InvalidSignature {
                reason: "missing signature header".to_string(),
            })
            .into_response();
        };

        let verification = state.gateway.verify_webhook(&body, signature);
        if !verification.valid {
            warn!(reason = ?verification.reason, "Payment callback signature rejected");
            return AppError::validation(ValidationError::InvalidSignature {
                reason: verification
                    .reason
                    .unwrap_or_else(|| "signature mismatch".to_string()),
            })
            .into_response();
        }
    }

    let mut payload = if body.is_empty() {
        JsonValue::Object(Map::new())
    } else {
        match serde_json::from_slice::<JsonValue>(&body) {
            Ok(value) => value,
            Err(e) if params.is_empty() => {
                warn!(error = %e, "Payment callback body is not JSON");
                return AppError::validation(ValidationError::InvalidField {
                    field: "body".to_string(),
                    reason: "expected a JSON object".to_string(),
                })
                .into_response();
            }
            Err(_) => JsonValue::Object(Map::new()),
        }
    };

    if let JsonValue::Object(map) = &mut payload {
        for (key, value) in params {
            map.entry(key).or_insert(JsonValue::String(value));
        }
    }

    process_callback(&state, &payload).await
}

async fn process_callback(state: &AppState, payload: &JsonValue) -> Response {
    let notice = state.gateway.parse_callback(payload);
    let result = state.reconciler.handle_callback(&notice).await;
    callback_response(notice.tx_ref.as_deref(), result)
}

/// 200 unless the request itself is bad (4xx) or the failure is worth a
/// provider retry (5xx).
fn callback_response(tx_ref: Option<&str>, result: AppResult<ReconcileOutcome>) -> Response {
    match result {
        Ok(outcome) => {
            info!(tx_ref = ?tx_ref, outcome = outcome.as_str(), "Payment callback processed");
            (
                StatusCode::OK,
                Json(json!({
                    "message": "Payment callback processed",
                    "status": outcome.status().as_str(),
                })),
            )
                .into_response()
        }
        Err(e) if matches!(e.kind, AppErrorKind::Validation(_)) || e.is_not_found() => {
            e.into_response()
        }
        Err(e) if e.is_retryable() => e.into_response(),
        Err(e) => {
            error!(tx_ref = ?tx_ref, error = %e, "Payment callback could not be reconciled");
            (
                StatusCode::OK,
                Json(json!({
                    "message": "Payment callback acknowledged",
                    "status": "pending",
                })),
            )
                .into_response()
        }
    }
}

/// GET /api/verify-payment/{tx_ref}
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(tx_ref): Path<String>,
) -> AppResult<Json<JsonValue>> {
    let verification = state.reconciler.verify_and_reconcile(&tx_ref).await?;
    Ok(Json(verification.raw))
}

fn query_to_json(params: HashMap<String, String>) -> JsonValue {
    JsonValue::Object(
        params
            .into_iter()
            .map(|(key, value)| (key, JsonValue::String(value)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DomainError, ExternalError};
    use crate::database::models::TransactionStatus;

    #[test]
    fn test_outcomes_map_to_ok() {
        let response = callback_response(
            Some("DEP-1"),
            Ok(ReconcileOutcome::AlreadySettled(TransactionStatus::Completed)),
        );
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_error_classes_map_to_statuses() {
        let not_found = AppError::domain(DomainError::TransactionNotFound {
            tx_ref: "DEP-404".to_string(),
        });
        assert_eq!(
            callback_response(None, Err(not_found)).status(),
            StatusCode::NOT_FOUND
        );

        let transient = AppError::new(AppErrorKind::External(ExternalError::Gateway {
            status: 502,
            message: "connection reset".to_string(),
            user_message: "Payment provider is unavailable".to_string(),
            is_retryable: true,
        }));
        assert_eq!(
            callback_response(None, Err(transient)).status(),
            StatusCode::BAD_GATEWAY
        );

        let permanent = AppError::new(AppErrorKind::External(ExternalError::Gateway {
            status: 400,
            message: "reference unknown".to_string(),
            user_message: "Payment reference was not found".to_string(),
            is_retryable: false,
        }));
        assert_eq!(callback_response(None, Err(permanent)).status(), StatusCode::OK);
    }

    #[test]
    fn test_query_params_become_json() {
        let mut params = HashMap::new();
        params.insert("trx_ref".to_string(), "DEP-1".to_string());
        let payload = query_to_json(params);
        assert_eq!(payload["trx_ref"], "DEP-1");
    }
}
