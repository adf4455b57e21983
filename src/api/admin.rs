//! Withdrawal settlement endpoints. Unauthenticated; deploy behind an
//! operator-only network boundary.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::api::wallet::HistoryQuery;
use crate::api::AppState;
use crate::database::models::TransactionRecord;
use crate::error::AppResult;

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

/// GET /api/admin/withdrawals
pub async fn list_pending_withdrawals(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, axum::extract::rejection::QueryRejection>,
) -> AppResult<Json<JsonValue>> {
    let Query(query) = query?;
    let withdrawals = state.wallet_service.pending_withdrawals(query.limit).await?;
    Ok(Json(json!({
        "count": withdrawals.len(),
        "withdrawals": withdrawals,
    })))
}

/// POST /api/admin/withdrawals/{tx_ref}/approve
pub async fn approve_withdrawal(
    State(state): State<AppState>,
    Path(tx_ref): Path<String>,
) -> AppResult<Json<TransactionRecord>> {
    Ok(Json(state.wallet_service.approve_withdrawal(&tx_ref).await?))
}

/// POST /api/admin/withdrawals/{tx_ref}/reject
pub async fn reject_withdrawal(
    State(state): State<AppState>,
    Path(tx_ref): Path<String>,
    body: Option<Json<RejectRequest>>,
) -> AppResult<Json<TransactionRecord>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(
        state
            .wallet_service
            .reject_withdrawal(&tx_ref, request.reason)
            .await?,
    ))
}
