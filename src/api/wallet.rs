use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::info;

use crate::api::AppState;
use crate::database::models::{TransactionRecord, Wallet};
use crate::error::AppResult;
use crate::services::validation::{parse_amount, require_text};
use crate::services::{DepositCommand, DepositSession, WithdrawCommand};

/// Body of `POST /api/wallet/deposit`. Every field is required; they are
/// optional here so a missing one is reported by name.
#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: Option<JsonValue>,
    pub email: Option<String>,
    #[serde(alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(alias = "lastName")]
    pub last_name: Option<String>,
    #[serde(rename = "userId", alias = "user_id")]
    pub user_id: Option<String>,
    pub phone: Option<String>,
}

impl DepositRequest {
    pub fn into_command(self) -> AppResult<DepositCommand> {
        Ok(DepositCommand {
            amount: parse_amount(self.amount.as_ref())?,
            email: require_text("email", self.email.as_deref())?,
            first_name: require_text("first_name", self.first_name.as_deref())?,
            last_name: require_text("last_name", self.last_name.as_deref())?,
            user_id: require_text("userId", self.user_id.as_deref())?,
            phone: require_text("phone", self.phone.as_deref())?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    #[serde(rename = "userId", alias = "user_id")]
    pub user_id: Option<String>,
    pub amount: Option<JsonValue>,
}

impl WithdrawRequest {
    pub fn into_command(self) -> AppResult<WithdrawCommand> {
        Ok(WithdrawCommand {
            user_id: require_text("userId", self.user_id.as_deref())?,
            amount: parse_amount(self.amount.as_ref())?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// POST /api/wallet/deposit
pub async fn deposit(
    State(state): State<AppState>,
    payload: Result<Json<DepositRequest>, JsonRejection>,
) -> AppResult<Json<DepositSession>> {
    let Json(request) = payload?;
    let command = request.into_command()?;

    let session = state.wallet_service.initiate_deposit(command).await?;
    info!(tx_ref = %session.tx_ref, "Deposit checkout created");
    Ok(Json(session))
}

/// POST /api/wallet/withdraw
pub async fn withdraw(
    State(state): State<AppState>,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> AppResult<Json<JsonValue>> {
    let Json(request) = payload?;
    let command = request.into_command()?;

    let receipt = state.wallet_service.request_withdrawal(command).await?;
    Ok(Json(json!({
        "success": true,
        "transactionId": receipt.tx_ref,
        "status": "processing",
        "message": format!("Withdrawal of {} ETB is being processed", receipt.amount),
    })))
}

/// GET /api/wallet/{user_id}
pub async fn get_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Wallet>> {
    let user_id = require_text("user_id", Some(&user_id))?;
    Ok(Json(state.wallet_service.wallet(&user_id).await?))
}

/// GET /api/wallet/{user_id}/transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    query: Result<Query<HistoryQuery>, axum::extract::rejection::QueryRejection>,
) -> AppResult<Json<JsonValue>> {
    let Query(query) = query?;
    let user_id = require_text("user_id", Some(&user_id))?;

    let transactions: Vec<TransactionRecord> =
        state.wallet_service.history(&user_id, query.limit).await?;
    Ok(Json(json!({
        "user_id": user_id,
        "count": transactions.len(),
        "transactions": transactions,
    })))
}
