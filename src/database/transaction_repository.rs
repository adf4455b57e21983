use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::BigDecimal, FromRow, PgPool};

use crate::database::error::{DatabaseError, LedgerError};
use crate::database::models::{
    NewTransaction, PendingCursor, StatusDetails, TransactionRecord, TransactionStatus,
    TransactionType,
};
use crate::database::repository::{LedgerResult, TransactionLedger};

const TRANSACTION_COLUMNS: &str = "tx_ref, user_id, amount, currency, status, tx_type, \
     provider_reference, failure_reason, created_at, updated_at";

/// Row shape of the `transactions` table
#[derive(Debug, Clone, FromRow)]
struct TransactionRow {
    tx_ref: String,
    user_id: String,
    amount: BigDecimal,
    currency: String,
    status: String,
    tx_type: String,
    provider_reference: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = DatabaseError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<TransactionStatus>()
            .map_err(|message| DatabaseError::Decode { message })?;
        let tx_type = row
            .tx_type
            .parse::<TransactionType>()
            .map_err(|message| DatabaseError::Decode { message })?;

        Ok(TransactionRecord {
            tx_ref: row.tx_ref,
            user_id: row.user_id,
            amount: row.amount,
            currency: row.currency,
            status,
            tx_type,
            provider_reference: row.provider_reference,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_records(rows: Vec<TransactionRow>) -> LedgerResult<Vec<TransactionRecord>> {
    rows.into_iter()
        .map(|row| TransactionRecord::try_from(row).map_err(LedgerError::from))
        .collect()
}

/// Postgres-backed transaction ledger
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, tx_ref: &str) -> LedgerResult<Option<TransactionRecord>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE tx_ref = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(tx_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(TransactionRecord::try_from)
            .transpose()
            .map_err(LedgerError::from)
    }
}

#[async_trait]
impl TransactionLedger for TransactionRepository {
    async fn create(&self, transaction: NewTransaction) -> LedgerResult<TransactionRecord> {
        let tx_ref = transaction.tx_ref.clone();
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "INSERT INTO transactions (tx_ref, user_id, amount, currency, status, tx_type) \
             VALUES ($1, $2, $3, 'ETB', 'pending', $4) \
             RETURNING {}",
            TRANSACTION_COLUMNS
        ))
        .bind(&transaction.tx_ref)
        .bind(&transaction.user_id)
        .bind(&transaction.amount)
        .bind(transaction.tx_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match DatabaseError::from_sqlx(e) {
            DatabaseError::UniqueViolation { .. } => LedgerError::DuplicateReference {
                tx_ref: tx_ref.clone(),
            },
            other => LedgerError::Database(other),
        })?;

        Ok(TransactionRecord::try_from(row)?)
    }

    async fn mark_status(
        &self,
        tx_ref: &str,
        status: TransactionStatus,
        details: StatusDetails,
    ) -> LedgerResult<TransactionRecord> {
        if status.is_terminal() {
            // Only a pending row matches, so concurrent writers race on the
            // row lock and exactly one of them performs the transition.
            let updated = sqlx::query_as::<_, TransactionRow>(&format!(
                "UPDATE transactions \
                 SET status = $2, \
                     provider_reference = COALESCE($3, provider_reference), \
                     failure_reason = COALESCE($4, failure_reason), \
                     updated_at = NOW() \
                 WHERE tx_ref = $1 AND status = 'pending' \
                 RETURNING {}",
                TRANSACTION_COLUMNS
            ))
            .bind(tx_ref)
            .bind(status.as_str())
            .bind(&details.provider_reference)
            .bind(&details.failure_reason)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            if let Some(row) = updated {
                return Ok(TransactionRecord::try_from(row)?);
            }
        }

        let current = self.fetch(tx_ref).await?.ok_or_else(|| LedgerError::NotFound {
            tx_ref: tx_ref.to_string(),
        })?;

        if current.status == status {
            Ok(current)
        } else {
            Err(LedgerError::InvalidTransition {
                tx_ref: tx_ref.to_string(),
                from: current.status,
                to: status,
            })
        }
    }

    async fn get(&self, tx_ref: &str) -> LedgerResult<Option<TransactionRecord>> {
        self.fetch(tx_ref).await
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> LedgerResult<Vec<TransactionRecord>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions \
             WHERE user_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2",
            TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        into_records(rows)
    }

    async fn list_pending(
        &self,
        tx_type: TransactionType,
        created_before: DateTime<Utc>,
        after: Option<&PendingCursor>,
        limit: i64,
    ) -> LedgerResult<Vec<TransactionRecord>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions \
             WHERE status = 'pending' AND tx_type = $1 AND created_at <= $2 \
               AND ($3::timestamptz IS NULL OR (created_at, tx_ref) > ($3::timestamptz, $4::text)) \
             ORDER BY created_at ASC, tx_ref ASC \
             LIMIT $5",
            TRANSACTION_COLUMNS
        ))
        .bind(tx_type.as_str())
        .bind(created_before)
        .bind(after.map(|cursor| cursor.created_at))
        .bind(after.map(|cursor| cursor.tx_ref.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        into_records(rows)
    }

    async fn health_check(&self) -> LedgerResult<()> {
        crate::database::health_check(&self.pool).await?;
        Ok(())
    }
}
