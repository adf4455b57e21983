use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::BigDecimal, FromRow, PgPool, Postgres, Transaction};

use crate::database::error::{DatabaseError, LedgerError};
use crate::database::models::{EntryKind, Wallet};
use crate::database::repository::{LedgerResult, WalletStore};

#[derive(Debug, Clone, FromRow)]
struct WalletRow {
    user_id: String,
    balance: BigDecimal,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Wallet {
            user_id: row.user_id,
            balance: row.balance,
            currency: row.currency,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Postgres-backed wallet store
///
/// Each mutation runs in one SQL transaction that first claims the reference
/// in `wallet_entries`; a second claim of the same reference inserts nothing
/// and the balance is left alone.
pub struct WalletRepository {
    pool: PgPool,
}

impl WalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn claim_reference(
        tx: &mut Transaction<'_, Postgres>,
        user_id: &str,
        amount: &BigDecimal,
        reference: &str,
        kind: EntryKind,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO wallet_entries (reference, user_id, amount, kind) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (reference) DO NOTHING",
        )
        .bind(reference)
        .bind(user_id)
        .bind(amount)
        .bind(kind.as_str())
        .execute(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl WalletStore for WalletRepository {
    async fn credit_once(
        &self,
        user_id: &str,
        amount: &BigDecimal,
        reference: &str,
    ) -> LedgerResult<bool> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        if !Self::claim_reference(&mut tx, user_id, amount, reference, EntryKind::Credit).await? {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO wallets (user_id, balance, currency) \
             VALUES ($1, $2, 'ETB') \
             ON CONFLICT (user_id) \
             DO UPDATE SET balance = wallets.balance + EXCLUDED.balance, updated_at = NOW()",
        )
        .bind(user_id)
        .bind(amount)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(true)
    }

    async fn debit_once(
        &self,
        user_id: &str,
        amount: &BigDecimal,
        reference: &str,
    ) -> LedgerResult<bool> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        if !Self::claim_reference(&mut tx, user_id, amount, reference, EntryKind::Debit).await? {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(false);
        }

        let remaining: Option<BigDecimal> = sqlx::query_scalar(
            "UPDATE wallets \
             SET balance = balance - $2, updated_at = NOW() \
             WHERE user_id = $1 AND balance >= $2 \
             RETURNING balance",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if remaining.is_none() {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            let available = self.get(user_id).await?.balance;
            return Err(LedgerError::InsufficientFunds {
                user_id: user_id.to_string(),
                available,
                requested: amount.clone(),
            });
        }

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(true)
    }

    async fn is_applied(&self, reference: &str) -> LedgerResult<bool> {
        let applied: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM wallet_entries WHERE reference = $1)",
        )
        .bind(reference)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(applied)
    }

    async fn get(&self, user_id: &str) -> LedgerResult<Wallet> {
        sqlx::query(
            "INSERT INTO wallets (user_id, balance, currency) \
             VALUES ($1, 0, 'ETB') \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let row = sqlx::query_as::<_, WalletRow>(
            "SELECT user_id, balance, currency, created_at, updated_at \
             FROM wallets WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.into())
    }
}
