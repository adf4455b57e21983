use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

use crate::database::error::LedgerError;
use crate::database::models::{
    NewTransaction, PendingCursor, StatusDetails, TransactionRecord, TransactionStatus,
    TransactionType, Wallet,
};

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Durable record of payment attempts keyed by `tx_ref`.
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Fails with `DuplicateReference` if `tx_ref` already exists.
    async fn create(&self, transaction: NewTransaction) -> LedgerResult<TransactionRecord>;

    /// Moves a pending record to `status`.
    ///
    /// Repeating the record's current terminal status is a no-op that returns
    /// the stored record; any other change of a terminal record fails with
    /// `InvalidTransition`.
    async fn mark_status(
        &self,
        tx_ref: &str,
        status: TransactionStatus,
        details: StatusDetails,
    ) -> LedgerResult<TransactionRecord>;

    async fn get(&self, tx_ref: &str) -> LedgerResult<Option<TransactionRecord>>;

    /// Newest first.
    async fn list_by_user(&self, user_id: &str, limit: i64)
        -> LedgerResult<Vec<TransactionRecord>>;

    /// Pending records of one type created at or before `created_before`,
    /// ordered by `(created_at, tx_ref)` and starting strictly after `after`.
    async fn list_pending(
        &self,
        tx_type: TransactionType,
        created_before: DateTime<Utc>,
        after: Option<&PendingCursor>,
        limit: i64,
    ) -> LedgerResult<Vec<TransactionRecord>>;

    async fn health_check(&self) -> LedgerResult<()>;
}

/// Per-user balances mutated only through reference-tied entries.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Adds `amount` unless `reference` was already applied.
    /// Returns whether this call applied the credit.
    async fn credit_once(
        &self,
        user_id: &str,
        amount: &BigDecimal,
        reference: &str,
    ) -> LedgerResult<bool>;

    /// Subtracts `amount` unless `reference` was already applied. Fails with
    /// `InsufficientFunds`, leaving the balance untouched, when the balance
    /// does not cover it.
    async fn debit_once(
        &self,
        user_id: &str,
        amount: &BigDecimal,
        reference: &str,
    ) -> LedgerResult<bool>;

    /// Whether an entry under `reference` has been applied.
    async fn is_applied(&self, reference: &str) -> LedgerResult<bool>;

    /// Returns the wallet, creating an empty one if absent.
    async fn get(&self, user_id: &str) -> LedgerResult<Wallet>;
}
