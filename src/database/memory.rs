//! In-memory ledger and wallet store.
//!
//! Used by tests and by `STORAGE_BACKEND=memory` for local runs. Every
//! check-and-apply happens under a single write lock, so the same
//! guarantees hold as with the Postgres repositories, minus durability.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::database::error::LedgerError;
use crate::database::models::{
    NewTransaction, PendingCursor, StatusDetails, TransactionRecord, TransactionStatus,
    TransactionType, Wallet,
};
use crate::database::repository::{LedgerResult, TransactionLedger, WalletStore};

#[derive(Default, Clone)]
pub struct InMemoryTransactionLedger {
    transactions: Arc<RwLock<HashMap<String, TransactionRecord>>>,
}

impl InMemoryTransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionLedger for InMemoryTransactionLedger {
    async fn create(&self, transaction: NewTransaction) -> LedgerResult<TransactionRecord> {
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&transaction.tx_ref) {
            return Err(LedgerError::DuplicateReference {
                tx_ref: transaction.tx_ref,
            });
        }

        let record = transaction.into_record(Utc::now());
        transactions.insert(record.tx_ref.clone(), record.clone());
        Ok(record)
    }

    async fn mark_status(
        &self,
        tx_ref: &str,
        status: TransactionStatus,
        details: StatusDetails,
    ) -> LedgerResult<TransactionRecord> {
        let mut transactions = self.transactions.write().await;
        let record = transactions
            .get_mut(tx_ref)
            .ok_or_else(|| LedgerError::NotFound {
                tx_ref: tx_ref.to_string(),
            })?;

        if record.status == status {
            return Ok(record.clone());
        }
        if record.status.is_terminal() || !record.status.can_transition_to(status) {
            return Err(LedgerError::InvalidTransition {
                tx_ref: tx_ref.to_string(),
                from: record.status,
                to: status,
            });
        }

        record.status = status;
        if details.provider_reference.is_some() {
            record.provider_reference = details.provider_reference;
        }
        if details.failure_reason.is_some() {
            record.failure_reason = details.failure_reason;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn get(&self, tx_ref: &str) -> LedgerResult<Option<TransactionRecord>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(tx_ref).cloned())
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> LedgerResult<Vec<TransactionRecord>> {
        let transactions = self.transactions.read().await;
        let mut records: Vec<TransactionRecord> = transactions
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn list_pending(
        &self,
        tx_type: TransactionType,
        created_before: DateTime<Utc>,
        after: Option<&PendingCursor>,
        limit: i64,
    ) -> LedgerResult<Vec<TransactionRecord>> {
        let transactions = self.transactions.read().await;
        let mut records: Vec<TransactionRecord> = transactions
            .values()
            .filter(|record| {
                record.status == TransactionStatus::Pending
                    && record.tx_type == tx_type
                    && record.created_at <= created_before
                    && after.map_or(true, |cursor| {
                        (record.created_at, record.tx_ref.as_str())
                            > (cursor.created_at, cursor.tx_ref.as_str())
                    })
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            (a.created_at, a.tx_ref.as_str()).cmp(&(b.created_at, b.tx_ref.as_str()))
        });
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn health_check(&self) -> LedgerResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct WalletState {
    wallets: HashMap<String, Wallet>,
    applied: HashSet<String>,
}

#[derive(Default, Clone)]
pub struct InMemoryWalletStore {
    state: Arc<RwLock<WalletState>>,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn credit_once(
        &self,
        user_id: &str,
        amount: &BigDecimal,
        reference: &str,
    ) -> LedgerResult<bool> {
        let mut state = self.state.write().await;
        if !state.applied.insert(reference.to_string()) {
            return Ok(false);
        }

        let now = Utc::now();
        let wallet = state
            .wallets
            .entry(user_id.to_string())
            .or_insert_with(|| Wallet::empty(user_id, now));
        wallet.balance += amount;
        wallet.updated_at = now;
        Ok(true)
    }

    async fn debit_once(
        &self,
        user_id: &str,
        amount: &BigDecimal,
        reference: &str,
    ) -> LedgerResult<bool> {
        let mut state = self.state.write().await;
        if state.applied.contains(reference) {
            return Ok(false);
        }

        let available = state
            .wallets
            .get(user_id)
            .map(|wallet| wallet.balance.clone())
            .unwrap_or_else(|| BigDecimal::from(0));
        if &available < amount {
            return Err(LedgerError::InsufficientFunds {
                user_id: user_id.to_string(),
                available,
                requested: amount.clone(),
            });
        }

        state.applied.insert(reference.to_string());
        let now = Utc::now();
        let wallet = state
            .wallets
            .entry(user_id.to_string())
            .or_insert_with(|| Wallet::empty(user_id, now));
        wallet.balance -= amount;
        wallet.updated_at = now;
        Ok(true)
    }

    async fn is_applied(&self, reference: &str) -> LedgerResult<bool> {
        Ok(self.state.read().await.applied.contains(reference))
    }

    async fn get(&self, user_id: &str) -> LedgerResult<Wallet> {
        let mut state = self.state.write().await;
        let wallet = state
            .wallets
            .entry(user_id.to_string())
            .or_insert_with(|| Wallet::empty(user_id, Utc::now()));
        Ok(wallet.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposit(tx_ref: &str, amount: i64) -> NewTransaction {
        NewTransaction {
            tx_ref: tx_ref.to_string(),
            user_id: "u1".to_string(),
            amount: BigDecimal::from(amount),
            tx_type: TransactionType::Deposit,
        }
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_reference() {
        let ledger = InMemoryTransactionLedger::new();
        ledger.create(deposit("DEP-1", 100)).await.unwrap();

        let result = ledger.create(deposit("DEP-1", 200)).await;
        assert!(matches!(result, Err(LedgerError::DuplicateReference { .. })));

        let stored = ledger.get("DEP-1").await.unwrap().unwrap();
        assert_eq!(stored.amount, BigDecimal::from(100));
    }

    #[tokio::test]
    async fn test_terminal_status_is_sticky() {
        let ledger = InMemoryTransactionLedger::new();
        ledger.create(deposit("DEP-1", 100)).await.unwrap();

        let completed = ledger
            .mark_status(
                "DEP-1",
                TransactionStatus::Completed,
                StatusDetails {
                    provider_reference: Some("CH-1".to_string()),
                    failure_reason: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(completed.provider_reference.as_deref(), Some("CH-1"));

        let replay = ledger
            .mark_status("DEP-1", TransactionStatus::Completed, StatusDetails::default())
            .await
            .unwrap();
        assert_eq!(replay.status, TransactionStatus::Completed);

        let reversed = ledger
            .mark_status("DEP-1", TransactionStatus::Failed, StatusDetails::failure("late"))
            .await;
        assert!(matches!(reversed, Err(LedgerError::InvalidTransition { .. })));

        let missing = ledger
            .mark_status("DEP-404", TransactionStatus::Failed, StatusDetails::default())
            .await;
        assert!(matches!(missing, Err(LedgerError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_pending_filters_by_type_and_age() {
        let ledger = InMemoryTransactionLedger::new();
        ledger.create(deposit("DEP-1", 100)).await.unwrap();
        ledger.create(deposit("DEP-2", 100)).await.unwrap();
        ledger
            .create(NewTransaction {
                tx_ref: "WTH-1".to_string(),
                user_id: "u1".to_string(),
                amount: BigDecimal::from(10),
                tx_type: TransactionType::Withdraw,
            })
            .await
            .unwrap();
        ledger
            .mark_status("DEP-2", TransactionStatus::Failed, StatusDetails::default())
            .await
            .unwrap();

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let pending = ledger
            .list_pending(TransactionType::Deposit, cutoff, None, 10)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].tx_ref, "DEP-1");

        let too_recent = ledger
            .list_pending(
                TransactionType::Deposit,
                Utc::now() - chrono::Duration::hours(1),
                None,
                10,
            )
            .await
            .unwrap();
        assert!(too_recent.is_empty());
    }

    #[tokio::test]
    async fn test_list_pending_pages_after_cursor() {
        let ledger = InMemoryTransactionLedger::new();
        for tx_ref in ["DEP-a", "DEP-b", "DEP-c"] {
            ledger.create(deposit(tx_ref, 10)).await.unwrap();
        }
        let cutoff = Utc::now() + chrono::Duration::seconds(1);

        let first = ledger
            .list_pending(TransactionType::Deposit, cutoff, None, 2)
            .await
            .unwrap();
        assert_eq!(first.len(), 2);

        let cursor = PendingCursor::from(first.last().unwrap());
        let rest = ledger
            .list_pending(TransactionType::Deposit, cutoff, Some(&cursor), 2)
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);

        let mut seen: Vec<String> = first.into_iter().chain(rest).map(|r| r.tx_ref).collect();
        seen.sort();
        assert_eq!(seen, vec!["DEP-a", "DEP-b", "DEP-c"]);
    }

    #[tokio::test]
    async fn test_credit_once_is_idempotent_under_concurrency() {
        let store = InMemoryWalletStore::new();
        let amount = BigDecimal::from(100);

        let attempts = (0..16).map(|_| {
            let store = store.clone();
            let amount = amount.clone();
            tokio::spawn(async move { store.credit_once("u1", &amount, "DEP-1").await })
        });
        let results = futures::future::join_all(attempts).await;

        let applied = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(true))))
            .count();
        assert_eq!(applied, 1);
        assert_eq!(store.get("u1").await.unwrap().balance, amount);
    }

    #[tokio::test]
    async fn test_debit_checks_balance_and_reference() {
        let store = InMemoryWalletStore::new();
        store
            .credit_once("u1", &BigDecimal::from(100), "DEP-1")
            .await
            .unwrap();

        let overdraft = store.debit_once("u1", &BigDecimal::from(150), "WTH-1").await;
        assert!(matches!(overdraft, Err(LedgerError::InsufficientFunds { .. })));

        assert!(!store.is_applied("WTH-1").await.unwrap());

        assert!(store
            .debit_once("u1", &BigDecimal::from(40), "WTH-1")
            .await
            .unwrap());
        assert!(store.is_applied("WTH-1").await.unwrap());
        assert!(!store
            .debit_once("u1", &BigDecimal::from(40), "WTH-1")
            .await
            .unwrap());
        assert_eq!(store.get("u1").await.unwrap().balance, BigDecimal::from(60));
    }

    #[tokio::test]
    async fn test_get_creates_empty_wallet() {
        let store = InMemoryWalletStore::new();
        let wallet = store.get("fresh").await.unwrap();
        assert_eq!(wallet.balance, BigDecimal::from(0));
        assert_eq!(wallet.currency, "ETB");
    }
}
