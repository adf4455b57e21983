use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::payments::types::CURRENCY_ETB;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// `pending -> completed|failed`; repeating a terminal state is allowed
    /// and treated as a no-op by the ledger.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        match self {
            TransactionStatus::Pending => true,
            terminal => *terminal == next,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdraw,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdraw => "withdraw",
        }
    }

    /// Prefix of generated references, e.g. `DEP-<uuid>`.
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEP",
            TransactionType::Withdraw => "WTH",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "deposit" => Ok(TransactionType::Deposit),
            "withdraw" | "withdrawal" => Ok(TransactionType::Withdraw),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

/// One payment attempt. `tx_ref` is the ledger key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionRecord {
    pub tx_ref: String,
    pub user_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: TransactionStatus,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub provider_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub tx_ref: String,
    pub user_id: String,
    pub amount: BigDecimal,
    pub tx_type: TransactionType,
}

impl NewTransaction {
    pub fn into_record(self, now: DateTime<Utc>) -> TransactionRecord {
        TransactionRecord {
            tx_ref: self.tx_ref,
            user_id: self.user_id,
            amount: self.amount,
            currency: CURRENCY_ETB.to_string(),
            status: TransactionStatus::Pending,
            tx_type: self.tx_type,
            provider_reference: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Position in the `(created_at, tx_ref)` order of pending records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCursor {
    pub created_at: DateTime<Utc>,
    pub tx_ref: String,
}

impl From<&TransactionRecord> for PendingCursor {
    fn from(record: &TransactionRecord) -> Self {
        Self {
            created_at: record.created_at,
            tx_ref: record.tx_ref.clone(),
        }
    }
}

/// Extra details recorded alongside a status change.
#[derive(Debug, Clone, Default)]
pub struct StatusDetails {
    pub provider_reference: Option<String>,
    pub failure_reason: Option<String>,
}

impl StatusDetails {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            provider_reference: None,
            failure_reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wallet {
    pub user_id: String,
    pub balance: BigDecimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn empty(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            balance: BigDecimal::from(0),
            currency: CURRENCY_ETB.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Credit,
    Debit,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Credit => "credit",
            EntryKind::Debit => "debit",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_monotonic() {
        use TransactionStatus::*;

        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Completed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Pending));
    }

    #[test]
    fn status_and_type_parse_from_storage_strings() {
        assert_eq!(
            "completed".parse::<TransactionStatus>(),
            Ok(TransactionStatus::Completed)
        );
        assert!("done".parse::<TransactionStatus>().is_err());
        assert_eq!(
            "withdrawal".parse::<TransactionType>(),
            Ok(TransactionType::Withdraw)
        );
    }

    #[test]
    fn record_serializes_type_field() {
        let record = NewTransaction {
            tx_ref: "DEP-1".to_string(),
            user_id: "u1".to_string(),
            amount: BigDecimal::from(100),
            tx_type: TransactionType::Deposit,
        }
        .into_record(Utc::now());

        let json = serde_json::to_value(&record).expect("serialization should succeed");
        assert_eq!(json["type"], "deposit");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["currency"], "ETB");
    }
}
