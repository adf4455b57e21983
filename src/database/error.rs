use bigdecimal::BigDecimal;
use thiserror::Error;

use crate::database::models::TransactionStatus;
use crate::error::{AppError, AppErrorKind, DomainError, InfrastructureError};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database connection error: {message}")]
    Connection { message: String },

    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("database query error: {message}")]
    Query { message: String },

    #[error("stored row could not be decoded: {message}")]
    Decode { message: String },
}

impl DatabaseError {
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return DatabaseError::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                };
            }
        }

        match &err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => DatabaseError::Connection {
                message: err.to_string(),
            },
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => DatabaseError::Decode {
                message: err.to_string(),
            },
            _ => DatabaseError::Query {
                message: err.to_string(),
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, DatabaseError::Connection { .. })
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        DatabaseError::from_sqlx(err)
    }
}

/// Ledger and wallet store failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transaction reference already exists: {tx_ref}")]
    DuplicateReference { tx_ref: String },

    #[error("transaction not found: {tx_ref}")]
    NotFound { tx_ref: String },

    #[error("invalid transition for {tx_ref}: {from} -> {to}")]
    InvalidTransition {
        tx_ref: String,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("insufficient funds for {user_id}: available {available}, requested {requested}")]
    InsufficientFunds {
        user_id: String,
        available: BigDecimal,
        requested: BigDecimal,
    },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
            is_retryable: err.is_retryable(),
            message: err.to_string(),
        }))
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::DuplicateReference { tx_ref } => {
                AppError::domain(DomainError::DuplicateReference { tx_ref })
            }
            LedgerError::NotFound { tx_ref } => {
                AppError::domain(DomainError::TransactionNotFound { tx_ref })
            }
            LedgerError::InvalidTransition { tx_ref, from, to } => {
                AppError::domain(DomainError::InvalidTransition {
                    tx_ref,
                    from: from.to_string(),
                    to: to.to_string(),
                })
            }
            LedgerError::InsufficientFunds {
                available,
                requested,
                ..
            } => AppError::domain(DomainError::InsufficientFunds {
                available: available.to_string(),
                requested: requested.to_string(),
            }),
            LedgerError::Database(db) => db.into(),
        }
    }
}
