//! Unified error handling for the wallet backend
//!
//! Every failure that reaches an HTTP handler is an `AppError`. It carries the
//! HTTP status mapping, a machine readable code, a user-facing message that
//! never includes provider or storage internals, and a retryable flag that
//! the callback endpoint uses to decide between 200 and 5xx.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "DUPLICATE_REFERENCE")]
    DuplicateReference,
    #[serde(rename = "TRANSACTION_NOT_FOUND")]
    TransactionNotFound,
    #[serde(rename = "INVALID_TRANSITION")]
    InvalidTransition,
    #[serde(rename = "INSUFFICIENT_FUNDS")]
    InsufficientFunds,
    #[serde(rename = "WITHDRAWAL_NOT_DEBITED")]
    WithdrawalNotDebited,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors
    #[serde(rename = "GATEWAY_ERROR")]
    GatewayError,
    #[serde(rename = "GATEWAY_TIMEOUT")]
    GatewayTimeout,

    // Generic
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

/// Ledger and wallet rule violations
#[derive(Debug, Clone)]
pub enum DomainError {
    /// A transaction with this reference already exists
    DuplicateReference { tx_ref: String },
    /// No transaction has this reference
    TransactionNotFound { tx_ref: String },
    /// Terminal transactions never change state again
    InvalidTransition {
        tx_ref: String,
        from: String,
        to: String,
    },
    /// Wallet balance does not cover a debit
    InsufficientFunds { available: String, requested: String },
    /// No wallet debit exists for this withdrawal
    WithdrawalNotDebited { tx_ref: String },
}

/// Storage and configuration failures
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Configuration { message: String },
}

/// Payment gateway failures
#[derive(Debug, Clone)]
pub enum ExternalError {
    Gateway {
        status: u16,
        message: String,
        user_message: String,
        is_retryable: bool,
    },
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    MissingField { field: String },
    InvalidAmount { amount: String, reason: String },
    InvalidReference { reference: String, reason: String },
    InvalidField { field: String, reason: String },
    InvalidSignature { reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
        }
    }

    pub fn validation(error: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(error))
    }

    pub fn domain(error: DomainError) -> Self {
        Self::new(AppErrorKind::Domain(error))
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::validation(ValidationError::MissingField {
            field: field.into(),
        })
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::DuplicateReference { .. } => 409,
                DomainError::TransactionNotFound { .. } => 404,
                DomainError::InvalidTransition { .. } => 409,
                DomainError::InsufficientFunds { .. } => 422,
                DomainError::WithdrawalNotDebited { .. } => 409,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { status, .. } => *status,
                ExternalError::Timeout { .. } => 504,
            },
            AppErrorKind::Validation(ValidationError::InvalidSignature { .. }) => 401,
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::DuplicateReference { .. } => ErrorCode::DuplicateReference,
                DomainError::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
                DomainError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
                DomainError::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
                DomainError::WithdrawalNotDebited { .. } => ErrorCode::WithdrawalNotDebited,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { .. } => ErrorCode::GatewayError,
                ExternalError::Timeout { .. } => ErrorCode::GatewayTimeout,
            },
            AppErrorKind::Validation(ValidationError::InvalidSignature { .. }) => {
                ErrorCode::Unauthorized
            }
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::DuplicateReference { tx_ref } => {
                    format!("Transaction '{}' already exists", tx_ref)
                }
                DomainError::TransactionNotFound { tx_ref } => {
                    format!("Transaction '{}' not found", tx_ref)
                }
                DomainError::InvalidTransition { tx_ref, from, to } => {
                    format!(
                        "Transaction '{}' is already {} and cannot become {}",
                        tx_ref, from, to
                    )
                }
                DomainError::InsufficientFunds {
                    available,
                    requested,
                } => {
                    format!(
                        "Insufficient balance. Available: {} ETB, requested: {} ETB",
                        available, requested
                    )
                }
                DomainError::WithdrawalNotDebited { tx_ref } => {
                    format!("Withdrawal '{}' has no wallet debit to settle", tx_ref)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { user_message, .. } => user_message.clone(),
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => {
                    format!(
                        "{} request timed out after {} seconds. Please try again",
                        service, timeout_secs
                    )
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::InvalidReference { reference, reason } => {
                    format!("Invalid transaction reference '{}': {}", reference, reason)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid field '{}': {}", field, reason)
                }
                ValidationError::InvalidSignature { .. } => "Invalid webhook signature".to_string(),
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { is_retryable, .. } => *is_retryable,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind,
            AppErrorKind::Domain(DomainError::TransactionNotFound { .. })
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AppErrorKind::Infrastructure(InfrastructureError::Database { message, .. })
            | AppErrorKind::Infrastructure(InfrastructureError::Configuration { message })
            | AppErrorKind::External(ExternalError::Gateway { message, .. }) => {
                write!(f, "{}", message)
            }
            _ => write!(f, "{}", self.user_message()),
        }
    }
}

impl std::error::Error for AppError {}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
