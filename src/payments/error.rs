use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Gateway timed out after {timeout_secs}s: {message}")]
    TimeoutError { message: String, timeout_secs: u64 },

    #[error("Unknown reference at gateway: {reference}")]
    ReferenceNotFound { reference: String },

    #[error("Provider rejected request: {message}")]
    ProviderRejected {
        message: String,
        provider_code: Option<String>,
    },

    #[error("Invalid provider response: {message}")]
    InvalidResponse { message: String },

    #[error("Webhook verification failed: {message}")]
    WebhookVerificationError { message: String },
}

impl PaymentError {
    /// Transport-level failures that the caller may safely retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ValidationError { .. } => false,
            PaymentError::NetworkError { .. } => true,
            PaymentError::TimeoutError { .. } => true,
            PaymentError::ReferenceNotFound { .. } => false,
            PaymentError::ProviderRejected { .. } => false,
            PaymentError::InvalidResponse { .. } => true,
            PaymentError::WebhookVerificationError { .. } => false,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::ValidationError { .. } => 400,
            PaymentError::NetworkError { .. } => 502,
            PaymentError::TimeoutError { .. } => 504,
            PaymentError::ReferenceNotFound { .. } => 400,
            PaymentError::ProviderRejected { .. } => 400,
            PaymentError::InvalidResponse { .. } => 502,
            PaymentError::WebhookVerificationError { .. } => 401,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::ValidationError { message, .. } => message.clone(),
            PaymentError::NetworkError { .. } | PaymentError::InvalidResponse { .. } => {
                "Payment provider is temporarily unavailable".to_string()
            }
            PaymentError::TimeoutError { .. } => {
                "Payment provider did not respond in time. Please retry shortly".to_string()
            }
            PaymentError::ReferenceNotFound { .. } => {
                "Payment provider does not know this transaction".to_string()
            }
            PaymentError::ProviderRejected { .. } => {
                "Payment initialization failed".to_string()
            }
            PaymentError::WebhookVerificationError { .. } => {
                "Invalid webhook signature".to_string()
            }
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError, ValidationError};

        let kind = match err {
            PaymentError::ValidationError { message, field } => {
                AppErrorKind::Validation(ValidationError::InvalidField {
                    field: field.unwrap_or_else(|| "request".to_string()),
                    reason: message,
                })
            }
            PaymentError::TimeoutError { timeout_secs, .. } => {
                AppErrorKind::External(ExternalError::Timeout {
                    service: "chapa".to_string(),
                    timeout_secs,
                })
            }
            other => AppErrorKind::External(ExternalError::Gateway {
                status: other.http_status_code(),
                message: other.to_string(),
                user_message: other.user_message(),
                is_retryable: other.is_retryable(),
            }),
        };

        AppError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn error_http_status_mapping_is_correct() {
        assert_eq!(
            PaymentError::ProviderRejected {
                message: "invalid currency".to_string(),
                provider_code: None
            }
            .http_status_code(),
            400
        );
        assert_eq!(
            PaymentError::NetworkError {
                message: "connection refused".to_string()
            }
            .http_status_code(),
            502
        );
        assert_eq!(
            PaymentError::TimeoutError {
                message: "deadline".to_string(),
                timeout_secs: 15
            }
            .http_status_code(),
            504
        );
    }

    #[test]
    fn retryable_flags_are_set() {
        assert!(PaymentError::NetworkError {
            message: "timeout".to_string()
        }
        .is_retryable());
        assert!(!PaymentError::ReferenceNotFound {
            reference: "DEP-1".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn converts_into_app_error_without_leaking_detail() {
        let err: AppError = PaymentError::ProviderRejected {
            message: "secret key sk_live_xyz is invalid".to_string(),
            provider_code: Some("401".to_string()),
        }
        .into();

        assert_eq!(err.status_code(), 400);
        assert!(!err.user_message().contains("sk_live"));
        assert!(!err.is_retryable());

        let timeout: AppError = PaymentError::TimeoutError {
            message: "verify".to_string(),
            timeout_secs: 15,
        }
        .into();
        assert_eq!(timeout.status_code(), 504);
        assert!(timeout.is_retryable());
    }
}
