//! Health check module
//! Provides health status for the application and its storage

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info};

use crate::database::repository::TransactionLedger;

pub const SERVICE_NAME: &str = "bingo-wallet-api";

/// Liveness body served by `GET /health`
#[derive(Debug, Serialize, Clone)]
pub struct Liveness {
    pub status: &'static str,
    pub service: &'static str,
}

impl Liveness {
    pub fn healthy() -> Self {
        Self {
            status: "healthy",
            service: SERVICE_NAME,
        }
    }
}

/// Readiness report served by `GET /health/ready`
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Up,
    Down,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    ledger: Arc<dyn TransactionLedger>,
    check_timeout: Duration,
}

impl HealthChecker {
    pub fn new(ledger: Arc<dyn TransactionLedger>) -> Self {
        Self {
            ledger,
            check_timeout: Duration::from_secs(5),
        }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let started = Instant::now();
        let storage = match timeout(self.check_timeout, self.ledger.health_check()).await {
            Ok(Ok(())) => {
                let elapsed = started.elapsed().as_millis();
                info!("Storage health check: OK ({}ms)", elapsed);
                ComponentHealth::up(Some(elapsed))
            }
            Ok(Err(e)) => {
                error!("Storage health check failed: {}", e);
                ComponentHealth::down(Some(e.to_string()))
            }
            Err(_) => {
                error!("Storage health check timed out");
                ComponentHealth::down(Some("Timeout".to_string()))
            }
        };

        let status = if storage.status == ComponentState::Up {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        };

        let mut checks = HashMap::new();
        checks.insert("storage".to_string(), storage);

        HealthStatus {
            status,
            checks,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::InMemoryTransactionLedger;

    #[test]
    fn test_liveness_body() {
        let body = serde_json::to_value(Liveness::healthy()).unwrap();
        assert_eq!(body, serde_json::json!({ "status": "healthy", "service": "bingo-wallet-api" }));
    }

    #[tokio::test]
    async fn test_in_memory_storage_is_ready() {
        let checker = HealthChecker::new(Arc::new(InMemoryTransactionLedger::new()));
        let status = checker.check_health().await;
        assert!(status.is_healthy());
        assert_eq!(status.checks["storage"].status, ComponentState::Up);
    }
}
