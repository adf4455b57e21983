//! Chapa-backed wallet service: deposits, withdrawals and idempotent
//! payment callback reconciliation.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
pub mod workers;
