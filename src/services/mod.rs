//! Services module for business logic

pub mod locks;
pub mod reconciler;
pub mod validation;
pub mod wallet;

pub use reconciler::{ReconcileOutcome, Reconciler};
pub use wallet::{DepositCommand, DepositSession, WalletService, WithdrawCommand, WithdrawalReceipt};
