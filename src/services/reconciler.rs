//! Callback Reconciler
//!
//! Turns provider callbacks and polled verifications into ledger and wallet
//! changes. The ledger record is the only source of the amount and owner
//! that get credited; the callback payload is used for its `tx_ref` alone,
//! and the payment outcome always comes from `PaymentGateway::verify`.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::database::error::LedgerError;
use crate::database::models::{StatusDetails, TransactionRecord, TransactionStatus, TransactionType};
use crate::database::repository::{TransactionLedger, WalletStore};
use crate::error::{AppError, AppResult, ValidationError};
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{CallbackNotice, PaymentState, Verification, CURRENCY_ETB};
use crate::services::locks::KeyedLocks;
use crate::services::validation::validate_tx_ref;

pub const AMOUNT_MISMATCH: &str = "amount mismatch";
pub const GATEWAY_FAILED: &str = "payment failed at gateway";
pub const EXPIRED: &str = "expired";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Wallet credited and record completed by this call.
    Completed,
    /// Record marked failed by this call.
    Failed,
    /// Record was already terminal; nothing changed.
    AlreadySettled(TransactionStatus),
    /// Gateway still reports the payment as pending.
    StillPending,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Completed => "completed",
            ReconcileOutcome::Failed => "failed",
            ReconcileOutcome::AlreadySettled(_) => "already_settled",
            ReconcileOutcome::StillPending => "still_pending",
        }
    }

    /// Ledger status of the transaction after reconciliation.
    pub fn status(&self) -> TransactionStatus {
        match self {
            ReconcileOutcome::Completed => TransactionStatus::Completed,
            ReconcileOutcome::Failed => TransactionStatus::Failed,
            ReconcileOutcome::AlreadySettled(status) => *status,
            ReconcileOutcome::StillPending => TransactionStatus::Pending,
        }
    }
}

pub struct Reconciler {
    ledger: Arc<dyn TransactionLedger>,
    wallets: Arc<dyn WalletStore>,
    gateway: Arc<dyn PaymentGateway>,
    locks: KeyedLocks,
}

impl Reconciler {
    pub fn new(
        ledger: Arc<dyn TransactionLedger>,
        wallets: Arc<dyn WalletStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            ledger,
            wallets,
            gateway,
            locks: KeyedLocks::new(),
        }
    }

    /// Entry point for `/api/payment-callback`.
    pub async fn handle_callback(&self, notice: &CallbackNotice) -> AppResult<ReconcileOutcome> {
        let tx_ref = notice
            .tx_ref
            .as_deref()
            .ok_or_else(|| AppError::missing_field("tx_ref"))?;
        validate_tx_ref(tx_ref)?;

        info!(
            tx_ref = %tx_ref,
            claimed_status = ?notice.claimed_status,
            event = ?notice.event_type,
            "Payment callback received"
        );

        self.reconcile(tx_ref).await
    }

    /// Verifies `tx_ref` with the gateway and applies the result.
    pub async fn reconcile(&self, tx_ref: &str) -> AppResult<ReconcileOutcome> {
        let record = self.load_deposit(tx_ref).await?;
        if record.status.is_terminal() {
            info!(tx_ref = %tx_ref, status = %record.status, "Transaction already settled");
            return Ok(ReconcileOutcome::AlreadySettled(record.status));
        }

        let verification = self.gateway.verify(tx_ref).await.map_err(|e| {
            warn!(tx_ref = %tx_ref, error = %e, retryable = e.is_retryable(), "Gateway verification failed");
            AppError::from(e)
        })?;

        self.apply_verification(&verification).await
    }

    /// Applies an already fetched verification to the ledger and wallet.
    pub async fn apply_verification(
        &self,
        verification: &Verification,
    ) -> AppResult<ReconcileOutcome> {
        let tx_ref = verification.tx_ref.as_str();
        let _guard = self.locks.acquire(tx_ref).await;

        // Re-read under the lock: a concurrent delivery may have settled it.
        let record = self.load_deposit(tx_ref).await?;
        if record.status.is_terminal() {
            return Ok(ReconcileOutcome::AlreadySettled(record.status));
        }

        match verification.status {
            PaymentState::Pending => {
                info!(tx_ref = %tx_ref, "Payment still pending at gateway");
                Ok(ReconcileOutcome::StillPending)
            }
            PaymentState::Failed => {
                self.settle_failed(&record, GATEWAY_FAILED, verification)
                    .await
            }
            PaymentState::Success => {
                let Some(verified_amount) = verification.amount.as_ref() else {
                    warn!(
                        tx_ref = %tx_ref,
                        "Verified success carries no amount; leaving transaction pending"
                    );
                    return Ok(ReconcileOutcome::StillPending);
                };

                let currency_matches = verification
                    .currency
                    .as_deref()
                    .map(|c| c.eq_ignore_ascii_case(CURRENCY_ETB))
                    .unwrap_or(true);

                if *verified_amount != record.amount || !currency_matches {
                    warn!(
                        tx_ref = %tx_ref,
                        expected = %record.amount,
                        verified = %verified_amount,
                        currency = ?verification.currency,
                        "Verified payment does not match ledger record"
                    );
                    return self
                        .settle_failed(&record, AMOUNT_MISMATCH, verification)
                        .await;
                }

                self.settle_completed(&record, verification).await
            }
        }
    }

    /// Gateway passthrough for `/api/verify-payment/{tx_ref}`.
    ///
    /// A pending deposit in the ledger is reconciled against the fetched
    /// result; reconciliation errors are logged and never change the
    /// response.
    pub async fn verify_and_reconcile(&self, tx_ref: &str) -> AppResult<Verification> {
        validate_tx_ref(tx_ref)?;
        let verification = self.gateway.verify(tx_ref).await?;

        match self.ledger.get(tx_ref).await {
            Ok(Some(record))
                if record.status == TransactionStatus::Pending
                    && record.tx_type == TransactionType::Deposit =>
            {
                match self.apply_verification(&verification).await {
                    Ok(outcome) => {
                        info!(tx_ref = %tx_ref, outcome = outcome.as_str(), "Reconciled on verify")
                    }
                    Err(e) => warn!(tx_ref = %tx_ref, error = %e, "Reconcile on verify failed"),
                }
            }
            Ok(_) => {}
            Err(e) => warn!(tx_ref = %tx_ref, error = %e, "Ledger lookup on verify failed"),
        }

        Ok(verification)
    }

    /// Fails a deposit that never left `pending`. Settled records are left alone.
    pub async fn expire_pending(&self, tx_ref: &str) -> AppResult<ReconcileOutcome> {
        let _guard = self.locks.acquire(tx_ref).await;

        let record = self.load_deposit(tx_ref).await?;
        if record.status.is_terminal() {
            return Ok(ReconcileOutcome::AlreadySettled(record.status));
        }

        match self
            .ledger
            .mark_status(tx_ref, TransactionStatus::Failed, StatusDetails::failure(EXPIRED))
            .await
        {
            Ok(_) => {
                info!(tx_ref = %tx_ref, created_at = %record.created_at, "Pending deposit expired");
                Ok(ReconcileOutcome::Failed)
            }
            Err(LedgerError::InvalidTransition { from, .. }) => {
                Ok(ReconcileOutcome::AlreadySettled(from))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn load_deposit(&self, tx_ref: &str) -> AppResult<TransactionRecord> {
        let record = self.ledger.get(tx_ref).await?.ok_or_else(|| {
            AppError::from(LedgerError::NotFound {
                tx_ref: tx_ref.to_string(),
            })
        })?;

        if record.tx_type != TransactionType::Deposit {
            return Err(AppError::validation(ValidationError::InvalidReference {
                reference: tx_ref.to_string(),
                reason: "withdrawals are not settled by payment callbacks".to_string(),
            }));
        }

        Ok(record)
    }

    async fn settle_completed(
        &self,
        record: &TransactionRecord,
        verification: &Verification,
    ) -> AppResult<ReconcileOutcome> {
        // Credit first: if the process dies before the status write, the
        // record stays pending and the replayed credit is a no-op.
        let applied = self
            .wallets
            .credit_once(&record.user_id, &record.amount, &record.tx_ref)
            .await
            .map_err(|e| {
                error!(tx_ref = %record.tx_ref, error = %e, "Wallet credit failed");
                AppError::from(e)
            })?;

        let details = StatusDetails {
            provider_reference: verification.provider_reference.clone(),
            failure_reason: None,
        };
        match self
            .ledger
            .mark_status(&record.tx_ref, TransactionStatus::Completed, details)
            .await
        {
            Ok(_) => {
                info!(
                    tx_ref = %record.tx_ref,
                    user_id = %record.user_id,
                    amount = %record.amount,
                    credited = applied,
                    "Deposit completed"
                );
                Ok(ReconcileOutcome::Completed)
            }
            Err(LedgerError::InvalidTransition { from, .. }) => {
                error!(
                    tx_ref = %record.tx_ref,
                    status = %from,
                    "Deposit credited but record was settled elsewhere"
                );
                Ok(ReconcileOutcome::AlreadySettled(from))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn settle_failed(
        &self,
        record: &TransactionRecord,
        reason: &str,
        verification: &Verification,
    ) -> AppResult<ReconcileOutcome> {
        let details = StatusDetails {
            provider_reference: verification.provider_reference.clone(),
            failure_reason: Some(reason.to_string()),
        };
        match self
            .ledger
            .mark_status(&record.tx_ref, TransactionStatus::Failed, details)
            .await
        {
            Ok(_) => {
                info!(tx_ref = %record.tx_ref, reason = %reason, "Deposit failed");
                Ok(ReconcileOutcome::Failed)
            }
            Err(LedgerError::InvalidTransition { from, .. }) => {
                Ok(ReconcileOutcome::AlreadySettled(from))
            }
            Err(e) => Err(e.into()),
        }
    }
}
