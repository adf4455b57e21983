//! Wallet Service
//!
//! Deposit initiation, withdrawals and their admin settlement, and wallet
//! reads. Inputs arrive here already shaped into commands; amounts and
//! references are re-checked before anything touches storage.

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::error::LedgerError;
use crate::database::models::{
    NewTransaction, StatusDetails, TransactionRecord, TransactionStatus, TransactionType, Wallet,
};
use crate::database::repository::{TransactionLedger, WalletStore};
use crate::error::{AppError, AppResult, DomainError, ValidationError};
use crate::logging::mask_email;
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{CustomerContact, InitializeRequest, CURRENCY_ETB};
use crate::services::validation::{validate_amount, validate_email, validate_tx_ref};

pub const DEFAULT_HISTORY_LIMIT: i64 = 20;
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// Reference of the refund credit issued when a withdrawal is rejected.
pub fn refund_reference(tx_ref: &str) -> String {
    format!("REFUND-{}", tx_ref)
}

fn new_tx_ref(tx_type: TransactionType) -> String {
    format!("{}-{}", tx_type.reference_prefix(), Uuid::new_v4().simple())
}

#[derive(Debug, Clone)]
pub struct DepositCommand {
    pub user_id: String,
    pub amount: BigDecimal,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositSession {
    pub checkout_url: String,
    pub tx_ref: String,
}

#[derive(Debug, Clone)]
pub struct WithdrawCommand {
    pub user_id: String,
    pub amount: BigDecimal,
}

#[derive(Debug, Clone)]
pub struct WithdrawalReceipt {
    pub tx_ref: String,
    pub amount: BigDecimal,
}

pub struct WalletService {
    ledger: Arc<dyn TransactionLedger>,
    wallets: Arc<dyn WalletStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl WalletService {
    pub fn new(
        ledger: Arc<dyn TransactionLedger>,
        wallets: Arc<dyn WalletStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            ledger,
            wallets,
            gateway,
        }
    }

    /// Records a pending deposit, then asks the gateway for a checkout URL.
    ///
    /// The record is marked failed when the gateway refuses. After a timeout
    /// or network error the gateway may still have opened the session, so the
    /// record stays pending for the reconciler to resolve.
    pub async fn initiate_deposit(&self, command: DepositCommand) -> AppResult<DepositSession> {
        validate_amount(&command.amount)?;
        validate_email(&command.email)?;

        let tx_ref = new_tx_ref(TransactionType::Deposit);
        self.ledger
            .create(NewTransaction {
                tx_ref: tx_ref.clone(),
                user_id: command.user_id.clone(),
                amount: command.amount.clone(),
                tx_type: TransactionType::Deposit,
            })
            .await?;

        info!(
            tx_ref = %tx_ref,
            user_id = %command.user_id,
            amount = %command.amount,
            email = %mask_email(&command.email),
            "Initializing deposit"
        );

        let request = InitializeRequest {
            amount: command.amount,
            currency: CURRENCY_ETB.to_string(),
            customer: CustomerContact {
                email: command.email,
                first_name: command.first_name,
                last_name: command.last_name,
                phone: Some(command.phone),
            },
            tx_ref: tx_ref.clone(),
            callback_url: None,
            return_url: None,
            customization: None,
        };

        match self.gateway.initialize(request).await {
            Ok(response) => Ok(DepositSession {
                checkout_url: response.checkout_url,
                tx_ref,
            }),
            Err(e) if e.is_retryable() => {
                warn!(
                    tx_ref = %tx_ref,
                    error = %e,
                    "Deposit initialization outcome unknown, leaving pending"
                );
                Err(e.into())
            }
            Err(e) => {
                warn!(tx_ref = %tx_ref, error = %e, "Deposit initialization failed");
                if let Err(mark_err) = self
                    .ledger
                    .mark_status(
                        &tx_ref,
                        TransactionStatus::Failed,
                        StatusDetails::failure(e.user_message()),
                    )
                    .await
                {
                    error!(tx_ref = %tx_ref, error = %mark_err, "Could not mark deposit failed");
                }
                Err(e.into())
            }
        }
    }

    /// Records a withdrawal and debits the wallet before reporting success.
    ///
    /// An uncovered withdrawal is recorded as failed and leaves the balance
    /// untouched. Covered withdrawals stay pending until an admin settles them.
    pub async fn request_withdrawal(&self, command: WithdrawCommand) -> AppResult<WithdrawalReceipt> {
        validate_amount(&command.amount)?;

        let tx_ref = new_tx_ref(TransactionType::Withdraw);
        self.ledger
            .create(NewTransaction {
                tx_ref: tx_ref.clone(),
                user_id: command.user_id.clone(),
                amount: command.amount.clone(),
                tx_type: TransactionType::Withdraw,
            })
            .await?;

        match self
            .wallets
            .debit_once(&command.user_id, &command.amount, &tx_ref)
            .await
        {
            Ok(_) => {
                info!(
                    tx_ref = %tx_ref,
                    user_id = %command.user_id,
                    amount = %command.amount,
                    "Withdrawal debited, awaiting settlement"
                );
                Ok(WithdrawalReceipt {
                    tx_ref,
                    amount: command.amount,
                })
            }
            Err(e) => {
                let reason = match &e {
                    LedgerError::InsufficientFunds { .. } => "insufficient funds",
                    _ => "wallet debit failed",
                };
                warn!(tx_ref = %tx_ref, user_id = %command.user_id, error = %e, "Withdrawal rejected");
                if let Err(mark_err) = self
                    .ledger
                    .mark_status(&tx_ref, TransactionStatus::Failed, StatusDetails::failure(reason))
                    .await
                {
                    error!(tx_ref = %tx_ref, error = %mark_err, "Could not mark withdrawal failed");
                }
                Err(e.into())
            }
        }
    }

    /// Completes a debited withdrawal. A pending withdrawal whose debit never
    /// landed cannot be approved.
    pub async fn approve_withdrawal(&self, tx_ref: &str) -> AppResult<TransactionRecord> {
        let current = self.load_withdrawal(tx_ref).await?;

        let debited = self.wallets.is_applied(tx_ref).await?;
        if current.status == TransactionStatus::Pending && !debited {
            warn!(tx_ref = %tx_ref, "Approval refused, withdrawal was never debited");
            return Err(AppError::domain(DomainError::WithdrawalNotDebited {
                tx_ref: tx_ref.to_string(),
            }));
        }

        let record = self
            .ledger
            .mark_status(tx_ref, TransactionStatus::Completed, StatusDetails::default())
            .await?;
        info!(tx_ref = %tx_ref, user_id = %record.user_id, "Withdrawal approved");
        Ok(record)
    }

    /// Marks the withdrawal failed and refunds the debited amount.
    ///
    /// Only a withdrawal whose debit was applied is refunded. Replaying a
    /// rejection re-issues the refund under the same reference, so a crash
    /// between the two writes heals on retry.
    pub async fn reject_withdrawal(
        &self,
        tx_ref: &str,
        reason: Option<String>,
    ) -> AppResult<TransactionRecord> {
        self.load_withdrawal(tx_ref).await?;

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "rejected by administrator".to_string());

        let record = self
            .ledger
            .mark_status(tx_ref, TransactionStatus::Failed, StatusDetails::failure(reason))
            .await?;

        let refunded = if self.wallets.is_applied(tx_ref).await? {
            self.wallets
                .credit_once(&record.user_id, &record.amount, &refund_reference(tx_ref))
                .await?
        } else {
            false
        };

        info!(
            tx_ref = %tx_ref,
            user_id = %record.user_id,
            amount = %record.amount,
            refunded,
            "Withdrawal rejected"
        );
        Ok(record)
    }

    pub async fn wallet(&self, user_id: &str) -> AppResult<Wallet> {
        Ok(self.wallets.get(user_id).await?)
    }

    pub async fn history(
        &self,
        user_id: &str,
        limit: Option<i64>,
    ) -> AppResult<Vec<TransactionRecord>> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        Ok(self.ledger.list_by_user(user_id, limit).await?)
    }

    pub async fn pending_withdrawals(&self, limit: Option<i64>) -> AppResult<Vec<TransactionRecord>> {
        let limit = limit
            .unwrap_or(MAX_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        Ok(self
            .ledger
            .list_pending(TransactionType::Withdraw, Utc::now(), None, limit)
            .await?)
    }

    async fn load_withdrawal(&self, tx_ref: &str) -> AppResult<TransactionRecord> {
        validate_tx_ref(tx_ref)?;
        let record = self.ledger.get(tx_ref).await?.ok_or_else(|| {
            AppError::from(LedgerError::NotFound {
                tx_ref: tx_ref.to_string(),
            })
        })?;

        if record.tx_type != TransactionType::Withdraw {
            return Err(AppError::validation(ValidationError::InvalidReference {
                reference: tx_ref.to_string(),
                reason: "not a withdrawal".to_string(),
            }));
        }
        Ok(record)
    }
}
