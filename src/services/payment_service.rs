// src/services/payment_service.rs
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::errors::{KiteError, KiteResult};
use crate::models::payment::{CreatePaymentRequest, Payment, PaymentMethod, PaymentStatus};
use crate::models::trip::TripStatus;
use crate::repository::{self, PaymentRepository, TripRepository};

#[derive(Debug, Error)]
pub enum ChargeError {
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("charge declined: {0}")]
    Declined(String),
}

/// Successful adapter outcome: the external transaction id plus the raw
/// gateway response kept for audit.
#[derive(Debug, Clone)]
pub struct ChargeOutcome {
    pub transaction_id: String,
    pub raw: serde_json::Value,
}

/// Single capability every payment rail implements.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    async fn charge(&self, payment: &Payment) -> Result<ChargeOutcome, ChargeError>;
}

fn mock_outcome(prefix: &str, message: &str) -> ChargeOutcome {
    let transaction_id = format!("{prefix}_{}", &Uuid::new_v4().to_string()[..8]);
    let raw = json!({
        "transaction_id": transaction_id,
        "status": "success",
        "message": message,
        "processed_at": Utc::now().to_rfc3339(),
    });
    ChargeOutcome {
        transaction_id,
        raw,
    }
}

/// Cash is settled in person; the record is marked collected immediately.
pub struct CashAdapter;

#[async_trait]
impl PaymentAdapter for CashAdapter {
    async fn charge(&self, _payment: &Payment) -> Result<ChargeOutcome, ChargeError> {
        Ok(mock_outcome("CASH", "cash payment collected"))
    }
}

pub struct WalletAdapter;

#[async_trait]
impl PaymentAdapter for WalletAdapter {
    async fn charge(&self, _payment: &Payment) -> Result<ChargeOutcome, ChargeError> {
        Ok(mock_outcome("WAL", "wallet payment successful"))
    }
}

pub struct CardAdapter;

#[async_trait]
impl PaymentAdapter for CardAdapter {
    async fn charge(&self, _payment: &Payment) -> Result<ChargeOutcome, ChargeError> {
        Ok(mock_outcome("PSP", "payment successful via card"))
    }
}

pub struct UpiAdapter;

#[async_trait]
impl PaymentAdapter for UpiAdapter {
    async fn charge(&self, _payment: &Payment) -> Result<ChargeOutcome, ChargeError> {
        Ok(mock_outcome("PSP", "payment successful via upi"))
    }
}

pub struct PaymentService {
    payment_repo: PaymentRepository,
    trip_repo: TripRepository,
    currency: String,
    cash: CashAdapter,
    wallet: WalletAdapter,
    card: CardAdapter,
    upi: UpiAdapter,
}

impl PaymentService {
    pub fn new(payment_repo: PaymentRepository, trip_repo: TripRepository, currency: String) -> Self {
        Self {
            payment_repo,
            trip_repo,
            currency,
            cash: CashAdapter,
            wallet: WalletAdapter,
            card: CardAdapter,
            upi: UpiAdapter,
        }
    }

    fn adapter_for(&self, method: PaymentMethod) -> &dyn PaymentAdapter {
        match method {
            PaymentMethod::Cash => &self.cash,
            PaymentMethod::Wallet => &self.wallet,
            PaymentMethod::Card => &self.card,
            PaymentMethod::Upi => &self.upi,
        }
    }

    /// Charge the settled fare of a completed trip. Idempotent against the
    /// request's key; a completed payment for the trip is returned as is.
    pub async fn process_payment(&self, req: &CreatePaymentRequest) -> KiteResult<Payment> {
        if let Some(key) = req.idempotency_key.as_deref() {
            if let Some(existing) = self.payment_repo.get_by_idempotency_key(key).await? {
                return Ok(existing);
            }
        }

        let trip = self
            .trip_repo
            .get_by_id(req.trip_id)
            .await?
            .ok_or_else(|| KiteError::not_found("trip"))?;

        if trip.status != TripStatus::Completed {
            return Err(KiteError::bad_request("trip is not completed"));
        }
        let amount = trip
            .total_fare
            .ok_or_else(|| KiteError::bad_request("trip fare not calculated"))?;

        if let Some(existing) = self.payment_repo.get_by_trip_id(req.trip_id).await? {
            if existing.status == PaymentStatus::Completed {
                return Ok(existing);
            }
        }

        let payment = match self
            .payment_repo
            .create(
                trip.id,
                trip.user_id,
                trip.driver_id,
                amount,
                &self.currency,
                req.method,
                req.idempotency_key.as_deref(),
            )
            .await
        {
            Ok(payment) => payment,
            Err(err) if repository::is_unique_violation(&err) => {
                // Concurrent replay with the same key: hand back the row
                // that won.
                if let Some(key) = req.idempotency_key.as_deref() {
                    if let Some(existing) = self.payment_repo.get_by_idempotency_key(key).await? {
                        return Ok(existing);
                    }
                }
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };

        match self.adapter_for(req.method).charge(&payment).await {
            Ok(outcome) => {
                let payment = self
                    .payment_repo
                    .update_status(
                        payment.id,
                        PaymentStatus::Completed,
                        Some(&outcome.transaction_id),
                        Some(&outcome.raw),
                    )
                    .await?;

                tracing::info!(
                    payment_id = %payment.id,
                    trip_id = %trip.id,
                    amount,
                    method = %req.method,
                    "payment completed"
                );
                Ok(payment)
            }
            Err(charge_err) => {
                // The failure is recorded on the payment row; the trip
                // stays settled.
                let raw = json!({ "error": charge_err.to_string() });
                if let Err(err) = self
                    .payment_repo
                    .update_status(payment.id, PaymentStatus::Failed, None, Some(&raw))
                    .await
                {
                    tracing::error!(error = %err, payment_id = %payment.id, "failed to record charge failure");
                }

                tracing::warn!(payment_id = %payment.id, error = %charge_err, "charge failed");
                match charge_err {
                    ChargeError::InsufficientFunds => Err(KiteError::InsufficientFunds),
                    ChargeError::Declined(reason) => {
                        Err(KiteError::bad_request(format!("payment failed: {reason}")))
                    }
                }
            }
        }
    }

    pub async fn get_payment(&self, id: Uuid) -> KiteResult<Payment> {
        self.payment_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| KiteError::not_found("payment"))
    }

    /// Mock refund of a completed payment; the refund record lands in the
    /// gateway response column.
    pub async fn refund_payment(&self, id: Uuid) -> KiteResult<Payment> {
        let payment = self
            .payment_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| KiteError::not_found("payment"))?;

        if payment.status != PaymentStatus::Completed {
            return Err(KiteError::bad_request("can only refund completed payments"));
        }

        let raw = json!({
            "refund_id": format!("REF_{}", &Uuid::new_v4().to_string()[..8]),
            "refunded_at": Utc::now().to_rfc3339(),
        });
        let payment = self
            .payment_repo
            .update_status(
                payment.id,
                PaymentStatus::Refunded,
                payment.transaction_id.as_deref(),
                Some(&raw),
            )
            .await?;

        tracing::info!(payment_id = %payment.id, "payment refunded");
        Ok(payment)
    }
}
