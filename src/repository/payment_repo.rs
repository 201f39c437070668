// src/repository/payment_repo.rs
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::KiteResult;
use crate::models::payment::{Payment, PaymentMethod, PaymentStatus};

const COLUMNS: &str = "id, trip_id, user_id, driver_id, amount::float8 AS amount, \
    currency, method, status, transaction_id, gateway_response, idempotency_key, \
    created_at, updated_at";

#[derive(Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        trip_id: Uuid,
        user_id: Uuid,
        driver_id: Uuid,
        amount: f64,
        currency: &str,
        method: PaymentMethod,
        idempotency_key: Option<&str>,
    ) -> Result<Payment, sqlx::Error> {
        let query = format!(
            "INSERT INTO payments \
                (id, trip_id, user_id, driver_id, amount, currency, method, status, \
                 idempotency_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Payment>(&query)
            .bind(Uuid::new_v4())
            .bind(trip_id)
            .bind(user_id)
            .bind(driver_id)
            .bind(amount)
            .bind(currency)
            .bind(method)
            .bind(idempotency_key)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn get_by_id(&self, id: Uuid) -> KiteResult<Option<Payment>> {
        let query = format!("SELECT {COLUMNS} FROM payments WHERE id = $1");
        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(payment)
    }

    pub async fn get_by_trip_id(&self, trip_id: Uuid) -> KiteResult<Option<Payment>> {
        let query = format!(
            "SELECT {COLUMNS} FROM payments WHERE trip_id = $1 \
             ORDER BY created_at DESC LIMIT 1"
        );
        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(payment)
    }

    pub async fn get_by_idempotency_key(&self, key: &str) -> KiteResult<Option<Payment>> {
        let query = format!("SELECT {COLUMNS} FROM payments WHERE idempotency_key = $1");
        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(payment)
    }

    /// Adapter outcome write: status, external transaction id, and the raw
    /// gateway response for audit.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: PaymentStatus,
        transaction_id: Option<&str>,
        gateway_response: Option<&serde_json::Value>,
    ) -> KiteResult<Payment> {
        let query = format!(
            "UPDATE payments SET status = $1, transaction_id = $2, \
             gateway_response = $3, updated_at = now() \
             WHERE id = $4 \
             RETURNING {COLUMNS}"
        );
        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(status)
            .bind(transaction_id)
            .bind(gateway_response)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(payment)
    }
}
