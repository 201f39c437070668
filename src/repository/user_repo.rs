// src/repository/user_repo.rs
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::KiteResult;
use crate::models::user::User;

const COLUMNS: &str = "id, phone, name, email, rating::float8 AS rating, \
    created_at, updated_at";

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        phone: &str,
        name: &str,
        email: Option<&str>,
    ) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (id, phone, name, email, rating) \
             VALUES ($1, $2, $3, $4, 5.0) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(phone)
            .bind(name)
            .bind(email)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn get_by_id(&self, id: Uuid) -> KiteResult<Option<User>> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn get_by_phone(&self, phone: &str) -> KiteResult<Option<User>> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE phone = $1");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}
