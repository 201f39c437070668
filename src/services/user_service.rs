// src/services/user_service.rs
use uuid::Uuid;

use crate::errors::{KiteError, KiteResult};
use crate::models::user::{CreateUserRequest, User};
use crate::repository::{self, UserRepository};

pub struct UserService {
    user_repo: UserRepository,
}

impl UserService {
    pub fn new(user_repo: UserRepository) -> Self {
        Self { user_repo }
    }

    pub async fn create_user(&self, req: &CreateUserRequest) -> KiteResult<User> {
        if self.user_repo.get_by_phone(&req.phone).await?.is_some() {
            return Err(KiteError::conflict("user with this phone already exists"));
        }

        let created = self
            .user_repo
            .create(&req.phone, &req.name, req.email.as_deref())
            .await;

        match created {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "user created");
                Ok(user)
            }
            Err(err) if repository::is_unique_violation(&err) => {
                Err(KiteError::conflict("user with this phone already exists"))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_user(&self, id: Uuid) -> KiteResult<User> {
        self.user_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| KiteError::not_found("user"))
    }
}
