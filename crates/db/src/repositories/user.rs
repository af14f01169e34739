//! User repository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use plaza_common::{AppError, AppResult, IdGenerator};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    Set, SqlErr,
};

use crate::entities::{User, user};

/// A user about to be registered.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Display handle, already trimmed.
    pub username: String,
    /// Email, already trimmed and lowercased.
    pub email: String,
    /// Argon2 PHC string.
    pub password_hash: String,
}

/// Storage capability for user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find a user by ID.
    async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>>;

    /// Find users by IDs. Unknown IDs are skipped.
    async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<user::Model>>;

    /// Find a user by (lowercased) email.
    async fn find_by_email(&self, email: &str) -> AppResult<Option<user::Model>>;

    /// Find a user holding either the username or the email.
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> AppResult<Option<user::Model>>;

    /// Create a user. Fails with a conflict when the username or email is taken.
    async fn create(&self, user: NewUser) -> AppResult<user::Model>;
}

/// Shared handle to a user store.
pub type UserStoreRef = Arc<dyn UserStore>;

/// Message returned when registration hits a uniqueness constraint.
pub const DUPLICATE_USER_MESSAGE: &str = "Username or email already exists";

/// User repository backed by `PostgreSQL`.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
    id_gen: IdGenerator,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            id_gen: IdGenerator::new(),
        }
    }
}

fn map_create_error(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::Conflict(DUPLICATE_USER_MESSAGE.to_string())
        }
        _ => AppError::Database(err.to_string()),
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>> {
        User::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<user::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        User::find()
            .filter(user::Column::Id.is_in(ids.to_vec()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::Email.eq(email.to_lowercase()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(
                Condition::any()
                    .add(user::Column::Username.eq(username))
                    .add(user::Column::Email.eq(email.to_lowercase())),
            )
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn create(&self, new_user: NewUser) -> AppResult<user::Model> {
        let model = user::ActiveModel {
            id: Set(self.id_gen.generate()?),
            username: Set(new_user.username),
            email: Set(new_user.email.to_lowercase()),
            password_hash: Set(new_user.password_hash),
            created_at: Set(Utc::now().into()),
        };

        model
            .insert(self.db.as_ref())
            .await
            .map_err(map_create_error)
    }
}
