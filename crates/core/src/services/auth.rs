//! Account registration and login.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use plaza_common::{AppError, AppResult};
use plaza_db::{
    entities::user,
    repositories::{NewUser, UserStoreRef},
};
use serde::Deserialize;
use tracing::info;

use super::{lenient, token::JwtTokens};

/// Registration request.
#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    #[serde(default, deserialize_with = "lenient::string")]
    pub username: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub password: String,
}

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginInput {
    #[serde(default, deserialize_with = "lenient::string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub password: String,
}

/// A freshly authenticated session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user: user::Model,
}

/// Registration and login.
#[derive(Clone)]
pub struct AuthService {
    users: UserStoreRef,
    tokens: JwtTokens,
}

impl AuthService {
    #[must_use]
    pub fn new(users: UserStoreRef, tokens: JwtTokens) -> Self {
        Self { users, tokens }
    }

    /// Register a new account and sign it in.
    pub async fn register(&self, input: RegisterInput) -> AppResult<AuthSession> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();

        if username.is_empty() || email.is_empty() || input.password.is_empty() {
            return Err(AppError::Validation(
                "Username, email and password are required".to_string(),
            ));
        }

        if self
            .users
            .find_by_username_or_email(&username, &email)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "Username or email already exists".to_string(),
            ));
        }

        let password_hash = hash_password(&input.password)?;
        let user = self
            .users
            .create(NewUser {
                username,
                email,
                password_hash,
            })
            .await?;

        info!(user_id = %user.id, "Registered user");

        let token = self.tokens.issue(&user.id)?;
        Ok(AuthSession { token, user })
    }

    /// Exchange email and password for a token.
    pub async fn login(&self, input: LoginInput) -> AppResult<AuthSession> {
        let email = input.email.trim().to_lowercase();
        if email.is_empty() || input.password.is_empty() {
            return Err(AppError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !verify_password(&input.password, &user.password_hash)? {
            return Err(AppError::InvalidCredentials);
        }

        let token = self.tokens.issue(&user.id)?;
        Ok(AuthSession { token, user })
    }
}

/// Hash a password using Argon2.
fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against an Argon2 hash.
fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| AppError::Internal(format!("Invalid hash: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
