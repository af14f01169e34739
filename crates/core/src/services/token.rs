//! Access tokens.

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use plaza_common::{AppError, AppResult, config::AuthConfig};
use serde::{Deserialize, Serialize};

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub sub: String,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
}

/// Verifies bearer credentials.
pub trait TokenVerifier: Send + Sync {
    /// Return the user ID a token was issued to.
    fn verify(&self, token: &str) -> AppResult<String>;
}

/// Shared handle to a token verifier.
pub type TokenVerifierRef = Arc<dyn TokenVerifier>;

/// HS256 token issuer and verifier.
#[derive(Clone)]
pub struct JwtTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl JwtTokens {
    /// Create a token service from a shared secret.
    pub fn new(secret: &str, ttl_hours: i64) -> AppResult<Self> {
        if secret.is_empty() {
            return Err(AppError::Config("auth.jwt_secret must not be empty".to_string()));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        })
    }

    /// Create a token service from configuration.
    pub fn from_config(config: &AuthConfig) -> AppResult<Self> {
        Self::new(&config.jwt_secret, config.token_ttl_hours)
    }

    /// Issue a token for a user.
    pub fn issue(&self, user_id: &str) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))
    }
}

impl TokenVerifier for JwtTokens {
    fn verify(&self, token: &str) -> AppResult<String> {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "Rejected access token");
            AppError::Unauthorized
        })?;

        if data.claims.sub.is_empty() {
            return Err(AppError::Unauthorized);
        }
        Ok(data.claims.sub)
    }
}
