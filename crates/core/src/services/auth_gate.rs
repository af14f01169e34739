//! Bearer credential check run in front of every feed operation.

use plaza_common::{AppError, AppResult};

use super::token::TokenVerifierRef;

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    /// User ID the credential was issued to.
    pub user_id: String,
}

/// Resolves an `Authorization` header to a [`UserIdentity`].
///
/// Every failure (missing header, wrong scheme, bad signature, expiry) is
/// reported as the same [`AppError::Unauthorized`].
#[derive(Clone)]
pub struct AuthGate {
    verifier: TokenVerifierRef,
}

impl AuthGate {
    /// Create a gate around a token verifier.
    #[must_use]
    pub fn new(verifier: TokenVerifierRef) -> Self {
        Self { verifier }
    }

    /// Authenticate the raw value of an `Authorization` header.
    pub fn authenticate(&self, header: Option<&str>) -> AppResult<UserIdentity> {
        let token = header
            .and_then(bearer_token)
            .ok_or(AppError::Unauthorized)?;

        let user_id = self
            .verifier
            .verify(token)
            .map_err(|_| AppError::Unauthorized)?;

        Ok(UserIdentity { user_id })
    }
}

/// Extract the credential from `Bearer <token>`; the scheme is case-insensitive.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
