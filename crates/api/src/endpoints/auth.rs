//! Authentication endpoints.

use axum::{Json, Router, extract::State, routing::post};
use plaza_common::AppResult;
use plaza_core::{AuthSession, LoginInput, RegisterInput};
use serde::Serialize;

use crate::{extractors::AppJson, middleware::AppState, response::Created};

/// Account as returned to its owner.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub id: String,
    pub username: String,
    pub email: String,
}

/// Token plus the account it was issued for.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub token: String,
    pub user: AccountResponse,
}

impl From<AuthSession> for SessionResponse {
    fn from(session: AuthSession) -> Self {
        Self {
            token: session.token,
            user: AccountResponse {
                id: session.user.id,
                username: session.user.username,
                email: session.user.email,
            },
        }
    }
}

/// Create a new account.
async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterInput>,
) -> AppResult<Created<SessionResponse>> {
    let session = state.auth_service.register(req).await?;
    Ok(Created(session.into()))
}

/// Sign in to an existing account.
async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginInput>,
) -> AppResult<Json<SessionResponse>> {
    let session = state.auth_service.login(req).await?;
    Ok(Json(session.into()))
}

/// Routes under `/auth`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}
