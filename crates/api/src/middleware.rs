//! API middleware.

#![allow(missing_docs)]

use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use plaza_core::{AuthGate, AuthService, FeedService};

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub auth_service: AuthService,
    pub feed_service: FeedService,
    pub auth_gate: AuthGate,
}

/// Authentication middleware.
///
/// Attaches a [`plaza_core::UserIdentity`] to the request when it carries a
/// valid bearer token. Rejection is left to the [`crate::extractors::AuthUser`]
/// extractor so public routes pass through untouched.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(auth_header) = req.headers().get(AUTHORIZATION)
        && let Ok(auth_str) = auth_header.to_str()
        && let Ok(identity) = state.auth_gate.authenticate(Some(auth_str))
    {
        req.extensions_mut().insert(identity);
    }

    next.run(req).await
}
