//! HTTP API layer for plaza.
//!
//! - **Endpoints**: account registration/login and the post feed
//! - **Extractors**: the authenticated caller
//! - **Middleware**: bearer authentication
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::router;
pub use middleware::{AppState, auth_middleware};
