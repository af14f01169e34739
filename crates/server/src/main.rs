//! Plaza server entry point.

use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use plaza_api::{AppState, auth_middleware, response::health, router as api_router};
use plaza_common::Config;
use plaza_core::{AuthGate, AuthService, FeedService, JwtTokens};
use plaza_db::repositories::{
    MemoryPostStore, MemoryUserStore, PostRepository, PostStoreRef, UserRepository, UserStoreRef,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Open the configured stores, running migrations when backed by `PostgreSQL`.
async fn open_stores(
    config: &Config,
) -> Result<(PostStoreRef, UserStoreRef), Box<dyn std::error::Error>> {
    if config.database.in_memory {
        warn!("Using in-memory storage; data is lost on shutdown");
        return Ok((
            Arc::new(MemoryPostStore::new()),
            Arc::new(MemoryUserStore::new()),
        ));
    }

    let db = Arc::new(plaza_db::init(config).await?);
    info!("Connected to database");

    info!("Running database migrations...");
    plaza_db::migrate(&db).await?;
    info!("Migrations completed");

    Ok((
        Arc::new(PostRepository::new(Arc::clone(&db))),
        Arc::new(UserRepository::new(db)),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plaza=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting plaza server...");

    let config = Config::load()?;
    let (posts, users) = open_stores(&config).await?;

    let tokens = JwtTokens::from_config(&config.auth)?;
    let state = AppState {
        auth_service: AuthService::new(Arc::clone(&users), tokens.clone()),
        feed_service: FeedService::new(posts, users, config.feed.clone()),
        auth_gate: AuthGate::new(Arc::new(tokens)),
    };

    let app = Router::new()
        .route("/", get(health))
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
