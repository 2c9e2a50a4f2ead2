//! API module
//!
//! HTTP API endpoints, middleware and the shared application state.

pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::providers::ProviderRegistry;
use crate::store::WalletStore;

pub use routes::create_router;

/// State shared by every request
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn WalletStore>,
    pub providers: ProviderRegistry,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn WalletStore>, providers: ProviderRegistry, config: Config) -> Self {
        Self {
            store,
            providers,
            config: Arc::new(config),
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Axum layers run in reverse order: the context is built before logging reads it
    let api_routes = create_router()
        .layer(axum::middleware::from_fn(middleware::logging_middleware))
        .layer(axum::middleware::from_fn(middleware::context_middleware));

    Router::new()
        // Health check (no identity)
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
