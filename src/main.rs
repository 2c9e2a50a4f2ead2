//! Wallet Ledger - wallet balance, transfer and deposit backend API
//!
//! Balances move only through atomic units of work over the store; every
//! movement is recorded in an append-only ledger.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_ledger::api::{self, AppState};
use wallet_ledger::config::{ConfigError, StoreBackend};
use wallet_ledger::db;
use wallet_ledger::providers::ProviderRegistry;
use wallet_ledger::store::{MemoryStore, PgStore, WalletStore};
use wallet_ledger::Config;

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wallet_ledger=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Open the configured store; the pool is returned so it can be closed on exit
async fn open_store(config: &Config) -> anyhow::Result<(Arc<dyn WalletStore>, Option<PgPool>)> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await?;
            db::verify_connection(&pool).await?;

            // Verify database schema
            if !db::check_schema(&pool).await? {
                tracing::error!("Database schema is not complete. Please run migrations.");
                return Err(anyhow::anyhow!("Database schema incomplete"));
            }
            tracing::info!("Database connected successfully");

            Ok((Arc::new(PgStore::new(pool.clone())), Some(pool)))
        }
        StoreBackend::Memory => {
            if config.is_production() {
                return Err(anyhow::anyhow!(
                    "STORE_BACKEND=memory is not allowed in production"
                ));
            }
            tracing::warn!("Using in-memory store; all balances are lost on exit");
            Ok((Arc::new(MemoryStore::new()), None))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(
        environment = %config.environment,
        currency = %config.wallet_currency,
        "Starting wallet ledger server"
    );

    let (store, pool) = open_store(&config).await?;
    let providers = ProviderRegistry::from_config(&config)?;
    tracing::info!(providers = ?providers.kinds(), "Payment providers ready");

    let app = api::build_router(AppState::new(store, providers, config));

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutting down...");
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed");
    }
    tracing::info!("Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
