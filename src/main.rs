//! Billing reconciler server binary.
//!
//! Loads configuration, selects the ledger store from `ledger.url`, and serves
//! the webhook endpoint until SIGINT/SIGTERM.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use billing_reconciler::adapters::http::{app_router, CorsPolicy, WebhookAppState};
use billing_reconciler::adapters::{
    InMemoryCreatorAccountLedger, InMemorySubscriptionLedger, PostgresCreatorAccountLedger,
    PostgresSubscriptionLedger, PostgrestClient, PostgrestConfig, PostgrestCreatorAccountLedger,
    PostgrestSubscriptionLedger, StripeConfig, StripePaymentAdapter,
};
use billing_reconciler::application::{
    HandleBillingWebhookHandler, ReconcileAccountHandler, ReconcileSubscriptionHandler,
};
use billing_reconciler::config::{AppConfig, ConfigError, LedgerConfig, LedgerKind, ValidationError};
use billing_reconciler::domain::billing::WebhookVerifier;
use billing_reconciler::domain::foundation::DomainError;
use billing_reconciler::ports::{CreatorAccountLedger, SubscriptionLedger};

/// Failures that abort start-up.
#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Ledger setup failed: {0}")]
    Ledger(#[from] DomainError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

struct Ledgers {
    subscriptions: Arc<dyn SubscriptionLedger>,
    accounts: Arc<dyn CreatorAccountLedger>,
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        stripe_test_mode = config.payment.is_test_mode(),
        "Starting billing reconciler"
    );

    let ledgers = build_ledgers(&config.ledger).await?;

    let verifier = WebhookVerifier::new(config.payment.stripe_webhook_secret.clone())
        .with_tolerance(config.payment.webhook_tolerance_secs);
    let stripe = StripePaymentAdapter::new(
        StripeConfig::new(config.payment.stripe_secret_key.clone())
            .with_base_url(config.payment.api_base_url.clone())
            .with_request_timeout(config.payment.provider_timeout()),
    );

    let webhook_handler = HandleBillingWebhookHandler::new(
        Arc::new(verifier),
        Arc::new(stripe),
        ReconcileSubscriptionHandler::new(ledgers.subscriptions),
        ReconcileAccountHandler::new(ledgers.accounts),
        config.payment.provider_timeout(),
    );

    let state = WebhookAppState::new(
        Arc::new(webhook_handler),
        CorsPolicy::new(config.server.cors_origins_list()),
    );
    let app = app_router(state, config.server.request_timeout());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down");
    Ok(())
}

/// JSON logs in production, human-readable otherwise. `RUST_LOG` overrides
/// `server.log_level`.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn build_ledgers(config: &LedgerConfig) -> Result<Ledgers, StartupError> {
    let kind = config.kind().ok_or(ValidationError::InvalidLedgerUrl)?;

    match kind {
        LedgerKind::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(config.acquire_timeout())
                .connect(&config.url)
                .await?;
            tracing::info!("Database connection established");

            if config.run_migrations {
                sqlx::migrate!("./migrations").run(&pool).await?;
                tracing::info!("Database migrations applied");
            }

            Ok(Ledgers {
                subscriptions: Arc::new(PostgresSubscriptionLedger::new(pool.clone())),
                accounts: Arc::new(PostgresCreatorAccountLedger::new(pool)),
            })
        }
        LedgerKind::Rest => {
            let service_key = config
                .service_key
                .clone()
                .ok_or(ValidationError::MissingRequired("LEDGER_SERVICE_KEY"))?;
            let client = PostgrestClient::new(
                PostgrestConfig::new(config.url.clone(), service_key)
                    .with_request_timeout(config.request_timeout()),
            )?;
            tracing::info!(url = %config.url, "Using REST ledger store");

            Ok(Ledgers {
                subscriptions: Arc::new(PostgrestSubscriptionLedger::new(client.clone())),
                accounts: Arc::new(PostgrestCreatorAccountLedger::new(client)),
            })
        }
        LedgerKind::Memory => {
            tracing::warn!("Using in-memory ledger; state is lost on restart");
            Ok(Ledgers {
                subscriptions: Arc::new(InMemorySubscriptionLedger::new()),
                accounts: Arc::new(InMemoryCreatorAccountLedger::new()),
            })
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
