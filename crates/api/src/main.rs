//! API server entry point.

use std::sync::Arc;

use api::{Config, LogFormat, Services, StaticTokenVerifier};
use inventory::{InMemoryLedger, PostgresLedger};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::TracerProvider;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Installs the log subscriber and the OpenTelemetry layer that links spans
/// to the trace contexts carried by messages.
fn init_tracing(config: &Config) -> TracerProvider {
    let provider = TracerProvider::builder().build();
    let otel = tracing_opentelemetry::layer().with_tracer(provider.tracer("purchase-saga"));

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter).with(otel);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
    provider
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env().expect("invalid configuration");
    let tracer_provider = init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let tokens = match config.auth_tokens.as_deref() {
        Some(list) => StaticTokenVerifier::parse(list).expect("invalid AUTH_TOKENS"),
        None => {
            tracing::warn!("AUTH_TOKENS not set, every purchase request will be rejected");
            StaticTokenVerifier::new()
        }
    };

    // 3. Start the saga over the configured ledger
    let services = match config.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to Postgres");
            let ledger = PostgresLedger::new(pool);
            ledger
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using Postgres inventory ledger");
            Services::start(&config, ledger, Arc::new(tokens)).await
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory inventory ledger");
            Services::start(&config, InMemoryLedger::new(), Arc::new(tokens)).await
        }
    }
    .expect("failed to start saga services");

    // 4. Build the application
    let app = api::create_app(services.state.clone(), metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    services.shutdown().await;
    if let Err(err) = tracer_provider.shutdown() {
        tracing::warn!(error = %err, "failed to shut down tracer provider");
    }
    tracing::info!("server shut down gracefully");
}
