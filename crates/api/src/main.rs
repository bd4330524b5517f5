//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use ledger_store::PostgresLedgerStore;
use pipeline::{InMemoryPublisher, OutboxRelay};
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

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

async fn serve(app: axum::Router, addr: &str) {
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire store, pipeline state, and outbox relay. The in-memory
    // publisher stands in for the broker binding, which is deployed as
    // an external collaborator.
    let publisher = InMemoryPublisher::new();

    match config.database_url.clone() {
        Some(database_url) => {
            let store = Arc::new(
                PostgresLedgerStore::connect(&database_url)
                    .await
                    .expect("failed to connect to database"),
            );
            store.run_migrations().await.expect("migrations failed");
            tracing::info!("using PostgreSQL store");

            let relay = OutboxRelay::with_config(
                store.clone(),
                publisher.clone(),
                config.relay_config(),
            );
            tokio::spawn(async move { relay.run().await });

            let state = api::create_state(store);
            let app = api::create_app(state, metrics_handle);
            serve(app, &config.addr()).await;
        }
        None => {
            let (state, store) = api::create_demo_state().await;
            tracing::info!("using in-memory store with demo reference data");

            let relay = OutboxRelay::with_config(
                store.clone(),
                publisher.clone(),
                config.relay_config(),
            );
            tokio::spawn(async move { relay.run().await });

            let app = api::create_app(state, metrics_handle);
            serve(app, &config.addr()).await;
        }
    }
}
