//! HTTP API server for the ledger write-and-settle pipeline.
//!
//! Exposes transaction creation behind an idempotency-key header, the
//! processor trigger consumed by the settlement worker, and the audit
//! trail, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use common::{FundId, SecurityId, TransactionSubTypeId};
use ledger_store::{InMemoryLedgerStore, LedgerStore, ReferenceDirectory};
use metrics_exporter_prometheus::PrometheusHandle;
use pipeline::{TransactionProcessor, WriteCoordinator};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::transactions::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router
where
    S: LedgerStore + ReferenceDirectory + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/transactions", post(routes::transactions::create::<S>))
        .route("/transactions/{id}", get(routes::transactions::get::<S>))
        .route(
            "/transactions/{id}/process",
            post(routes::transactions::process::<S>),
        )
        .route(
            "/transactions/{id}/audit",
            get(routes::transactions::audit::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state over a store.
pub fn create_state<S>(store: Arc<S>) -> Arc<AppState<S>>
where
    S: LedgerStore + ReferenceDirectory + 'static,
{
    Arc::new(AppState {
        coordinator: WriteCoordinator::new(store.clone()),
        processor: TransactionProcessor::new(store.clone()),
        store,
    })
}

/// Creates in-memory state with a small set of demo reference data, for
/// running without a database.
pub async fn create_demo_state() -> (Arc<AppState<InMemoryLedgerStore>>, Arc<InMemoryLedgerStore>)
{
    let store = Arc::new(InMemoryLedgerStore::new());
    for fund in 1..=3 {
        store.register_fund(FundId::new(fund)).await;
    }
    for security in 1..=5 {
        store.register_security(SecurityId::new(security)).await;
    }
    for sub_type in 1..=2 {
        store.register_sub_type(TransactionSubTypeId::new(sub_type)).await;
    }
    (create_state(store.clone()), store)
}
