//! Service host for the order checkout saga.
//!
//! Runs the orchestrator, the outbox dispatcher and the timeout monitor as
//! background workers, and exposes a small diagnostics HTTP surface with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod workers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{OrderCheckoutSaga, OrderingParticipant};
use saga_store::ReliableStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<St> {
    pub store: St,
    /// Bearer token guarding `/admin/*`. `None` disables those routes.
    pub admin_token: Option<String>,
    /// Present only when the demo participants run in-process.
    pub ordering: Option<Arc<OrderingParticipant<St>>>,
}

impl<St> AppState<St> {
    pub fn new(store: St) -> Self {
        Self {
            store,
            admin_token: None,
            ordering: None,
        }
    }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token;
        self
    }

    pub fn with_ordering(mut self, ordering: Option<Arc<OrderingParticipant<St>>>) -> Self {
        self.ordering = ordering;
        self
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<St>(state: Arc<AppState<St>>, metrics_handle: PrometheusHandle) -> Router
where
    St: ReliableStore<OrderCheckoutSaga> + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/sagas/{order_id}", get(routes::sagas::get::<St>))
        .route("/admin/saga-graph", get(routes::admin::saga_graph::<St>))
        .route("/admin/faults", get(routes::admin::faults::<St>))
        .route("/demo/checkout", post(routes::demo::checkout::<St>))
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
