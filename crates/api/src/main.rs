//! Service entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::AppState;
use messaging::InMemoryMessageBus;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::OrderCheckoutSaga;
use saga_store::{InMemorySagaStore, PostgresSagaStore, ReliableStore};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
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

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve<St>(config: Config, store: St, metrics_handle: PrometheusHandle)
where
    St: ReliableStore<OrderCheckoutSaga> + Clone + 'static,
{
    // The in-memory bus connects every consumer in this process.
    let bus = InMemoryMessageBus::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let workers = api::workers::start(&config, store.clone(), bus, shutdown_rx)
        .await
        .expect("failed to start workers");

    let state = Arc::new(
        AppState::new(store)
            .with_admin_token(config.admin_token.clone())
            .with_ordering(workers.ordering()),
    );
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("stopping background workers");
    let _ = shutdown_tx.send(true);
    workers.join().await;
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the saga store and run
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresSagaStore::<OrderCheckoutSaga>::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL saga store");
            serve(config, store, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory saga store");
            serve(config, InMemorySagaStore::<OrderCheckoutSaga>::new(), metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
