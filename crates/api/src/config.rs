//! Application configuration loaded from environment variables.

use std::time::Duration;

use messaging::{ConsumerConfig, RetryPolicy};
use saga::{DispatcherConfig, SagaConfig, TimeoutAction};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `ADMIN_TOKEN`: bearer token for `/admin/*`; unset disables those routes
/// - `SAGA_TIMEOUT_SECS`: OrderPlaced timeout; unset disables the monitor
/// - `SAGA_TIMEOUT_ACTION`: `fault` or `cancel` (default: `fault`)
/// - `OUTBOX_POLL_INTERVAL_MS`: dispatcher poll interval (default: `500`)
/// - `OUTBOX_BATCH_SIZE`: rows per dispatch batch (default: `100`)
/// - `CONSUMER_CONCURRENCY`: parallel deliveries per consumer (default: `8`)
/// - `CONSUMER_MAX_ATTEMPTS`: deliveries before dead-lettering (default: `5`)
/// - `DEMO_PARTICIPANTS`: run the in-process participant fakes (default: `false`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub admin_token: Option<String>,
    pub saga_timeout: Option<Duration>,
    pub saga_timeout_action: TimeoutAction,
    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: usize,
    pub consumer_concurrency: usize,
    pub consumer_max_attempts: u32,
    pub demo_participants: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`. Unparseable values fall back
    /// to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str| non_empty(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match non_empty("LOG_FORMAT") {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: non_empty("DATABASE_URL"),
            admin_token: non_empty("ADMIN_TOKEN"),
            saga_timeout: parsed("SAGA_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            saga_timeout_action: non_empty("SAGA_TIMEOUT_ACTION")
                .and_then(|a| a.parse().ok())
                .unwrap_or_default(),
            outbox_poll_interval: parsed("OUTBOX_POLL_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.outbox_poll_interval),
            outbox_batch_size: parsed("OUTBOX_BATCH_SIZE")
                .filter(|n| *n > 0)
                .map_or(defaults.outbox_batch_size, |n| n as usize),
            consumer_concurrency: parsed("CONSUMER_CONCURRENCY")
                .filter(|n| *n > 0)
                .map_or(defaults.consumer_concurrency, |n| n as usize),
            consumer_max_attempts: parsed("CONSUMER_MAX_ATTEMPTS")
                .filter(|n| *n > 0)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.consumer_max_attempts),
            demo_participants: non_empty("DEMO_PARTICIPANTS")
                .is_some_and(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes")),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn saga_config(&self) -> SagaConfig {
        let config = SagaConfig::default();
        match self.saga_timeout {
            Some(timeout) => config.with_timeout(timeout, self.saga_timeout_action),
            None => config,
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::default()
            .with_poll_interval(self.outbox_poll_interval)
            .with_batch_size(self.outbox_batch_size)
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            concurrency: self.consumer_concurrency,
            retry: RetryPolicy::default().with_max_attempts(self.consumer_max_attempts),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            admin_token: None,
            saga_timeout: None,
            saga_timeout_action: TimeoutAction::Fault,
            outbox_poll_interval: Duration::from_millis(500),
            outbox_batch_size: 100,
            consumer_concurrency: 8,
            consumer_max_attempts: 5,
            demo_participants: false,
        }
    }
}
