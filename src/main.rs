use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use windowgate::config::{format_duration, AppConfig, Overrides, StoreBackend, StoreConfig};
use windowgate::http::HttpServer;
use windowgate::ratelimit::RateLimiter;
use windowgate::store::{CounterStore, MemoryCounterStore, RedisCounterStore};

/// Fixed-window rate limiting service.
#[derive(Parser, Debug)]
#[command(name = "windowgate", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "WINDOWGATE_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP port to listen on
    #[arg(long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Redis URL or host:port
    #[arg(long, env = "REDIS_URI")]
    redis_uri: Option<String>,

    /// Requests allowed per window
    #[arg(long, env = "RATE_LIMITER_MAX_REQUESTS")]
    max_requests: Option<String>,

    /// Window length, e.g. 1m or 30s
    #[arg(long, env = "RATE_LIMITER_REFRESH_INTERVAL")]
    refresh_interval: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port,
            redis_uri: self.redis_uri.clone(),
            max_requests: self.max_requests.clone(),
            refresh_interval: self.refresh_interval.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.log_format);

    info!("Starting Windowgate rate limiting service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.overrides().apply(&mut config)?;
    info!(
        http_addr = %config.server.http_addr,
        backend = ?config.store.backend,
        max_requests = config.limiter.max_requests,
        refresh_interval = %format_duration(config.limiter.refresh_interval),
        window_mode = ?config.limiter.window_mode,
        admission = ?config.limiter.admission,
        "Configuration loaded"
    );

    let store = build_store(&config.store).await?;
    let rate_limiter = Arc::new(RateLimiter::new(store, config.limiter.to_limiter_config()));
    info!("Rate limiter initialized");

    let server = HttpServer::new(config.server.http_addr, rate_limiter);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Windowgate rate limiting service stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Build the counter store selected by the configuration.
async fn build_store(config: &StoreConfig) -> windowgate::error::Result<Arc<dyn CounterStore>> {
    match config.backend {
        StoreBackend::Redis => {
            let store = RedisCounterStore::connect(config).await?;
            info!(url = %config.url, "Using Redis counter store");
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            let store = Arc::new(MemoryCounterStore::new());
            spawn_purge_task(Arc::clone(&store), config.purge_interval);
            info!("Using in-memory counter store; limits are not shared between instances");
            Ok(store)
        }
    }
}

/// Periodically drop expired counters from the in-memory store.
fn spawn_purge_task(store: Arc<MemoryCounterStore>, period: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                debug!(purged = purged, "Purged expired counters");
            }
        }
    });
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_maps_legacy_variables_to_overrides() {
        let cli = Cli::parse_from([
            "windowgate",
            "--port",
            "9000",
            "--max-requests",
            "5",
            "--refresh-interval",
            "30s",
        ]);
        let overrides = cli.overrides();

        assert_eq!(overrides.port, Some(9000));
        assert_eq!(overrides.max_requests.as_deref(), Some("5"));
        assert_eq!(overrides.refresh_interval.as_deref(), Some("30s"));
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[tokio::test]
    async fn test_build_memory_store() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        let store = build_store(&config).await.unwrap();
        assert_eq!(store.get_counter("anything").await.unwrap(), 0);
    }
}
