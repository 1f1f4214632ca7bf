//! Gatehouse: a rate-limited, token-authenticated movie catalogue API.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ catch panic ──▶ request id / trace / metrics ──▶ timeout ──▶ CORS
//!                                                                      │
//!          ┌───────────────────────────────────────────────────────────┘
//!          ▼
//!     rate limit ──▶ authenticate ──▶ gate chain ──▶ handler ──▶ ConcurrencyControlledStore
//!   (per-IP bucket)  (bearer token)   (per route)                 (versioned updates)
//!
//!   Background: limiter sweep (stopped by the shutdown coordinator)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use gatehouse::config::{load_config, validate_config, ConfigError, GateConfig};
use gatehouse::http::{Backends, HttpServer};
use gatehouse::lifecycle::{signals, Shutdown};
use gatehouse::observability::{logging, metrics};
use gatehouse::store::memory::MemoryBackends;

#[derive(Parser, Debug)]
#[command(name = "gatehouse", version, about = "Rate-limited, token-authenticated movie API")]
struct Args {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overriding `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,

    /// Environment name reported by the healthcheck.
    #[arg(long)]
    env: Option<String>,

    /// Enable or disable rate limiting.
    #[arg(long, action = clap::ArgAction::Set)]
    limiter_enabled: Option<bool>,

    /// Token refill rate, in requests per second.
    #[arg(long)]
    limiter_rps: Option<f64>,

    /// Bucket capacity.
    #[arg(long)]
    limiter_burst: Option<u32>,
}

impl Args {
    fn load(&self) -> Result<GateConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => GateConfig::default(),
        };

        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(env) = &self.env {
            config.listener.env = env.clone();
        }
        if let Some(enabled) = self.limiter_enabled {
            config.rate_limit.enabled = enabled;
        }
        if let Some(rps) = self.limiter_rps {
            config.rate_limit.requests_per_second = rps;
        }
        if let Some(burst) = self.limiter_burst {
            config.rate_limit.burst = burst;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = args.load()?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gatehouse starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        env = %config.listener.env,
        rate_limit = config.rate_limit.enabled,
        requests_per_second = config.rate_limit.requests_per_second,
        burst = config.rate_limit.burst,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let drain = config.timeouts.shutdown_drain();

    let shutdown = Arc::new(Shutdown::new());
    let signal_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        signals::trigger_on_signal(&signal_shutdown).await;
    });

    let server = HttpServer::new(config, Backends::from(MemoryBackends::new()));
    let served = server.run(listener, &shutdown).await;

    shutdown.drain(drain).await;
    served?;

    tracing::info!("Shutdown complete");
    Ok(())
}
