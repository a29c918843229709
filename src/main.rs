//! circuit-guard demo binary.
//!
//! Drives calls to a question endpoint through the `hji` breaker, in the
//! blocking style, the non-blocking style, or both at once against the same
//! breaker.
//!
//! # Architecture Overview
//!
//! ```text
//!   blocking thread ──▶ Guarded::call ───────┐
//!     (GET)                                  │      ┌──────────────┐
//!                                            ├─────▶│ breaker 'hji'│──▶ remote / simulated
//!   tokio tasks ─────▶ Guarded::call_async ──┘      └──────┬───────┘
//!     (POST)                                               │ denied / failed
//!                                                          ▼
//!                                                  fallback "default"
//! ```

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use circuit_guard::config::{load_config, EngineConfig};
use circuit_guard::observability::{init_logging, init_metrics, LogObserver, MetricsObserver};
use circuit_guard::remote::{
    BlockingQuestionClient, QuestionClient, RemoteError, SimulatedDependency, DEFAULT_URL,
};
use circuit_guard::resilience::{
    FallbackDispatcher, Guarded, Registry, Scheduler, TransitionObserver,
};

const BREAKER_NAME: &str = "hji";
const FALLBACK_VALUE: &str = "default";

#[derive(Parser)]
#[command(name = "circuit-guard")]
#[command(about = "Call a remote question endpoint through a circuit breaker", long_about = None)]
struct Cli {
    /// TOML config file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, default_value = DEFAULT_URL)]
    url: String,

    #[arg(short, long, value_enum, default_value_t = Mode::Both)]
    mode: Mode,

    /// Calls per style
    #[arg(short = 'n', long, default_value_t = 10)]
    calls: u32,

    /// Pause between calls
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,

    /// Deadline for each remote call
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,

    /// Replace the HTTP endpoint with an in-process dependency failing at this rate (0.0-1.0)
    #[arg(long)]
    simulate_failure_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Blocking,
    NonBlocking,
    Both,
}

/// Where calls go.
#[derive(Debug, Clone)]
enum Target {
    Http { url: String, timeout: Duration },
    Simulated(SimulatedDependency),
}

#[derive(Debug, Clone, Copy)]
struct Pacing {
    calls: u32,
    interval: Duration,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };

    init_logging(&config.observability)?;
    tracing::info!("circuit-guard v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let observers: Vec<Arc<dyn TransitionObserver>> =
        vec![Arc::new(LogObserver), Arc::new(MetricsObserver)];
    let registry = Registry::from_config(&config, Scheduler::current_or_dedicated()?)
        .with_observer(Arc::new(observers));

    let breaker = registry.breaker(BREAKER_NAME)?;
    MetricsObserver.register(breaker.name(), breaker.state());
    tracing::info!(
        breaker = %breaker.name(),
        failure_rate_threshold = breaker.config().failure_rate_threshold,
        wait_duration_in_open_state_ms = breaker.config().wait_duration_in_open_state_ms,
        "Configuration loaded"
    );

    let timeout = Duration::from_millis(cli.timeout_ms);
    let guarded = Guarded::new(breaker, FallbackDispatcher::value(FALLBACK_VALUE.to_string()))
        .with_timeout(timeout);

    let target = match cli.simulate_failure_rate {
        Some(rate) => Target::Simulated(SimulatedDependency::new(rate, Duration::from_millis(5))),
        None => Target::Http {
            url: cli.url.clone(),
            timeout,
        },
    };
    let pacing = Pacing {
        calls: cli.calls,
        interval: Duration::from_millis(cli.interval_ms),
    };

    let blocking = matches!(cli.mode, Mode::Blocking | Mode::Both).then(|| {
        let guarded = guarded.clone();
        let target = target.clone();
        tokio::task::spawn_blocking(move || run_blocking(&guarded, &target, pacing))
    });

    if matches!(cli.mode, Mode::NonBlocking | Mode::Both) {
        run_non_blocking(&guarded, &target, pacing).await?;
    }

    if let Some(handle) = blocking {
        handle.await??;
    }

    println!("{}", serde_json::to_string_pretty(&registry.snapshots())?);

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Blocking style, on a dedicated blocking thread.
fn run_blocking(
    guarded: &Guarded<String, RemoteError>,
    target: &Target,
    pacing: Pacing,
) -> Result<(), reqwest::Error> {
    let ask: Box<dyn Fn() -> Result<String, RemoteError>> = match target {
        Target::Http { url, timeout } => {
            let client = BlockingQuestionClient::new(url.clone(), *timeout)?;
            Box::new(move || client.ask())
        }
        Target::Simulated(dependency) => {
            let dependency = dependency.clone();
            Box::new(move || dependency.ask_blocking())
        }
    };

    for call in 1..=pacing.calls {
        tracing::info!(call, "Starting BLOCKING call");
        match guarded.call(|| ask()) {
            Ok(body) => tracing::info!(call, "{}", body),
            Err(e) => tracing::error!(call, error = %e, "Blocking call failed"),
        }
        tracing::info!(call, "Exiting BLOCKING call");
        std::thread::sleep(pacing.interval);
    }

    Ok(())
}

/// Async flavour of [`Target`].
#[derive(Debug, Clone)]
enum AsyncTarget {
    Http(QuestionClient),
    Simulated(SimulatedDependency),
}

impl AsyncTarget {
    async fn ask(&self) -> Result<String, RemoteError> {
        match self {
            AsyncTarget::Http(client) => client.ask().await,
            AsyncTarget::Simulated(dependency) => dependency.ask().await,
        }
    }
}

/// Non-blocking style: calls are started without waiting for earlier ones.
async fn run_non_blocking(
    guarded: &Guarded<String, RemoteError>,
    target: &Target,
    pacing: Pacing,
) -> Result<(), Box<dyn Error>> {
    let target = match target {
        Target::Http { url, timeout } => AsyncTarget::Http(QuestionClient::new(url.clone(), *timeout)?),
        Target::Simulated(dependency) => AsyncTarget::Simulated(dependency.clone()),
    };

    let mut pending = Vec::with_capacity(pacing.calls as usize);
    for call in 1..=pacing.calls {
        tracing::info!(call, "Starting NON-BLOCKING call");

        let target = target.clone();
        let future = guarded.call_async(move || async move { target.ask().await });
        pending.push(tokio::spawn(async move {
            match future.await {
                Ok(body) => tracing::info!(call, "{}", body),
                Err(e) => tracing::error!(call, error = %e, "Non-blocking call failed"),
            }
        }));

        tracing::info!(call, "Exiting NON-BLOCKING call");
        tokio::time::sleep(pacing.interval).await;
    }

    for task in pending {
        task.await?;
    }
    Ok(())
}
