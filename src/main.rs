//! Load harness for the floodgate engine.
//!
//! Drives the engine with many concurrent simulated callers and reports
//! admission counts, decision latency percentiles, and store growth across
//! iterations. Useful for eyeballing throughput and memory behavior under
//! realistic concurrency.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use rand::Rng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use floodgate::clock::{Clock, SystemClock};
use floodgate::config::FloodgateConfig;
use floodgate::ratelimit::{
    Caller, InMemoryWindowStore, RateLimiter, Sweeper, TierPolicy, WindowStore,
};

const ENDPOINTS: [&str; 3] = [
    "GET /api/v1/data/{path}",
    "GET /api/v1/health",
    "POST /api/v1/auth/refresh",
];

#[derive(Parser, Debug)]
#[command(
    name = "floodgate",
    version,
    about = "Load harness for the floodgate rate limiting engine"
)]
struct Args {
    /// Path to a YAML configuration file (defaults are used when omitted)
    #[arg(long)]
    config: Option<String>,

    /// Number of simulated callers per iteration
    #[arg(long, default_value_t = 1000)]
    users: usize,

    /// Requests issued per caller per iteration
    #[arg(long, default_value_t = 10)]
    requests: u32,

    /// Tier assigned to the simulated callers
    #[arg(long, default_value = "tier1")]
    tier: String,

    /// Number of load iterations
    #[arg(long, default_value_t = 3)]
    iterations: u32,
}

struct IterationReport {
    allowed: u64,
    denied: u64,
    p50: Duration,
    p99: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    info!("Starting floodgate load harness");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => FloodgateConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => FloodgateConfig::default(),
    };
    info!(
        tiers = config.tiers.len(),
        sweep_interval_secs = config.sweeper.interval_secs,
        "Configuration loaded"
    );

    let policy = TierPolicy::from_config(&config)?;
    if config.sweeper.interval() < policy.smallest_window() {
        warn!(
            interval_secs = config.sweeper.interval_secs,
            "Sweep interval is shorter than the smallest window; sweeps will mostly be no-ops"
        );
    }
    let store = Arc::new(InMemoryWindowStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = Arc::new(RateLimiter::with_store(
        store.clone(),
        policy,
        clock.clone(),
    ));
    let sweeper = Sweeper::spawn(store.clone(), clock, config.sweeper.interval());
    info!("Engine and sweeper initialized");

    for iteration in 1..=args.iterations {
        let started = Instant::now();
        let report = run_iteration(&engine, &args).await?;

        info!(
            iteration,
            allowed = report.allowed,
            denied = report.denied,
            p50_us = report.p50.as_micros() as u64,
            p99_us = report.p99.as_micros() as u64,
            elapsed_ms = started.elapsed().as_millis() as u64,
            entries = store.len(),
            "Iteration complete"
        );
    }

    let swept = Sweeper::sweep(store.as_ref(), &SystemClock);
    info!(
        swept,
        entries = store.len(),
        "Final sweep (entries only become stale after their grace window)"
    );

    sweeper.shutdown().await;
    info!("Load harness complete");
    Ok(())
}

/// One load iteration: a fresh population of callers, each issuing its
/// requests concurrently with every other caller.
async fn run_iteration(engine: &Arc<RateLimiter>, args: &Args) -> anyhow::Result<IterationReport> {
    let tasks: Vec<_> = (0..args.users)
        .map(|_| {
            let engine = Arc::clone(engine);
            let tier = args.tier.clone();
            let requests = args.requests;

            tokio::spawn(async move {
                let caller = Caller::new(uuid::Uuid::new_v4().to_string(), tier);
                let mut allowed = 0u64;
                let mut denied = 0u64;
                let mut latencies = Vec::with_capacity(requests as usize);

                for _ in 0..requests {
                    let endpoint = ENDPOINTS[rand::thread_rng().gen_range(0..ENDPOINTS.len())];
                    let started = Instant::now();
                    let result = engine.try_acquire(&caller, endpoint).await;
                    latencies.push(started.elapsed());

                    if result.allowed {
                        allowed += 1;
                    } else {
                        denied += 1;
                    }
                }

                (allowed, denied, latencies)
            })
        })
        .collect();

    let mut allowed = 0u64;
    let mut denied = 0u64;
    let mut latencies = Vec::with_capacity(args.users * args.requests as usize);

    for outcome in futures::future::join_all(tasks).await {
        let (a, d, mut l) = outcome.context("load task panicked")?;
        allowed += a;
        denied += d;
        latencies.append(&mut l);
    }

    latencies.sort_unstable();

    Ok(IterationReport {
        allowed,
        denied,
        p50: percentile(&latencies, 0.50),
        p99: percentile(&latencies, 0.99),
    })
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
