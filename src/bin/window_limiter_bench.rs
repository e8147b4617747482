// src/bin/window_limiter_bench.rs

use indicatif::{ProgressBar, ProgressStyle};
use prettytable::{row, Table};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use structopt::StructOpt;
use tokio::sync::{Barrier, Semaphore};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

use window_limiter::storage::conformance;
use window_limiter::{
    Algorithm, CheckOptions, CounterStore, InMemoryConfig, LimiterConfig, MemoryStorage,
    RateLimiter, RedisConfig, RedisStorage, WindowSpec,
};

type BenchResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "window_limiter_bench",
    about = "A benchmarking tool for window quotas over memory or Redis counters"
)]
struct Opt {
    /// Algorithm to benchmark
    #[structopt(short, long, possible_values = &["fixed_window", "sliding_window", "all"], default_value = "all")]
    algorithm: String,

    /// Storage backend to use
    #[structopt(short, long, possible_values = &["memory", "redis"], default_value = "memory")]
    storage: String,

    /// Redis URL (when using Redis storage)
    #[structopt(long, default_value = "redis://localhost:6379")]
    redis_url: String,

    /// Maximum number of requests per window and key
    #[structopt(short, long, default_value = "1000")]
    limit: u64,

    /// Window length in milliseconds
    #[structopt(short, long, default_value = "60000")]
    window_ms: u64,

    /// Number of concurrent users to simulate
    #[structopt(short = "u", long, default_value = "10")]
    num_users: usize,

    /// Number of requests per user
    #[structopt(short = "r", long, default_value = "100")]
    requests_per_user: usize,

    /// Number of iterations to run
    #[structopt(short, long, default_value = "3")]
    iterations: usize,

    /// Maximum concurrency level
    #[structopt(short = "c", long, default_value = "100")]
    concurrency: usize,

    /// Upper bound of random delay between a user's requests, in microseconds
    #[structopt(long, default_value = "0")]
    jitter_us: u64,

    /// Concurrent increments used by the linearizability probe, 0 to skip it
    #[structopt(long, default_value = "256")]
    probe_callers: usize,

    /// Verbosity level
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,

    /// Disable logs
    #[structopt(long)]
    disable_logs: bool,
}

/// Aggregated outcome of every iteration for one algorithm
#[derive(Debug, Default)]
struct BenchSummary {
    allowed: usize,
    denied: usize,
    errors: usize,
    max_allowed_per_key: usize,
    duration: Duration,
}

impl BenchSummary {
    fn total(&self) -> usize {
        self.allowed + self.denied + self.errors
    }

    fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.total() as f64 / secs
        } else {
            0.0
        }
    }
}

#[tokio::main]
async fn main() -> BenchResult<()> {
    dotenv::dotenv().ok();
    let opt = Opt::from_args();

    let log_level = match (opt.disable_logs, opt.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!(
            "window_limiter_bench={},window_limiter={}",
            log_level, log_level
        )))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if opt.iterations == 0 || opt.num_users == 0 {
        return Err("iterations and num_users must be greater than 0".into());
    }
    let spec = WindowSpec::new(opt.limit, opt.window_ms)?;

    let store: Arc<dyn CounterStore> = match opt.storage.as_str() {
        "memory" => Arc::new(MemoryStorage::new(InMemoryConfig {
            max_entries: 100_000, // Large capacity for benchmarking
            use_background_task: true,
            cleanup_interval: Duration::from_secs(60),
        })),
        "redis" => {
            let redis_config = RedisConfig {
                url: opt.redis_url.clone(),
                connection_timeout: Duration::from_secs(5),
            };
            match RedisStorage::new(redis_config).await {
                Ok(storage) => Arc::new(storage),
                Err(e) => {
                    error!("Failed to connect to Redis: {}", e);
                    return Err(format!("Failed to connect to Redis: {}", e).into());
                }
            }
        }
        other => return Err(format!("Unknown storage backend: {}", other).into()),
    };

    let run_id = Uuid::new_v4().simple().to_string();
    if !opt.disable_logs {
        info!(run_id = %run_id, storage = %opt.storage, "Starting benchmark run");
    }

    if opt.probe_callers > 0 {
        let probe_key = format!("bench:{}:probe", run_id);
        conformance::verify_linearizable_increments(
            store.as_ref(),
            &probe_key,
            opt.window_ms,
            opt.probe_callers,
        )
        .await?;
        println!(
            "Linearizability probe passed: {} concurrent increments, no duplicate or lost counts",
            opt.probe_callers
        );
    }

    let algorithms = if opt.algorithm == "all" {
        vec![Algorithm::FixedWindow, Algorithm::SlidingWindow]
    } else {
        vec![opt.algorithm.parse::<Algorithm>()?]
    };

    let mut table = Table::new();
    table.set_titles(row![
        "Algorithm",
        "Storage",
        "Requests",
        "Allowed",
        "Denied",
        "Errors",
        "Max/key",
        "Avg. Duration",
        "req/sec"
    ]);

    for algorithm in algorithms {
        let config = LimiterConfig {
            key_prefix: format!("bench:{}:{}", run_id, algorithm),
            algorithm,
            ..LimiterConfig::from_env()?
        };
        let limiter = Arc::new(RateLimiter::new(store.clone(), config));
        let summary = run_benchmark(limiter, &spec, &opt).await?;

        if summary.max_allowed_per_key as u64 > opt.limit
            && summary.duration / (opt.iterations as u32) < spec.window()
        {
            warn!(
                algorithm = %algorithm,
                max_allowed = summary.max_allowed_per_key,
                limit = opt.limit,
                "A key was admitted more than its limit within one window"
            );
        }

        table.add_row(row![
            algorithm,
            opt.storage,
            summary.total(),
            summary.allowed,
            summary.denied,
            summary.errors,
            summary.max_allowed_per_key,
            format!("{:?}", summary.duration / opt.iterations as u32),
            format!("{:.2}", summary.throughput())
        ]);
    }

    println!();
    table.printstd();
    Ok(())
}

async fn run_benchmark(
    limiter: Arc<RateLimiter<Arc<dyn CounterStore>>>,
    spec: &WindowSpec,
    opt: &Opt,
) -> BenchResult<BenchSummary> {
    let name = limiter.algorithm().to_string();
    println!("\nRunning benchmark: {} ({})", name, opt.storage);
    println!("======================{}", "=".repeat(name.len() + opt.storage.len() + 3));

    let mut summary = BenchSummary::default();

    for iteration in 0..opt.iterations {
        if !opt.disable_logs {
            info!("Starting iteration {} of {}", iteration + 1, opt.iterations);
        }

        // Reset before each iteration
        for i in 0..opt.num_users {
            limiter.reset(&format!("user_{}", i)).await?;
        }

        let progress = ProgressBar::new((opt.num_users * opt.requests_per_user) as u64);
        progress.set_style(
            ProgressStyle::with_template(
                "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({per_sec})",
            )?
            .progress_chars("=> "),
        );

        let start_time = Instant::now();

        // Create a barrier to start all tasks at once
        let barrier = Arc::new(Barrier::new(opt.num_users));
        let semaphore = Arc::new(Semaphore::new(opt.concurrency.max(1)));
        let mut handles = Vec::with_capacity(opt.num_users);

        for user_id in 0..opt.num_users {
            let limiter = limiter.clone();
            let barrier = barrier.clone();
            let semaphore = semaphore.clone();
            let progress = progress.clone();
            let key = format!("user_{}", user_id);
            let spec = *spec;
            let requests_per_user = opt.requests_per_user;
            let jitter_us = opt.jitter_us;
            let disable_logs = opt.disable_logs;

            handles.push(tokio::spawn(async move {
                barrier.wait().await;

                let (mut allowed, mut denied, mut errors) = (0usize, 0usize, 0usize);
                for _ in 0..requests_per_user {
                    if jitter_us > 0 {
                        let delay = rand::rng().random_range(0..=jitter_us);
                        tokio::time::sleep(Duration::from_micros(delay)).await;
                    }

                    // Limit concurrency
                    let Ok(_permit) = semaphore.acquire().await else {
                        break;
                    };

                    match limiter.check(&key, &spec, CheckOptions::default()).await {
                        Ok(verdict) if verdict.allowed => allowed += 1,
                        Ok(_) => denied += 1,
                        Err(e) => {
                            errors += 1;
                            if !disable_logs {
                                warn!("Error in rate limiting: {}", e);
                            }
                        }
                    }
                    progress.inc(1);
                }

                (allowed, denied, errors)
            }));
        }

        let results = futures::future::join_all(handles).await;
        let elapsed = start_time.elapsed();
        progress.finish_and_clear();

        let (mut iteration_allowed, mut iteration_denied, mut iteration_errors) = (0, 0, 0);
        for result in results {
            match result {
                Ok((allowed, denied, errors)) => {
                    iteration_allowed += allowed;
                    iteration_denied += denied;
                    iteration_errors += errors;
                    summary.max_allowed_per_key = summary.max_allowed_per_key.max(allowed);
                }
                Err(e) => error!("Benchmark task failed: {}", e),
            }
        }

        summary.allowed += iteration_allowed;
        summary.denied += iteration_denied;
        summary.errors += iteration_errors;
        summary.duration += elapsed;

        let total_requests = iteration_allowed + iteration_denied + iteration_errors;
        println!(
            "Iteration {}: {:?}, {} allowed, {} denied, {} errors, {:.2} req/sec",
            iteration + 1,
            elapsed,
            iteration_allowed,
            iteration_denied,
            iteration_errors,
            total_requests as f64 / elapsed.as_secs_f64()
        );
    }

    Ok(summary)
}
