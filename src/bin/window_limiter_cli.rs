// src/bin/window_limiter_cli.rs

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use structopt::StructOpt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::time;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use window_limiter::{
    Algorithm, CheckOptions, Clock, CounterStore, InMemoryConfig, LimiterConfig, MemoryStorage,
    RateLimiter, RedisConfig, RedisStorage, SystemClock, Verdict, WindowSpec,
};

type Limiter = RateLimiter<Arc<dyn CounterStore>>;
type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "window_limiter_cli",
    about = "A CLI for trying fixed and sliding window quotas"
)]
struct Opt {
    /// Algorithm to use, overrides WINDOW_LIMITER_ALGORITHM
    #[structopt(short, long, possible_values = &["fixed_window", "sliding_window"])]
    algorithm: Option<String>,

    /// Key to use for rate limiting
    #[structopt(short, long, default_value = "default_user")]
    key: String,

    /// Maximum number of requests per window
    #[structopt(short, long, default_value = "10")]
    limit: u64,

    /// Window length in milliseconds
    #[structopt(short, long, default_value = "60000")]
    window_ms: u64,

    /// Count requests but never deny them
    #[structopt(long)]
    dry_run: bool,

    /// Counter store backend
    #[structopt(long, possible_values = &["memory", "redis"], default_value = "memory")]
    storage: String,

    /// Redis URL, used with --storage redis (falls back to REDIS_URL)
    #[structopt(long)]
    redis_url: Option<String>,

    /// Simulation mode
    #[structopt(long, possible_values = &["burst", "steady", "sine_wave", "custom"], default_value = "burst")]
    simulation: String,

    /// Number of requests to simulate
    #[structopt(short = "n", long, default_value = "20")]
    num_requests: usize,

    /// Time between requests in milliseconds (for steady and sine_wave modes)
    #[structopt(short = "t", long, default_value = "100")]
    request_interval_ms: u64,

    /// Verbosity level
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,

    /// Disable logs
    #[structopt(long)]
    disable_logs: bool,
}

/// Running totals for one simulation
#[derive(Debug, Default)]
struct Tally {
    allowed: usize,
    denied: usize,
    failed: usize,
}

impl Tally {
    fn record(&mut self, request: usize, outcome: window_limiter::Result<Verdict>, quiet: bool) {
        match outcome {
            Ok(verdict) if verdict.allowed => {
                self.allowed += 1;
                if !quiet {
                    info!(
                        "Request {}: ALLOWED (remaining: {}, current: {:.2})",
                        request, verdict.remaining, verdict.current
                    );
                }
            }
            Ok(verdict) => {
                self.denied += 1;
                if !quiet {
                    warn!(
                        "Request {}: DENIED (limit: {}, resets at {})",
                        request,
                        verdict.limit,
                        format_reset(verdict.reset_at)
                    );
                }
            }
            Err(e) => {
                // The CLI fails open so a flaky store does not end the run
                self.failed += 1;
                error!("Request {}: store error, admitting: {}", request, e);
            }
        }
    }

    fn print(&self, title: &str, total: usize, elapsed: Duration) {
        println!("\n{} Simulation Results:", title);
        println!("{}", "-".repeat(title.len() + 20));
        println!("Total requests: {}", total);
        println!("Allowed: {}", self.allowed);
        println!("Denied: {}", self.denied);
        if self.failed > 0 {
            println!("Store errors: {}", self.failed);
        }
        println!("Time elapsed: {:?}", elapsed);
    }
}

fn format_reset(reset_at: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(reset_at as i64)
        .map(|at| at.format("%H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| reset_at.to_string())
}

fn init_cli_logging(opt: &Opt) -> CliResult<()> {
    // RUST_LOG and LOG_FORMAT take over when set
    if !opt.disable_logs && std::env::var_os("RUST_LOG").is_some() {
        window_limiter::init_logging();
        return Ok(());
    }

    let log_level = match (opt.disable_logs, opt.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!(
            "window_limiter_cli={},window_limiter={}",
            log_level, log_level
        )))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> CliResult<()> {
    dotenv::dotenv().ok();
    let opt = Opt::from_args();
    init_cli_logging(&opt)?;

    let mut config = LimiterConfig::from_env()?;
    if let Some(algorithm) = &opt.algorithm {
        config.algorithm = algorithm.parse::<Algorithm>()?;
    }
    let spec = WindowSpec::new(opt.limit, opt.window_ms)?;

    let store: Arc<dyn CounterStore> = match opt.storage.as_str() {
        "redis" => {
            let url = opt
                .redis_url
                .clone()
                .or_else(|| std::env::var("REDIS_URL").ok())
                .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());
            Arc::new(
                RedisStorage::new(RedisConfig {
                    url,
                    connection_timeout: Duration::from_secs(2),
                })
                .await?,
            )
        }
        _ => Arc::new(MemoryStorage::new(InMemoryConfig::default())),
    };

    if !opt.disable_logs {
        info!(
            "Starting window limiter CLI with {} algorithm on {} storage",
            config.algorithm, opt.storage
        );
        info!(
            "Configuration: limit={}, window={}ms, dry_run={}",
            spec.limit, spec.window_ms, opt.dry_run
        );
    }

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        if handler_stop.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("\nStopping after the current request, press Ctrl-C again to exit now");
    })?;

    let limiter = RateLimiter::new(store, config);
    let options = CheckOptions {
        dry_run: opt.dry_run,
        skip: false,
    };

    match opt.simulation.as_str() {
        "burst" => simulate_burst(&opt, &limiter, &spec, options, &stop).await,
        "steady" => simulate_paced(&opt, &limiter, &spec, options, &stop, |_| 1.0).await,
        "sine_wave" => {
            let total = opt.num_requests.max(1) as f64;
            simulate_paced(&opt, &limiter, &spec, options, &stop, move |i| {
                // One full cycle over the run, intervals between 0.5x and 1.5x
                let phase = (i as f64 * std::f64::consts::PI * 2.0) / total;
                1.0 + 0.5 * phase.sin()
            })
            .await
        }
        "custom" => simulate_custom(&opt, &limiter, &spec, options, &stop).await,
        other => {
            error!("Unknown simulation mode: {}", other);
            Err("Unknown simulation mode".into())
        }
    }
}

// Simulate a burst of requests all at once
async fn simulate_burst(
    opt: &Opt,
    limiter: &Limiter,
    spec: &WindowSpec,
    options: CheckOptions,
    stop: &AtomicBool,
) -> CliResult<()> {
    if !opt.disable_logs {
        info!(
            "Simulating burst of {} requests for key: {}",
            opt.num_requests, opt.key
        );
    }

    let mut tally = Tally::default();
    let start_time = Instant::now();

    for i in 0..opt.num_requests {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let outcome = limiter.check(&opt.key, spec, options).await;
        tally.record(i + 1, outcome, opt.disable_logs);
    }

    tally.print("Burst", opt.num_requests, start_time.elapsed());
    Ok(())
}

// Requests spaced by the base interval scaled per request
async fn simulate_paced<F>(
    opt: &Opt,
    limiter: &Limiter,
    spec: &WindowSpec,
    options: CheckOptions,
    stop: &AtomicBool,
    interval_factor: F,
) -> CliResult<()>
where
    F: Fn(usize) -> f64,
{
    if !opt.disable_logs {
        info!(
            "Simulating {} {} requests around {}ms apart for key: {}",
            opt.num_requests, opt.simulation, opt.request_interval_ms, opt.key
        );
    }

    let mut tally = Tally::default();
    let base_interval = Duration::from_millis(opt.request_interval_ms);
    let start_time = Instant::now();

    for i in 0..opt.num_requests {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let request_time = Instant::now();

        let outcome = limiter.check(&opt.key, spec, options).await;
        tally.record(i + 1, outcome, opt.disable_logs);

        let this_interval = base_interval.mul_f64(interval_factor(i));
        let elapsed = request_time.elapsed();
        if elapsed < this_interval {
            time::sleep(this_interval - elapsed).await;
        }
    }

    let title = if opt.simulation == "sine_wave" {
        "Sine Wave"
    } else {
        "Steady"
    };
    tally.print(title, opt.num_requests, start_time.elapsed());
    Ok(())
}

// Simulate custom pattern with interactive input
async fn simulate_custom(
    opt: &Opt,
    limiter: &Limiter,
    spec: &WindowSpec,
    options: CheckOptions,
    stop: &AtomicBool,
) -> CliResult<()> {
    println!("\nCustom Simulation Mode");
    println!("----------------------");
    println!("Press Enter to make a request, 'usage' to inspect the counter, 'reset' to clear it,");
    println!("'refund' to give one request back, or 'quit' to exit");

    let start_time = Instant::now();
    let input = BufReader::new(tokio::io::stdin());
    let (tally, requests) = run_commands(input, limiter, &opt.key, spec, options, stop).await?;

    tally.print("Custom", requests, start_time.elapsed());
    Ok(())
}

/// Run one command per input line until `quit`, end of input or Ctrl-C.
/// Returns the tally and the number of checks made.
async fn run_commands<R>(
    input: R,
    limiter: &Limiter,
    key: &str,
    spec: &WindowSpec,
    options: CheckOptions,
    stop: &AtomicBool,
) -> CliResult<(Tally, usize)>
where
    R: AsyncBufRead + Unpin,
{
    let mut tally = Tally::default();
    let mut requests = 0;
    let mut lines = input.lines();

    while !stop.load(Ordering::SeqCst) {
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "quit" | "exit" | "q" => break,
            "usage" => match limiter.usage(key).await? {
                Some(snapshot) => println!(
                    "count: {}, previous: {}, window started {}",
                    snapshot.count,
                    snapshot.previous_count,
                    format_reset(snapshot.window_start)
                ),
                None => println!("no requests recorded"),
            },
            "reset" => {
                limiter.reset(key).await?;
                println!("quota cleared");
            }
            "refund" => {
                if limiter.refund(key).await? {
                    println!("one request refunded");
                } else {
                    println!("store does not support refunds");
                }
            }
            _ => {
                requests += 1;
                match limiter.check(key, spec, options).await {
                    Ok(verdict) if verdict.allowed => {
                        tally.allowed += 1;
                        println!("ALLOWED (remaining: {})", verdict.remaining);
                    }
                    Ok(verdict) => {
                        tally.denied += 1;
                        println!(
                            "DENIED (reset after: {:?})",
                            verdict.reset_after(SystemClock.now_millis())
                        );
                    }
                    Err(e) => {
                        tally.failed += 1;
                        println!("ERROR: {}", e);
                    }
                }
            }
        }
    }

    Ok((tally, requests))
}
