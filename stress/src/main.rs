use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use tracing_subscriber::EnvFilter;

use windowgate::{AdmissionController, AdmissionDecision, AdmissionOptions, RequestLimit, WindowSize};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KeyDist {
    Hot,
    Uniform,
    Skewed,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Mode {
    Max,
    TargetQps,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "windowgate-stress",
    about = "Load test / benchmark harness for windowgate"
)]
struct Args {
    #[arg(long, value_enum, default_value_t = KeyDist::Hot)]
    key_dist: KeyDist,

    #[arg(long, value_enum, default_value_t = Mode::Max)]
    mode: Mode,

    #[arg(long, default_value_t = 8)]
    threads: usize,

    #[arg(long, default_value_t = 60)]
    duration_s: u64,

    #[arg(long, default_value_t = 10_000)]
    window_ms: u64,

    #[arg(long, default_value_t = 1000)]
    limit: u64,

    #[arg(long, default_value_t = 100000)]
    key_space: usize,

    #[arg(long, default_value_t = 0.8)]
    hot_fraction: f64,

    #[arg(long, default_value_t = 100)]
    sample_every: u64,

    /// Sweep interval for the background cleanup loop. Disabled when omitted.
    #[arg(long)]
    cleanup_interval_ms: Option<u64>,

    #[arg(long)]
    target_qps: Option<u64>,

    #[arg(long)]
    burst_qps: Option<u64>,

    #[arg(long, default_value_t = 30_000)]
    burst_period_ms: u64,

    #[arg(long, default_value_t = 5_000)]
    burst_duration_ms: u64,
}

#[derive(Default)]
struct Counts {
    allowed: AtomicU64,
    rejected: AtomicU64,
}

fn build_controller(args: &Args) -> Result<AdmissionController, windowgate::WindowGateError> {
    Ok(AdmissionController::with_options(AdmissionOptions {
        limit: RequestLimit::try_from(args.limit)?,
        window: WindowSize::from_millis(args.window_ms)?,
    }))
}

fn build_keys(args: &Args) -> Vec<String> {
    let n = match args.key_dist {
        KeyDist::Hot => 1,
        _ => args.key_space.max(1),
    };
    (0..n).map(|i| format!("user_{i}")).collect()
}

fn should_sample(iter: u64, sample_every: u64) -> bool {
    if sample_every <= 1 {
        return true;
    }

    iter.is_multiple_of(sample_every)
}

fn qps_for_now(args: &Args, started: Instant) -> Option<u64> {
    if args.mode == Mode::Max {
        return None;
    }

    let base = args.target_qps?;

    if let Some(burst_qps) = args.burst_qps {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let in_period = elapsed_ms % args.burst_period_ms.max(1);
        if in_period < args.burst_duration_ms {
            return Some(burst_qps);
        }
    }

    Some(base)
}

fn pick_key<'a>(args: &Args, keys: &'a [String], thread_rng: &mut impl FnMut() -> u64) -> &'a str {
    match args.key_dist {
        KeyDist::Hot => &keys[0],
        KeyDist::Uniform => {
            let idx = (thread_rng() as usize) % keys.len();
            &keys[idx]
        }
        KeyDist::Skewed => {
            let r = (thread_rng() % 10_000) as f64 / 10_000.0;
            if r < args.hot_fraction {
                &keys[0]
            } else {
                let idx = 1 + ((thread_rng() as usize) % (keys.len().saturating_sub(1).max(1)));
                &keys[idx % keys.len()]
            }
        }
    }
}

fn print_results(
    args: &Args,
    elapsed: Duration,
    ops: u64,
    hist: &Histogram<u64>,
    counts: &Counts,
    keys_left: usize,
) {
    let ops_s = ops as f64 / elapsed.as_secs_f64();

    println!("mode={:?} key_dist={:?}", args.mode, args.key_dist);
    println!(
        "threads={} duration_s={} window_ms={} limit={} key_space={} cleanup_interval_ms={:?}",
        args.threads,
        args.duration_s,
        args.window_ms,
        args.limit,
        args.key_space,
        args.cleanup_interval_ms
    );
    println!(
        "elapsed_s={:.3} ops={} ops_per_s={:.0}",
        elapsed.as_secs_f64(),
        ops,
        ops_s
    );
    println!(
        "allowed={} rejected={} keys_left={}",
        counts.allowed.load(Ordering::Relaxed),
        counts.rejected.load(Ordering::Relaxed),
        keys_left
    );
    if !hist.is_empty() {
        println!(
            "lat_us p50={} p95={} p99={} p999={} max={}",
            hist.value_at_quantile(0.50),
            hist.value_at_quantile(0.95),
            hist.value_at_quantile(0.99),
            hist.value_at_quantile(0.999),
            hist.max()
        );
        println!("sample_every={} samples={}", args.sample_every, hist.len());
    } else {
        println!("no latency samples collected");
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let controller = Arc::new(build_controller(&args)?);
    let keys = build_keys(&args);

    if let Some(interval_ms) = args.cleanup_interval_ms {
        controller.run_cleanup_loop_with_interval(Duration::from_millis(interval_ms));
    }

    let stop = Arc::new(AtomicBool::new(false));
    let counts = Arc::new(Counts::default());
    let total_ops = Arc::new(AtomicU64::new(0));

    let started = Instant::now();
    let deadline = started + Duration::from_secs(args.duration_s);
    tracing::info!(threads = args.threads, duration_s = args.duration_s, "stress run started");

    let mut handles = Vec::with_capacity(args.threads);
    for t in 0..args.threads {
        let controller = Arc::clone(&controller);
        let keys = keys.clone();
        let stop = Arc::clone(&stop);
        let counts = Arc::clone(&counts);
        let total_ops = Arc::clone(&total_ops);
        let args = args.clone();

        handles.push(std::thread::spawn(move || -> Result<Histogram<u64>, String> {
            let mut hist =
                Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).map_err(|e| e.to_string())?;
            let mut i = 0_u64;
            let mut seed = (t as u64 + 1) * 0x9E37_79B9_7F4A_7C15;
            let mut next_deadline = Instant::now();

            let mut rng_u64 = || {
                // xorshift64*
                seed ^= seed >> 12;
                seed ^= seed << 25;
                seed ^= seed >> 27;
                seed = seed.wrapping_mul(0x2545_F491_4F6C_DD1D);
                seed
            };

            while !stop.load(Ordering::Relaxed) {
                if Instant::now() >= deadline {
                    break;
                }

                if let Some(qps) = qps_for_now(&args, started) {
                    let per_op_ns = 1_000_000_000u64 / qps.max(1);
                    let now = Instant::now();
                    if now < next_deadline {
                        std::thread::sleep(next_deadline - now);
                    }
                    next_deadline += Duration::from_nanos(per_op_ns);
                }

                i = i.wrapping_add(1);
                let k = pick_key(&args, &keys, &mut rng_u64);
                let sample = should_sample(i, args.sample_every);

                let now = Instant::now();
                let decision = controller.check(k, now);

                if sample {
                    let us = now.elapsed().as_micros() as u64;
                    let _ = hist.record(us.max(1));
                }

                total_ops.fetch_add(1, Ordering::Relaxed);
                match decision {
                    AdmissionDecision::Allowed => {
                        counts.allowed.fetch_add(1, Ordering::Relaxed);
                    }
                    AdmissionDecision::Rejected { .. } => {
                        counts.rejected.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }

            Ok(hist)
        }));
    }

    std::thread::sleep(Duration::from_secs(args.duration_s));
    stop.store(true, Ordering::Relaxed);
    controller.stop_cleanup_loop();

    let mut merged = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3)?;
    for h in handles {
        let hist = h.join().map_err(|_| "stress worker panicked")??;
        merged.add(&hist)?;
    }

    let elapsed = started.elapsed();
    let ops = total_ops.load(Ordering::Relaxed);
    print_results(&args, elapsed, ops, &merged, &counts, controller.len());

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(err) = run(args) {
        tracing::error!(error = %err, "stress run failed");
        std::process::exit(1);
    }
}
