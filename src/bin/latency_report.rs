use clap::Parser;
use hdrhistogram::Histogram;
use std::path::PathBuf;
use std::time::Instant;
use tick_sim::{Engine, SimConfig};
use tracing::{error, info};

/// Step the simulator frame by frame and report per-step latency.
#[derive(Parser, Debug)]
#[command(name = "latency-report")]
struct Args {
    /// JSON config file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the config's seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of frames to simulate
    #[arg(short, long, default_value_t = 100_000)]
    frames: u64,

    /// Simulated time per frame in milliseconds
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,

    /// Pin the engine thread to the last core
    #[arg(long)]
    pin: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = match &args.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    info!(?config, "preparing latency run");

    let mut engine = Engine::new(config)?;
    if args.pin {
        engine.pin_to_core();
    }
    engine.warm_up();
    engine.seed_market(0)?;

    let mut histogram = Histogram::<u64>::new_with_bounds(1, 100_000_000, 3)?;
    let frame_ns = args.frame_ms.saturating_mul(1_000_000);
    let mut total_duration = std::time::Duration::ZERO;
    let mut events = 0u64;
    let mut completed = 0u64;

    println!("Running {} frames of {} ms...", args.frames, args.frame_ms);

    for frame in 1..=args.frames {
        let target = frame.saturating_mul(frame_ns);

        let start = Instant::now();
        let result = std::hint::black_box(engine.step(target));
        let elapsed = start.elapsed();

        match result {
            Ok(report) => {
                events += u64::from(report.market_orders) + u64::from(report.limit_orders);
            }
            Err(err) => {
                error!(%err, frame, "simulation stopped");
                break;
            }
        }

        // Outliers beyond the upper bound are dropped
        histogram.record(elapsed.as_nanos() as u64).unwrap_or(());
        total_duration += elapsed;
        completed += 1;
    }

    if completed == 0 {
        return Ok(());
    }

    println!("\n=== Step Latency Report (ns) ===");
    println!("Frames:     {}", completed);
    println!("Events:     {}", events);
    println!("Orders:     {}", engine.order_count());
    println!("Bid / Ask:  {:?} / {:?}", engine.current_bid(), engine.current_ask());
    println!("State hash: {:#018x}", engine.state_hash());
    println!(
        "Throughput: {:.2} frames/sec",
        completed as f64 / total_duration.as_secs_f64()
    );
    println!("--------------------------------");
    println!("Min:    {:8} ns", histogram.min());
    println!("P50:    {:8} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:8} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:8} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:8} ns", histogram.value_at_quantile(0.999));
    println!("Max:    {:8} ns", histogram.max());
    println!("--------------------------------");

    println!("\nDistribution:");
    for v in histogram.iter_log(1_000, 2.0) {
        let count = v.count_since_last_iteration();
        if count > 0 {
            println!("<= {:9} ns: {:10} count", v.value_iterated_to(), count);
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
