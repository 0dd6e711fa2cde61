use drapesim::{ScenarioConfig, Scenario};
use drapesim::run_3d;
use drapesim::{bench_density, bench_step, bench_step_curve};

use anyhow::Result;
use clap::Parser;
use ftlog::appender::FileAppender;
use ftlog::{info, LevelFilter, LoggerGuard};

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
struct Args {
    /// Scenario file under `scenarios/`
    #[arg(short, long, default_value = "default.yaml")]
    file_name: String,

    /// Run this many ticks without a window, then exit
    #[arg(long)]
    headless: Option<u64>,

    /// Run the timing suite instead of the viewer
    #[arg(long)]
    bench: bool,

    /// Print step time against particle count as CSV, then exit
    #[arg(long)]
    bench_curve: bool,

    /// Write the log here instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn configure_logger(log_file: Option<&PathBuf>) -> Result<LoggerGuard> {
    let builder = ftlog::Builder::new().max_log_level(LevelFilter::Info);
    let builder = match log_file {
        Some(path) => builder.root(FileAppender::new(path)),
        None => builder.root(std::io::stderr()),
    };
    builder.try_init().map_err(|e| anyhow::anyhow!("{e}"))
}

// load here to keep main clean
fn load_scenario_from_yaml(file_name: &str) -> Result<ScenarioConfig> {
    let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(file_name);
    let file = File::open(&config_path)?;
    let reader = BufReader::new(file);
    let scenario_cfg: ScenarioConfig = serde_yaml::from_reader(reader)?;

    info!("Loaded scenario {:?}", config_path);
    Ok(scenario_cfg)
}

fn run_headless(mut scenario: Scenario, ticks: u64) {
    let dt = scenario.engine.fixed_dt.unwrap_or(scenario.engine.max_dt);

    let t0 = Instant::now();
    for _ in 0..ticks {
        scenario.tick(dt);
    }
    let elapsed = t0.elapsed().as_secs_f64();

    let lowest = scenario
        .system
        .particles
        .iter()
        .map(|p| p.position.y)
        .fold(f64::INFINITY, f64::min);

    info!(
        "Headless: {} particles, {} ticks of {} s in {:.3} s ({:.3} ms/tick), t = {:.3}, lowest y = {:.4}",
        scenario.system.len(),
        ticks,
        dt,
        elapsed,
        elapsed * 1000.0 / ticks.max(1) as f64,
        scenario.system.t,
        lowest
    );
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = configure_logger(args.log_file.as_ref())?;

    if args.bench {
        bench_density()?;
        bench_step()?;
        return Ok(());
    }
    if args.bench_curve {
        bench_step_curve()?;
        return Ok(());
    }

    let scenario_cfg = load_scenario_from_yaml(&args.file_name)?;
    let scenario = Scenario::build_scenario(scenario_cfg)?;

    match args.headless {
        Some(ticks) => run_headless(scenario, ticks),
        None => run_3d(scenario)?,
    }

    Ok(())
}
