use anyhow::{Context, Result};
use clap::Parser;
use clinostat_core::{
    EARTH_GRAVITY, ExperimentConfig, ExperimentDriver, LightDirection, RunPhase, Species,
};
use clinostat_storage::{Recorder, SharedRecorder};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "clinostat",
    version,
    about = "Run a headless clinostat plant-growth experiment and export its series as CSV"
)]
struct Cli {
    /// Species to germinate (cress, bean, radish).
    #[arg(long, default_value = "cress")]
    species: Species,

    /// Gravity magnitude: 0 = microgravity, 1 = Earth, fractional in between.
    #[arg(long, default_value_t = EARTH_GRAVITY)]
    gravity: f32,

    /// Directional light source (none, top, bottom, left, right).
    #[arg(long, default_value = "none")]
    light: LightDirection,

    /// Also grow an Earth-gravity control plant for comparison.
    #[arg(long)]
    comparison: bool,

    /// RNG seed for a reproducible run.
    #[arg(long, env = "CLINOSTAT_SEED")]
    seed: Option<u64>,

    /// Ticks between recorded samples.
    #[arg(long, default_value_t = 480)]
    sample_interval: u32,

    /// Simulated minutes represented by one tick.
    #[arg(long, default_value_t = 1.0)]
    minutes_per_tick: f64,

    /// Safety cap on ticks in case maturity is never reached.
    #[arg(long, default_value_t = 500_000)]
    max_ticks: u64,

    /// Treatment series CSV path; a control series lands next to it.
    #[arg(long, default_value = "growth.csv")]
    out: PathBuf,

    /// Print a JSON run summary to stdout when the run ends.
    #[arg(long)]
    summary_json: bool,
}

fn main() -> Result<()> {
    init_tracing();
    run(Cli::parse())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    let config = ExperimentConfig {
        species: cli.species,
        gravity: cli.gravity,
        light: cli.light,
        comparison: cli.comparison,
        rng_seed: cli.seed,
        sample_interval_ticks: cli.sample_interval,
        minutes_per_tick: cli.minutes_per_tick,
    };

    let wants_control = config.comparison && config.gravity != EARTH_GRAVITY;
    let control_out = wants_control.then(|| control_path(&cli.out));
    let recorder = Recorder::create(&cli.out, control_out.as_deref())
        .with_context(|| format!("opening series output next to {}", cli.out.display()))?;
    let recorder = Arc::new(Mutex::new(recorder));

    let mut driver = ExperimentDriver::new();
    driver.set_sink(Box::new(SharedRecorder::new(Arc::clone(&recorder))));
    driver
        .start(config)
        .context("experiment configuration rejected")?;

    info!(
        species = %cli.species,
        gravity = cli.gravity,
        light = %cli.light,
        comparison = wants_control,
        "Experiment started",
    );

    loop {
        let events = driver.tick();
        if events.completed {
            info!(tick = events.tick.0, "Plants reached maturity");
            break;
        }
        if events.tick.0 >= cli.max_ticks {
            warn!(
                tick = events.tick.0,
                "Tick cap reached before maturity; pausing the run",
            );
            driver.pause();
            break;
        }
    }

    report(&driver, &cli)?;

    recorder
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .finish()
        .context("flushing series output")?;
    Ok(())
}

fn report(driver: &ExperimentDriver, cli: &Cli) -> Result<()> {
    let measurements = driver
        .measurements()
        .context("run ended without a treatment plant")?;
    info!(
        phase = ?driver.phase(),
        elapsed_minutes = driver.elapsed_minutes(),
        samples = driver.treatment_series().len(),
        control_samples = driver.control_series().len(),
        shoot_length = measurements.shoot_length,
        root_depth = measurements.root_depth,
        branches = measurements.branch_count,
        shoot_angle_degrees = measurements.shoot_angle_degrees,
        "Run summary",
    );

    if cli.summary_json {
        let summary = serde_json::json!({
            "completed": driver.phase() == RunPhase::Complete,
            "elapsed_ticks": driver.elapsed().0,
            "elapsed_minutes": driver.elapsed_minutes(),
            "treatment_samples": driver.treatment_series().len(),
            "control_samples": driver.control_series().len(),
            "measurements": measurements,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

/// Control series document derived from the treatment path:
/// `growth.csv` becomes `growth_control.csv`.
fn control_path(out: &Path) -> PathBuf {
    let stem = out
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("growth");
    out.with_file_name(format!("{stem}_control.csv"))
}
