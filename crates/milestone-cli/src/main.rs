//! milestone-run: MMVT and Elber milestoning on an argon box.
//!
//! Loads a TOML run file, builds a Lennard-Jones argon box on the reference
//! host with planar milestones around particle 0, and drives the requested
//! integrator in report-sized chunks.

use anyhow::Result;
use clap::Parser;
use milestone_core::{MilestoneError, SimulationContext};
use milestone_dynamics::{ElberLangevinIntegrator, MmvtLangevinIntegrator, ReferenceContext};
use std::path::PathBuf;

mod config;
mod system;
mod trajectory;

use config::{RunConfig, RunMode};
use trajectory::PdbTrajectory;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "milestone-run")]
#[command(version = VERSION)]
#[command(about = "MMVT / Elber milestoning Langevin runs on a reference argon box", long_about = None)]
struct Args {
    /// TOML run file
    ///
    /// Example: --config runs/mmvt_argon.toml
    #[arg(short, long)]
    config: PathBuf,

    /// Override the number of steps from the run file
    #[arg(long)]
    steps: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    log::info!("milestone-run {} - Starting", VERSION);

    let mut config = RunConfig::from_file(&args.config)?;
    if let Some(steps) = args.steps {
        config.steps = steps;
    }
    config.validate()?;

    let result = run(&config);
    if let Err(err) = &result {
        match err.downcast_ref::<MilestoneError>() {
            Some(milestone_err) => log::error!("{}", milestone_err.user_message()),
            None => log::error!("{:#}", err),
        }
    }
    result
}

fn run(config: &RunConfig) -> Result<()> {
    let context = system::build_argon_box(&config.system, config.langevin.temperature)?;
    let mut trajectory = config
        .output
        .trajectory
        .as_ref()
        .map(PdbTrajectory::create)
        .transpose()?;
    if let Some(trajectory) = trajectory.as_mut() {
        trajectory.write_frame(context.time(), context.positions())?;
    }

    let outcome = match config.mode {
        RunMode::Mmvt => run_mmvt(config, context, trajectory.as_mut()),
        RunMode::Elber => run_elber(config, context, trajectory.as_mut()),
    };
    if let Some(trajectory) = &trajectory {
        log::info!(
            "Trajectory: {} frames written to {}",
            trajectory.frames(),
            trajectory.path().display()
        );
    }
    outcome
}

/// Step counts for each report chunk.
fn chunks(total: u64, interval: u64) -> impl Iterator<Item = u64> {
    let full = total / interval;
    let rest = total % interval;
    std::iter::repeat(interval)
        .take(full as usize)
        .chain((rest > 0).then_some(rest))
}

fn run_mmvt(
    config: &RunConfig,
    context: ReferenceContext,
    mut trajectory: Option<&mut PdbTrajectory>,
) -> Result<()> {
    log::info!("=== MMVT Mode ===");
    let mut integrator = MmvtLangevinIntegrator::new(config.mmvt_config()?)?;
    integrator.bind(context)?;

    for chunk in chunks(config.steps, config.report_interval) {
        integrator.step(chunk)?;
        let kinetic = integrator.compute_kinetic_energy()?;
        let context = integrator.context()?;
        log::info!(
            "Step {:>8}  t={:>10.3} ps  KE={:>10.3} kJ/mol  bounces={}",
            context.step_count(),
            context.time(),
            kinetic,
            integrator.bounce_counter()
        );
        if let Some(trajectory) = trajectory.as_deref_mut() {
            trajectory.write_frame(context.time(), context.positions())?;
        }
    }

    log::info!("=== Results Summary ===");
    log::info!("Bounces logged to: {}", integrator.output_file_name().display());
    let ids = integrator.milestones().ids();
    for line in integrator.statistics()?.render(&ids).lines() {
        log::info!("  {}", line);
    }
    Ok(())
}

fn run_elber(
    config: &RunConfig,
    context: ReferenceContext,
    mut trajectory: Option<&mut PdbTrajectory>,
) -> Result<()> {
    log::info!("=== Elber Mode ===");
    let mut integrator = ElberLangevinIntegrator::new(config.elber_config()?)?;
    integrator.bind(context)?;

    for chunk in chunks(config.steps, config.report_interval) {
        integrator.step(chunk)?;
        let kinetic = integrator.compute_kinetic_energy()?;
        let context = integrator.context()?;
        log::info!(
            "Step {:>8}  t={:>10.3} ps  KE={:>10.3} kJ/mol  phase={:?}",
            context.step_count(),
            context.time(),
            kinetic,
            integrator.phase()?
        );
        if let Some(trajectory) = trajectory.as_deref_mut() {
            trajectory.write_frame(context.time(), context.positions())?;
        }
        if integrator.has_ended() {
            log::info!("Segment ended; stopping early");
            break;
        }
    }

    log::info!("=== Results Summary ===");
    log::info!(
        "Crossings logged to: {} (counter now {})",
        integrator.output_file_name().display(),
        integrator.crossing_counter()
    );
    if !integrator.has_ended() {
        log::warn!("Segment did not reach a terminating milestone in {} steps", config.steps);
    }
    Ok(())
}
