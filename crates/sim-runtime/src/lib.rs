#![deny(warnings)]

//! Interval stepper for the plant simulation.
//!
//! A run generates a production schedule once, then advances a fixed-step
//! clock over the horizon. At every tick each equipment with an active order
//! resolves its status through the [`DowntimeTracker`] and the anomaly
//! [`RuleEngine`], and one [`sim_core::IntervalRecord`] is emitted.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sim_core::{validate_scenario, ConfigError, IntervalRecord, ScenarioConfig};
use sim_kpi::KpiError;
use thiserror::Error;
use tracing::info;

pub mod anomaly;
pub mod assemble;
pub mod schedule;
pub mod stepper;
pub mod tracker;

pub use anomaly::{
    AnomalyRule, Evaluation, ProductionAdjustment, RuleEngine, Stoppage, TickContext, Verdict,
};
pub use assemble::assemble_record;
pub use schedule::{generate_schedule, Schedule};
pub use stepper::Stepper;
pub use tracker::{DowntimeTracker, OpenDowntime};

/// Errors that abort a simulation run.
#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("kpi error: {0}")]
    Kpi(#[from] KpiError),
    /// A stepper bug; never recovered.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Generated schedule plus the ordered record stream of one run.
#[derive(Clone, Debug)]
pub struct SimOutput {
    pub schedule: Schedule,
    pub records: Vec<IntervalRecord>,
}

/// Validate, schedule and step a scenario with the given randomness source.
pub fn run_scenario<R: RngCore>(cfg: &ScenarioConfig, rng: &mut R) -> Result<SimOutput, SimError> {
    let master = validate_scenario(cfg)?;
    let schedule = generate_schedule(cfg.horizon, &cfg.schedule, &master, rng)?;
    let engine = RuleEngine::from_config(&cfg.anomalies);
    let stepper = Stepper::new(
        &master,
        &schedule,
        &engine,
        cfg.horizon,
        cfg.interval_minutes,
    )?;
    let records = stepper.run(rng)?;
    info!(
        orders = schedule.orders().len(),
        records = records.len(),
        "simulation finished"
    );
    Ok(SimOutput { schedule, records })
}

/// Run a scenario with a ChaCha8 stream seeded from `seed`.
pub fn run_seeded(cfg: &ScenarioConfig, seed: u64) -> Result<SimOutput, SimError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    run_scenario(cfg, &mut rng)
}
