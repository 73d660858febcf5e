//! Declarative scenario configuration.
//!
//! Everything the simulation needs is described here: horizon and interval
//! size, line topology, product master data, downtime vocabulary, schedule
//! bounds and anomaly rule parameters.

use crate::{DowntimeReason, EquipmentId, EquipmentKind, LineId, Product};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_interval_minutes() -> u32 {
    5
}

/// Top-level scenario description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Simulated time window `[start, end)`.
    pub horizon: Horizon,
    /// Tick size in minutes (default: 5).
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
    /// Seed for deterministic RNG.
    #[serde(default)]
    pub rng_seed: u64,
    /// Lines with their ordered equipment.
    pub lines: Vec<LineConfig>,
    /// Product catalog.
    pub products: Vec<Product>,
    /// Downtime reason vocabulary.
    pub downtime_reasons: Vec<DowntimeReason>,
    /// Production order generation bounds.
    pub schedule: ScheduleConfig,
    /// Anomaly rule parameters; absent sections disable the rule.
    #[serde(default)]
    pub anomalies: AnomalyConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LineConfig {
    pub id: LineId,
    pub equipment: Vec<EquipmentConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EquipmentConfig {
    pub id: EquipmentId,
    pub kind: EquipmentKind,
}

/// Inclusive integer range in minutes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinuteBounds {
    pub min: u32,
    pub max: u32,
}

impl MinuteBounds {
    pub fn is_degenerate(&self) -> bool {
        self.min > self.max
    }
}

/// Inclusive floating-point range, used for multipliers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FactorBounds {
    pub min: f64,
    pub max: f64,
}

impl FactorBounds {
    pub fn is_degenerate(&self) -> bool {
        self.min > self.max
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Order run duration.
    pub run_minutes: MinuteBounds,
    /// Gap between consecutive orders on the same line.
    pub changeover_minutes: MinuteBounds,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AnomalyConfig {
    #[serde(default)]
    pub mechanical_failures: Vec<MechanicalFailureConfig>,
    #[serde(default)]
    pub micro_stops: Option<MicroStopConfig>,
    #[serde(default)]
    pub performance_degradation: Option<PerformanceDegradationConfig>,
    /// Efficiency multiplier range per equipment kind.
    #[serde(default)]
    pub equipment_efficiency: BTreeMap<EquipmentKind, FactorBounds>,
    #[serde(default)]
    pub changeover_scrap: Option<ChangeoverScrapConfig>,
}

/// Deterministic stoppage of one equipment over `[start, end]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MechanicalFailureConfig {
    pub equipment: EquipmentId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub reason: String,
}

/// Random short stoppages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MicroStopConfig {
    pub equipment: Vec<EquipmentId>,
    /// Chance per tick, in [0, 1).
    pub probability: f64,
    pub duration_minutes: MinuteBounds,
    pub reason: String,
}

/// Rate slowdown for products running on one of their `degraded_lines`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PerformanceDegradationConfig {
    pub factor: FactorBounds,
}

/// Scrap spike following the start of an order that ends a changeover.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ChangeoverScrapConfig {
    pub window_minutes: u32,
    pub multiplier: f64,
}
