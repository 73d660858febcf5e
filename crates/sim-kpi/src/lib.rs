#![deny(warnings)]

//! KPI models: OEE components and scrap accounting for one interval.
//!
//! This module provides pure helpers for:
//! - Availability, performance, quality and OEE as one-decimal percentages
//! - Scrap units derived from good units and a scrap rate defined as
//!   scrap / (scrap + good)

use serde::{Deserialize, Serialize};
use sim_core::Status;
use thiserror::Error;

/// Errors produced by KPI helpers.
#[derive(Debug, Error, PartialEq)]
pub enum KpiError {
    /// Scrap rate must be finite and within [0, 1).
    #[error("invalid scrap rate: {0}")]
    InvalidScrapRate(f64),
}

/// The four interval scores, as percentages rounded to one decimal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KpiScores {
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub oee: f64,
}

/// Round a fraction in [0, 1] to a percentage with one decimal place.
///
/// Example:
/// assert_eq!(to_percent(0.90909), 90.9);
pub fn to_percent(fraction: f64) -> f64 {
    (fraction * 1000.0).round() / 10.0
}

/// Compute interval KPIs.
///
/// - Availability = 1 when running, else 0
/// - Performance = min((good + scrap) / target, 1) when running with target > 0, else 0
/// - Quality = good / (good + scrap) when anything was produced, else 1 when
///   running and 0 when stopped
/// - OEE = A * P * Q, computed on the unrounded fractions
///
/// Example:
/// let k = compute_kpis(Status::Running, 0, 0, 100);
/// assert_eq!(k.quality, 100.0);
pub fn compute_kpis(status: Status, good: u32, scrap: u32, target_rate: u32) -> KpiScores {
    let running = status == Status::Running;
    let total = u64::from(good) + u64::from(scrap);

    let availability = if running { 1.0 } else { 0.0 };
    let performance = if running && target_rate > 0 {
        (total as f64 / f64::from(target_rate)).min(1.0)
    } else {
        0.0
    };
    let quality = if total > 0 {
        f64::from(good) / total as f64
    } else if running {
        1.0
    } else {
        0.0
    };
    let oee = availability * performance * quality;

    KpiScores {
        availability: to_percent(availability),
        performance: to_percent(performance),
        quality: to_percent(quality),
        oee: to_percent(oee),
    }
}

/// Scrap units accompanying `good` units at `scrap_rate`.
///
/// Uses floor(good * r / (1 - r)), so scrap / (scrap + good) ~= r.
///
/// Example:
/// assert_eq!(scrap_units(100, 0.1).unwrap(), 11);
pub fn scrap_units(good: u32, scrap_rate: f64) -> Result<u32, KpiError> {
    if !scrap_rate.is_finite() || !(0.0..1.0).contains(&scrap_rate) {
        return Err(KpiError::InvalidScrapRate(scrap_rate));
    }
    let scrap = f64::from(good) * scrap_rate / (1.0 - scrap_rate);
    Ok(scrap.floor().clamp(0.0, f64::from(u32::MAX)) as u32)
}
