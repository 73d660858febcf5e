#![deny(warnings)]

//! Roll-ups over a finished interval record stream.
//!
//! Consumers downstream of the simulation expect time-ordered input and
//! classify stoppages as planned or unplanned by reason prefix; this crate
//! checks the former and applies the latter.

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use sim_core::{
    classify_reason, DowntimeClass, EquipmentId, EquipmentKind, IntervalRecord, LineId, Status,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Totals for one equipment over a run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EquipmentSummary {
    pub equipment_id: EquipmentId,
    pub equipment_kind: EquipmentKind,
    pub line_id: LineId,
    pub intervals: u64,
    pub running_intervals: u64,
    pub good_units: u64,
    pub scrap_units: u64,
    pub good_value: Decimal,
    pub scrap_cost: Decimal,
    /// Mean of per-interval OEE, one decimal.
    pub mean_oee: f64,
    pub stopped_minutes_by_reason: BTreeMap<String, u64>,
    pub planned_stop_minutes: u64,
    pub unplanned_stop_minutes: u64,
}

/// Totals for one line.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineSummary {
    pub line_id: LineId,
    pub equipment: usize,
    pub good_units: u64,
    pub scrap_units: u64,
    pub mean_oee: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub records: usize,
    pub interval_minutes: u32,
    pub equipment: Vec<EquipmentSummary>,
    pub lines: Vec<LineSummary>,
    pub planned_stop_minutes: u64,
    pub unplanned_stop_minutes: u64,
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Fail unless timestamps never decrease along the stream.
pub fn check_time_ordered(records: &[IntervalRecord]) -> Result<()> {
    for (i, pair) in records.windows(2).enumerate() {
        if pair[1].timestamp < pair[0].timestamp {
            bail!(
                "record {} at {} precedes record {} at {}",
                i + 1,
                pair[1].timestamp,
                i,
                pair[0].timestamp
            );
        }
    }
    Ok(())
}

#[derive(Default)]
struct Acc {
    oee_sum: f64,
}

/// Aggregate a record stream. Each stopped interval counts `interval_minutes`
/// toward its reason; reasons without a known prefix count as unplanned.
pub fn summarize(records: &[IntervalRecord], interval_minutes: u32) -> RunSummary {
    let minutes = u64::from(interval_minutes);
    let mut by_equipment: BTreeMap<EquipmentId, (EquipmentSummary, Acc)> = BTreeMap::new();
    for r in records {
        let (s, acc) = by_equipment
            .entry(r.equipment_id.clone())
            .or_insert_with(|| {
                (
                    EquipmentSummary {
                        equipment_id: r.equipment_id.clone(),
                        equipment_kind: r.equipment_kind,
                        line_id: r.line_id.clone(),
                        intervals: 0,
                        running_intervals: 0,
                        good_units: 0,
                        scrap_units: 0,
                        good_value: Decimal::ZERO,
                        scrap_cost: Decimal::ZERO,
                        mean_oee: 0.0,
                        stopped_minutes_by_reason: BTreeMap::new(),
                        planned_stop_minutes: 0,
                        unplanned_stop_minutes: 0,
                    },
                    Acc::default(),
                )
            });
        s.intervals += 1;
        acc.oee_sum += r.oee;
        s.good_units += u64::from(r.good_units);
        s.scrap_units += u64::from(r.scrap_units);
        s.good_value += r.unit_price * Decimal::from(r.good_units);
        s.scrap_cost += r.unit_cost * Decimal::from(r.scrap_units);
        match r.status {
            Status::Running => s.running_intervals += 1,
            Status::Stopped => {
                let reason = r.downtime_reason.clone().unwrap_or_default();
                match classify_reason(&reason) {
                    Some(DowntimeClass::Planned) => s.planned_stop_minutes += minutes,
                    _ => s.unplanned_stop_minutes += minutes,
                }
                *s.stopped_minutes_by_reason.entry(reason).or_insert(0) += minutes;
            }
        }
    }

    let equipment: Vec<EquipmentSummary> = by_equipment
        .into_values()
        .map(|(mut s, acc)| {
            s.mean_oee = round1(acc.oee_sum / s.intervals as f64);
            s
        })
        .collect();

    let mut by_line: BTreeMap<LineId, (LineSummary, f64, u64)> = BTreeMap::new();
    for e in &equipment {
        let (l, oee_weighted, n) = by_line.entry(e.line_id.clone()).or_insert_with(|| {
            (
                LineSummary {
                    line_id: e.line_id.clone(),
                    equipment: 0,
                    good_units: 0,
                    scrap_units: 0,
                    mean_oee: 0.0,
                },
                0.0,
                0,
            )
        });
        l.equipment += 1;
        l.good_units += e.good_units;
        l.scrap_units += e.scrap_units;
        *oee_weighted += e.mean_oee * e.intervals as f64;
        *n += e.intervals;
    }
    let lines = by_line
        .into_values()
        .map(|(mut l, w, n)| {
            if n > 0 {
                l.mean_oee = round1(w / n as f64);
            }
            l
        })
        .collect();

    let planned_stop_minutes = equipment.iter().map(|e| e.planned_stop_minutes).sum();
    let unplanned_stop_minutes = equipment.iter().map(|e| e.unplanned_stop_minutes).sum();
    debug!(
        records = records.len(),
        equipment = equipment.len(),
        "summarized record stream"
    );
    RunSummary {
        records: records.len(),
        interval_minutes,
        equipment,
        lines,
        planned_stop_minutes,
        unplanned_stop_minutes,
    }
}

/// Pretty JSON rendering of a summary.
pub fn summary_json(summary: &RunSummary) -> Result<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}
