//! Fixed-step interval loop.

use crate::{
    assemble_record, DowntimeTracker, Evaluation, RuleEngine, Schedule, SimError, TickContext,
};
use chrono::{Duration, NaiveDateTime};
use rand::RngCore;
use sim_core::{
    ConfigError, Equipment, Horizon, IntervalRecord, LineId, MasterData, ProductionOrder, Status,
};
use sim_kpi::compute_kpis;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Orders of one line and the index of the first one not yet finished.
#[derive(Debug)]
struct LineCursor<'a> {
    orders: Vec<&'a ProductionOrder>,
    next: usize,
}

impl<'a> LineCursor<'a> {
    /// Active order at `now`. `now` must not decrease between calls.
    fn active(&mut self, now: NaiveDateTime) -> Option<&'a ProductionOrder> {
        while self.next < self.orders.len() && self.orders[self.next].end <= now {
            self.next += 1;
        }
        self.orders
            .get(self.next)
            .copied()
            .filter(|o| o.start <= now)
    }
}

/// Owns the per-run mutable state: the downtime tracker and order cursors.
pub struct Stepper<'a> {
    master: &'a MasterData,
    engine: &'a RuleEngine,
    changeovers: &'a [NaiveDateTime],
    horizon: Horizon,
    interval: Duration,
    tracker: DowntimeTracker,
    lines: BTreeMap<LineId, LineCursor<'a>>,
}

impl<'a> Stepper<'a> {
    pub fn new(
        master: &'a MasterData,
        schedule: &'a Schedule,
        engine: &'a RuleEngine,
        horizon: Horizon,
        interval_minutes: u32,
    ) -> Result<Self, ConfigError> {
        if interval_minutes == 0 {
            return Err(ConfigError::NonPositiveInterval);
        }
        if horizon.end <= horizon.start {
            return Err(ConfigError::EmptyHorizon {
                start: horizon.start,
                end: horizon.end,
            });
        }
        let mut lines: BTreeMap<LineId, LineCursor<'a>> = master
            .lines()
            .iter()
            .map(|l| {
                (
                    l.clone(),
                    LineCursor {
                        orders: Vec::new(),
                        next: 0,
                    },
                )
            })
            .collect();
        for o in schedule.orders() {
            match lines.get_mut(&o.line) {
                Some(c) => c.orders.push(o),
                None => return Err(ConfigError::UnknownLine(o.line.0.clone())),
            }
        }
        Ok(Self {
            master,
            engine,
            changeovers: schedule.changeovers(),
            horizon,
            interval: Duration::minutes(i64::from(interval_minutes)),
            tracker: DowntimeTracker::new(),
            lines,
        })
    }

    /// Step from horizon start to horizon end inclusive and return the
    /// records in tick order, equipment in topology order within a tick.
    pub fn run<R: RngCore>(mut self, rng: &mut R) -> Result<Vec<IntervalRecord>, SimError> {
        info!(
            start = %self.horizon.start,
            end = %self.horizon.end,
            interval_minutes = self.interval.num_minutes(),
            equipment = self.master.equipment().len(),
            "stepping simulation"
        );
        let mut records = Vec::new();
        let mut now = self.horizon.start;
        while now <= self.horizon.end {
            self.step(now, rng, &mut records)?;
            now += self.interval;
        }
        Ok(records)
    }

    fn step<R: RngCore>(
        &mut self,
        now: NaiveDateTime,
        rng: &mut R,
        out: &mut Vec<IntervalRecord>,
    ) -> Result<(), SimError> {
        let master = self.master;
        for equipment in master.equipment() {
            let order = match self.lines.get_mut(&equipment.line) {
                Some(cursor) => match cursor.active(now) {
                    Some(o) => o,
                    None => continue,
                },
                None => {
                    return Err(SimError::InvariantViolation(format!(
                        "no cursor for line {}",
                        equipment.line
                    )))
                }
            };
            let product = master.product(&order.product).ok_or_else(|| {
                SimError::InvariantViolation(format!(
                    "order {} references unknown product {}",
                    order.id, order.product
                ))
            })?;

            let ctx = TickContext {
                instant: now,
                equipment,
                order,
                product,
                changeovers: self.changeovers,
            };
            let held = self.tracker.resolve(&equipment.id, now).cloned();
            let outcome = match held {
                Some(open) => {
                    // Mechanical failures take over a stoppage already in progress.
                    let reason = match self.engine.preempt(&ctx, &mut *rng) {
                        Some(stop) if stop.reason != open.reason || stop.until != open.until => {
                            self.tracker
                                .preempt(&equipment.id, now, stop.until, stop.reason.clone())?;
                            stop.reason
                        }
                        _ => open.reason,
                    };
                    Evaluation {
                        status: Status::Stopped,
                        reason: Some(reason),
                        good_units: 0,
                        scrap_units: 0,
                        downtime_end: None,
                    }
                }
                None => {
                    let eval = self.engine.evaluate(&ctx, &mut *rng)?;
                    if let (Some(until), Some(reason)) = (eval.downtime_end, &eval.reason) {
                        // A stoppage ending by now covers this tick only.
                        if until > now {
                            self.tracker.open(&equipment.id, now, until, reason.clone())?;
                        }
                    }
                    eval
                }
            };
            check_outcome(&outcome, equipment, now)?;

            let kpis = compute_kpis(
                outcome.status,
                outcome.good_units,
                outcome.scrap_units,
                product.target_rate,
            );
            out.push(assemble_record(now, order, equipment, product, &outcome, &kpis));
        }
        Ok(())
    }
}

fn check_outcome(
    e: &Evaluation,
    equipment: &Equipment,
    now: NaiveDateTime,
) -> Result<(), SimError> {
    let broken = match e.status {
        Status::Stopped => e.good_units != 0 || e.scrap_units != 0 || e.reason.is_none(),
        Status::Running => e.reason.is_some() || e.downtime_end.is_some(),
    };
    if broken {
        return Err(SimError::InvariantViolation(format!(
            "inconsistent outcome for {} at {now}: {e:?}",
            equipment.id
        )));
    }
    if e.status == Status::Stopped {
        debug!(equipment = %equipment.id, at = %now, reason = ?e.reason, "stopped");
    }
    Ok(())
}
