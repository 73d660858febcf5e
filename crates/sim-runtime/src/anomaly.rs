//! Anomaly rule engine.
//!
//! Rules are evaluated in list order for one equipment at one instant. A rule
//! either stops the equipment (first stoppage wins and ends evaluation) or
//! adjusts the production of a running interval.

use crate::SimError;
use chrono::{Duration, NaiveDateTime};
use rand::{Rng, RngCore};
use sim_core::{
    AnomalyConfig, Equipment, EquipmentId, EquipmentKind, FactorBounds, MinuteBounds, Product,
    ProductionOrder, Status,
};
use sim_kpi::scrap_units;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Everything a rule may look at for one (equipment, tick).
#[derive(Clone, Copy, Debug)]
pub struct TickContext<'a> {
    pub instant: NaiveDateTime,
    pub equipment: &'a Equipment,
    pub order: &'a ProductionOrder,
    pub product: &'a Product,
    /// Sorted instants at which production resumed after a changeover.
    pub changeovers: &'a [NaiveDateTime],
}

/// A new stoppage and the instant it lasts until.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stoppage {
    pub reason: String,
    pub until: NaiveDateTime,
}

/// Production parameters accumulated by the running-path rules.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProductionAdjustment {
    /// Multiplier applied to the order's target rate.
    pub rate_factor: f64,
    /// Scrap share of total output.
    pub scrap_rate: f64,
}

#[derive(Debug)]
pub enum Verdict {
    Continue,
    Stop(Stoppage),
}

/// A single anomaly rule.
pub trait AnomalyRule: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(
        &self,
        ctx: &TickContext<'_>,
        adjustment: &mut ProductionAdjustment,
        rng: &mut dyn RngCore,
    ) -> Verdict;

    /// Whether a stoppage from this rule replaces downtime already in progress.
    fn preempts_open_downtime(&self) -> bool {
        false
    }
}

/// Result of evaluating the rule chain for one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub status: Status,
    pub reason: Option<String>,
    pub good_units: u32,
    pub scrap_units: u32,
    /// Set when a rule started a stoppage.
    pub downtime_end: Option<NaiveDateTime>,
}

/// Deterministic stoppage of one equipment over an absolute `[start, end]` window.
#[derive(Debug, Clone)]
pub struct MechanicalFailure {
    pub equipment: EquipmentId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub reason: String,
}

impl AnomalyRule for MechanicalFailure {
    fn name(&self) -> &'static str {
        "mechanical_failure"
    }

    fn preempts_open_downtime(&self) -> bool {
        true
    }

    fn evaluate(
        &self,
        ctx: &TickContext<'_>,
        _adjustment: &mut ProductionAdjustment,
        _rng: &mut dyn RngCore,
    ) -> Verdict {
        if ctx.equipment.id == self.equipment && self.start <= ctx.instant && ctx.instant <= self.end
        {
            return Verdict::Stop(Stoppage {
                reason: self.reason.clone(),
                until: self.end,
            });
        }
        Verdict::Continue
    }
}

/// Random short stoppages on selected equipment.
#[derive(Debug, Clone)]
pub struct MicroStops {
    pub equipment: BTreeSet<EquipmentId>,
    pub probability: f64,
    pub duration_minutes: MinuteBounds,
    pub reason: String,
}

impl AnomalyRule for MicroStops {
    fn name(&self) -> &'static str {
        "micro_stops"
    }

    fn evaluate(
        &self,
        ctx: &TickContext<'_>,
        _adjustment: &mut ProductionAdjustment,
        rng: &mut dyn RngCore,
    ) -> Verdict {
        if !self.equipment.contains(&ctx.equipment.id) {
            return Verdict::Continue;
        }
        if rng.gen::<f64>() >= self.probability {
            return Verdict::Continue;
        }
        let minutes = rng.gen_range(self.duration_minutes.min..=self.duration_minutes.max);
        Verdict::Stop(Stoppage {
            reason: self.reason.clone(),
            until: ctx.instant + Duration::minutes(i64::from(minutes)),
        })
    }
}

/// Slower rate for products running on a line listed in their `degraded_lines`.
#[derive(Debug, Clone)]
pub struct PerformanceDegradation {
    pub factor: FactorBounds,
}

impl AnomalyRule for PerformanceDegradation {
    fn name(&self) -> &'static str {
        "performance_degradation"
    }

    fn evaluate(
        &self,
        ctx: &TickContext<'_>,
        adjustment: &mut ProductionAdjustment,
        rng: &mut dyn RngCore,
    ) -> Verdict {
        if ctx.product.degraded_lines.contains(&ctx.equipment.line) {
            adjustment.rate_factor *= rng.gen_range(self.factor.min..=self.factor.max);
        }
        Verdict::Continue
    }
}

/// Rate multiplier drawn per equipment kind. Kinds without a range run at
/// nominal rate and consume no randomness.
#[derive(Debug, Clone)]
pub struct EquipmentEfficiency {
    pub ranges: BTreeMap<EquipmentKind, FactorBounds>,
}

impl AnomalyRule for EquipmentEfficiency {
    fn name(&self) -> &'static str {
        "equipment_efficiency"
    }

    fn evaluate(
        &self,
        ctx: &TickContext<'_>,
        adjustment: &mut ProductionAdjustment,
        rng: &mut dyn RngCore,
    ) -> Verdict {
        if let Some(b) = self.ranges.get(&ctx.equipment.kind) {
            adjustment.rate_factor *= rng.gen_range(b.min..=b.max);
        }
        Verdict::Continue
    }
}

/// Products with a quality issue scrap at their override rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityDegradation;

impl AnomalyRule for QualityDegradation {
    fn name(&self) -> &'static str {
        "quality_degradation"
    }

    fn evaluate(
        &self,
        ctx: &TickContext<'_>,
        adjustment: &mut ProductionAdjustment,
        _rng: &mut dyn RngCore,
    ) -> Verdict {
        if let Some(rate) = ctx.product.quality_issue_scrap_rate {
            adjustment.scrap_rate = rate;
        }
        Verdict::Continue
    }
}

/// Scrap multiplier for `window` after any changeover instant.
#[derive(Debug, Clone)]
pub struct ChangeoverScrapSpike {
    pub window: Duration,
    pub multiplier: f64,
}

impl ChangeoverScrapSpike {
    fn in_window(&self, changeovers: &[NaiveDateTime], instant: NaiveDateTime) -> bool {
        // Latest changeover at or before the instant is the only candidate.
        let idx = changeovers.partition_point(|&c| c <= instant);
        idx > 0 && instant < changeovers[idx - 1] + self.window
    }
}

impl AnomalyRule for ChangeoverScrapSpike {
    fn name(&self) -> &'static str {
        "changeover_scrap_spike"
    }

    fn evaluate(
        &self,
        ctx: &TickContext<'_>,
        adjustment: &mut ProductionAdjustment,
        _rng: &mut dyn RngCore,
    ) -> Verdict {
        if self.in_window(ctx.changeovers, ctx.instant) {
            adjustment.scrap_rate *= self.multiplier;
        }
        Verdict::Continue
    }
}

/// Ordered chain of anomaly rules.
#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: Vec<Box<dyn AnomalyRule>>,
}

impl RuleEngine {
    pub fn new(rules: Vec<Box<dyn AnomalyRule>>) -> Self {
        Self { rules }
    }

    /// Build the standard chain: mechanical failures, micro-stops,
    /// performance degradation, equipment efficiency, quality degradation,
    /// changeover scrap spike.
    pub fn from_config(cfg: &AnomalyConfig) -> Self {
        let mut rules: Vec<Box<dyn AnomalyRule>> = Vec::new();
        for f in &cfg.mechanical_failures {
            rules.push(Box::new(MechanicalFailure {
                equipment: f.equipment.clone(),
                start: f.start,
                end: f.end,
                reason: f.reason.clone(),
            }));
        }
        if let Some(m) = &cfg.micro_stops {
            rules.push(Box::new(MicroStops {
                equipment: m.equipment.iter().cloned().collect(),
                probability: m.probability,
                duration_minutes: m.duration_minutes,
                reason: m.reason.clone(),
            }));
        }
        if let Some(d) = &cfg.performance_degradation {
            rules.push(Box::new(PerformanceDegradation { factor: d.factor }));
        }
        if !cfg.equipment_efficiency.is_empty() {
            rules.push(Box::new(EquipmentEfficiency {
                ranges: cfg.equipment_efficiency.clone(),
            }));
        }
        rules.push(Box::new(QualityDegradation));
        if let Some(c) = &cfg.changeover_scrap {
            rules.push(Box::new(ChangeoverScrapSpike {
                window: Duration::minutes(i64::from(c.window_minutes)),
                multiplier: c.multiplier,
            }));
        }
        Self { rules }
    }

    /// Append a rule at the end of the chain.
    pub fn push(&mut self, rule: Box<dyn AnomalyRule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// First stoppage from a preempting rule, for a tick whose equipment is
    /// already down. Production adjustments are discarded.
    pub fn preempt(&self, ctx: &TickContext<'_>, rng: &mut dyn RngCore) -> Option<Stoppage> {
        let mut scratch = ProductionAdjustment {
            rate_factor: 1.0,
            scrap_rate: ctx.product.scrap_rate,
        };
        for rule in self.rules.iter().filter(|r| r.preempts_open_downtime()) {
            if let Verdict::Stop(stop) = rule.evaluate(ctx, &mut scratch, rng) {
                return Some(stop);
            }
        }
        None
    }

    /// Evaluate the chain for a tick that has no open downtime.
    pub fn evaluate(
        &self,
        ctx: &TickContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Evaluation, SimError> {
        let mut adjustment = ProductionAdjustment {
            rate_factor: 1.0,
            scrap_rate: ctx.product.scrap_rate,
        };
        for rule in &self.rules {
            if let Verdict::Stop(stop) = rule.evaluate(ctx, &mut adjustment, rng) {
                return Ok(Evaluation {
                    status: Status::Stopped,
                    reason: Some(stop.reason),
                    good_units: 0,
                    scrap_units: 0,
                    downtime_end: Some(stop.until),
                });
            }
        }
        let rate = f64::from(ctx.product.target_rate) * adjustment.rate_factor;
        let good = rate.floor().clamp(0.0, f64::from(u32::MAX)) as u32;
        let scrap = scrap_units(good, adjustment.scrap_rate)?;
        Ok(Evaluation {
            status: Status::Running,
            reason: None,
            good_units: good,
            scrap_units: scrap,
            downtime_end: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, product};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use sim_core::{LineId, OrderId, ProductId};

    fn filler() -> Equipment {
        Equipment {
            id: EquipmentId::from("FIL-101"),
            kind: EquipmentKind::Filler,
            line: LineId::from("LINE-1"),
        }
    }

    fn order() -> ProductionOrder {
        ProductionOrder {
            id: OrderId::from("ORD-00001"),
            line: LineId::from("LINE-1"),
            product: ProductId::from("SKU-1"),
            start: at(6, 0),
            end: at(14, 0),
        }
    }

    fn eval(
        engine: &RuleEngine,
        instant: NaiveDateTime,
        p: &Product,
        changeovers: &[NaiveDateTime],
    ) -> Evaluation {
        let eq = filler();
        let o = order();
        let ctx = TickContext {
            instant,
            equipment: &eq,
            order: &o,
            product: p,
            changeovers,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        engine.evaluate(&ctx, &mut rng).unwrap()
    }

    #[test]
    fn baseline_running_interval() {
        let engine = RuleEngine::from_config(&AnomalyConfig::default());
        assert_eq!(engine.rule_names(), vec!["quality_degradation"]);
        let e = eval(&engine, at(7, 0), &product("SKU-1", 100, 0.1), &[]);
        assert_eq!(e.status, Status::Running);
        assert_eq!(e.good_units, 100);
        assert_eq!(e.scrap_units, 11);
        assert_eq!(e.downtime_end, None);
    }

    #[test]
    fn first_stoppage_wins() {
        let engine = RuleEngine::new(vec![
            Box::new(MechanicalFailure {
                equipment: EquipmentId::from("FIL-101"),
                start: at(7, 0),
                end: at(8, 0),
                reason: "UNP-MECH".to_string(),
            }),
            Box::new(MicroStops {
                equipment: [EquipmentId::from("FIL-101")].into_iter().collect(),
                probability: 0.999_999,
                duration_minutes: MinuteBounds { min: 5, max: 5 },
                reason: "UNP-MICRO".to_string(),
            }),
        ]);
        let p = product("SKU-1", 100, 0.1);
        let e = eval(&engine, at(7, 30), &p, &[]);
        assert_eq!(e.status, Status::Stopped);
        assert_eq!(e.reason.as_deref(), Some("UNP-MECH"));
        assert_eq!(e.downtime_end, Some(at(8, 0)));
        assert_eq!(e.good_units + e.scrap_units, 0);

        let e = eval(&engine, at(8, 5), &p, &[]);
        assert_eq!(e.reason.as_deref(), Some("UNP-MICRO"));
        assert_eq!(e.downtime_end, Some(at(8, 10)));
    }

    #[test]
    fn failure_window_bounds_are_inclusive() {
        let rule = MechanicalFailure {
            equipment: EquipmentId::from("FIL-101"),
            start: at(7, 0),
            end: at(8, 0),
            reason: "UNP-MECH".to_string(),
        };
        let engine = RuleEngine::new(vec![Box::new(rule)]);
        let p = product("SKU-1", 100, 0.0);
        assert_eq!(eval(&engine, at(6, 55), &p, &[]).status, Status::Running);
        assert_eq!(eval(&engine, at(7, 0), &p, &[]).status, Status::Stopped);
        assert_eq!(eval(&engine, at(8, 0), &p, &[]).status, Status::Stopped);
        assert_eq!(eval(&engine, at(8, 5), &p, &[]).status, Status::Running);
    }

    #[test]
    fn degradation_only_on_listed_lines() {
        let engine = RuleEngine::new(vec![Box::new(PerformanceDegradation {
            factor: FactorBounds { min: 0.5, max: 0.5 },
        })]);
        let mut p = product("SKU-1", 100, 0.0);
        assert_eq!(eval(&engine, at(7, 0), &p, &[]).good_units, 100);
        p.degraded_lines = vec![LineId::from("LINE-1")];
        assert_eq!(eval(&engine, at(7, 0), &p, &[]).good_units, 50);
    }

    #[test]
    fn efficiency_keyed_by_kind() {
        let mut ranges = BTreeMap::new();
        ranges.insert(EquipmentKind::Filler, FactorBounds { min: 0.9, max: 0.9 });
        ranges.insert(EquipmentKind::Packer, FactorBounds { min: 0.1, max: 0.1 });
        let engine = RuleEngine::new(vec![Box::new(EquipmentEfficiency { ranges })]);
        let e = eval(&engine, at(7, 0), &product("SKU-1", 100, 0.0), &[]);
        assert_eq!(e.good_units, 90);
    }

    #[test]
    fn quality_override_then_changeover_spike() {
        let engine = RuleEngine::new(vec![
            Box::new(QualityDegradation),
            Box::new(ChangeoverScrapSpike {
                window: Duration::minutes(30),
                multiplier: 2.0,
            }),
        ]);
        let mut p = product("SKU-1", 100, 0.02);
        p.quality_issue_scrap_rate = Some(0.05);
        let changeovers = [at(9, 0), at(12, 0)];
        // Outside any window: override rate only, floor(100 * 0.05 / 0.95) = 5.
        assert_eq!(eval(&engine, at(8, 55), &p, &changeovers).scrap_units, 5);
        // Inside: 0.10 -> floor(100 * 0.1 / 0.9) = 11.
        assert_eq!(eval(&engine, at(9, 0), &p, &changeovers).scrap_units, 11);
        assert_eq!(eval(&engine, at(9, 25), &p, &changeovers).scrap_units, 11);
        assert_eq!(eval(&engine, at(9, 30), &p, &changeovers).scrap_units, 5);
        assert_eq!(eval(&engine, at(12, 10), &p, &changeovers).scrap_units, 11);
    }

    #[test]
    fn only_mechanical_failures_preempt() {
        let engine = RuleEngine::new(vec![
            Box::new(MicroStops {
                equipment: [EquipmentId::from("FIL-101")].into_iter().collect(),
                probability: 1.0,
                duration_minutes: MinuteBounds { min: 5, max: 5 },
                reason: "UNP-MICRO".to_string(),
            }),
            Box::new(MechanicalFailure {
                equipment: EquipmentId::from("FIL-101"),
                start: at(7, 0),
                end: at(8, 0),
                reason: "UNP-MECH".to_string(),
            }),
        ]);
        let eq = filler();
        let o = order();
        let p = product("SKU-1", 100, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let ctx = |instant| TickContext {
            instant,
            equipment: &eq,
            order: &o,
            product: &p,
            changeovers: &[],
        };
        assert_eq!(engine.preempt(&ctx(at(6, 55)), &mut rng), None);
        assert_eq!(
            engine.preempt(&ctx(at(7, 30)), &mut rng),
            Some(Stoppage {
                reason: "UNP-MECH".to_string(),
                until: at(8, 0),
            })
        );
    }

    #[test]
    fn custom_rules_extend_the_chain() {
        #[derive(Debug)]
        struct AlwaysStop;
        impl AnomalyRule for AlwaysStop {
            fn name(&self) -> &'static str {
                "always_stop"
            }
            fn evaluate(
                &self,
                ctx: &TickContext<'_>,
                _adjustment: &mut ProductionAdjustment,
                _rng: &mut dyn RngCore,
            ) -> Verdict {
                Verdict::Stop(Stoppage {
                    reason: "PLN-CLEANING".to_string(),
                    until: ctx.instant + Duration::minutes(15),
                })
            }
        }
        let mut engine = RuleEngine::from_config(&AnomalyConfig::default());
        engine.push(Box::new(AlwaysStop));
        assert_eq!(engine.rule_names(), vec!["quality_degradation", "always_stop"]);
        let e = eval(&engine, at(7, 0), &product("SKU-1", 100, 0.0), &[]);
        assert_eq!(e.reason.as_deref(), Some("PLN-CLEANING"));
        assert_eq!(e.downtime_end, Some(at(7, 15)));
    }
}
