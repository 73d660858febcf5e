//! Master data loading and scenario validation.

use crate::{
    classify_reason, ConfigError, DowntimeReason, Equipment, EquipmentId, FactorBounds, LineId,
    MinuteBounds, Product, ProductId, ScenarioConfig,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

/// Immutable lookup tables built once from a scenario.
#[derive(Clone, Debug)]
pub struct MasterData {
    products: Vec<Product>,
    product_index: BTreeMap<ProductId, usize>,
    equipment: Vec<Equipment>,
    lines: Vec<LineId>,
    reasons: BTreeMap<String, DowntimeReason>,
}

impl MasterData {
    /// Build tables from configuration, rejecting duplicates and bad values.
    pub fn load(cfg: &ScenarioConfig) -> Result<Self, ConfigError> {
        if cfg.products.is_empty() {
            return Err(ConfigError::Empty("product catalog"));
        }
        if cfg.lines.is_empty() {
            return Err(ConfigError::Empty("line topology"));
        }

        let mut lines = Vec::with_capacity(cfg.lines.len());
        let mut line_ids: BTreeSet<&LineId> = BTreeSet::new();
        let mut equipment = Vec::new();
        let mut equipment_ids: BTreeSet<&EquipmentId> = BTreeSet::new();
        for line in &cfg.lines {
            if !line_ids.insert(&line.id) {
                return Err(ConfigError::DuplicateId(line.id.0.clone()));
            }
            if line.equipment.is_empty() {
                return Err(ConfigError::Empty("line equipment list"));
            }
            lines.push(line.id.clone());
            for e in &line.equipment {
                if !equipment_ids.insert(&e.id) {
                    return Err(ConfigError::DuplicateId(e.id.0.clone()));
                }
                equipment.push(Equipment {
                    id: e.id.clone(),
                    kind: e.kind,
                    line: line.id.clone(),
                });
            }
        }

        let mut product_index = BTreeMap::new();
        for (i, p) in cfg.products.iter().enumerate() {
            validate_product(p)?;
            for l in &p.degraded_lines {
                if !line_ids.contains(l) {
                    return Err(ConfigError::UnknownLine(l.0.clone()));
                }
            }
            if product_index.insert(p.id.clone(), i).is_some() {
                return Err(ConfigError::DuplicateId(p.id.0.clone()));
            }
        }

        let mut reasons = BTreeMap::new();
        for r in &cfg.downtime_reasons {
            if classify_reason(&r.code).is_none() {
                return Err(ConfigError::ReasonPrefix(r.code.clone()));
            }
            if reasons.insert(r.code.clone(), r.clone()).is_some() {
                return Err(ConfigError::DuplicateId(r.code.clone()));
            }
        }

        Ok(Self {
            products: cfg.products.clone(),
            product_index,
            equipment,
            lines,
            reasons,
        })
    }

    /// Product catalog in configuration order.
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn product(&self, id: &ProductId) -> Option<&Product> {
        self.product_index.get(id).map(|&i| &self.products[i])
    }

    /// All equipment in topology order (line by line).
    pub fn equipment(&self) -> &[Equipment] {
        &self.equipment
    }

    pub fn equipment_by_id(&self, id: &EquipmentId) -> Option<&Equipment> {
        self.equipment.iter().find(|e| &e.id == id)
    }

    pub fn lines(&self) -> &[LineId] {
        &self.lines
    }

    pub fn reason(&self, code: &str) -> Option<&DowntimeReason> {
        self.reasons.get(code)
    }
}

fn validate_product(p: &Product) -> Result<(), ConfigError> {
    if p.id.0.trim().is_empty() {
        return Err(ConfigError::Empty("product id"));
    }
    if p.unit_cost < Decimal::ZERO || p.unit_price < Decimal::ZERO {
        return Err(ConfigError::NegativeMoney(p.id.0.clone()));
    }
    check_scrap_rate(&p.id, p.scrap_rate)?;
    if let Some(rate) = p.quality_issue_scrap_rate {
        check_scrap_rate(&p.id, rate)?;
    }
    Ok(())
}

fn check_scrap_rate(product: &ProductId, rate: f64) -> Result<(), ConfigError> {
    if !rate.is_finite() || !(0.0..1.0).contains(&rate) {
        return Err(ConfigError::ScrapRateOutOfRange {
            product: product.0.clone(),
            rate,
        });
    }
    Ok(())
}

fn check_minutes(field: &str, b: &MinuteBounds) -> Result<(), ConfigError> {
    if b.is_degenerate() {
        return Err(ConfigError::DegenerateRange {
            field: field.to_string(),
            min: f64::from(b.min),
            max: f64::from(b.max),
        });
    }
    Ok(())
}

fn check_factor(field: &str, b: &FactorBounds) -> Result<(), ConfigError> {
    for v in [b.min, b.max] {
        if !v.is_finite() || v <= 0.0 {
            return Err(ConfigError::InvalidMultiplier {
                field: field.to_string(),
                value: v,
            });
        }
    }
    if b.is_degenerate() {
        return Err(ConfigError::DegenerateRange {
            field: field.to_string(),
            min: b.min,
            max: b.max,
        });
    }
    Ok(())
}

fn check_reason(master: &MasterData, code: &str) -> Result<(), ConfigError> {
    if master.reason(code).is_none() {
        return Err(ConfigError::UnknownReason(code.to_string()));
    }
    Ok(())
}

fn check_equipment(master: &MasterData, id: &EquipmentId) -> Result<(), ConfigError> {
    if master.equipment_by_id(id).is_none() {
        return Err(ConfigError::UnknownEquipment(id.0.clone()));
    }
    Ok(())
}

/// Validate a whole scenario and return its master data.
///
/// Covers horizon and interval, schedule bounds, every anomaly parameter, and
/// cross-references between anomaly rules and master data. Once this returns
/// `Ok`, the simulation over the scenario cannot fail on configuration.
pub fn validate_scenario(cfg: &ScenarioConfig) -> Result<MasterData, ConfigError> {
    if cfg.horizon.end <= cfg.horizon.start {
        return Err(ConfigError::EmptyHorizon {
            start: cfg.horizon.start,
            end: cfg.horizon.end,
        });
    }
    if cfg.interval_minutes == 0 {
        return Err(ConfigError::NonPositiveInterval);
    }
    let master = MasterData::load(cfg)?;

    check_minutes("schedule.run_minutes", &cfg.schedule.run_minutes)?;
    check_minutes("schedule.changeover_minutes", &cfg.schedule.changeover_minutes)?;
    if cfg.schedule.run_minutes.min == 0 {
        return Err(ConfigError::ZeroRunDuration);
    }

    let a = &cfg.anomalies;
    for f in &a.mechanical_failures {
        check_equipment(&master, &f.equipment)?;
        check_reason(&master, &f.reason)?;
        if f.end < f.start {
            return Err(ConfigError::ReversedWindow {
                equipment: f.equipment.0.clone(),
            });
        }
    }
    if let Some(m) = &a.micro_stops {
        for id in &m.equipment {
            check_equipment(&master, id)?;
        }
        check_reason(&master, &m.reason)?;
        if !m.probability.is_finite() || !(0.0..1.0).contains(&m.probability) {
            return Err(ConfigError::ProbabilityOutOfRange {
                field: "micro_stops.probability".to_string(),
                value: m.probability,
            });
        }
        check_minutes("micro_stops.duration_minutes", &m.duration_minutes)?;
    }
    match &a.performance_degradation {
        Some(d) => check_factor("performance_degradation.factor", &d.factor)?,
        None => {
            if let Some(p) = master.products().iter().find(|p| !p.degraded_lines.is_empty()) {
                return Err(ConfigError::MissingDegradationFactor(p.id.0.clone()));
            }
        }
    }
    for (kind, bounds) in &a.equipment_efficiency {
        check_factor(&format!("equipment_efficiency.{kind}"), bounds)?;
    }
    if let Some(c) = &a.changeover_scrap {
        if !c.multiplier.is_finite() || c.multiplier <= 0.0 {
            return Err(ConfigError::InvalidMultiplier {
                field: "changeover_scrap.multiplier".to_string(),
                value: c.multiplier,
            });
        }
        // The spiked rate feeds good * r / (1 - r); it has to stay below 1.
        for p in master.products() {
            let spiked = p.effective_scrap_rate() * c.multiplier;
            if spiked >= 1.0 {
                return Err(ConfigError::ScrapRateOutOfRange {
                    product: p.id.0.clone(),
                    rate: spiked,
                });
            }
        }
    }
    Ok(master)
}
