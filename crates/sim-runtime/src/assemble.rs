//! Log assembly: merge tick outcome, master data and KPIs into a record.

use crate::Evaluation;
use chrono::NaiveDateTime;
use sim_core::{Equipment, IntervalRecord, Product, ProductionOrder};
use sim_kpi::KpiScores;

/// Combine the attributes active at `timestamp` into one interval record.
pub fn assemble_record(
    timestamp: NaiveDateTime,
    order: &ProductionOrder,
    equipment: &Equipment,
    product: &Product,
    outcome: &Evaluation,
    kpis: &KpiScores,
) -> IntervalRecord {
    IntervalRecord {
        timestamp,
        order_id: order.id.clone(),
        line_id: order.line.clone(),
        equipment_id: equipment.id.clone(),
        equipment_kind: equipment.kind,
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        status: outcome.status,
        downtime_reason: outcome.reason.clone(),
        good_units: outcome.good_units,
        scrap_units: outcome.scrap_units,
        target_rate: product.target_rate,
        unit_cost: product.unit_cost,
        unit_price: product.unit_price,
        availability: kpis.availability,
        performance: kpis.performance,
        quality: kpis.quality,
        oee: kpis.oee,
    }
}
