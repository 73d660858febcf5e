#![deny(warnings)]

//! Core domain models and invariants for the plant simulation.
//!
//! This crate defines the serializable master data, scenario configuration and
//! emitted interval records shared by every other crate, together with the
//! validation that turns a raw scenario into immutable [`MasterData`].

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod config;
pub mod master;

pub use config::*;
pub use master::{validate_scenario, MasterData};

/// Prefix of downtime reason codes that classify as planned.
pub const PLANNED_PREFIX: &str = "PLN-";
/// Prefix of downtime reason codes that classify as unplanned.
pub const UNPLANNED_PREFIX: &str = "UNP-";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Production line identifier, e.g. "LINE-1".
    LineId
);
string_id!(
    /// Equipment identifier, e.g. "FIL-101".
    EquipmentId
);
string_id!(
    /// Product identifier, e.g. "SKU-COLA-330".
    ProductId
);
string_id!(
    /// Production order identifier, e.g. "ORD-00001".
    OrderId
);

/// Closed set of equipment types found on a packaging line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EquipmentKind {
    Filler,
    Packer,
    Palletizer,
}

impl fmt::Display for EquipmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filler => f.write_str("Filler"),
            Self::Packer => f.write_str("Packer"),
            Self::Palletizer => f.write_str("Palletizer"),
        }
    }
}

/// A piece of equipment and the line it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: EquipmentId,
    pub kind: EquipmentKind,
    pub line: LineId,
}

/// Product master record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Nominal output in units per interval.
    pub target_rate: u32,
    /// Cost per unit.
    pub unit_cost: Decimal,
    /// Sale price per unit.
    pub unit_price: Decimal,
    /// Baseline scrap rate in [0, 1), defined as scrap / (scrap + good).
    pub scrap_rate: f64,
    /// Lines with a known performance bottleneck for this product.
    #[serde(default)]
    pub degraded_lines: Vec<LineId>,
    /// Scrap rate replacing the baseline while the product has a quality issue.
    #[serde(default)]
    pub quality_issue_scrap_rate: Option<f64>,
}

impl Product {
    /// Scrap rate before any time-dependent multiplier.
    pub fn effective_scrap_rate(&self) -> f64 {
        self.quality_issue_scrap_rate.unwrap_or(self.scrap_rate)
    }
}

/// Planned vs. unplanned classification of a downtime reason.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DowntimeClass {
    Planned,
    Unplanned,
}

/// Classify a reason code by its prefix. Returns `None` for codes that carry
/// neither prefix.
pub fn classify_reason(code: &str) -> Option<DowntimeClass> {
    if code.starts_with(PLANNED_PREFIX) {
        Some(DowntimeClass::Planned)
    } else if code.starts_with(UNPLANNED_PREFIX) {
        Some(DowntimeClass::Unplanned)
    } else {
        None
    }
}

/// Entry of the downtime reason vocabulary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DowntimeReason {
    pub code: String,
    pub description: String,
}

impl DowntimeReason {
    pub fn class(&self) -> Option<DowntimeClass> {
        classify_reason(&self.code)
    }
}

/// A scheduled run of one product on one line over `[start, end)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrder {
    pub id: OrderId,
    pub line: LineId,
    pub product: ProductId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ProductionOrder {
    /// Whether `instant` falls inside the half-open order window.
    pub fn is_active_at(&self, instant: NaiveDateTime) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Equipment status for one interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Running,
    Stopped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("Running"),
            Self::Stopped => f.write_str("Stopped"),
        }
    }
}

/// One emitted log line: a single equipment over a single interval.
///
/// KPI fields are percentages rounded to one decimal place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntervalRecord {
    pub timestamp: NaiveDateTime,
    pub order_id: OrderId,
    pub line_id: LineId,
    pub equipment_id: EquipmentId,
    pub equipment_kind: EquipmentKind,
    pub product_id: ProductId,
    pub product_name: String,
    pub status: Status,
    pub downtime_reason: Option<String>,
    pub good_units: u32,
    pub scrap_units: u32,
    pub target_rate: u32,
    pub unit_cost: Decimal,
    pub unit_price: Decimal,
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub oee: f64,
}

/// Invalid or contradictory scenario parameters. Always fatal and raised
/// before the simulation starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("horizon end {end} must be after start {start}")]
    EmptyHorizon {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    #[error("interval size must be > 0 minutes")]
    NonPositiveInterval,
    #[error("degenerate range for {field}: min {min} > max {max}")]
    DegenerateRange { field: String, min: f64, max: f64 },
    #[error("minimum run duration must be > 0 minutes")]
    ZeroRunDuration,
    #[error("probability for {field} must be within [0,1), got {value}")]
    ProbabilityOutOfRange { field: String, value: f64 },
    #[error("scrap rate for product {product} must be within [0,1), got {rate}")]
    ScrapRateOutOfRange { product: String, rate: f64 },
    #[error("multiplier for {field} must be finite and > 0, got {value}")]
    InvalidMultiplier { field: String, value: f64 },
    #[error("negative monetary value for product {0}")]
    NegativeMoney(String),
    #[error("duplicate id: {0}")]
    DuplicateId(String),
    #[error("unknown equipment: {0}")]
    UnknownEquipment(String),
    #[error("unknown line: {0}")]
    UnknownLine(String),
    #[error("unknown product: {0}")]
    UnknownProduct(String),
    #[error("order {0} overlaps the previous order on its line")]
    OverlappingOrders(String),
    #[error("unknown downtime reason: {0}")]
    UnknownReason(String),
    #[error("downtime reason {0} must start with PLN- or UNP-")]
    ReasonPrefix(String),
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("failure window for {equipment} ends before it starts")]
    ReversedWindow { equipment: String },
    #[error("product {0} lists degraded lines but no degradation factor is configured")]
    MissingDegradationFactor(String),
}
