//! Per-equipment open downtime.

use crate::SimError;
use chrono::NaiveDateTime;
use sim_core::EquipmentId;
use std::collections::BTreeMap;
use tracing::debug;

/// A stoppage still in effect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenDowntime {
    pub until: NaiveDateTime,
    pub reason: String,
}

/// Down / idle-tracking state for every equipment. An entry exists only while
/// its equipment is down.
#[derive(Clone, Debug, Default)]
pub struct DowntimeTracker {
    open: BTreeMap<EquipmentId, OpenDowntime>,
}

impl DowntimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open downtime still covering `now`. An entry whose end has been reached
    /// is cleared and `None` is returned, so the caller re-evaluates the tick.
    pub fn resolve(
        &mut self,
        equipment: &EquipmentId,
        now: NaiveDateTime,
    ) -> Option<&OpenDowntime> {
        let expired = match self.open.get(equipment) {
            None => return None,
            Some(d) => d.until <= now,
        };
        if expired {
            if let Some(d) = self.open.remove(equipment) {
                debug!(equipment = %equipment, reason = %d.reason, at = %now, "downtime cleared");
            }
            return None;
        }
        self.open.get(equipment)
    }

    /// Enter the down state until `until`. The end must lie after `now`.
    pub fn open(
        &mut self,
        equipment: &EquipmentId,
        now: NaiveDateTime,
        until: NaiveDateTime,
        reason: String,
    ) -> Result<(), SimError> {
        if until <= now {
            return Err(SimError::InvariantViolation(format!(
                "downtime for {equipment} opened at {now} already ended at {until}"
            )));
        }
        if let Some(prev) = self.open.get(equipment) {
            if prev.until > now {
                return Err(SimError::InvariantViolation(format!(
                    "{equipment} already down until {}",
                    prev.until
                )));
            }
        }
        debug!(equipment = %equipment, reason = %reason, until = %until, "downtime opened");
        self.open.insert(equipment.clone(), OpenDowntime { until, reason });
        Ok(())
    }

    /// Swap whatever downtime `equipment` has for a new stoppage. A stoppage
    /// already ended by `now` only clears the entry. Returns the replaced one.
    pub fn preempt(
        &mut self,
        equipment: &EquipmentId,
        now: NaiveDateTime,
        until: NaiveDateTime,
        reason: String,
    ) -> Result<Option<OpenDowntime>, SimError> {
        let prev = self.open.remove(equipment);
        if until > now {
            self.open(equipment, now, until, reason)?;
        }
        Ok(prev)
    }

    pub fn is_down(&self, equipment: &EquipmentId) -> bool {
        self.open.contains_key(equipment)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}
