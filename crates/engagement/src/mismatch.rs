//! Cross-checks against the safety processor and the vehicle's own cruise

use car_state::{SafetyChannel, VehicleSnapshot};
use hazards::MismatchCounts;

/// Cycle counters for disagreement with independent systems.
///
/// Both counters reset the moment their condition clears, so the thresholds
/// they are compared against are consecutive-cycle counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MismatchTracker {
    counts: MismatchCounts,
}

impl MismatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count cycles engaged while any actuating channel blocks actuation.
    ///
    /// Status from the safety processor arrives on a different path than
    /// vehicle data, so a short disagreement is expected and tolerated.
    pub fn update_panda(&mut self, enabled: bool, channels: &[SafetyChannel]) {
        if !enabled {
            self.counts.panda = 0;
            return;
        }

        let blocked = channels
            .iter()
            .any(|c| !c.safety_model.is_ignored() && !c.controls_allowed);
        if blocked {
            self.counts.panda = self.counts.panda.saturating_add(1);
        }
    }

    /// Count cycles the vehicle cruise is engaged while we are not, or while
    /// we do not own the cruise system.
    pub fn update_cruise(&mut self, car: &VehicleSnapshot, enabled: bool, pcm_cruise: bool) {
        let mismatch = car.cruise_state.enabled && (!enabled || !pcm_cruise);
        self.counts.cruise = if mismatch {
            self.counts.cruise.saturating_add(1)
        } else {
            0
        };
    }

    pub fn counts(&self) -> MismatchCounts {
        self.counts
    }
}
