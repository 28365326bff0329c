//! Engagement state carried across cycles

use car_state::{SafetyChannel, VehicleSnapshot};
use hazards::MismatchCounts;
use metrics::counter;
use onroad_events::{Categories, EventCategory, EventSet};
use tracing::{debug, info};

use crate::mismatch::MismatchTracker;
use crate::state::{transition, ControlMode};

/// Outcome of one engagement step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub mode: ControlMode,
    /// Engaged from `Disabled` this cycle; cruise targets must be initialized
    pub engaged: bool,
}

/// Mode, soft-disable timer, and mismatch counters owned by the control tick
#[derive(Debug, Clone)]
pub struct EngagementContext {
    mode: ControlMode,
    soft_disable_timer: u32,
    soft_disable_cycles: u32,
    mismatch: MismatchTracker,
    alert_types: Categories,
}

impl EngagementContext {
    /// `soft_disable_cycles` is the grace window re-armed on every entry into
    /// soft-disabling
    pub fn new(soft_disable_cycles: u32) -> Self {
        Self {
            mode: ControlMode::Disabled,
            soft_disable_timer: 0,
            soft_disable_cycles,
            mismatch: MismatchTracker::new(),
            alert_types: Categories::PERMANENT,
        }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn enabled(&self) -> bool {
        self.mode.enabled()
    }

    pub fn active(&self) -> bool {
        self.mode.active()
    }

    pub fn soft_disable_timer(&self) -> u32 {
        self.soft_disable_timer
    }

    /// Categories the alert layer should render
    pub fn alert_types(&self) -> Categories {
        self.alert_types
    }

    pub fn mismatch(&self) -> MismatchCounts {
        self.mismatch.counts()
    }

    /// Resume a recorded drive already engaged
    pub fn restore_enabled(&mut self, channels: &[SafetyChannel]) -> bool {
        if channels.iter().any(|c| c.controls_allowed) {
            info!("Restoring engaged state from recorded safety channels");
            self.mode = ControlMode::Enabled;
            true
        } else {
            false
        }
    }

    /// Update the safety-channel counter from this cycle's channels, using
    /// the mode decided on the previous cycle
    pub fn track_panda_mismatch(&mut self, channels: &[SafetyChannel]) {
        self.mismatch.update_panda(self.enabled(), channels);
    }

    /// Update the cruise counter. Callers skip this while controls are
    /// initializing or the car is passive, leaving the count unchanged.
    pub fn track_cruise_mismatch(&mut self, car: &VehicleSnapshot, pcm_cruise: bool) {
        self.mismatch.update_cruise(car, self.enabled(), pcm_cruise);
    }

    /// Advance the state machine by one cycle
    pub fn step(&mut self, events: &EventSet) -> Step {
        let prev = self.mode;
        let next = transition(
            prev,
            self.soft_disable_timer,
            events.categories(),
            self.soft_disable_cycles,
        );

        self.mode = next.mode;
        self.soft_disable_timer = next.timer;
        self.alert_types = next.alert_types;

        if next.mode != prev {
            info!(
                from = prev.as_str(),
                to = next.mode.as_str(),
                events = ?events.names(),
                "Engagement transition"
            );
            counter!("supervisor_engagement_transitions_total", "to" => next.mode.as_str())
                .increment(1);
        } else if next.alert_types.has(EventCategory::NoEntry) {
            debug!(events = ?events.names(), "Engagement blocked");
        }

        Step {
            mode: next.mode,
            engaged: next.engaged,
        }
    }
}
