//! Run mode

use serde::{Deserialize, Serialize};

/// How the process is being run, resolved once at startup.
///
/// Checks that only make sense against real hardware ask the mode instead
/// of reading process-wide flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// On a vehicle
    #[default]
    Live,
    /// Driven by a simulator
    Simulation,
    /// Re-running recorded inputs
    Replay,
    /// Bench setup without a moving vehicle
    TestingCloset,
}

impl RunMode {
    /// Disk, memory, and camera checks need real hardware
    pub fn checks_device_resources(self) -> bool {
        self != RunMode::Simulation
    }

    /// Simulators start without waiting for every service
    pub fn initializes_immediately(self) -> bool {
        self == RunMode::Simulation
    }

    /// Replays run faster than real time, so lag is meaningless
    pub fn reports_lagging(self) -> bool {
        self != RunMode::Replay
    }

    /// Recorded cruise state does not react to our commands
    pub fn checks_cruise_mismatch(self) -> bool {
        self != RunMode::Replay
    }

    pub fn checks_live_parameters(self) -> bool {
        matches!(self, RunMode::Live | RunMode::Replay)
    }

    /// GPS and model frame-drop checks
    pub fn checks_gps_and_model(self) -> bool {
        self != RunMode::Simulation
    }

    /// Driver camera and process manager are absent in simulation
    pub fn expects_driver_camera(self) -> bool {
        self != RunMode::Simulation
    }

    /// Replays resume in the engagement state that was recorded
    pub fn restores_recorded_state(self) -> bool {
        self == RunMode::Replay
    }
}
