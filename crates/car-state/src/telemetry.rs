//! Per-cycle telemetry from device, perception, localization, and safety subsystems

use crate::params::SafetyModel;
use crate::services::ServiceHealth;
use crate::vehicle::VehicleSnapshot;
use onroad_events::EventName;
use serde::{Deserialize, Serialize};

/// Device thermal band, ordered from coolest to hottest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThermalStatus {
    #[default]
    Green,
    Yellow,
    Red,
    Danger,
}

/// Device resource state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub thermal_status: ThermalStatus,
    pub free_space_percent: f32,
    pub memory_usage_percent: f32,
    pub fan_speed_percent_desired: f32,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            thermal_status: ThermalStatus::Green,
            free_space_percent: 100.0,
            memory_usage_percent: 0.0,
            fan_speed_percent_desired: 0.0,
        }
    }
}

/// Interface board peripherals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeripheralState {
    /// Board type was identified; fan telemetry is meaningless otherwise
    pub board_known: bool,
    pub fan_speed_rpm: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CalibrationStatus {
    #[default]
    Uncalibrated,
    Calibrated,
    Invalid,
    Recalibrating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LaneChangeState {
    #[default]
    Off,
    PreLaneChange,
    LaneChangeStarting,
    LaneChangeFinishing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LaneChangeDirection {
    #[default]
    None,
    Left,
    Right,
}

/// Driving model outputs
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelOutputs {
    pub lane_change_state: LaneChangeState,
    pub lane_change_direction: LaneChangeDirection,
    pub hard_brake_predicted: bool,
    pub frame_drop_percent: f32,
    /// Curvature requested by the model (1/m)
    pub desired_curvature: f32,
    /// Probabilities for lane lines ordered far-left, left, right, far-right
    pub lane_line_probs: [f32; 4],
    /// Lateral offset of each lane line at the car (m, left positive)
    pub lane_line_y0: [f32; 4],
    /// Desire probability of a left lane change
    pub lane_change_left_prob: f32,
    /// Desire probability of a right lane change
    pub lane_change_right_prob: f32,
    /// Lateral offset of the first predicted path point
    pub path_y0: Option<f32>,
}

/// Lane geometry from the planner
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LanePlan {
    pub lane_width_left: f32,
    pub lane_width_right: f32,
}

/// Longitudinal planner outputs
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LongitudinalPlan {
    pub fcw: bool,
    pub has_lead: bool,
    /// Last speed of the planned trajectory
    pub final_speed: Option<f32>,
}

/// Localizer quality flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Localization {
    pub posenet_ok: bool,
    pub device_stable: bool,
    pub inputs_ok: bool,
    pub gps_ok: bool,
}

impl Default for Localization {
    fn default() -> Self {
        Self {
            posenet_ok: true,
            device_stable: true,
            inputs_ok: true,
            gps_ok: true,
        }
    }
}

/// Online-estimated vehicle parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiveParameters {
    pub valid: bool,
    pub stiffness_factor: f32,
    pub steer_ratio: f32,
    pub angle_offset_deg: f32,
    /// Road roll (rad)
    pub roll: f32,
}

impl Default for LiveParameters {
    fn default() -> Self {
        Self {
            valid: true,
            stiffness_factor: 1.0,
            steer_ratio: 15.0,
            angle_offset_deg: 0.0,
            roll: 0.0,
        }
    }
}

/// Driver monitoring result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverMonitoring {
    pub events: Vec<EventName>,
    /// Negative once the driver has been unresponsive for too long
    pub awareness_status: f32,
}

impl Default for DriverMonitoring {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            awareness_status: 1.0,
        }
    }
}

/// One managed background process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessState {
    pub name: String,
    pub running: bool,
    pub should_be_running: bool,
}

/// State reported by one redundant safety channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SafetyChannel {
    pub safety_model: SafetyModel,
    pub safety_param: u16,
    pub alternative_experience: u16,
    /// The channel currently lets actuation through
    pub controls_allowed: bool,
    pub rx_checks_invalid: bool,
    pub relay_malfunction: bool,
}

/// What the car interface actually sent after rate and torque limits
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ActuatorsOutput {
    pub steer: f32,
    pub steering_angle_deg: f32,
}

/// Debug joystick used on development platforms
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JoystickInput {
    /// Longitudinal and lateral axes in [-1, 1]
    pub axes: [f32; 2],
    pub cancel_pressed: bool,
}

/// Everything except the vehicle snapshot, sampled once per cycle
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Telemetry {
    pub health: ServiceHealth,
    pub device: DeviceState,
    pub peripheral: PeripheralState,
    pub calibration: CalibrationStatus,
    pub model: ModelOutputs,
    pub lane_plan: LanePlan,
    pub longitudinal_plan: LongitudinalPlan,
    pub localization: Localization,
    pub live_parameters: LiveParameters,
    pub driver_monitoring: DriverMonitoring,
    pub processes: Vec<ProcessState>,
    pub safety_channels: Vec<SafetyChannel>,
    pub radar_errors: Vec<String>,
    pub car_output: ActuatorsOutput,
    pub joystick: JoystickInput,
    /// Kernel and driver log lines drained since the last cycle
    pub log_lines: Vec<String>,
}

/// One cycle's worth of inputs
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CycleInputs {
    pub car: VehicleSnapshot,
    pub telemetry: Telemetry,
    /// The car interface saw no CAN frames within its receive window
    pub can_rcv_timeout: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thermal_ordering() {
        assert!(ThermalStatus::Red > ThermalStatus::Yellow);
        assert!(ThermalStatus::Danger >= ThermalStatus::Red);
        assert!(ThermalStatus::Green < ThermalStatus::Red);
    }

    #[test]
    fn test_default_telemetry_is_healthy() {
        let telemetry = Telemetry::default();
        assert!(telemetry.localization.posenet_ok);
        assert!(telemetry.live_parameters.valid);
        assert_eq!(telemetry.device.free_space_percent, 100.0);
        assert!(telemetry.driver_monitoring.awareness_status > 0.0);
    }
}
