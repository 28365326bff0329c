//! Vehicle configuration
//!
//! Brand-specific tables are produced elsewhere; the supervisor only needs
//! the handful of flags that change its decisions.

use serde::{Deserialize, Serialize};

/// Safety mode enforced by the independent safety processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SafetyModel {
    #[default]
    Silent,
    NoOutput,
    AllOutput,
    Elm327,
    Gm,
    Toyota,
    HondaNidec,
    HondaBosch,
    Hyundai,
    Chrysler,
    Subaru,
    Mazda,
    Nissan,
    Volkswagen,
    Ford,
    Tesla,
    Body,
}

impl SafetyModel {
    /// Channels in these modes never actuate and are exempt from cross-checks
    pub fn is_ignored(self) -> bool {
        matches!(self, SafetyModel::Silent | SafetyModel::NoOutput)
    }
}

/// Expected configuration of one safety channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyConfig {
    pub safety_model: SafetyModel,
    #[serde(default)]
    pub safety_param: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SteerControlType {
    #[default]
    Torque,
    Angle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LateralTuning {
    #[default]
    Pid,
    Torque,
}

/// Vehicle configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarParams {
    /// Platform name; `"mock"` means the car was not recognized
    pub car_name: String,
    /// Dashcam only, never actuate
    pub passive: bool,
    /// The car's own cruise system engages and disengages us
    pub pcm_cruise: bool,
    pub openpilot_longitudinal_control: bool,
    pub experimental_longitudinal_available: bool,
    /// Robotics platform rather than a road vehicle
    pub not_car: bool,
    /// Firmware versions were read during fingerprinting
    pub has_firmware: bool,
    /// Driving model does not use radar
    pub radarless: bool,
    pub safety_configs: Vec<SafetyConfig>,
    pub alternative_experience: u16,
    pub steer_control_type: SteerControlType,
    pub lateral_tuning: LateralTuning,
    /// Lowest speed at which the car accepts steering commands (m/s)
    pub min_steer_speed: f32,
}

impl CarParams {
    pub fn recognized(&self) -> bool {
        self.car_name != "mock"
    }
}

impl Default for CarParams {
    fn default() -> Self {
        Self {
            car_name: "gm".to_string(),
            passive: false,
            pcm_cruise: true,
            openpilot_longitudinal_control: false,
            experimental_longitudinal_available: true,
            not_car: false,
            has_firmware: true,
            radarless: false,
            safety_configs: vec![SafetyConfig {
                safety_model: SafetyModel::Gm,
                safety_param: 0,
            }],
            alternative_experience: 0,
            steer_control_type: SteerControlType::Torque,
            lateral_tuning: LateralTuning::Torque,
            min_steer_speed: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_car_is_unrecognized() {
        let params = CarParams {
            car_name: "mock".to_string(),
            ..Default::default()
        };
        assert!(!params.recognized());
        assert!(CarParams::default().recognized());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let params: CarParams =
            serde_json::from_str(r#"{"passive": true, "safety_configs": [{"safety_model": "toyota"}]}"#)
                .unwrap();
        assert!(params.passive);
        assert_eq!(params.safety_configs[0].safety_model, SafetyModel::Toyota);
        assert_eq!(params.safety_configs[0].safety_param, 0);
        assert_eq!(params.car_name, "gm");
    }

    #[test]
    fn test_ignored_safety_models() {
        assert!(SafetyModel::Silent.is_ignored());
        assert!(SafetyModel::NoOutput.is_ignored());
        assert!(!SafetyModel::Gm.is_ignored());
    }
}
