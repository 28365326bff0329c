//! Normalized vehicle state

use onroad_events::EventName;
use serde::{Deserialize, Serialize};

/// Transmission gear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GearShifter {
    #[default]
    Unknown,
    Park,
    Drive,
    Neutral,
    Reverse,
    Sport,
    Low,
    Brake,
    Eco,
    Manumatic,
}

/// Steering wheel and stalk buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ButtonType {
    Unknown,
    LeftBlinker,
    RightBlinker,
    AccelCruise,
    DecelCruise,
    Cancel,
    AltButton1,
    GapAdjustCruise,
    MainCruise,
    SetCruise,
    ResumeCruise,
}

/// A button edge seen during this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonEvent {
    pub button: ButtonType,
    /// `true` on press, `false` on release
    pub pressed: bool,
}

/// Vehicle's own cruise control state
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CruiseState {
    pub enabled: bool,
    pub available: bool,
    pub standstill: bool,
    /// Cruise set speed (m/s)
    pub speed: f32,
}

/// Vehicle state for one cycle, decoded from the bus by the car interface
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    /// All expected CAN messages arrived and passed checks
    pub can_valid: bool,
    /// No CAN traffic at all
    pub can_timeout: bool,

    /// Speed (m/s)
    pub v_ego: f32,
    /// Longitudinal acceleration (m/s²)
    pub a_ego: f32,
    pub standstill: bool,

    pub gas_pressed: bool,
    pub brake_pressed: bool,
    pub regen_braking: bool,

    pub steering_pressed: bool,
    pub steering_angle_deg: f32,
    pub steer_fault_temporary: bool,
    pub steer_fault_permanent: bool,

    pub left_blinker: bool,
    pub right_blinker: bool,
    pub left_blindspot: bool,
    pub right_blindspot: bool,

    pub gear_shifter: GearShifter,
    pub cruise_state: CruiseState,

    /// Button edges since the previous snapshot
    pub button_events: Vec<ButtonEvent>,
    /// Faults and requests reported by the car interface
    pub events: Vec<EventName>,
}

impl VehicleSnapshot {
    /// True if any of `buttons` changed state this cycle
    pub fn any_button(&self, buttons: &[ButtonType]) -> bool {
        self.button_events
            .iter()
            .any(|event| buttons.contains(&event.button))
    }

    /// True if `button` was released this cycle
    pub fn button_released(&self, button: ButtonType) -> bool {
        self.button_events
            .iter()
            .any(|event| event.button == button && !event.pressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_queries() {
        let snapshot = VehicleSnapshot {
            button_events: vec![
                ButtonEvent { button: ButtonType::ResumeCruise, pressed: true },
                ButtonEvent { button: ButtonType::GapAdjustCruise, pressed: false },
            ],
            ..Default::default()
        };

        assert!(snapshot.any_button(&[ButtonType::AccelCruise, ButtonType::ResumeCruise]));
        assert!(!snapshot.any_button(&[ButtonType::Cancel]));
        assert!(snapshot.button_released(ButtonType::GapAdjustCruise));
        assert!(!snapshot.button_released(ButtonType::ResumeCruise));
    }

    #[test]
    fn test_snapshot_deserializes_with_events() {
        let json = r#"{
            "can_valid": true, "can_timeout": false, "v_ego": 12.5, "a_ego": 0.1,
            "standstill": false, "gas_pressed": false, "brake_pressed": false,
            "regen_braking": false, "steering_pressed": false, "steering_angle_deg": 1.5,
            "steer_fault_temporary": false, "steer_fault_permanent": false,
            "left_blinker": false, "right_blinker": false, "left_blindspot": false,
            "right_blindspot": false, "gear_shifter": "drive",
            "cruise_state": {"enabled": true, "available": true, "standstill": false, "speed": 20.0},
            "button_events": [], "events": ["pcmEnable"]
        }"#;
        let snapshot: VehicleSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.gear_shifter, GearShifter::Drive);
        assert_eq!(snapshot.events, vec![EventName::PcmEnable]);
    }
}
