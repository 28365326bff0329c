//! Commands sent to the vehicle interface

use serde::{Deserialize, Serialize};

/// Actuator command for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Actuators {
    /// Longitudinal acceleration (m/s²)
    pub accel: f32,
    /// Target speed at the end of the plan (m/s)
    pub speed: f32,
    /// Normalized steering torque in [-1, 1]
    pub steer: f32,
    pub steering_angle_deg: f32,
    /// Desired path curvature (1/m)
    pub curvature: f32,
}

impl Actuators {
    /// Field names paired with mutable access, in declaration order
    pub(crate) fn fields_mut(&mut self) -> [(&'static str, &mut f32); 5] {
        [
            ("accel", &mut self.accel),
            ("speed", &mut self.speed),
            ("steer", &mut self.steer),
            ("steering_angle_deg", &mut self.steering_angle_deg),
            ("curvature", &mut self.curvature),
        ]
    }
}

/// Lateral controller state reported alongside its output
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LateralDebug {
    pub active: bool,
    /// Controller output pinned at its limit
    pub saturated: bool,
    pub steering_angle_deg: f32,
    pub output: f32,
    /// Torque controllers only (m/s²)
    pub desired_lateral_accel: f32,
    pub actual_lateral_accel: f32,
}

/// Cruise button requests sent to the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CruiseControl {
    /// Hold the stock cruise off while we are engaged without longitudinal
    #[serde(rename = "override")]
    pub override_: bool,
    pub cancel: bool,
    pub resume: bool,
}

/// Dashboard hints
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HudControl {
    /// Set speed shown on the cluster (m/s)
    pub set_speed: f32,
    pub speed_visible: bool,
    pub lanes_visible: bool,
    pub lead_visible: bool,
    pub lead_distance_bars: u8,
    pub left_lane_visible: bool,
    pub right_lane_visible: bool,
    pub left_lane_depart: bool,
    pub right_lane_depart: bool,
}

/// Everything sent to the vehicle interface in one cycle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CarControl {
    pub enabled: bool,
    pub lat_active: bool,
    pub long_active: bool,
    pub actuators: Actuators,
    pub left_blinker: bool,
    pub right_blinker: bool,
    pub cruise_control: CruiseControl,
    pub hud_control: HudControl,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_cover_every_actuator() {
        let mut actuators = Actuators {
            accel: 1.0,
            speed: 2.0,
            steer: 3.0,
            steering_angle_deg: 4.0,
            curvature: 5.0,
        };
        let sum: f32 = actuators.fields_mut().iter().map(|(_, v)| **v).sum();
        assert_eq!(sum, 15.0);
    }

    #[test]
    fn test_cruise_override_field_name() {
        let json = serde_json::to_string(&CruiseControl {
            override_: true,
            ..Default::default()
        })
        .unwrap();
        assert!(json.contains("\"override\":true"));
    }
}
