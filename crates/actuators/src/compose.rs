//! Composition of the vehicle command from engagement state
//!
//! Rules for which axes may actuate, what the cruise buttons should request,
//! and which dashboard hints to show. Stateful monitors keep the frame of the
//! last blinker or steering input they saw.

use car_state::{
    units::MPH_TO_MS, ActuatorsOutput, CarParams, LaneChangeDirection, LaneChangeState,
    LateralTuning, ModelOutputs, SteerControlType, VehicleSnapshot,
};
use onroad_events::{EventCategory, EventSet};

use crate::command::{Actuators, CruiseControl, HudControl, LateralDebug};

/// Angle error above which an angle-controlled car is considered limited (deg)
pub const STEER_ANGLE_SATURATION_THRESHOLD: f32 = 2.5;

/// Below this speed the car is treated as stopped for lateral control (m/s)
const MIN_LATERAL_CONTROL_SPEED: f32 = 0.3;
const LDW_MIN_SPEED: f32 = 31.0 * MPH_TO_MS;
const LANE_DEPARTURE_THRESHOLD: f32 = 0.1;
const LANE_LINE_VISIBLE_PROB: f32 = 0.5;
/// Lane line lateral distance that counts as close (m)
const LANE_LINE_CLOSE_M: f32 = 1.08;
const CAMERA_OFFSET: f32 = 0.04;
/// Lowest planned end speed that warrants resuming from standstill (m/s)
const RESUME_MIN_SPEED: f32 = 0.1;
/// Torque controller saturation heuristics
const UNDERSHOOT_RATIO: f32 = 1.2;
const TURNING_LATERAL_ACCEL: f32 = 1.0;
const SATURATION_MIN_SPEED: f32 = 5.0;
const MAX_TORQUE: f32 = 0.99;
/// Predicted path offset that means the car is not following it (m)
const PATH_DEVIATION_M: f32 = 0.20;

/// What decides which axes may actuate
#[derive(Debug, Clone, Copy)]
pub struct GateInputs<'a> {
    pub car: &'a VehicleSnapshot,
    pub params: &'a CarParams,
    pub events: &'a EventSet,
    pub enabled: bool,
    pub active: bool,
    pub joystick_mode: bool,
}

/// Which controllers run this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActuatorGates {
    pub lat_active: bool,
    pub long_active: bool,
}

impl ActuatorGates {
    pub fn compute(inputs: &GateInputs<'_>) -> Self {
        let car = inputs.car;
        let standstill = car.v_ego
            <= inputs.params.min_steer_speed.max(MIN_LATERAL_CONTROL_SPEED)
            || car.standstill;

        let lat_active = inputs.active
            && !car.steer_fault_temporary
            && !car.steer_fault_permanent
            && (!standstill || inputs.joystick_mode);
        let long_active = inputs.enabled
            && !inputs.events.has(EventCategory::OverrideLongitudinal)
            && inputs.params.openpilot_longitudinal_control;

        Self {
            lat_active,
            long_active,
        }
    }
}

/// Actuators driven directly from the debug joystick axes
pub fn joystick_actuators(
    axes: [f32; 2],
    gates: ActuatorGates,
    active: bool,
    car: &VehicleSnapshot,
) -> (Actuators, LateralDebug) {
    let mut actuators = Actuators::default();

    if gates.long_active {
        actuators.accel = 4.0 * axes[0].clamp(-1.0, 1.0);
    }
    if gates.lat_active {
        let steer = axes[1].clamp(-1.0, 1.0);
        // 90 degrees for angle cars, 0.02 1/m curvature at full deflection
        actuators.steer = steer;
        actuators.steering_angle_deg = steer * 90.0;
        actuators.curvature = steer * -0.02;
    }

    let debug = LateralDebug {
        active,
        saturated: actuators.steer.abs() >= 0.9,
        steering_angle_deg: car.steering_angle_deg,
        output: actuators.steer,
        ..Default::default()
    };
    (actuators, debug)
}

/// Cruise button requests for this cycle
pub fn cruise_control(
    car: &VehicleSnapshot,
    params: &CarParams,
    enabled: bool,
    gates: ActuatorGates,
    final_planned_speed: Option<f32>,
    joystick_cancel: bool,
) -> CruiseControl {
    let override_ =
        enabled && !gates.long_active && params.openpilot_longitudinal_control;
    let cancel = (car.cruise_state.enabled && (!enabled || !params.pcm_cruise)) || joystick_cancel;
    let resume = final_planned_speed
        .map(|speed| enabled && car.cruise_state.standstill && speed > RESUME_MIN_SPEED)
        .unwrap_or(false);

    CruiseControl {
        override_,
        cancel,
        resume,
    }
}

/// Inputs for the dashboard hints
#[derive(Debug, Clone, Copy)]
pub struct HudInputs {
    /// Set speed shown on the cluster (km/h)
    pub v_cruise_cluster_kph: f32,
    pub enabled: bool,
    pub has_lead: bool,
    /// Following distance personality, 0 is the closest
    pub personality: u8,
}

impl HudInputs {
    pub fn compose(&self) -> HudControl {
        HudControl {
            set_speed: self.v_cruise_cluster_kph * car_state::units::KPH_TO_MS,
            speed_visible: self.enabled,
            lanes_visible: self.enabled,
            lead_visible: self.has_lead,
            lead_distance_bars: self.personality + 1,
            left_lane_visible: true,
            right_lane_visible: true,
            left_lane_depart: false,
            right_lane_depart: false,
        }
    }
}

/// Blinkers follow the model's lane change direction while one is underway
pub fn lane_change_blinkers(model: &ModelOutputs) -> Option<(bool, bool)> {
    if model.lane_change_state == LaneChangeState::Off {
        return None;
    }
    Some((
        model.lane_change_direction == LaneChangeDirection::Left,
        model.lane_change_direction == LaneChangeDirection::Right,
    ))
}

/// Lane departure warning while lateral control is off
#[derive(Debug, Clone)]
pub struct LaneDepartureMonitor {
    enabled: bool,
    cooldown: u64,
    last_blinker_frame: u64,
}

impl LaneDepartureMonitor {
    /// `cooldown` is the number of frames after a blinker during which no
    /// warning is raised
    pub fn new(enabled: bool, cooldown: u64) -> Self {
        Self {
            enabled,
            cooldown,
            last_blinker_frame: 0,
        }
    }

    /// Record blinker use for this frame
    pub fn observe(&mut self, frame: u64, car: &VehicleSnapshot) {
        if car.left_blinker || car.right_blinker {
            self.last_blinker_frame = frame;
        }
    }

    /// Set lane departure flags on `hud`, returning true if either side departs
    pub fn update(
        &self,
        frame: u64,
        car: &VehicleSnapshot,
        lat_active: bool,
        calibrated: bool,
        model: &ModelOutputs,
        hud: &mut HudControl,
    ) -> bool {
        let recent_blinker = frame.saturating_sub(self.last_blinker_frame) < self.cooldown;
        let allowed =
            self.enabled && car.v_ego > LDW_MIN_SPEED && !recent_blinker && !lat_active && calibrated;

        if allowed {
            let left_visible = model.lane_line_probs[1] > LANE_LINE_VISIBLE_PROB;
            let right_visible = model.lane_line_probs[2] > LANE_LINE_VISIBLE_PROB;
            let left_close =
                left_visible && model.lane_line_y0[1] > -(LANE_LINE_CLOSE_M + CAMERA_OFFSET);
            let right_close =
                right_visible && model.lane_line_y0[2] < LANE_LINE_CLOSE_M - CAMERA_OFFSET;

            hud.left_lane_depart =
                model.lane_change_left_prob > LANE_DEPARTURE_THRESHOLD && left_close;
            hud.right_lane_depart =
                model.lane_change_right_prob > LANE_DEPARTURE_THRESHOLD && right_close;
        }

        hud.left_lane_depart || hud.right_lane_depart
    }
}

/// Warns when the lateral controller cannot hold the requested path
#[derive(Debug, Clone)]
pub struct SaturationMonitor {
    cooldown: u64,
    last_steering_pressed_frame: u64,
}

impl SaturationMonitor {
    /// `cooldown` is the number of frames after driver steering input during
    /// which saturation is not reported
    pub fn new(cooldown: u64) -> Self {
        Self {
            cooldown,
            last_steering_pressed_frame: 0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        frame: u64,
        car: &VehicleSnapshot,
        params: &CarParams,
        joystick_mode: bool,
        lateral: &LateralDebug,
        actuators: &Actuators,
        path_y0: Option<f32>,
    ) -> bool {
        if car.steering_pressed {
            self.last_steering_pressed_frame = frame;
        }
        let recent_steer_pressed =
            frame.saturating_sub(self.last_steering_pressed_frame) < self.cooldown;

        if !lateral.active || recent_steer_pressed || params.not_car {
            return false;
        }

        if params.lateral_tuning == LateralTuning::Torque && !joystick_mode {
            let desired = lateral.desired_lateral_accel.abs();
            let undershooting = desired / (1e-3 + lateral.actual_lateral_accel.abs()) > UNDERSHOOT_RATIO;
            let turning = desired > TURNING_LATERAL_ACCEL;
            let good_speed = car.v_ego > SATURATION_MIN_SPEED;
            let max_torque = actuators.steer.abs() > MAX_TORQUE;
            undershooting && turning && good_speed && max_torque
        } else if lateral.saturated {
            let Some(y0) = path_y0 else {
                return false;
            };
            let steering = match params.steer_control_type {
                SteerControlType::Angle => actuators.steering_angle_deg,
                SteerControlType::Torque => actuators.steer,
            };
            let left_deviation = steering > 0.0 && y0 < -PATH_DEVIATION_M;
            let right_deviation = steering < 0.0 && y0 > PATH_DEVIATION_M;
            left_deviation || right_deviation
        } else {
            false
        }
    }
}

/// The vehicle interface sent something other than what was commanded
pub fn steer_limited(params: &CarParams, commanded: &Actuators, output: &ActuatorsOutput) -> bool {
    match params.steer_control_type {
        SteerControlType::Angle => {
            (commanded.steering_angle_deg - output.steering_angle_deg).abs()
                > STEER_ANGLE_SATURATION_THRESHOLD
        }
        SteerControlType::Torque => (commanded.steer - output.steer).abs() > 1e-2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onroad_events::EventName;

    fn gates(
        car: &VehicleSnapshot,
        params: &CarParams,
        events: &EventSet,
        enabled: bool,
        active: bool,
    ) -> ActuatorGates {
        ActuatorGates::compute(&GateInputs {
            car,
            params,
            events,
            enabled,
            active,
            joystick_mode: false,
        })
    }

    fn moving() -> VehicleSnapshot {
        VehicleSnapshot {
            v_ego: 20.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_lateral_needs_active_and_no_fault() {
        let params = CarParams::default();
        let events = EventSet::new();
        let mut car = moving();

        assert!(gates(&car, &params, &events, true, true).lat_active);
        assert!(!gates(&car, &params, &events, true, false).lat_active);

        car.steer_fault_temporary = true;
        assert!(!gates(&car, &params, &events, true, true).lat_active);
    }

    #[test]
    fn test_lateral_off_at_standstill_unless_joystick() {
        let params = CarParams::default();
        let events = EventSet::new();
        let car = VehicleSnapshot {
            v_ego: 0.2,
            ..Default::default()
        };
        assert!(!gates(&car, &params, &events, true, true).lat_active);

        let gates = ActuatorGates::compute(&GateInputs {
            car: &car,
            params: &params,
            events: &events,
            enabled: true,
            active: true,
            joystick_mode: true,
        });
        assert!(gates.lat_active);
    }

    #[test]
    fn test_longitudinal_gating() {
        let car = moving();
        let mut params = CarParams::default();
        let events = EventSet::new();
        assert!(!gates(&car, &params, &events, true, true).long_active);

        params.openpilot_longitudinal_control = true;
        assert!(gates(&car, &params, &events, true, true).long_active);

        let overriding: EventSet = [EventName::GasPressedOverride].into_iter().collect();
        assert!(!gates(&car, &params, &overriding, true, true).long_active);
    }

    #[test]
    fn test_joystick_actuators() {
        let car = moving();
        let gates = ActuatorGates {
            lat_active: true,
            long_active: true,
        };
        let (actuators, debug) = joystick_actuators([0.5, -2.0], gates, true, &car);
        assert_eq!(actuators.accel, 2.0);
        assert_eq!(actuators.steer, -1.0);
        assert_eq!(actuators.steering_angle_deg, -90.0);
        assert_eq!(actuators.curvature, 0.02);
        assert!(debug.saturated);

        let (actuators, _) = joystick_actuators([0.5, 0.5], ActuatorGates::default(), false, &car);
        assert_eq!(actuators, Actuators::default());
    }

    #[test]
    fn test_cruise_cancel_when_not_engaged() {
        let mut car = moving();
        car.cruise_state.enabled = true;
        let params = CarParams::default();

        let cc = cruise_control(&car, &params, false, ActuatorGates::default(), None, false);
        assert!(cc.cancel);

        let cc = cruise_control(&car, &params, true, ActuatorGates::default(), None, false);
        assert!(!cc.cancel);

        let cc = cruise_control(&moving(), &params, true, ActuatorGates::default(), None, true);
        assert!(cc.cancel);
    }

    #[test]
    fn test_cruise_resume_and_override() {
        let mut car = VehicleSnapshot::default();
        car.cruise_state.standstill = true;
        let params = CarParams {
            openpilot_longitudinal_control: true,
            ..Default::default()
        };

        let cc = cruise_control(&car, &params, true, ActuatorGates::default(), Some(1.0), false);
        assert!(cc.resume);
        assert!(cc.override_);

        let cc = cruise_control(&car, &params, true, ActuatorGates::default(), Some(0.0), false);
        assert!(!cc.resume);
        let cc = cruise_control(&car, &params, true, ActuatorGates::default(), None, false);
        assert!(!cc.resume);
    }

    #[test]
    fn test_hud() {
        let hud = HudInputs {
            v_cruise_cluster_kph: 36.0,
            enabled: true,
            has_lead: true,
            personality: 1,
        }
        .compose();
        assert!((hud.set_speed - 10.0).abs() < 1e-4);
        assert!(hud.speed_visible);
        assert!(hud.lead_visible);
        assert_eq!(hud.lead_distance_bars, 2);
    }

    #[test]
    fn test_lane_change_blinkers() {
        let mut model = ModelOutputs::default();
        assert_eq!(lane_change_blinkers(&model), None);

        model.lane_change_state = LaneChangeState::LaneChangeStarting;
        model.lane_change_direction = LaneChangeDirection::Right;
        assert_eq!(lane_change_blinkers(&model), Some((false, true)));
    }

    fn departing_left() -> ModelOutputs {
        ModelOutputs {
            lane_line_probs: [0.0, 0.9, 0.9, 0.0],
            lane_line_y0: [-5.0, -1.0, 2.0, 5.0],
            lane_change_left_prob: 0.3,
            ..Default::default()
        }
    }

    #[test]
    fn test_lane_departure_warning() {
        let monitor = LaneDepartureMonitor::new(true, 500);
        let car = moving();
        let model = departing_left();

        let mut hud = HudControl::default();
        assert!(monitor.update(600, &car, false, true, &model, &mut hud));
        assert!(hud.left_lane_depart);
        assert!(!hud.right_lane_depart);

        let mut hud = HudControl::default();
        assert!(!monitor.update(600, &car, true, true, &model, &mut hud));
        let mut hud = HudControl::default();
        assert!(!monitor.update(600, &car, false, false, &model, &mut hud));
    }

    #[test]
    fn test_lane_departure_muted_after_blinker() {
        let mut monitor = LaneDepartureMonitor::new(true, 500);
        let mut car = moving();
        car.left_blinker = true;
        monitor.observe(1000, &car);
        car.left_blinker = false;

        let mut hud = HudControl::default();
        assert!(!monitor.update(1400, &car, false, true, &departing_left(), &mut hud));
        assert!(monitor.update(1500, &car, false, true, &departing_left(), &mut hud));
    }

    #[test]
    fn test_lane_departure_disabled_or_slow() {
        let monitor = LaneDepartureMonitor::new(false, 500);
        let mut hud = HudControl::default();
        assert!(!monitor.update(600, &moving(), false, true, &departing_left(), &mut hud));

        let monitor = LaneDepartureMonitor::new(true, 500);
        let slow = VehicleSnapshot {
            v_ego: 10.0,
            ..Default::default()
        };
        assert!(!monitor.update(600, &slow, false, true, &departing_left(), &mut hud));
    }

    #[test]
    fn test_torque_saturation() {
        let mut monitor = SaturationMonitor::new(200);
        let params = CarParams::default();
        let car = moving();
        let lateral = LateralDebug {
            active: true,
            desired_lateral_accel: 2.0,
            actual_lateral_accel: 1.0,
            ..Default::default()
        };
        let actuators = Actuators {
            steer: 1.0,
            ..Default::default()
        };

        assert!(monitor.update(500, &car, &params, false, &lateral, &actuators, None));

        let mut pressed = car.clone();
        pressed.steering_pressed = true;
        monitor.update(600, &pressed, &params, false, &lateral, &actuators, None);
        assert!(!monitor.update(700, &car, &params, false, &lateral, &actuators, None));
        assert!(monitor.update(800, &car, &params, false, &lateral, &actuators, None));
    }

    #[test]
    fn test_path_deviation_saturation() {
        let mut monitor = SaturationMonitor::new(200);
        let params = CarParams {
            lateral_tuning: LateralTuning::Pid,
            ..Default::default()
        };
        let car = moving();
        let lateral = LateralDebug {
            active: true,
            saturated: true,
            ..Default::default()
        };
        let actuators = Actuators {
            steer: 0.5,
            ..Default::default()
        };

        assert!(monitor.update(500, &car, &params, false, &lateral, &actuators, Some(-0.3)));
        assert!(!monitor.update(500, &car, &params, false, &lateral, &actuators, Some(0.3)));
        assert!(!monitor.update(500, &car, &params, false, &lateral, &actuators, None));
    }

    #[test]
    fn test_steer_limited() {
        let mut params = CarParams::default();
        let commanded = Actuators {
            steer: 0.5,
            steering_angle_deg: 10.0,
            ..Default::default()
        };
        let output = ActuatorsOutput {
            steer: 0.495,
            steering_angle_deg: 6.0,
        };
        assert!(!steer_limited(&params, &commanded, &output));

        params.steer_control_type = SteerControlType::Angle;
        assert!(steer_limited(&params, &commanded, &output));
    }
}
