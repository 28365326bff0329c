//! Offline simulated vehicle
//!
//! Implements every collaborator against one shared kinematic state so the
//! loop can run on a desk. The driver turns on the car's cruise control
//! after a configurable delay; the car then follows whatever the loop
//! commands.

use actuators::{CarControl, LateralDebug};
use car_state::{
    units::{KPH_TO_MS, MPH_TO_MS},
    ButtonType, CalibrationStatus, CarParams, CycleInputs, LongitudinalPlan, SafetyChannel,
    Service, ServiceHealth, VehicleSnapshot,
};
use onroad_events::EventName;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

use crate::collaborators::{
    CarInterface, Collaborators, ControlLaw, CruiseSpeed, LateralOutput, LateralRequest,
    TelemetrySource, VehicleModel,
};

const WHEELBASE_M: f32 = 2.7;
const STEER_RATIO: f32 = 15.0;
/// Understeer gradient of the kinematic model (s²/m²)
const SLIP_FACTOR: f32 = 0.0015;
const GRAVITY: f32 = 9.81;
/// Steering wheel angle mapped to a full torque command (deg)
const MAX_STEER_ANGLE_DEG: f32 = 90.0;
const ACCEL_MIN: f32 = -3.5;
const ACCEL_MAX: f32 = 2.0;
const SPEED_GAIN: f32 = 0.5;
/// Set speed while cruise has not been initialized (km/h)
const V_CRUISE_UNSET: f32 = 255.0;
const V_CRUISE_MIN_KPH: f32 = 40.0;

/// Inputs where every service arrived on `frame` and agrees with `car`
pub fn nominal_inputs(frame: u64, car: &CarParams) -> CycleInputs {
    let mut health = ServiceHealth::new(frame);
    for service in Service::ALL {
        health.update(service, |s| s.recv_frame = frame);
    }

    let mut inputs = CycleInputs::default();
    inputs.car.can_valid = true;
    inputs.telemetry.health = health;
    inputs.telemetry.calibration = CalibrationStatus::Calibrated;
    inputs.telemetry.live_parameters.steer_ratio = STEER_RATIO;
    inputs.telemetry.live_parameters.stiffness_factor = 1.0;
    inputs.telemetry.safety_channels = car
        .safety_configs
        .iter()
        .map(|config| SafetyChannel {
            safety_model: config.safety_model,
            safety_param: config.safety_param,
            alternative_experience: car.alternative_experience,
            ..Default::default()
        })
        .collect();
    inputs
}

#[derive(Debug, Default)]
struct SimState {
    v_ego: f32,
    a_ego: f32,
    steering_angle_deg: f32,
    armed: bool,
    cruise_enabled: bool,
    last_control: Option<CarControl>,
}

type Shared = Arc<Mutex<SimState>>;

fn lock(state: &Shared) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Read access to the simulated vehicle
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Shared,
}

impl SimHandle {
    pub fn v_ego(&self) -> f32 {
        lock(&self.state).v_ego
    }

    pub fn cruise_enabled(&self) -> bool {
        lock(&self.state).cruise_enabled
    }

    /// Last command accepted by the simulated car
    pub fn last_control(&self) -> Option<CarControl> {
        lock(&self.state).last_control
    }
}

/// Builder for a simulated vehicle
#[derive(Debug, Clone)]
pub struct SimulatedVehicle {
    car: CarParams,
    tick: Duration,
    initial_speed: f32,
    engage_after: Duration,
}

impl SimulatedVehicle {
    pub fn new(car: CarParams, tick: Duration) -> Self {
        Self {
            car,
            tick,
            initial_speed: 20.0,
            engage_after: Duration::from_secs(3),
        }
    }

    pub fn initial_speed(mut self, v_ego: f32) -> Self {
        self.initial_speed = v_ego;
        self
    }

    /// When the simulated driver switches cruise on
    pub fn engage_after(mut self, delay: Duration) -> Self {
        self.engage_after = delay;
        self
    }

    pub fn build(self) -> (Collaborators, SimHandle) {
        let state = Arc::new(Mutex::new(SimState {
            v_ego: self.initial_speed,
            ..Default::default()
        }));
        let tick = self.tick.as_secs_f64().max(f64::EPSILON);
        let engage_frame = (self.engage_after.as_secs_f64() / tick).round() as u64;

        info!(
            car = %self.car.car_name,
            v_ego = self.initial_speed,
            engage_frame,
            "Simulated vehicle ready"
        );

        let collaborators = Collaborators {
            telemetry: Box::new(SimTelemetry {
                state: state.clone(),
                car: self.car.clone(),
                dt: self.tick.as_secs_f32(),
                engage_frame: engage_frame.max(1),
            }),
            car: Box::new(SimCar {
                state: state.clone(),
            }),
            control: Box::new(SimControlLaw::default()),
            cruise: Box::new(SimCruise::new(self.car.pcm_cruise)),
            vehicle_model: Box::new(KinematicModel::new()),
        };
        (collaborators, SimHandle { state })
    }
}

struct SimTelemetry {
    state: Shared,
    car: CarParams,
    dt: f32,
    engage_frame: u64,
}

impl SimTelemetry {
    fn advance(&self, state: &mut SimState) {
        let Some(control) = state.last_control else {
            return;
        };
        if control.long_active {
            state.a_ego = control.actuators.accel;
            state.v_ego = (state.v_ego + state.a_ego * self.dt).max(0.0);
        } else {
            state.a_ego = 0.0;
        }
        if control.lat_active {
            state.steering_angle_deg = control.actuators.steering_angle_deg;
        }
        if control.cruise_control.cancel {
            state.cruise_enabled = false;
        }
    }
}

impl TelemetrySource for SimTelemetry {
    fn sample(&mut self, frame: u64) -> CycleInputs {
        let mut state = lock(&self.state);
        self.advance(&mut state);

        let mut events = Vec::new();
        if frame == self.engage_frame && state.armed {
            state.cruise_enabled = true;
            events.push(if self.car.pcm_cruise {
                EventName::PcmEnable
            } else {
                EventName::ButtonEnable
            });
        }

        let mut inputs = nominal_inputs(frame, &self.car);
        inputs.car = VehicleSnapshot {
            can_valid: true,
            v_ego: state.v_ego,
            a_ego: state.a_ego,
            standstill: state.v_ego < 0.01,
            steering_angle_deg: state.steering_angle_deg,
            events,
            ..Default::default()
        };
        inputs.car.cruise_state.available = true;
        // without stock cruise the car reports it off and follows our commands
        inputs.car.cruise_state.enabled = state.cruise_enabled && self.car.pcm_cruise;
        inputs.car.cruise_state.speed = state.v_ego;

        for channel in &mut inputs.telemetry.safety_channels {
            channel.controls_allowed = state.cruise_enabled;
        }
        if let Some(control) = state.last_control {
            inputs.telemetry.car_output.steer = control.actuators.steer;
            inputs.telemetry.car_output.steering_angle_deg = control.actuators.steering_angle_deg;
        }
        inputs.telemetry.longitudinal_plan = LongitudinalPlan {
            final_speed: Some(state.v_ego),
            ..Default::default()
        };
        inputs
    }

    fn camera_available(&self, _service: Service) -> bool {
        true
    }
}

struct SimCar {
    state: Shared,
}

impl CarInterface for SimCar {
    fn initialize(&mut self) {
        lock(&self.state).armed = true;
    }

    fn send(&mut self, control: &CarControl) {
        lock(&self.state).last_control = Some(*control);
    }
}

/// Proportional speed control and direct curvature-to-angle steering
#[derive(Debug, Default)]
struct SimControlLaw {
    steering_angle_deg: f32,
}

impl ControlLaw for SimControlLaw {
    fn reset_lateral(&mut self) {
        self.steering_angle_deg = 0.0;
    }

    fn reset_longitudinal(&mut self, _v_ego: f32) {}

    fn longitudinal(
        &mut self,
        active: bool,
        car: &VehicleSnapshot,
        _plan: &LongitudinalPlan,
        v_cruise: f32,
    ) -> f32 {
        if !active {
            return 0.0;
        }
        (SPEED_GAIN * (v_cruise - car.v_ego)).clamp(ACCEL_MIN, ACCEL_MAX)
    }

    fn lateral(&mut self, request: &LateralRequest<'_>) -> LateralOutput {
        let desired_curvature = request.model.desired_curvature;
        if !request.active {
            return LateralOutput {
                desired_curvature,
                ..Default::default()
            };
        }

        let steer_ratio = request.live_parameters.steer_ratio.max(0.1);
        self.steering_angle_deg = (desired_curvature * WHEELBASE_M * steer_ratio).to_degrees();
        let steer = (self.steering_angle_deg / MAX_STEER_ANGLE_DEG).clamp(-1.0, 1.0);
        let v_ego = request.car.v_ego;

        LateralOutput {
            steer,
            steering_angle_deg: self.steering_angle_deg,
            desired_curvature,
            debug: LateralDebug {
                active: true,
                saturated: steer.abs() >= 1.0,
                steering_angle_deg: self.steering_angle_deg,
                output: steer,
                desired_lateral_accel: desired_curvature * v_ego * v_ego,
                actual_lateral_accel: 0.0,
            },
        }
    }
}

/// Set speed follows the car's cruise when it owns the speed, buttons otherwise
#[derive(Debug)]
struct SimCruise {
    pcm_cruise: bool,
    v_cruise_kph: f32,
}

impl SimCruise {
    fn new(pcm_cruise: bool) -> Self {
        Self {
            pcm_cruise,
            v_cruise_kph: V_CRUISE_UNSET,
        }
    }
}

impl CruiseSpeed for SimCruise {
    fn update(&mut self, car: &VehicleSnapshot, enabled: bool, is_metric: bool) {
        if self.pcm_cruise {
            if car.cruise_state.available {
                self.v_cruise_kph = car.cruise_state.speed / KPH_TO_MS;
            }
            return;
        }
        if !enabled || !self.initialized() {
            return;
        }

        let step_kph = if is_metric { 1.0 } else { MPH_TO_MS / KPH_TO_MS };
        for event in car.button_events.iter().filter(|e| !e.pressed) {
            match event.button {
                ButtonType::AccelCruise => self.v_cruise_kph += step_kph,
                ButtonType::DecelCruise => self.v_cruise_kph -= step_kph,
                _ => {}
            }
        }
        self.v_cruise_kph = self.v_cruise_kph.max(V_CRUISE_MIN_KPH);
    }

    fn initialize(&mut self, car: &VehicleSnapshot, _experimental_mode: bool) {
        if !self.pcm_cruise {
            self.v_cruise_kph = (car.v_ego / KPH_TO_MS).round().max(V_CRUISE_MIN_KPH);
        }
    }

    fn initialized(&self) -> bool {
        self.v_cruise_kph != V_CRUISE_UNSET
    }

    fn v_cruise_kph(&self) -> f32 {
        self.v_cruise_kph
    }

    fn v_cruise_cluster_kph(&self) -> f32 {
        self.v_cruise_kph
    }
}

/// Single-track model with a speed-dependent understeer term
#[derive(Debug)]
struct KinematicModel {
    stiffness_factor: f32,
    steer_ratio: f32,
}

impl KinematicModel {
    fn new() -> Self {
        Self {
            stiffness_factor: 1.0,
            steer_ratio: STEER_RATIO,
        }
    }

    fn curvature_factor(&self, v_ego: f32) -> f32 {
        let slip = SLIP_FACTOR / self.stiffness_factor;
        1.0 / (1.0 + slip * v_ego * v_ego) / WHEELBASE_M
    }
}

impl VehicleModel for KinematicModel {
    fn update_params(&mut self, stiffness_factor: f32, steer_ratio: f32) {
        self.stiffness_factor = stiffness_factor;
        self.steer_ratio = steer_ratio;
    }

    fn curvature(&self, steering_angle_rad: f32, v_ego: f32, roll: f32) -> f32 {
        let slip = SLIP_FACTOR / self.stiffness_factor;
        let roll_compensation = -GRAVITY * roll / (1.0 / slip + v_ego * v_ego);
        self.curvature_factor(v_ego) * steering_angle_rad / self.steer_ratio - roll_compensation
    }
}
