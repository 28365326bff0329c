//! Interfaces to the subsystems the control loop drives but does not own
//!
//! Every method is called from the control tick and must return within the
//! cycle budget. Sources that have nothing new report stale data through the
//! service health table instead of waiting.

use actuators::{CarControl, LateralDebug};
use car_state::{
    CycleInputs, LiveParameters, LongitudinalPlan, ModelOutputs, Service, VehicleSnapshot,
};

/// Per-cycle sampling of the vehicle and every subscribed service
pub trait TelemetrySource: Send {
    /// Inputs for control frame `frame`, never blocking
    fn sample(&mut self, frame: u64) -> CycleInputs;

    /// Whether an optional camera stream is being produced
    fn camera_available(&self, service: Service) -> bool;
}

/// The vehicle-specific bus interface
pub trait CarInterface: Send {
    /// Arm the interface for actuation, once controls are initialized
    fn initialize(&mut self);

    /// Queue this cycle's command for the bus
    fn send(&mut self, control: &CarControl);
}

/// Result of one lateral controller update
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LateralOutput {
    pub steer: f32,
    pub steering_angle_deg: f32,
    /// Curvature the controller is following after rate limiting (1/m)
    pub desired_curvature: f32,
    pub debug: LateralDebug,
}

/// Inputs to the lateral controller
#[derive(Debug, Clone, Copy)]
pub struct LateralRequest<'a> {
    pub active: bool,
    pub car: &'a VehicleSnapshot,
    pub live_parameters: &'a LiveParameters,
    pub model: &'a ModelOutputs,
    /// The car limited last cycle's command
    pub steer_limited: bool,
}

/// Lateral and longitudinal controllers
pub trait ControlLaw: Send {
    fn reset_lateral(&mut self);

    fn reset_longitudinal(&mut self, v_ego: f32);

    /// Acceleration command (m/s²)
    fn longitudinal(
        &mut self,
        active: bool,
        car: &VehicleSnapshot,
        plan: &LongitudinalPlan,
        v_cruise: f32,
    ) -> f32;

    fn lateral(&mut self, request: &LateralRequest<'_>) -> LateralOutput;
}

/// Owner of the cruise set speed
pub trait CruiseSpeed: Send {
    /// Track buttons and the vehicle cruise state every cycle
    fn update(&mut self, car: &VehicleSnapshot, enabled: bool, is_metric: bool);

    /// Seed the set speed on engagement
    fn initialize(&mut self, car: &VehicleSnapshot, experimental_mode: bool);

    fn initialized(&self) -> bool;

    /// Set speed used for control (km/h)
    fn v_cruise_kph(&self) -> f32;

    /// Set speed shown on the cluster (km/h)
    fn v_cruise_cluster_kph(&self) -> f32;
}

/// Steering geometry
pub trait VehicleModel: Send {
    fn update_params(&mut self, stiffness_factor: f32, steer_ratio: f32);

    /// Path curvature for a steering wheel angle (rad) at speed `v_ego` on a
    /// road with `roll` (1/m)
    fn curvature(&self, steering_angle_rad: f32, v_ego: f32, roll: f32) -> f32;
}

/// Everything the loop delegates to
pub struct Collaborators {
    pub telemetry: Box<dyn TelemetrySource>,
    pub car: Box<dyn CarInterface>,
    pub control: Box<dyn ControlLaw>,
    pub cruise: Box<dyn CruiseSpeed>,
    pub vehicle_model: Box<dyn VehicleModel>,
}
