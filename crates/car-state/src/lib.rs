//! Car State and Telemetry
//!
//! Read-only inputs to the supervisor. A [`CycleInputs`] value is produced
//! once per control cycle by the external sampling layer and never mutated
//! afterwards.

mod params;
mod services;
mod telemetry;
mod vehicle;

pub use params::{CarParams, LateralTuning, SafetyConfig, SafetyModel, SteerControlType};
pub use services::{Service, ServiceHealth, ServiceSet, ServiceStatus};
pub use telemetry::{
    ActuatorsOutput, CalibrationStatus, CycleInputs, DeviceState, DriverMonitoring, JoystickInput,
    LaneChangeDirection, LaneChangeState, LanePlan, LiveParameters, Localization, LongitudinalPlan,
    ModelOutputs, PeripheralState, ProcessState, SafetyChannel, Telemetry, ThermalStatus,
};
pub use vehicle::{ButtonEvent, ButtonType, CruiseState, GearShifter, VehicleSnapshot};

/// Unit conversions used across the workspace
pub mod units {
    pub const MPH_TO_MS: f32 = 0.447_04;
    pub const KPH_TO_MS: f32 = 1.0 / 3.6;
}
