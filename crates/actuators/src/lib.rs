//! Actuator Commands
//!
//! Types sent to the vehicle interface every cycle, the sanitation pass that
//! keeps non-finite values off the bus, and the composition rules that turn
//! the engagement state into lateral/longitudinal gating, cruise buttons,
//! and dashboard hints.

mod command;
mod compose;
mod sanitizer;

pub use command::{Actuators, CarControl, CruiseControl, HudControl, LateralDebug};
pub use compose::{
    cruise_control, joystick_actuators, lane_change_blinkers, steer_limited, ActuatorGates,
    GateInputs, HudInputs, LaneDepartureMonitor, SaturationMonitor,
    STEER_ANGLE_SATURATION_THRESHOLD,
};
pub use sanitizer::{ActuatorSanitizer, NonFiniteField};
