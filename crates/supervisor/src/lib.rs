//! Engagement Supervisor
//!
//! Fixed-rate control loop that decides whether the driver-assistance
//! system may actuate. Each cycle it rebuilds the hazard event set, advances
//! the engagement state machine, sanitizes actuator commands, and publishes
//! the result. User parameters are refreshed by a separate task and handed
//! to the loop as immutable snapshots.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod params;
pub mod publish;
pub mod ratekeeper;
pub mod sim;

pub use collaborators::{
    CarInterface, Collaborators, ControlLaw, CruiseSpeed, LateralOutput, LateralRequest,
    TelemetrySource, VehicleModel,
};
pub use config::SupervisorConfig;
pub use error::{ParamsError, SupervisorError};
pub use logging::init_logging;
pub use orchestrator::{ControlLoop, LoopPhase};
pub use params::{
    FileParamStore, MemoryParamStore, ParamKey, ParamStore, ParamWriter, Personality, UserParams,
};
pub use publish::{ControlsState, OnroadEvents, Publisher, Subscriptions};
pub use ratekeeper::RateKeeper;
pub use sim::{nominal_inputs, SimHandle, SimulatedVehicle};
