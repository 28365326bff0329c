//! Supervisor configuration
//!
//! Loaded once at startup from an optional TOML file, then overridden by
//! `SUPERVISOR__*` environment variables (`SUPERVISOR__RUN_MODE=simulation`,
//! `SUPERVISOR__CAR__PASSIVE=true`). Every field has a default so an empty
//! configuration runs a 100 Hz live loop.

use car_state::CarParams;
use config::{Config, Environment, File};
use hazards::{CycleThresholds, HazardConfig, RunMode};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SupervisorError;

/// Runtime configuration of the control loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Control loop rate
    #[serde(default = "default_tick_hz")]
    pub tick_hz: f64,

    /// Period of the user parameter refresh task
    #[serde(default = "default_params_refresh_ms")]
    pub params_refresh_ms: u64,

    #[serde(default)]
    pub run_mode: RunMode,

    /// Directory holding one file per user parameter
    #[serde(default = "default_params_dir")]
    pub params_dir: PathBuf,

    #[serde(default)]
    pub disengage_on_accelerator: bool,

    /// Lane departure warning while lateral control is off
    #[serde(default)]
    pub ldw_enabled: bool,

    #[serde(default)]
    pub increase_thermal_limits: bool,

    #[serde(default)]
    pub loud_blindspot_alert: bool,

    /// Narrowest adjacent lane that still permits a lane change (m)
    #[serde(default = "default_lane_detection_width_m")]
    pub lane_detection_width_m: f32,

    /// Background processes whose absence is not a fault
    #[serde(default = "default_ignored_processes")]
    pub ignored_processes: Vec<String>,

    #[serde(default = "default_true")]
    pub sounds_available: bool,

    #[serde(default)]
    pub tested_branch: bool,

    /// Serve Prometheus metrics on this address when set
    #[serde(default)]
    pub metrics_listen: Option<SocketAddr>,

    #[serde(default)]
    pub car: CarParams,
}

fn default_tick_hz() -> f64 {
    100.0
}

fn default_params_refresh_ms() -> u64 {
    100
}

fn default_params_dir() -> PathBuf {
    PathBuf::from("params")
}

fn default_lane_detection_width_m() -> f32 {
    2.5
}

fn default_ignored_processes() -> Vec<String> {
    ["loggerd", "encoderd", "statsd"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_true() -> bool {
    true
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            params_refresh_ms: default_params_refresh_ms(),
            run_mode: RunMode::default(),
            params_dir: default_params_dir(),
            disengage_on_accelerator: false,
            ldw_enabled: false,
            increase_thermal_limits: false,
            loud_blindspot_alert: false,
            lane_detection_width_m: default_lane_detection_width_m(),
            ignored_processes: default_ignored_processes(),
            sounds_available: true,
            tested_branch: false,
            metrics_listen: None,
            car: CarParams::default(),
        }
    }
}

impl SupervisorConfig {
    /// Load from `path` (if given and present) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, SupervisorError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config = builder
            .add_source(Environment::with_prefix("SUPERVISOR").separator("__"))
            .build()?
            .try_deserialize::<SupervisorConfig>()?;

        config.tick()?;
        Ok(config)
    }

    /// Control loop period
    pub fn tick(&self) -> Result<Duration, SupervisorError> {
        let invalid = || SupervisorError::InvalidTickRate(self.tick_hz);
        if !self.tick_hz.is_finite() || self.tick_hz <= 0.0 {
            return Err(invalid());
        }
        match Duration::try_from_secs_f64(1.0 / self.tick_hz) {
            Ok(tick) if !tick.is_zero() => Ok(tick),
            _ => Err(invalid()),
        }
    }

    pub fn params_refresh(&self) -> Duration {
        Duration::from_millis(self.params_refresh_ms.max(1))
    }

    /// Cycle counts for every timed rule at the configured rate
    pub fn thresholds(&self) -> Result<CycleThresholds, SupervisorError> {
        Ok(CycleThresholds::from_tick(self.tick()?)?)
    }

    pub fn hazard_config(&self) -> Result<HazardConfig, SupervisorError> {
        Ok(HazardConfig {
            car: self.car.clone(),
            run_mode: self.run_mode,
            thresholds: self.thresholds()?,
            disengage_on_accelerator: self.disengage_on_accelerator,
            increase_thermal_limits: self.increase_thermal_limits,
            loud_blindspot_alert: self.loud_blindspot_alert,
            lane_detection_width: self.lane_detection_width_m,
            ignored_processes: self.ignored_processes.clone(),
            sounds_available: self.sounds_available,
            tested_branch: self.tested_branch,
        })
    }
}
