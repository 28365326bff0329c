//! Per-cycle event aggregation

use car_state::{
    ButtonType, CalibrationStatus, CarParams, CycleInputs, LaneChangeDirection, LaneChangeState,
    Service, ServiceSet, ThermalStatus, VehicleSnapshot,
};
use onroad_events::{EventName, EventSet};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::health::CommIssueDetail;
use crate::mode::RunMode;
use crate::thresholds::CycleThresholds;

/// Minimum free disk space before engagement is blocked (%)
const MIN_FREE_SPACE_PERCENT: f32 = 7.0;
/// Memory usage that soft-disables (%)
const MAX_MEMORY_USAGE_PERCENT: f32 = 90.0;
/// Fan counts as stalled below this speed
const MIN_FAN_RPM: u16 = 500;
/// Fan is only expected to spin above this duty
const FAN_DUTY_EXPECTED_PERCENT: f32 = 50.0;
/// Deceleration that means the stock system is already braking (m/s²)
const STOCK_BRAKING_ACCEL: f32 = -1.25;
/// Distance driven without a fix before reporting missing GPS (m)
const NO_GPS_DISTANCE_M: f32 = 1000.0;
/// Model frame drops that mean it is falling behind (%)
const MAX_MODEL_FRAME_DROP_PERCENT: f32 = 20.0;

/// Camera driver faults reported through the kernel log
const CAMERA_LOG_ERRORS: [&str; 4] = [
    "ERROR_CRC",
    "ERROR_ECC",
    "ERROR_STREAM_UNDERFLOW",
    "APPLY FAILED",
];

/// Static configuration for the aggregator
#[derive(Debug, Clone)]
pub struct HazardConfig {
    pub car: CarParams,
    pub run_mode: RunMode,
    pub thresholds: CycleThresholds,
    /// Rising edge of the accelerator disengages
    pub disengage_on_accelerator: bool,
    /// Tolerate the red thermal band
    pub increase_thermal_limits: bool,
    /// Use the audible variant of the blocked lane change warning
    pub loud_blindspot_alert: bool,
    /// Narrowest adjacent lane that still permits a lane change (m)
    pub lane_detection_width: f32,
    /// Processes whose absence is not a fault
    pub ignored_processes: Vec<String>,
    /// A sound device was found at startup
    pub sounds_available: bool,
    /// Running a tested release branch
    pub tested_branch: bool,
}

impl Default for HazardConfig {
    fn default() -> Self {
        Self {
            car: CarParams::default(),
            run_mode: RunMode::default(),
            thresholds: CycleThresholds::default(),
            disengage_on_accelerator: false,
            increase_thermal_limits: false,
            loud_blindspot_alert: false,
            lane_detection_width: 2.5,
            ignored_processes: vec![
                "loggerd".to_string(),
                "encoderd".to_string(),
                "statsd".to_string(),
            ],
            sounds_available: true,
            tested_branch: false,
        }
    }
}

/// Mismatch counters maintained by the engagement layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MismatchCounts {
    /// Cycles engaged while a safety channel blocks actuation
    pub panda: u32,
    /// Cycles the vehicle cruise is engaged without us
    pub cruise: u32,
}

/// Everything the aggregator reads for one cycle
#[derive(Debug, Clone, Copy)]
pub struct CycleContext<'a> {
    pub inputs: &'a CycleInputs,
    /// Vehicle snapshot of the previous cycle, for edge detection
    pub car_prev: &'a VehicleSnapshot,
    pub initialized: bool,
    pub enabled: bool,
    /// The rate keeper reports the loop is behind schedule
    pub lagging: bool,
    pub joystick_mode: bool,
    /// The cruise set speed has been initialized this drive
    pub v_cruise_initialized: bool,
    pub mismatch: MismatchCounts,
}

/// Alerts persisted for display while parked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffroadAlert {
    Recalibration,
    CarUnrecognized,
    NoFirmware,
}

impl OffroadAlert {
    /// Parameter key the alert is stored under
    pub fn key(self) -> &'static str {
        match self {
            OffroadAlert::Recalibration => "Offroad_Recalibration",
            OffroadAlert::CarUnrecognized => "Offroad_CarUnrecognized",
            OffroadAlert::NoFirmware => "Offroad_NoFirmware",
        }
    }
}

/// Builds the event set of every cycle
pub struct HazardAggregator {
    pub(crate) config: HazardConfig,
    static_events: Vec<EventName>,
    startup_event: Option<EventName>,
    pub(crate) ignore_alive: ServiceSet,
    pub(crate) ignore_freq: ServiceSet,
    pub(crate) ignore_valid: ServiceSet,
    last_functional_fan_frame: u64,
    recalibrating_seen: bool,
    pub(crate) not_running_prev: Option<BTreeSet<String>>,
    pub(crate) logged_comm_issue: Option<CommIssueDetail>,
    distance_traveled: f32,
    offroad_alerts: Vec<OffroadAlert>,
}

impl HazardAggregator {
    pub fn new(config: HazardConfig) -> Self {
        let car = &config.car;

        let mut static_events = Vec::new();
        let mut offroad_alerts = Vec::new();
        if !config.sounds_available {
            static_events.push(EventName::SoundsUnavailable);
        }
        if !car.recognized() {
            static_events.push(EventName::CarUnrecognized);
            offroad_alerts.push(if car.has_firmware {
                OffroadAlert::CarUnrecognized
            } else {
                OffroadAlert::NoFirmware
            });
        } else if car.passive {
            static_events.push(EventName::DashcamMode);
        }

        let mut ignore = vec![Service::Accelerometer, Service::Gyroscope, Service::TestJoystick];
        if !config.run_mode.expects_driver_camera() {
            ignore.extend([Service::DriverCameraState, Service::ManagerState]);
        }
        if car.radarless {
            ignore.push(Service::RadarState);
        }
        let ignore_alive = ServiceSet::from_services(&ignore);
        let mut ignore_freq = ignore_alive;
        ignore_freq.insert(Service::RadarState);

        let startup_event = Some(startup_event(car, config.tested_branch));

        info!(
            car = %car.car_name,
            passive = car.passive,
            run_mode = ?config.run_mode,
            "Hazard aggregator ready"
        );

        Self {
            static_events,
            startup_event,
            ignore_alive,
            ignore_freq,
            ignore_valid: ServiceSet::from_services(&[Service::TestJoystick]),
            last_functional_fan_frame: 0,
            recalibrating_seen: false,
            not_running_prev: None,
            logged_comm_issue: None,
            distance_traveled: 0.0,
            offroad_alerts,
            config,
        }
    }

    pub fn config(&self) -> &HazardConfig {
        &self.config
    }

    /// Stop requiring liveness of `service`, used for optional camera streams
    pub fn ignore_alive(&mut self, service: Service) {
        debug!(?service, "Ignoring service liveness");
        self.ignore_alive.insert(service);
    }

    /// Alerts raised since the last call, to be persisted by the caller
    pub fn take_offroad_alerts(&mut self) -> Vec<OffroadAlert> {
        std::mem::take(&mut self.offroad_alerts)
    }

    /// Rebuild `events` from scratch for this cycle
    pub fn update(&mut self, ctx: &CycleContext<'_>, events: &mut EventSet) {
        events.clear();
        events.extend(self.static_events.iter().copied());

        if ctx.joystick_mode {
            events.add(EventName::JoystickDebug);
            self.startup_event = None;
        }

        if let Some(startup) = self.startup_event.take() {
            events.add(startup);
        }

        if !ctx.initialized {
            events.add(EventName::ControlsInitializing);
            return;
        }

        if self.config.car.passive {
            return;
        }

        self.driver_input_events(ctx, events);
        self.device_events(ctx, events);
        self.calibration_events(ctx, events);
        self.lane_change_events(ctx, events);
        self.safety_channel_events(ctx, events);
        self.system_health_events(ctx, events);
        self.localization_events(ctx, events);
        self.sensor_events(ctx, events);
        self.driving_events(ctx, events);
        self.camera_log_events(ctx, events);
        self.gps_and_model_events(ctx, events);
    }

    fn driver_input_events(&self, ctx: &CycleContext<'_>, events: &mut EventSet) {
        let cs = &ctx.inputs.car;
        let prev = ctx.car_prev;

        let resume_pressed = cs.any_button(&[ButtonType::AccelCruise, ButtonType::ResumeCruise]);
        if !self.config.car.pcm_cruise && !ctx.v_cruise_initialized && resume_pressed {
            events.add(EventName::ResumeBlocked);
        }

        let gas_edge =
            cs.gas_pressed && !prev.gas_pressed && self.config.disengage_on_accelerator;
        let brake_edge = cs.brake_pressed && (!prev.brake_pressed || !cs.standstill);
        let regen_edge = cs.regen_braking && (!prev.regen_braking || !cs.standstill);
        if gas_edge || brake_edge || regen_edge {
            events.add(EventName::PedalPressed);
        }

        if cs.brake_pressed && cs.standstill {
            events.add(EventName::PreEnableStandstill);
        }

        if cs.gas_pressed {
            events.add(EventName::GasPressedOverride);
        }

        if !self.config.car.not_car {
            events.extend(ctx.inputs.telemetry.driver_monitoring.events.iter().copied());
        }

        if cs.can_valid {
            events.extend(cs.events.iter().copied());
        }
    }

    fn device_events(&mut self, ctx: &CycleContext<'_>, events: &mut EventSet) {
        let telemetry = &ctx.inputs.telemetry;
        let device = &telemetry.device;
        let check_resources = self.config.run_mode.checks_device_resources();

        if device.thermal_status >= ThermalStatus::Red
            && (!self.config.increase_thermal_limits
                || device.thermal_status == ThermalStatus::Danger)
        {
            events.add(EventName::Overheat);
        }
        if check_resources && device.free_space_percent < MIN_FREE_SPACE_PERCENT {
            events.add(EventName::OutOfSpace);
        }
        if check_resources && device.memory_usage_percent > MAX_MEMORY_USAGE_PERCENT {
            events.add(EventName::LowMemory);
        }

        let frame = telemetry.health.frame;
        if telemetry.peripheral.board_known {
            let stalled = telemetry.peripheral.fan_speed_rpm < MIN_FAN_RPM
                && device.fan_speed_percent_desired > FAN_DUTY_EXPECTED_PERCENT;
            if !stalled {
                self.last_functional_fan_frame = frame;
            } else if frame.saturating_sub(self.last_functional_fan_frame)
                > self.config.thresholds.fan_grace
            {
                events.add(EventName::FanMalfunction);
            }
        }
    }

    fn calibration_events(&mut self, ctx: &CycleContext<'_>, events: &mut EventSet) {
        match ctx.inputs.telemetry.calibration {
            CalibrationStatus::Calibrated => {}
            CalibrationStatus::Uncalibrated => events.add(EventName::CalibrationIncomplete),
            CalibrationStatus::Recalibrating => {
                if !self.recalibrating_seen {
                    info!("Recalibration started");
                    self.offroad_alerts.push(OffroadAlert::Recalibration);
                }
                self.recalibrating_seen = true;
                events.add(EventName::CalibrationRecalibrating);
            }
            CalibrationStatus::Invalid => events.add(EventName::CalibrationInvalid),
        }
    }

    fn lane_change_events(&self, ctx: &CycleContext<'_>, events: &mut EventSet) {
        let cs = &ctx.inputs.car;
        let model = &ctx.inputs.telemetry.model;
        let lanes = &ctx.inputs.telemetry.lane_plan;

        match model.lane_change_state {
            LaneChangeState::PreLaneChange => {
                let direction = model.lane_change_direction;
                let blocked = (cs.left_blindspot && direction == LaneChangeDirection::Left)
                    || (cs.right_blindspot && direction == LaneChangeDirection::Right);

                if blocked {
                    events.add(if self.config.loud_blindspot_alert {
                        EventName::LaneChangeBlockedLoud
                    } else {
                        EventName::LaneChangeBlocked
                    });
                } else if direction == LaneChangeDirection::Left {
                    events.add(if lanes.lane_width_left >= self.config.lane_detection_width {
                        EventName::PreLaneChangeLeft
                    } else {
                        EventName::NoLaneAvailable
                    });
                } else {
                    events.add(if lanes.lane_width_right >= self.config.lane_detection_width {
                        EventName::PreLaneChangeRight
                    } else {
                        EventName::NoLaneAvailable
                    });
                }
            }
            LaneChangeState::LaneChangeStarting | LaneChangeState::LaneChangeFinishing => {
                events.add(EventName::LaneChange);
            }
            LaneChangeState::Off => {}
        }
    }

    fn safety_channel_events(&self, ctx: &CycleContext<'_>, events: &mut EventSet) {
        let car = &self.config.car;
        let thresholds = &self.config.thresholds;
        let past_grace = ctx.inputs.telemetry.health.frame > thresholds.safety_mode_grace;

        for (i, channel) in ctx.inputs.telemetry.safety_channels.iter().enumerate() {
            let safety_mismatch = match car.safety_configs.get(i) {
                Some(expected) => {
                    channel.safety_model != expected.safety_model
                        || channel.safety_param != expected.safety_param
                        || channel.alternative_experience != car.alternative_experience
                }
                None => !channel.safety_model.is_ignored(),
            };

            if (safety_mismatch && past_grace)
                || channel.rx_checks_invalid
                || ctx.mismatch.panda >= thresholds.controls_mismatch
            {
                events.add(EventName::ControlsMismatch);
            }

            if channel.relay_malfunction {
                events.add(EventName::RelayMalfunction);
            }
        }
    }

    fn sensor_events(&self, ctx: &CycleContext<'_>, events: &mut EventSet) {
        let health = &ctx.inputs.telemetry.health;
        let stale = Service::SENSORS
            .iter()
            .any(|s| health.frames_since(*s) > self.config.thresholds.sensor_timeout);
        if stale {
            events.add(EventName::SensorDataInvalid);
        }
    }

    fn driving_events(&self, ctx: &CycleContext<'_>, events: &mut EventSet) {
        let cs = &ctx.inputs.car;
        let telemetry = &ctx.inputs.telemetry;

        if self.config.run_mode.checks_cruise_mismatch()
            && ctx.mismatch.cruise > self.config.thresholds.cruise_mismatch
        {
            events.add(EventName::CruiseMismatch);
        }

        let stock_long_is_braking = ctx.enabled
            && !self.config.car.openpilot_longitudinal_control
            && cs.a_ego < STOCK_BRAKING_ACCEL;
        let model_fcw =
            telemetry.model.hard_brake_predicted && !cs.brake_pressed && !stock_long_is_braking;
        let planner_fcw = telemetry.longitudinal_plan.fcw && ctx.enabled;
        if planner_fcw || model_fcw {
            events.add(EventName::Fcw);
        }
    }

    fn camera_log_events(&self, ctx: &CycleContext<'_>, events: &mut EventSet) {
        for line in &ctx.inputs.telemetry.log_lines {
            if let Some(event) = camera_error_event(line) {
                events.add(event);
            }
        }
    }

    fn gps_and_model_events(&mut self, ctx: &CycleContext<'_>, events: &mut EventSet) {
        if !self.config.run_mode.checks_gps_and_model() {
            return;
        }

        let telemetry = &ctx.inputs.telemetry;
        let localization = &telemetry.localization;

        // not shown in the first kilometre, to allow for leaving a garage
        if !localization.gps_ok
            && localization.inputs_ok
            && self.distance_traveled > NO_GPS_DISTANCE_M
        {
            events.add(EventName::NoGps);
        }
        if localization.gps_ok {
            self.distance_traveled = 0.0;
        }
        self.distance_traveled += ctx.inputs.car.v_ego * self.config.thresholds.dt();

        if telemetry.model.frame_drop_percent > MAX_MODEL_FRAME_DROP_PERCENT {
            events.add(EventName::ModeldLagging);
        }
    }
}

/// Event shown once after startup, describing what the supervisor will do
fn startup_event(car: &CarParams, tested_branch: bool) -> EventName {
    if !car.recognized() {
        if car.has_firmware {
            EventName::StartupNoCar
        } else {
            EventName::StartupNoFw
        }
    } else if car.passive {
        EventName::StartupNoControl
    } else if tested_branch {
        EventName::Startup
    } else {
        EventName::StartupMaster
    }
}

/// Map a camera driver error line to the camera that raised it
fn camera_error_event(line: &str) -> Option<EventName> {
    if !CAMERA_LOG_ERRORS.iter().any(|err| line.contains(err)) {
        return None;
    }
    let csid = line.rsplit("CSID:").next()?.split(' ').next()?;
    match csid {
        "0" => Some(EventName::DriverCameraError),
        "1" => Some(EventName::RoadCameraError),
        "2" => Some(EventName::WideRoadCameraError),
        _ => None,
    }
}
