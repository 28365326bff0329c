//! Fixed-rate control loop
//!
//! Each tick samples the inputs, rebuilds the event set, advances the
//! engagement state, asks the controllers for actuator values, sanitizes
//! them, and publishes. The loop owns every piece of mutable control state;
//! the parameter refresh task only hands it immutable snapshots.

use actuators::{
    cruise_control, joystick_actuators, lane_change_blinkers, steer_limited, ActuatorGates,
    ActuatorSanitizer, CarControl, GateInputs, HudInputs, LaneDepartureMonitor, LateralDebug,
    SaturationMonitor,
};
use car_state::{
    units::KPH_TO_MS, ButtonType, CalibrationStatus, CarParams, CycleInputs, Service,
    VehicleSnapshot,
};
use engagement::{ControlMode, EngagementContext};
use hazards::{CycleContext, CycleThresholds, HazardAggregator, RunMode};
use metrics::counter;
use onroad_events::{EventCategory, EventName, EventSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::collaborators::{Collaborators, LateralRequest};
use crate::config::SupervisorConfig;
use crate::error::SupervisorError;
use crate::params::{clean_startup_params, ParamKey, ParamStore, ParamWriter, ParamsRefresh, UserParams};
use crate::publish::{ControlsState, Publisher};
use crate::ratekeeper::RateKeeper;

/// Lifecycle of the loop. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Uninitialized,
    /// Waiting for valid CAN and healthy services
    Initializing,
    Running,
}

/// The supervisory control loop
pub struct ControlLoop {
    car_params: CarParams,
    run_mode: RunMode,
    thresholds: CycleThresholds,
    phase: LoopPhase,
    frame: u64,

    aggregator: HazardAggregator,
    engagement: EngagementContext,
    sanitizer: ActuatorSanitizer,
    events: EventSet,
    car_prev: VehicleSnapshot,

    user: UserParams,
    params: watch::Receiver<UserParams>,
    writer: ParamWriter,
    refresh_task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,

    rate_keeper: RateKeeper,
    publisher: Publisher,
    collaborators: Collaborators,

    lane_departure: LaneDepartureMonitor,
    saturation: SaturationMonitor,
    desired_curvature: f32,
    steer_limited: bool,
}

impl ControlLoop {
    /// Build the loop and start the parameter refresh task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: &SupervisorConfig,
        collaborators: Collaborators,
        store: Arc<dyn ParamStore>,
        publisher: Publisher,
    ) -> Result<Self, SupervisorError> {
        let hazard_config = config.hazard_config()?;
        let thresholds = hazard_config.thresholds;
        let car_params = config.car.clone();

        if let Err(e) = clean_startup_params(store.as_ref(), &car_params) {
            warn!(error = %e, "Startup parameter cleanup failed");
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let params = ParamsRefresh::spawn(
            store,
            car_params.clone(),
            config.params_refresh(),
            shutdown_rx,
        );
        let user = *params.params.borrow();

        info!(
            car = %car_params.car_name,
            tick_ms = thresholds.tick.as_secs_f64() * 1000.0,
            run_mode = ?config.run_mode,
            "Control loop created"
        );

        Ok(Self {
            run_mode: config.run_mode,
            phase: LoopPhase::Uninitialized,
            frame: 0,
            aggregator: HazardAggregator::new(hazard_config),
            engagement: EngagementContext::new(thresholds.soft_disable),
            sanitizer: ActuatorSanitizer::new(),
            events: EventSet::new(),
            car_prev: VehicleSnapshot::default(),
            user,
            params: params.params,
            writer: params.writer,
            refresh_task: params.task,
            shutdown,
            rate_keeper: RateKeeper::new("controls", thresholds.tick, None),
            publisher,
            collaborators,
            lane_departure: LaneDepartureMonitor::new(config.ldw_enabled, thresholds.blinker_cooldown),
            saturation: SaturationMonitor::new(thresholds.steer_pressed_cooldown),
            desired_curvature: 0.0,
            steer_limited: false,
            car_params,
            thresholds,
        })
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn mode(&self) -> ControlMode {
        self.engagement.mode()
    }

    pub fn engagement(&self) -> &EngagementContext {
        &self.engagement
    }

    /// Events of the last completed cycle
    pub fn events(&self) -> &EventSet {
        &self.events
    }

    pub fn user_params(&self) -> UserParams {
        self.user
    }

    /// Run until `shutdown` resolves, then stop the refresh task and wait
    /// for it. Returns the number of cycles run.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<u64, SupervisorError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut interval = tokio::time::interval(self.thresholds.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Control loop started");

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.step();
                    self.rate_keeper.monitor(Instant::now());
                }
            }
        }

        info!(frames = self.frame, "Control loop stopping");
        self.stop().await
    }

    /// Signal the refresh task, flush pending parameter writes, and join it
    pub async fn stop(self) -> Result<u64, SupervisorError> {
        let _ = self.shutdown.send(true);
        self.refresh_task.await?;
        Ok(self.frame)
    }

    /// Run one control cycle
    pub fn step(&mut self) {
        self.frame += 1;
        if self.params.has_changed().unwrap_or(false) {
            self.user = *self.params.borrow_and_update();
        }

        let inputs = self.collaborators.telemetry.sample(self.frame);

        if self.phase != LoopPhase::Running {
            self.try_initialize(&inputs);
        }
        let initialized = self.phase == LoopPhase::Running;

        self.engagement
            .track_panda_mismatch(&inputs.telemetry.safety_channels);
        if initialized && !self.car_params.passive {
            self.engagement
                .track_cruise_mismatch(&inputs.car, self.car_params.pcm_cruise);
        }

        let ctx = CycleContext {
            inputs: &inputs,
            car_prev: &self.car_prev,
            initialized,
            enabled: self.engagement.enabled(),
            lagging: self.rate_keeper.lagging(),
            joystick_mode: self.user.joystick_mode,
            v_cruise_initialized: self.collaborators.cruise.initialized(),
            mismatch: self.engagement.mismatch(),
        };
        self.aggregator.update(&ctx, &mut self.events);
        for alert in self.aggregator.take_offroad_alerts() {
            self.writer.put_bool(alert.key(), true);
        }

        if initialized && !self.car_params.passive {
            self.transition(&inputs.car);
        }

        let (control, lateral) = self.state_control(&inputs);
        self.publish(&inputs, control, lateral);

        counter!("supervisor_cycles_total").increment(1);
        self.car_prev = inputs.car;
    }

    fn try_initialize(&mut self, inputs: &CycleInputs) {
        let health = &inputs.telemetry.health;
        let all_valid = inputs.car.can_valid && self.aggregator.services_ok(health);
        let timed_out = self.frame > self.thresholds.init_timeout;

        if !(all_valid || timed_out || self.run_mode.initializes_immediately()) {
            if self.phase == LoopPhase::Uninitialized {
                debug!("Waiting for CAN and services");
                self.phase = LoopPhase::Initializing;
            }
            return;
        }

        for camera in [Service::RoadCameraState, Service::WideRoadCameraState] {
            if !self.collaborators.telemetry.camera_available(camera) {
                self.aggregator.ignore_alive(camera);
            }
        }

        if !self.car_params.passive {
            self.collaborators.car.initialize();
        }

        self.phase = LoopPhase::Running;
        if self.run_mode.restores_recorded_state() {
            self.engagement
                .restore_enabled(&inputs.telemetry.safety_channels);
        }
        self.writer
            .put_bool(ParamKey::ControlsReady.as_str(), true);

        info!(
            elapsed_s = self.frame as f32 * self.thresholds.dt(),
            timed_out,
            can_valid = inputs.car.can_valid,
            invalid = ?health.invalid(),
            not_alive = ?health.not_alive(),
            not_freq_ok = ?health.not_freq_ok(),
            "Controls initialized"
        );
    }

    fn transition(&mut self, car: &VehicleSnapshot) {
        let cruise = &mut self.collaborators.cruise;
        cruise.update(car, self.engagement.enabled(), self.user.is_metric);

        let step = self.engagement.step(&self.events);
        if step.engaged {
            cruise.initialize(car, self.user.experimental_mode);
        }
    }

    /// Compute the command for this cycle
    fn state_control(&mut self, inputs: &CycleInputs) -> (CarControl, LateralDebug) {
        let car = &inputs.car;
        let telemetry = &inputs.telemetry;
        let live = &telemetry.live_parameters;
        let joystick_mode = self.user.joystick_mode;
        let c = &mut self.collaborators;

        c.vehicle_model
            .update_params(live.stiffness_factor.max(0.1), live.steer_ratio.max(0.1));

        let enabled = self.engagement.enabled();
        let active = self.engagement.active();
        let gates = ActuatorGates::compute(&GateInputs {
            car,
            params: &self.car_params,
            events: &self.events,
            enabled,
            active,
            joystick_mode,
        });

        let mut control = CarControl {
            enabled,
            lat_active: gates.lat_active,
            long_active: gates.long_active,
            ..Default::default()
        };
        if let Some((left, right)) = lane_change_blinkers(&telemetry.model) {
            control.left_blinker = left;
            control.right_blinker = right;
        }
        self.lane_departure.observe(self.frame, car);

        if !gates.lat_active {
            c.control.reset_lateral();
        }
        if !gates.long_active {
            c.control.reset_longitudinal(car.v_ego);
        }

        let lateral = if !joystick_mode {
            let v_cruise = c.cruise.v_cruise_kph() * KPH_TO_MS;
            let actuators = &mut control.actuators;
            actuators.accel = c.control.longitudinal(
                gates.long_active,
                car,
                &telemetry.longitudinal_plan,
                v_cruise,
            );
            if let Some(speed) = telemetry.longitudinal_plan.final_speed {
                actuators.speed = speed;
            }

            let output = c.control.lateral(&LateralRequest {
                active: gates.lat_active,
                car,
                live_parameters: live,
                model: &telemetry.model,
                steer_limited: self.steer_limited,
            });
            self.desired_curvature = output.desired_curvature;
            actuators.curvature = output.desired_curvature;
            actuators.steer = output.steer;
            actuators.steering_angle_deg = output.steering_angle_deg;
            output.debug
        } else if telemetry.health.received(Service::TestJoystick) {
            let stale = telemetry.health.frames_since(Service::TestJoystick)
                > self.thresholds.joystick_timeout;
            let axes = if stale { [0.0; 2] } else { telemetry.joystick.axes };
            let (actuators, debug) = joystick_actuators(axes, gates, active, car);
            control.actuators = actuators;
            debug
        } else {
            LateralDebug::default()
        };

        if self.saturation.update(
            self.frame,
            car,
            &self.car_params,
            joystick_mode,
            &lateral,
            &control.actuators,
            telemetry.model.path_y0,
        ) {
            self.events.add(EventName::SteerSaturated);
        }

        self.sanitizer.sanitize(&mut control.actuators);

        if self.car_params.openpilot_longitudinal_control
            && car.button_released(ButtonType::GapAdjustCruise)
        {
            self.user.personality = self.user.personality.cycled();
            self.writer.put(
                ParamKey::LongitudinalPersonality.as_str(),
                self.user.personality.index().to_string(),
            );
            info!(personality = ?self.user.personality, "Personality changed");
        }

        (control, lateral)
    }

    /// Fill in cruise and dashboard requests, send, and publish
    fn publish(&mut self, inputs: &CycleInputs, mut control: CarControl, lateral: LateralDebug) {
        let car = &inputs.car;
        let telemetry = &inputs.telemetry;
        let enabled = self.engagement.enabled();
        let gates = ActuatorGates {
            lat_active: control.lat_active,
            long_active: control.long_active,
        };

        let joystick_cancel = self.user.joystick_mode
            && telemetry.health.received(Service::TestJoystick)
            && telemetry.joystick.cancel_pressed;
        control.cruise_control = cruise_control(
            car,
            &self.car_params,
            enabled,
            gates,
            telemetry.longitudinal_plan.final_speed,
            joystick_cancel,
        );

        let cruise = &self.collaborators.cruise;
        control.hud_control = HudInputs {
            v_cruise_cluster_kph: cruise.v_cruise_cluster_kph(),
            enabled,
            has_lead: telemetry.longitudinal_plan.has_lead,
            personality: self.user.personality.index(),
        }
        .compose();

        let calibrated = telemetry.calibration == CalibrationStatus::Calibrated;
        if self.lane_departure.update(
            self.frame,
            car,
            control.lat_active,
            calibrated,
            &telemetry.model,
            &mut control.hud_control,
        ) {
            self.events.add(EventName::Ldw);
        }

        if !self.car_params.passive && self.phase == LoopPhase::Running {
            self.collaborators.car.send(&control);
            self.steer_limited =
                steer_limited(&self.car_params, &control.actuators, &telemetry.car_output);
        }

        let mode = self.engagement.mode();
        let force_decel =
            telemetry.driver_monitoring.awareness_status < 0.0 || mode == ControlMode::SoftDisabling;

        let live = &telemetry.live_parameters;
        let steer_angle = (car.steering_angle_deg - live.angle_offset_deg).to_radians();
        let curvature = -self
            .collaborators
            .vehicle_model
            .curvature(steer_angle, car.v_ego, live.roll);

        let cruise = &self.collaborators.cruise;
        self.publisher.controls_state(ControlsState {
            frame: self.frame,
            valid: car.can_valid,
            state: mode,
            enabled,
            active: self.engagement.active(),
            engageable: !self.events.has(EventCategory::NoEntry),
            soft_disable_timer: self.engagement.soft_disable_timer(),
            curvature,
            desired_curvature: self.desired_curvature,
            force_decel,
            cum_lag_ms: (-self.rate_keeper.remaining() * 1000.0) as f32,
            v_cruise: cruise.v_cruise_kph(),
            v_cruise_cluster: cruise.v_cruise_cluster_kph(),
            experimental_mode: self.user.experimental_mode,
            personality: self.user.personality,
            alert_types: self.engagement.alert_types(),
            steer_limited: self.steer_limited,
            lateral,
        });
        self.publisher
            .onroad_events(self.frame, self.events.names());
        self.publisher
            .car_control(self.frame, car.can_valid, control);
    }
}
