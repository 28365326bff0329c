//! Messages produced every cycle
//!
//! Sends never wait: a consumer that falls behind loses messages rather than
//! stalling the control tick.

use actuators::{CarControl, LateralDebug};
use engagement::ControlMode;
use onroad_events::{Categories, EventName};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::params::Personality;

/// Engagement and controller state for the alert and UI layers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlsState {
    pub frame: u64,
    /// Vehicle snapshot was valid this cycle
    pub valid: bool,
    pub state: ControlMode,
    pub enabled: bool,
    pub active: bool,
    /// No event blocks engagement
    pub engageable: bool,
    pub soft_disable_timer: u32,
    /// Curvature the car is currently driving (1/m)
    pub curvature: f32,
    pub desired_curvature: f32,
    /// Ask the planner to slow down regardless of the driver
    pub force_decel: bool,
    /// How far the loop is behind schedule (ms)
    pub cum_lag_ms: f32,
    pub v_cruise: f32,
    pub v_cruise_cluster: f32,
    pub experimental_mode: bool,
    pub personality: Personality,
    /// Categories the alert layer should render
    pub alert_types: Categories,
    /// The car sent something other than what was commanded
    pub steer_limited: bool,
    pub lateral: LateralDebug,
}

/// Events raised during one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnroadEvents {
    pub frame: u64,
    pub names: Vec<EventName>,
}

/// Command sent to the car, as published for logging
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarControlMessage {
    pub frame: u64,
    pub valid: bool,
    pub car_control: CarControl,
}

/// Receiving ends of the published streams
pub struct Subscriptions {
    pub controls_state: mpsc::Receiver<ControlsState>,
    pub onroad_events: mpsc::Receiver<OnroadEvents>,
    pub car_control: mpsc::Receiver<CarControlMessage>,
}

/// Sending ends, owned by the control loop
pub struct Publisher {
    controls_state: mpsc::Sender<ControlsState>,
    onroad_events: mpsc::Sender<OnroadEvents>,
    car_control: mpsc::Sender<CarControlMessage>,
    events_prev: Vec<EventName>,
    events_every: u64,
}

/// Create bounded channels holding up to `capacity` messages per stream.
/// The event list is republished at least every `events_every` frames.
pub fn channel(capacity: usize, events_every: u64) -> (Publisher, Subscriptions) {
    let (controls_tx, controls_rx) = mpsc::channel(capacity.max(1));
    let (events_tx, events_rx) = mpsc::channel(capacity.max(1));
    let (car_tx, car_rx) = mpsc::channel(capacity.max(1));

    let publisher = Publisher {
        controls_state: controls_tx,
        onroad_events: events_tx,
        car_control: car_tx,
        events_prev: Vec::new(),
        events_every: events_every.max(1),
    };
    let subscriptions = Subscriptions {
        controls_state: controls_rx,
        onroad_events: events_rx,
        car_control: car_rx,
    };
    (publisher, subscriptions)
}

fn try_send<T>(stream: &'static str, tx: &mpsc::Sender<T>, message: T) {
    match tx.try_send(message) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => debug!(stream, "Subscriber behind, message dropped"),
        Err(TrySendError::Closed(_)) => debug!(stream, "No subscriber, message dropped"),
    }
}

impl Publisher {
    pub fn controls_state(&self, state: ControlsState) {
        try_send("controlsState", &self.controls_state, state);
    }

    /// Publish the event list when it changed or on the periodic frame
    pub fn onroad_events(&mut self, frame: u64, names: &[EventName]) {
        if frame % self.events_every == 0 || names != self.events_prev.as_slice() {
            try_send(
                "onroadEvents",
                &self.onroad_events,
                OnroadEvents {
                    frame,
                    names: names.to_vec(),
                },
            );
        }
        self.events_prev.clear();
        self.events_prev.extend_from_slice(names);
    }

    pub fn car_control(&self, frame: u64, valid: bool, car_control: CarControl) {
        try_send(
            "carControl",
            &self.car_control,
            CarControlMessage {
                frame,
                valid,
                car_control,
            },
        );
    }
}
