//! Engagement Supervisor - Main Entry Point
//!
//! Runs the control loop against the simulated vehicle until Ctrl-C.
//! Usage: `supervisor [config.toml]`

use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use supervisor::{
    init_logging, publish, ControlLoop, FileParamStore, SimulatedVehicle, Subscriptions,
    SupervisorConfig, SupervisorError,
};
use tracing::{debug, error, info};

/// Capacity of each published stream
const PUBLISH_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<(), SupervisorError> {
    init_logging();

    info!("=== Engagement Supervisor v{} ===", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = SupervisorConfig::load(config_path.as_deref())?;
    info!(
        config = ?config_path,
        tick_hz = config.tick_hz,
        run_mode = ?config.run_mode,
        car = %config.car.car_name,
        "Configuration loaded"
    );

    if let Some(addr) = config.metrics_listen {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!(%addr, "Prometheus exporter listening");
    }

    let store = Arc::new(FileParamStore::open(&config.params_dir)?);
    let thresholds = config.thresholds()?;
    let (publisher, subscriptions) = publish::channel(PUBLISH_CAPACITY, thresholds.events_publish);
    tokio::spawn(log_published(subscriptions));

    info!("Starting simulated vehicle");
    let (collaborators, _sim) = SimulatedVehicle::new(config.car.clone(), config.tick()?).build();

    let control_loop = ControlLoop::new(&config, collaborators, store, publisher)?;
    let frames = control_loop.run_until(shutdown_signal()).await?;

    info!(frames, "Supervisor stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// Drain the published streams, logging engagement changes
async fn log_published(mut subs: Subscriptions) {
    let mut last_state = None;
    loop {
        tokio::select! {
            Some(state) = subs.controls_state.recv() => {
                if last_state != Some(state.state) {
                    info!(frame = state.frame, state = state.state.as_str(), "Controls state");
                    last_state = Some(state.state);
                }
            }
            Some(events) = subs.onroad_events.recv() => {
                match serde_json::to_string(&events.names) {
                    Ok(names) => debug!(frame = events.frame, %names, "Onroad events"),
                    Err(e) => debug!(error = %e, "Event serialization failed"),
                }
            }
            Some(message) = subs.car_control.recv() => {
                debug!(
                    frame = message.frame,
                    accel = message.car_control.actuators.accel,
                    steer = message.car_control.actuators.steer,
                    "Car control"
                );
            }
            else => break,
        }
    }
}
