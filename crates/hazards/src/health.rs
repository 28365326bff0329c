//! Hardware and subsystem health checks
//!
//! Every event added here carries both `NoEntry` and a disable category, and
//! the catch-all communication check at the end depends on that: it only
//! reports when nothing more specific was raised in this block.

use car_state::{Service, ServiceHealth, ServiceStatus};
use onroad_events::{EventCategory, EventName, EventSet};
use std::collections::BTreeSet;
use tracing::{error, warn};

use crate::aggregator::{CycleContext, HazardAggregator};

/// Snapshot of failing services logged when a communication issue is raised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommIssueDetail {
    pub invalid: Vec<Service>,
    pub not_alive: Vec<Service>,
    pub not_freq_ok: Vec<Service>,
    pub can_rcv_timeout: bool,
}

impl HazardAggregator {
    /// All subscribed services are alive, on frequency, and valid
    pub fn services_ok(&self, health: &ServiceHealth) -> bool {
        self.all_alive(health, &Service::ALL)
            && self.all_freq_ok(health, &Service::ALL)
            && self.all_valid(health, &Service::ALL)
    }

    fn all_alive(&self, health: &ServiceHealth, services: &[Service]) -> bool {
        health.all(services, self.ignore_alive, |s: &ServiceStatus| s.alive)
    }

    fn all_freq_ok(&self, health: &ServiceHealth, services: &[Service]) -> bool {
        health.all(services, self.ignore_freq, |s: &ServiceStatus| s.freq_ok)
    }

    fn all_valid(&self, health: &ServiceHealth, services: &[Service]) -> bool {
        health.all(services, self.ignore_valid, |s: &ServiceStatus| s.valid)
    }

    fn service_ok(&self, health: &ServiceHealth, service: Service) -> bool {
        let one = [service];
        self.all_alive(health, &one) && self.all_freq_ok(health, &one) && self.all_valid(health, &one)
    }

    pub(crate) fn system_health_events(&mut self, ctx: &CycleContext<'_>, events: &mut EventSet) {
        let cs = &ctx.inputs.car;
        let telemetry = &ctx.inputs.telemetry;
        let health = &telemetry.health;
        let run_mode = self.config.run_mode;

        let num_events = events.len();

        let not_running: BTreeSet<String> = telemetry
            .processes
            .iter()
            .filter(|p| !p.running && p.should_be_running)
            .map(|p| p.name.clone())
            .collect();
        let required_missing = not_running
            .iter()
            .any(|name| !self.config.ignored_processes.contains(name));

        if health.received(Service::ManagerState) && required_missing {
            events.add(EventName::ProcessNotRunning);
            if self.not_running_prev.as_ref() != Some(&not_running) {
                warn!(processes = ?not_running, "Process not running");
            }
            self.not_running_prev = Some(not_running);
        } else if run_mode.checks_device_resources() && !ctx.lagging {
            if !self.all_alive(health, &Service::CAMERAS) {
                events.add(EventName::CameraMalfunction);
            } else if !self.all_freq_ok(health, &Service::CAMERAS) {
                events.add(EventName::CameraFrameRate);
            }
        }

        if run_mode.reports_lagging() && ctx.lagging {
            events.add(EventName::ControlsdLagging);
        }

        if !self.config.car.radarless
            && (!telemetry.radar_errors.is_empty()
                || (!ctx.lagging && !self.service_ok(health, Service::RadarState)))
        {
            events.add(EventName::RadarFault);
        }

        if !health.status(Service::PandaStates).valid {
            events.add(EventName::UsbError);
        }

        if cs.can_timeout {
            events.add(EventName::CanBusMissing);
        } else if !cs.can_valid {
            events.add(EventName::CanError);
        }

        // TODO: revisit when new disabling events are added outside this block,
        // since anything raised earlier in the cycle also suppresses the catch-all
        let has_disable_events = events.has(EventCategory::NoEntry)
            && (events.has(EventCategory::SoftDisable)
                || events.has(EventCategory::ImmediateDisable));
        let no_system_errors = !has_disable_events || events.len() == num_events;

        let can_rcv_timeout = ctx.inputs.can_rcv_timeout;
        if (!self.services_ok(health) || can_rcv_timeout) && no_system_errors {
            if !self.all_alive(health, &Service::ALL) {
                events.add(EventName::CommIssue);
            } else if !self.all_freq_ok(health, &Service::ALL) {
                events.add(EventName::CommIssueAvgFreq);
            } else {
                events.add(EventName::CommIssue);
            }

            let detail = CommIssueDetail {
                invalid: health.invalid(),
                not_alive: health.not_alive(),
                not_freq_ok: health.not_freq_ok(),
                can_rcv_timeout,
            };
            if self.logged_comm_issue.as_ref() != Some(&detail) {
                error!(
                    invalid = ?detail.invalid,
                    not_alive = ?detail.not_alive,
                    not_freq_ok = ?detail.not_freq_ok,
                    can_rcv_timeout,
                    "Communication issue"
                );
                self.logged_comm_issue = Some(detail);
            }
        } else {
            self.logged_comm_issue = None;
        }
    }

    pub(crate) fn localization_events(&self, ctx: &CycleContext<'_>, events: &mut EventSet) {
        if self.config.car.not_car && ctx.joystick_mode {
            return;
        }

        let telemetry = &ctx.inputs.telemetry;
        let localization = &telemetry.localization;
        if !localization.posenet_ok {
            events.add(EventName::PosenetInvalid);
        }
        if !localization.device_stable {
            events.add(EventName::DeviceFalling);
        }
        if !localization.inputs_ok {
            events.add(EventName::LocationdTemporaryError);
        }
        if !telemetry.live_parameters.valid && self.config.run_mode.checks_live_parameters() {
            events.add(EventName::ParamsdTemporaryError);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::tests::{healthy_inputs, running_ctx, started};
    use crate::aggregator::HazardConfig;
    use crate::mode::RunMode;
    use car_state::{CarParams, ProcessState, VehicleSnapshot};

    fn run(aggregator: &mut HazardAggregator, ctx: &CycleContext<'_>) -> EventSet {
        let mut events = EventSet::new();
        aggregator.update(ctx, &mut events);
        events
    }

    fn process(name: &str) -> ProcessState {
        ProcessState {
            name: name.to_string(),
            running: false,
            should_be_running: true,
        }
    }

    #[test]
    fn test_services_ok_respects_ignore_sets() {
        let aggregator = started(HazardConfig::default());
        let mut health = healthy_inputs(50).telemetry.health;
        assert!(aggregator.services_ok(&health));

        health.update(Service::Accelerometer, |s| s.alive = false);
        health.update(Service::RadarState, |s| s.freq_ok = false);
        assert!(aggregator.services_ok(&health));

        health.update(Service::ModelV2, |s| s.valid = false);
        assert!(!aggregator.services_ok(&health));
    }

    #[test]
    fn test_ignored_process_is_not_a_fault() {
        let mut aggregator = started(HazardConfig::default());
        let mut inputs = healthy_inputs(50);
        inputs.telemetry.processes = vec![process("loggerd")];
        let prev = VehicleSnapshot::default();

        let events = run(&mut aggregator, &running_ctx(&inputs, &prev));
        assert!(!events.contains(EventName::ProcessNotRunning));

        inputs.telemetry.processes.push(process("modeld"));
        let events = run(&mut aggregator, &running_ctx(&inputs, &prev));
        assert!(events.contains(EventName::ProcessNotRunning));
        assert_eq!(
            aggregator.not_running_prev,
            Some(BTreeSet::from(["loggerd".to_string(), "modeld".to_string()]))
        );
    }

    #[test]
    fn test_process_fault_skips_camera_check() {
        let mut aggregator = started(HazardConfig::default());
        let mut inputs = healthy_inputs(50);
        inputs.telemetry.processes = vec![process("camerad")];
        inputs
            .telemetry
            .health
            .update(Service::RoadCameraState, |s| s.alive = false);
        let prev = VehicleSnapshot::default();

        let events = run(&mut aggregator, &running_ctx(&inputs, &prev));
        assert!(events.contains(EventName::ProcessNotRunning));
        assert!(!events.contains(EventName::CameraMalfunction));
    }

    #[test]
    fn test_camera_checks() {
        let mut aggregator = started(HazardConfig::default());
        let mut inputs = healthy_inputs(50);
        inputs
            .telemetry
            .health
            .update(Service::WideRoadCameraState, |s| s.freq_ok = false);
        let prev = VehicleSnapshot::default();
        assert!(run(&mut aggregator, &running_ctx(&inputs, &prev))
            .contains(EventName::CameraFrameRate));

        inputs
            .telemetry
            .health
            .update(Service::WideRoadCameraState, |s| s.alive = false);
        assert!(run(&mut aggregator, &running_ctx(&inputs, &prev))
            .contains(EventName::CameraMalfunction));

        aggregator.ignore_alive(Service::WideRoadCameraState);
        inputs
            .telemetry
            .health
            .update(Service::WideRoadCameraState, |s| s.freq_ok = true);
        assert!(!run(&mut aggregator, &running_ctx(&inputs, &prev))
            .contains(EventName::CameraMalfunction));
    }

    #[test]
    fn test_lagging_reported_except_in_replay() {
        let inputs = healthy_inputs(50);
        let prev = VehicleSnapshot::default();
        let mut ctx = running_ctx(&inputs, &prev);
        ctx.lagging = true;

        let mut aggregator = started(HazardConfig::default());
        assert!(run(&mut aggregator, &ctx).contains(EventName::ControlsdLagging));

        let mut aggregator = started(HazardConfig {
            run_mode: RunMode::Replay,
            ..Default::default()
        });
        assert!(!run(&mut aggregator, &ctx).contains(EventName::ControlsdLagging));
    }

    #[test]
    fn test_radar_fault_unless_radarless() {
        let mut inputs = healthy_inputs(50);
        inputs.telemetry.radar_errors = vec!["canError".to_string()];
        let prev = VehicleSnapshot::default();

        let mut aggregator = started(HazardConfig::default());
        assert!(run(&mut aggregator, &running_ctx(&inputs, &prev)).contains(EventName::RadarFault));

        let mut aggregator = started(HazardConfig {
            car: CarParams {
                radarless: true,
                ..Default::default()
            },
            ..Default::default()
        });
        assert!(!run(&mut aggregator, &running_ctx(&inputs, &prev)).contains(EventName::RadarFault));
    }

    #[test]
    fn test_can_timeout_wins_over_can_error() {
        let mut aggregator = started(HazardConfig::default());
        let mut inputs = healthy_inputs(50);
        inputs.car.can_valid = false;
        inputs.car.can_timeout = true;
        let prev = VehicleSnapshot::default();

        let events = run(&mut aggregator, &running_ctx(&inputs, &prev));
        assert!(events.contains(EventName::CanBusMissing));
        assert!(!events.contains(EventName::CanError));
    }

    #[test]
    fn test_comm_issue_variants() {
        let prev = VehicleSnapshot::default();

        let mut aggregator = started(HazardConfig::default());
        let mut inputs = healthy_inputs(50);
        inputs
            .telemetry
            .health
            .update(Service::ModelV2, |s| s.freq_ok = false);
        let events = run(&mut aggregator, &running_ctx(&inputs, &prev));
        assert!(events.contains(EventName::CommIssueAvgFreq));
        assert!(aggregator.logged_comm_issue.is_some());

        inputs
            .telemetry
            .health
            .update(Service::ModelV2, |s| s.alive = false);
        let events = run(&mut aggregator, &running_ctx(&inputs, &prev));
        assert!(events.contains(EventName::CommIssue));

        let mut inputs = healthy_inputs(50);
        inputs.can_rcv_timeout = true;
        let events = run(&mut aggregator, &running_ctx(&inputs, &prev));
        assert!(events.contains(EventName::CommIssue));

        let inputs = healthy_inputs(50);
        let events = run(&mut aggregator, &running_ctx(&inputs, &prev));
        assert!(!events.contains(EventName::CommIssue));
        assert!(aggregator.logged_comm_issue.is_none());
    }

    #[test]
    fn test_comm_issue_suppressed_by_specific_event() {
        let mut aggregator = started(HazardConfig::default());
        let mut inputs = healthy_inputs(50);
        inputs
            .telemetry
            .health
            .update(Service::PandaStates, |s| s.valid = false);
        let prev = VehicleSnapshot::default();

        let events = run(&mut aggregator, &running_ctx(&inputs, &prev));
        assert!(events.contains(EventName::UsbError));
        assert!(!events.contains(EventName::CommIssue));
    }

    #[test]
    fn test_localization_faults() {
        let mut aggregator = started(HazardConfig::default());
        let mut inputs = healthy_inputs(50);
        inputs.telemetry.localization.posenet_ok = false;
        let prev = VehicleSnapshot::default();

        let events = run(&mut aggregator, &running_ctx(&inputs, &prev));
        assert!(events.contains(EventName::PosenetInvalid));
        assert!(!events.contains(EventName::DeviceFalling));

        inputs.telemetry.localization.posenet_ok = true;
        inputs.telemetry.localization.device_stable = false;
        let events = run(&mut aggregator, &running_ctx(&inputs, &prev));
        assert!(events.contains(EventName::DeviceFalling));
        assert!(!events.contains(EventName::PosenetInvalid));
    }

    #[test]
    fn test_localization_skipped_for_joystick_robot() {
        let mut inputs = healthy_inputs(50);
        inputs.telemetry.localization.posenet_ok = false;
        inputs.telemetry.live_parameters.valid = false;
        let prev = VehicleSnapshot::default();

        let mut aggregator = started(HazardConfig::default());
        let events = run(&mut aggregator, &running_ctx(&inputs, &prev));
        assert!(events.contains(EventName::PosenetInvalid));
        assert!(events.contains(EventName::ParamsdTemporaryError));

        let mut aggregator = started(HazardConfig {
            car: CarParams {
                not_car: true,
                ..Default::default()
            },
            ..Default::default()
        });
        let mut ctx = running_ctx(&inputs, &prev);
        ctx.joystick_mode = true;
        let events = run(&mut aggregator, &ctx);
        assert!(!events.contains(EventName::PosenetInvalid));
        assert!(!events.contains(EventName::ParamsdTemporaryError));
    }

    #[test]
    fn test_live_parameters_not_checked_in_testing_closet() {
        let mut inputs = healthy_inputs(50);
        inputs.telemetry.live_parameters.valid = false;
        let prev = VehicleSnapshot::default();

        let mut aggregator = started(HazardConfig {
            run_mode: RunMode::TestingCloset,
            ..Default::default()
        });
        assert!(!run(&mut aggregator, &running_ctx(&inputs, &prev))
            .contains(EventName::ParamsdTemporaryError));
    }
}
