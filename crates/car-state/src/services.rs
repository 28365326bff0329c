//! Liveness, frequency, and validity of subscribed services

use serde::{Deserialize, Serialize};

/// Telemetry streams the supervisor subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Service {
    DeviceState,
    PandaStates,
    PeripheralState,
    ModelV2,
    LiveCalibration,
    CarOutput,
    DriverMonitoringState,
    LongitudinalPlan,
    LiveLocationKalman,
    ManagerState,
    LiveParameters,
    RadarState,
    LiveTorqueParameters,
    TestJoystick,
    LanePlan,
    RoadCameraState,
    DriverCameraState,
    WideRoadCameraState,
    Accelerometer,
    Gyroscope,
}

impl Service {
    pub const COUNT: usize = 20;

    pub const ALL: [Service; Service::COUNT] = [
        Service::DeviceState,
        Service::PandaStates,
        Service::PeripheralState,
        Service::ModelV2,
        Service::LiveCalibration,
        Service::CarOutput,
        Service::DriverMonitoringState,
        Service::LongitudinalPlan,
        Service::LiveLocationKalman,
        Service::ManagerState,
        Service::LiveParameters,
        Service::RadarState,
        Service::LiveTorqueParameters,
        Service::TestJoystick,
        Service::LanePlan,
        Service::RoadCameraState,
        Service::DriverCameraState,
        Service::WideRoadCameraState,
        Service::Accelerometer,
        Service::Gyroscope,
    ];

    pub const CAMERAS: [Service; 3] = [
        Service::RoadCameraState,
        Service::DriverCameraState,
        Service::WideRoadCameraState,
    ];

    pub const SENSORS: [Service; 2] = [Service::Accelerometer, Service::Gyroscope];

    fn index(self) -> usize {
        self as usize
    }
}

/// A set of services stored as a bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceSet(u32);

impl ServiceSet {
    pub const EMPTY: ServiceSet = ServiceSet(0);

    pub fn from_services(services: &[Service]) -> Self {
        let mut set = Self::EMPTY;
        for &service in services {
            set.insert(service);
        }
        set
    }

    pub fn insert(&mut self, service: Service) {
        self.0 |= 1 << service.index();
    }

    pub fn contains(self, service: Service) -> bool {
        self.0 & (1 << service.index()) != 0
    }
}

/// Health of one service as seen by the sampling layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// A message arrived recently enough
    pub alive: bool,
    /// Average receive frequency is within tolerance
    pub freq_ok: bool,
    /// The last message was marked valid by its producer
    pub valid: bool,
    /// Control frame of the last received message, 0 if never received
    pub recv_frame: u64,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self {
            alive: true,
            freq_ok: true,
            valid: true,
            recv_frame: 0,
        }
    }
}

/// Health table for every subscribed service at one control frame
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceHealth {
    /// Control frame counter of the sampling layer
    pub frame: u64,
    status: [ServiceStatus; Service::COUNT],
}

impl ServiceHealth {
    pub fn new(frame: u64) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }

    pub fn status(&self, service: Service) -> ServiceStatus {
        self.status[service.index()]
    }

    pub fn set(&mut self, service: Service, status: ServiceStatus) {
        self.status[service.index()] = status;
    }

    pub fn update(&mut self, service: Service, f: impl FnOnce(&mut ServiceStatus)) {
        f(&mut self.status[service.index()]);
    }

    /// True once at least one message of `service` has arrived
    pub fn received(&self, service: Service) -> bool {
        self.status(service).recv_frame > 0
    }

    /// Frames elapsed since `service` last arrived
    pub fn frames_since(&self, service: Service) -> u64 {
        self.frame.saturating_sub(self.status(service).recv_frame)
    }

    /// Services marked not alive, ignoring any filter
    pub fn not_alive(&self) -> Vec<Service> {
        self.collect(|s| !s.alive)
    }

    /// Services with bad frequency, ignoring any filter
    pub fn not_freq_ok(&self) -> Vec<Service> {
        self.collect(|s| !s.freq_ok)
    }

    /// Services marked invalid, ignoring any filter
    pub fn invalid(&self) -> Vec<Service> {
        self.collect(|s| !s.valid)
    }

    /// True if every service passes `check`, skipping those in `ignore`
    pub fn all(
        &self,
        services: &[Service],
        ignore: ServiceSet,
        check: impl Fn(&ServiceStatus) -> bool,
    ) -> bool {
        services
            .iter()
            .filter(|s| !ignore.contains(**s))
            .all(|s| check(&self.status(*s)))
    }

    fn collect(&self, failing: impl Fn(&ServiceStatus) -> bool) -> Vec<Service> {
        Service::ALL
            .into_iter()
            .filter(|s| failing(&self.status(*s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_indices_match_all() {
        for (i, service) in Service::ALL.iter().enumerate() {
            assert_eq!(service.index(), i);
        }
    }

    #[test]
    fn test_ignore_set_skips_service() {
        let mut health = ServiceHealth::new(100);
        health.update(Service::RadarState, |s| s.alive = false);

        let ignore = ServiceSet::from_services(&[Service::RadarState]);
        assert!(health.all(&Service::ALL, ignore, |s| s.alive));
        assert!(!health.all(&Service::ALL, ServiceSet::EMPTY, |s| s.alive));
        assert_eq!(health.not_alive(), vec![Service::RadarState]);
    }

    #[test]
    fn test_frames_since_never_received() {
        let mut health = ServiceHealth::new(1500);
        assert!(!health.received(Service::Accelerometer));
        assert_eq!(health.frames_since(Service::Accelerometer), 1500);

        health.update(Service::Accelerometer, |s| s.recv_frame = 1490);
        assert!(health.received(Service::Accelerometer));
        assert_eq!(health.frames_since(Service::Accelerometer), 10);
    }
}
