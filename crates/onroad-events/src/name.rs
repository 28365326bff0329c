//! Event catalog

use crate::category::Categories;
use serde::{Deserialize, Serialize};

const PERMANENT: Categories = Categories::PERMANENT;
const NO_ENTRY: Categories = Categories::NO_ENTRY;
const WARNING: Categories = Categories::WARNING;

/// Blocks engagement and soft-disables when already engaged
const SOFT_FAULT: Categories = Categories::SOFT_DISABLE.with(NO_ENTRY);
/// Blocks engagement and disengages on the spot
const HARD_FAULT: Categories = Categories::IMMEDIATE_DISABLE.with(NO_ENTRY);

/// Every event the supervisor, the car interface, or driver monitoring can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventName {
    // Startup and static
    Startup,
    StartupMaster,
    StartupNoControl,
    StartupNoCar,
    StartupNoFw,
    DashcamMode,
    CarUnrecognized,
    SoundsUnavailable,
    JoystickDebug,
    ControlsInitializing,

    // Driver input
    ButtonEnable,
    PcmEnable,
    ButtonCancel,
    PcmDisable,
    PedalPressed,
    PreEnableStandstill,
    GasPressedOverride,
    SteerOverride,
    ResumeBlocked,
    BrakeHold,
    ParkBrake,

    // Car interface
    WrongGear,
    ReverseGear,
    DoorOpen,
    SeatbeltNotLatched,
    EspDisabled,
    WrongCarMode,
    WrongCruiseMode,
    CruiseDisabled,
    AccFaulted,
    SteerTempUnavailable,
    SteerTempUnavailableSilent,
    SteerUnavailable,
    BelowEngageSpeed,
    BelowSteerSpeed,
    SpeedTooLow,
    SpeedTooHigh,
    LowSpeedLockout,
    VehicleSensorsInvalid,
    ManualRestart,

    // Driver monitoring
    PreDriverDistracted,
    PromptDriverDistracted,
    DriverDistracted,
    PreDriverUnresponsive,
    PromptDriverUnresponsive,
    DriverUnresponsive,
    TooDistracted,

    // Device health
    Overheat,
    OutOfSpace,
    LowMemory,
    FanMalfunction,

    // Calibration
    CalibrationIncomplete,
    CalibrationRecalibrating,
    CalibrationInvalid,

    // Lane change
    PreLaneChangeLeft,
    PreLaneChangeRight,
    LaneChange,
    LaneChangeBlocked,
    LaneChangeBlockedLoud,
    NoLaneAvailable,

    // Safety processor and CAN
    ControlsMismatch,
    RelayMalfunction,
    UsbError,
    CanError,
    CanBusMissing,

    // System health
    ProcessNotRunning,
    CameraMalfunction,
    CameraFrameRate,
    RoadCameraError,
    WideRoadCameraError,
    DriverCameraError,
    ControlsdLagging,
    RadarFault,
    CommIssue,
    CommIssueAvgFreq,
    PosenetInvalid,
    DeviceFalling,
    LocationdTemporaryError,
    ParamsdTemporaryError,
    SensorDataInvalid,
    CruiseMismatch,
    ModeldLagging,
    NoGps,

    // Driving warnings
    Fcw,
    Ldw,
    SteerSaturated,
}

impl EventName {
    /// Categories this event belongs to.
    ///
    /// Fixed at compile time so category tests never look anything up.
    pub const fn categories(self) -> Categories {
        use EventName::*;

        match self {
            Startup | StartupMaster | StartupNoControl | StartupNoCar | StartupNoFw => PERMANENT,
            DashcamMode | CarUnrecognized => PERMANENT,
            SoundsUnavailable => PERMANENT.with(NO_ENTRY),
            JoystickDebug => WARNING.with(PERMANENT),
            ControlsInitializing => NO_ENTRY,

            ButtonEnable | PcmEnable => Categories::ENABLE,
            ButtonCancel => Categories::USER_DISABLE.with(NO_ENTRY),
            PcmDisable => Categories::USER_DISABLE,
            PedalPressed | BrakeHold | ParkBrake => Categories::USER_DISABLE.with(NO_ENTRY),
            PreEnableStandstill => Categories::PRE_ENABLE,
            GasPressedOverride => Categories::OVERRIDE_LONGITUDINAL,
            SteerOverride => Categories::OVERRIDE_LATERAL,
            ResumeBlocked => NO_ENTRY,

            WrongGear | DoorOpen | SeatbeltNotLatched | EspDisabled => SOFT_FAULT,
            ReverseGear => HARD_FAULT.with(PERMANENT),
            WrongCarMode | WrongCruiseMode => Categories::USER_DISABLE.with(NO_ENTRY),
            CruiseDisabled | SpeedTooLow => Categories::IMMEDIATE_DISABLE,
            AccFaulted | SteerUnavailable => HARD_FAULT.with(PERMANENT),
            SteerTempUnavailable => WARNING.with(NO_ENTRY),
            SteerTempUnavailableSilent | BelowSteerSpeed | ManualRestart => WARNING,
            BelowEngageSpeed => NO_ENTRY,
            SpeedTooHigh => WARNING.with(NO_ENTRY),
            LowSpeedLockout => PERMANENT.with(NO_ENTRY),
            VehicleSensorsInvalid => HARD_FAULT,

            PreDriverDistracted | PromptDriverDistracted | DriverDistracted => WARNING,
            PreDriverUnresponsive | PromptDriverUnresponsive | DriverUnresponsive => WARNING,
            TooDistracted => NO_ENTRY,

            Overheat | LowMemory => SOFT_FAULT.with(PERMANENT),
            OutOfSpace => PERMANENT.with(NO_ENTRY),
            FanMalfunction => PERMANENT,

            CalibrationIncomplete | CalibrationRecalibrating | CalibrationInvalid => {
                SOFT_FAULT.with(PERMANENT)
            }

            PreLaneChangeLeft | PreLaneChangeRight | LaneChange => WARNING,
            LaneChangeBlocked | LaneChangeBlockedLoud | NoLaneAvailable => WARNING,

            ControlsMismatch | CanBusMissing => HARD_FAULT,
            CanError => HARD_FAULT.with(PERMANENT),
            RelayMalfunction => HARD_FAULT.with(PERMANENT),
            UsbError => SOFT_FAULT.with(PERMANENT),

            ProcessNotRunning | ControlsdLagging | RadarFault => SOFT_FAULT,
            CameraMalfunction | CameraFrameRate | SensorDataInvalid => SOFT_FAULT.with(PERMANENT),
            RoadCameraError | WideRoadCameraError | DriverCameraError => PERMANENT,
            CommIssue | CommIssueAvgFreq => SOFT_FAULT,
            PosenetInvalid | DeviceFalling | LocationdTemporaryError | ParamsdTemporaryError => {
                SOFT_FAULT
            }
            ModeldLagging => SOFT_FAULT,
            CruiseMismatch | NoGps => PERMANENT,

            Fcw | Ldw => PERMANENT,
            SteerSaturated => WARNING,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventCategory;

    #[test]
    fn test_relay_malfunction_is_fatal() {
        let categories = EventName::RelayMalfunction.categories();
        assert!(categories.has(EventCategory::ImmediateDisable));
        assert!(categories.has(EventCategory::NoEntry));
    }

    #[test]
    fn test_can_error_keeps_permanent_alert() {
        let categories = EventName::CanError.categories();
        assert!(categories.has(EventCategory::ImmediateDisable));
        assert!(categories.has(EventCategory::NoEntry));
        assert!(categories.has(EventCategory::Permanent));
    }

    #[test]
    fn test_pedal_press_is_user_disable() {
        assert!(EventName::PedalPressed
            .categories()
            .has(EventCategory::UserDisable));
    }

    #[test]
    fn test_gas_override_is_not_disabling() {
        let categories = EventName::GasPressedOverride.categories();
        assert!(categories.has(EventCategory::OverrideLongitudinal));
        assert!(!categories.has(EventCategory::UserDisable));
        assert!(!categories.has(EventCategory::NoEntry));
    }

    #[test]
    fn test_health_failures_block_entry_and_disable() {
        for name in [
            EventName::ProcessNotRunning,
            EventName::CameraMalfunction,
            EventName::RadarFault,
            EventName::UsbError,
            EventName::CanError,
            EventName::CanBusMissing,
            EventName::ControlsdLagging,
        ] {
            let categories = name.categories();
            assert!(categories.has(EventCategory::NoEntry), "{name:?}");
            assert!(
                categories.intersects(Categories::SOFT_DISABLE | Categories::IMMEDIATE_DISABLE),
                "{name:?}"
            );
        }
    }

    #[test]
    fn test_names_use_camel_case() {
        use serde::de::value::{Error, StrDeserializer};
        use serde::de::IntoDeserializer;

        let de: StrDeserializer<'_, Error> = "controlsdLagging".into_deserializer();
        assert_eq!(EventName::deserialize(de).unwrap(), EventName::ControlsdLagging);
    }
}
