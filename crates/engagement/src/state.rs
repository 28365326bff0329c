//! Engagement modes and the transition function

use onroad_events::{Categories, EventCategory};
use serde::{Deserialize, Serialize};

/// Engagement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlMode {
    #[default]
    Disabled,
    /// Engaged but holding actuation until the pre-enable condition clears
    PreEnabled,
    Enabled,
    /// Counting down to a forced disengage
    SoftDisabling,
    /// Driver input suspends one or both axes
    Overriding,
}

impl ControlMode {
    pub const ALL: [ControlMode; 5] = [
        ControlMode::Disabled,
        ControlMode::PreEnabled,
        ControlMode::Enabled,
        ControlMode::SoftDisabling,
        ControlMode::Overriding,
    ];

    /// The driver perceives the system as on
    pub fn enabled(self) -> bool {
        self != ControlMode::Disabled
    }

    /// Actuator commands are issued
    pub fn active(self) -> bool {
        matches!(
            self,
            ControlMode::Enabled | ControlMode::SoftDisabling | ControlMode::Overriding
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControlMode::Disabled => "disabled",
            ControlMode::PreEnabled => "preEnabled",
            ControlMode::Enabled => "enabled",
            ControlMode::SoftDisabling => "softDisabling",
            ControlMode::Overriding => "overriding",
        }
    }
}

/// Result of one transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub mode: ControlMode,
    /// Soft-disable timer after this cycle
    pub timer: u32,
    /// Categories the alert layer should render this cycle
    pub alert_types: Categories,
    /// The system just engaged from `Disabled`
    pub engaged: bool,
}

fn overriding(events: Categories) -> bool {
    events.intersects(Categories::OVERRIDE)
}

/// Compute the next mode from the current one and this cycle's categories.
///
/// The timer is decremented before anything else and re-armed to
/// `soft_disable_cycles` on every entry into `SoftDisabling`. A soft disable
/// forces `Disabled` on the cycle after the timer has reached zero.
pub fn transition(
    mode: ControlMode,
    timer: u32,
    events: Categories,
    soft_disable_cycles: u32,
) -> Transition {
    let remaining = timer;
    let mut next = Transition {
        mode,
        timer: timer.saturating_sub(1),
        alert_types: Categories::PERMANENT,
        engaged: false,
    };

    if mode != ControlMode::Disabled {
        // user and immediate disable preempt everything else
        if events.has(EventCategory::UserDisable) {
            next.mode = ControlMode::Disabled;
            next.alert_types |= Categories::USER_DISABLE;
        } else if events.has(EventCategory::ImmediateDisable) {
            next.mode = ControlMode::Disabled;
            next.alert_types |= Categories::IMMEDIATE_DISABLE;
        } else {
            match mode {
                ControlMode::Enabled | ControlMode::Overriding
                    if events.has(EventCategory::SoftDisable) =>
                {
                    next.mode = ControlMode::SoftDisabling;
                    next.timer = soft_disable_cycles;
                    next.alert_types |= Categories::SOFT_DISABLE;
                }
                ControlMode::Enabled => {
                    if overriding(events) {
                        next.mode = ControlMode::Overriding;
                        next.alert_types |= Categories::OVERRIDE;
                    }
                }
                ControlMode::Overriding => {
                    if overriding(events) {
                        next.alert_types |= Categories::OVERRIDE;
                    } else {
                        next.mode = ControlMode::Enabled;
                    }
                }
                ControlMode::SoftDisabling => {
                    if !events.has(EventCategory::SoftDisable) {
                        next.mode = ControlMode::Enabled;
                    } else if remaining > 0 {
                        next.alert_types |= Categories::SOFT_DISABLE;
                    } else {
                        next.mode = ControlMode::Disabled;
                    }
                }
                ControlMode::PreEnabled => {
                    if events.has(EventCategory::PreEnable) {
                        next.alert_types |= Categories::PRE_ENABLE;
                    } else {
                        next.mode = ControlMode::Enabled;
                    }
                }
                ControlMode::Disabled => {}
            }
        }
    } else if events.has(EventCategory::Enable) {
        if events.has(EventCategory::NoEntry) {
            next.alert_types |= Categories::NO_ENTRY;
        } else {
            next.mode = if events.has(EventCategory::PreEnable) {
                ControlMode::PreEnabled
            } else if overriding(events) {
                ControlMode::Overriding
            } else {
                ControlMode::Enabled
            };
            next.alert_types |= Categories::ENABLE;
            next.engaged = true;
        }
    }

    if next.mode.active() {
        next.alert_types |= Categories::WARNING;
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SOFT: u32 = 300;

    fn step(mode: ControlMode, timer: u32, events: Categories) -> Transition {
        transition(mode, timer, events, SOFT)
    }

    #[test]
    fn test_soft_disable_entry_and_recovery() {
        let t = step(ControlMode::Enabled, 0, Categories::SOFT_DISABLE);
        assert_eq!(t.mode, ControlMode::SoftDisabling);
        assert_eq!(t.timer, 300);

        let t = step(t.mode, t.timer, Categories::EMPTY);
        assert_eq!(t.mode, ControlMode::Enabled);
    }

    #[test]
    fn test_soft_disable_expires() {
        let t = step(ControlMode::SoftDisabling, 1, Categories::SOFT_DISABLE);
        assert_eq!(t.mode, ControlMode::SoftDisabling);
        assert_eq!(t.timer, 0);
        assert!(t.alert_types.has(EventCategory::SoftDisable));

        let t = step(t.mode, t.timer, Categories::SOFT_DISABLE);
        assert_eq!(t.mode, ControlMode::Disabled);
    }

    #[test]
    fn test_soft_disable_full_countdown() {
        let mut t = step(ControlMode::Enabled, 0, Categories::SOFT_DISABLE);
        let mut cycles = 0;
        while t.mode == ControlMode::SoftDisabling {
            let before = t.timer;
            t = step(t.mode, t.timer, Categories::SOFT_DISABLE);
            if t.mode == ControlMode::SoftDisabling {
                assert_eq!(t.timer, before - 1);
            }
            cycles += 1;
        }
        assert_eq!(t.mode, ControlMode::Disabled);
        assert_eq!(cycles, 301);
    }

    #[test]
    fn test_pre_enable_then_enabled() {
        let t = step(
            ControlMode::Disabled,
            0,
            Categories::ENABLE | Categories::PRE_ENABLE,
        );
        assert_eq!(t.mode, ControlMode::PreEnabled);
        assert!(t.engaged);
        assert!(!t.alert_types.has(EventCategory::Warning));

        let t = step(t.mode, t.timer, Categories::EMPTY);
        assert_eq!(t.mode, ControlMode::Enabled);
        assert!(!t.engaged);
        assert!(t.alert_types.has(EventCategory::Warning));
    }

    #[test]
    fn test_enable_into_override() {
        let t = step(
            ControlMode::Disabled,
            0,
            Categories::ENABLE | Categories::OVERRIDE_LONGITUDINAL,
        );
        assert_eq!(t.mode, ControlMode::Overriding);
        assert!(t.alert_types.has(EventCategory::Enable));
    }

    #[test]
    fn test_no_entry_blocks_enable() {
        let t = step(
            ControlMode::Disabled,
            0,
            Categories::ENABLE | Categories::NO_ENTRY,
        );
        assert_eq!(t.mode, ControlMode::Disabled);
        assert!(!t.engaged);
        assert!(t.alert_types.has(EventCategory::NoEntry));
    }

    #[test]
    fn test_no_entry_does_not_affect_active_state() {
        let t = step(ControlMode::Enabled, 0, Categories::NO_ENTRY);
        assert_eq!(t.mode, ControlMode::Enabled);
    }

    #[test]
    fn test_override_from_enabled_and_back() {
        let t = step(ControlMode::Enabled, 0, Categories::OVERRIDE_LATERAL);
        assert_eq!(t.mode, ControlMode::Overriding);
        assert!(t.alert_types.has(EventCategory::OverrideLongitudinal));

        let t = step(t.mode, t.timer, Categories::OVERRIDE_LATERAL);
        assert_eq!(t.mode, ControlMode::Overriding);

        let t = step(t.mode, t.timer, Categories::EMPTY);
        assert_eq!(t.mode, ControlMode::Enabled);
    }

    #[test]
    fn test_soft_disable_while_overriding() {
        let t = step(
            ControlMode::Overriding,
            0,
            Categories::SOFT_DISABLE | Categories::OVERRIDE_LATERAL,
        );
        assert_eq!(t.mode, ControlMode::SoftDisabling);
        assert_eq!(t.timer, SOFT);
    }

    #[test]
    fn test_always_permanent() {
        for mode in ControlMode::ALL {
            let t = step(mode, 0, Categories::EMPTY);
            assert!(t.alert_types.has(EventCategory::Permanent));
        }
    }

    fn categories() -> impl Strategy<Value = Categories> {
        any::<u16>().prop_map(|bits| {
            EventCategory::ALL
                .into_iter()
                .filter(|c| bits & c.bit() != 0)
                .collect()
        })
    }

    fn mode() -> impl Strategy<Value = ControlMode> {
        prop::sample::select(ControlMode::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_disable_preempts(mode in mode(), timer in 0u32..400, events in categories()) {
            prop_assume!(mode != ControlMode::Disabled);
            let events = events | Categories::USER_DISABLE;
            prop_assert_eq!(step(mode, timer, events).mode, ControlMode::Disabled);

            let events = events | Categories::IMMEDIATE_DISABLE;
            prop_assert_eq!(step(mode, timer, events).mode, ControlMode::Disabled);
        }

        #[test]
        fn prop_leaving_disabled_needs_enable_without_no_entry(
            timer in 0u32..400,
            events in categories(),
        ) {
            let t = step(ControlMode::Disabled, timer, events);
            let allowed = events.has(EventCategory::Enable) && !events.has(EventCategory::NoEntry);
            prop_assert_eq!(t.mode != ControlMode::Disabled, allowed);
            prop_assert_eq!(t.engaged, allowed);
        }

        #[test]
        fn prop_soft_disable_rearms(mode in mode(), timer in 0u32..400, events in categories()) {
            let t = step(mode, timer, events);
            if t.mode == ControlMode::SoftDisabling && mode != ControlMode::SoftDisabling {
                prop_assert_eq!(t.timer, SOFT);
            }
        }

        #[test]
        fn prop_timer_never_grows_without_rearm(
            mode in mode(),
            timer in 0u32..400,
            events in categories(),
        ) {
            let t = step(mode, timer, events);
            let rearmed = t.mode == ControlMode::SoftDisabling && mode != ControlMode::SoftDisabling;
            if !rearmed {
                prop_assert_eq!(t.timer, timer.saturating_sub(1));
            }
        }

        #[test]
        fn prop_enabled_is_stable(cycles in 1usize..200, warning in any::<bool>()) {
            let events = if warning { Categories::WARNING } else { Categories::EMPTY };
            let mut t = step(ControlMode::Enabled, 0, events);
            for _ in 0..cycles {
                prop_assert_eq!(t.mode, ControlMode::Enabled);
                t = step(t.mode, t.timer, events);
            }
            prop_assert_eq!(t.mode, ControlMode::Enabled);
        }

        #[test]
        fn prop_active_gets_warning(mode in mode(), timer in 0u32..400, events in categories()) {
            let t = step(mode, timer, events);
            prop_assert_eq!(t.alert_types.has(EventCategory::Warning), t.mode.active());
        }
    }
}
