//! Time thresholds expressed in control cycles
//!
//! Every timed rule is specified in seconds and converted once, when the
//! tick period is known, so changing the loop rate keeps wall-clock meaning.

use std::time::Duration;
use thiserror::Error;

/// Errors building thresholds
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ThresholdError {
    #[error("tick period must be non-zero")]
    ZeroTick,
}

/// Cycle counts for every timed rule at a given tick period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleThresholds {
    pub tick: Duration,
    /// Grace window in soft-disabling before a forced disengage (3 s)
    pub soft_disable: u32,
    /// Time the safety processor gets to apply its mode at startup (10 s)
    pub safety_mode_grace: u64,
    /// Engaged-but-not-allowed cycles before declaring a mismatch (2 s)
    pub controls_mismatch: u32,
    /// Vehicle cruise engaged without us (6 s)
    pub cruise_mismatch: u32,
    /// Stalled fan tolerated since last confirmed spin (15 s)
    pub fan_grace: u64,
    /// IMU packets older than this are invalid (10 s)
    pub sensor_timeout: u64,
    /// Give up waiting for every service at startup (6 s)
    pub init_timeout: u64,
    /// Event list republished at least this often (1 s)
    pub events_publish: u64,
    /// Lane departure warnings muted after a blinker (5 s)
    pub blinker_cooldown: u64,
    /// Saturation warnings muted after driver steering input (2 s)
    pub steer_pressed_cooldown: u64,
    /// Joystick axes zeroed when the joystick goes quiet (0.2 s)
    pub joystick_timeout: u64,
}

impl CycleThresholds {
    pub fn from_tick(tick: Duration) -> Result<Self, ThresholdError> {
        if tick.is_zero() {
            return Err(ThresholdError::ZeroTick);
        }

        // nearest whole cycle, so periods like 1/60 s do not lose one
        let tick_ns = tick.as_nanos();
        let cycles = |d: Duration| {
            u64::try_from((d.as_nanos() + tick_ns / 2) / tick_ns).unwrap_or(u64::MAX)
        };
        let secs = |s: u64| cycles(Duration::from_secs(s));
        let secs_u32 = |s: u64| u32::try_from(secs(s)).unwrap_or(u32::MAX);

        Ok(Self {
            tick,
            soft_disable: secs_u32(3),
            safety_mode_grace: secs(10),
            controls_mismatch: secs_u32(2),
            cruise_mismatch: secs_u32(6),
            fan_grace: secs(15),
            sensor_timeout: secs(10),
            init_timeout: secs(6),
            events_publish: secs(1).max(1),
            blinker_cooldown: secs(5),
            steer_pressed_cooldown: secs(2),
            joystick_timeout: cycles(Duration::from_millis(200)),
        })
    }

    /// Tick period in seconds
    pub fn dt(&self) -> f32 {
        self.tick.as_secs_f32()
    }
}

impl Default for CycleThresholds {
    /// 100 Hz
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(10),
            soft_disable: 300,
            safety_mode_grace: 1000,
            controls_mismatch: 200,
            cruise_mismatch: 600,
            fan_grace: 1500,
            sensor_timeout: 1000,
            init_timeout: 600,
            events_publish: 100,
            blinker_cooldown: 500,
            steer_pressed_cooldown: 200,
            joystick_timeout: 20,
        }
    }
}
