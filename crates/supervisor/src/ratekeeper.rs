//! Loop timing and lag detection

use metrics::counter;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Samples in the moving average of cycle durations
const AVERAGE_WINDOW: usize = 100;
/// Average cycle time above `period / LAG_TOLERANCE` is lagging
const LAG_TOLERANCE: f64 = 0.9;

/// Tracks how far the loop runs behind its schedule
#[derive(Debug)]
pub struct RateKeeper {
    name: &'static str,
    period: Duration,
    /// Log when a cycle ends more than this behind schedule
    print_delay_threshold: Option<Duration>,
    next_frame_time: Option<Instant>,
    last_monitor: Option<Instant>,
    durations: VecDeque<f64>,
    sum: f64,
    remaining: f64,
    frame: u64,
    lagging: bool,
}

impl RateKeeper {
    pub fn new(name: &'static str, period: Duration, print_delay_threshold: Option<Duration>) -> Self {
        let mut keeper = Self {
            name,
            period,
            print_delay_threshold,
            next_frame_time: None,
            last_monitor: None,
            durations: VecDeque::with_capacity(AVERAGE_WINDOW),
            sum: 0.0,
            remaining: 0.0,
            frame: 0,
            lagging: false,
        };
        // one nominal sample, so the average is meaningful from the first cycle
        keeper.push(period.as_secs_f64());
        keeper
    }

    /// Record the end of a cycle at `now`, returning whether the loop lags
    pub fn monitor(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_monitor {
            self.push(now.duration_since(last).as_secs_f64());
        }
        self.last_monitor = Some(now);

        self.lagging = self.average() > self.period.as_secs_f64() / LAG_TOLERANCE;
        if self.lagging {
            counter!("supervisor_lagging_cycles_total").increment(1);
        }

        // the schedule never restarts, so a stall stays visible as cumulative lag
        let scheduled = *self.next_frame_time.get_or_insert(now + self.period);
        self.remaining = if scheduled >= now {
            scheduled.duration_since(now).as_secs_f64()
        } else {
            -now.duration_since(scheduled).as_secs_f64()
        };
        self.next_frame_time = Some(scheduled + self.period);

        if let Some(threshold) = self.print_delay_threshold {
            if -self.remaining > threshold.as_secs_f64() {
                warn!(
                    name = self.name,
                    lag_ms = -self.remaining * 1000.0,
                    frame = self.frame,
                    "Loop lagging"
                );
            }
        }

        self.frame += 1;
        self.lagging
    }

    fn push(&mut self, dt: f64) {
        if self.durations.len() == AVERAGE_WINDOW {
            if let Some(old) = self.durations.pop_front() {
                self.sum -= old;
            }
        }
        self.durations.push_back(dt);
        self.sum += dt;
    }

    /// Mean cycle duration over the window (s)
    pub fn average(&self) -> f64 {
        if self.durations.is_empty() {
            0.0
        } else {
            self.sum / self.durations.len() as f64
        }
    }

    pub fn lagging(&self) -> bool {
        self.lagging
    }

    /// Time left until this cycle's scheduled end, negative when behind.
    /// Lag accumulates across cycles (s)
    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }
}
