//! Engagement
//!
//! Decides once per cycle whether automated actuation is permitted. The
//! transition function is pure over the category set of the cycle's events;
//! [`EngagementContext`] owns the mode, the soft-disable timer, and the
//! mismatch counters across cycles.

mod context;
mod mismatch;
mod state;

pub use context::{EngagementContext, Step};
pub use mismatch::MismatchTracker;
pub use state::{transition, ControlMode, Transition};
