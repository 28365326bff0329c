//! Hazard Aggregation
//!
//! Fuses the vehicle snapshot and subsystem telemetry of one control cycle
//! into an [`EventSet`](onroad_events::EventSet). Every rule is evaluated
//! every cycle; the aggregator keeps only the bookkeeping needed for edge
//! detection and log de-duplication.

mod aggregator;
mod health;
mod mode;
mod thresholds;

pub use aggregator::{
    CycleContext, HazardAggregator, HazardConfig, MismatchCounts, OffroadAlert,
};
pub use health::CommIssueDetail;
pub use mode::RunMode;
pub use thresholds::{CycleThresholds, ThresholdError};
