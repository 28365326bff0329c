//! Onroad Events
//!
//! Every hazard the supervisor can raise is an [`EventName`]. Each name maps
//! to a fixed set of [`EventCategory`] tags, and the engagement state machine
//! only ever asks whether a category is present in the current [`EventSet`].

mod category;
mod name;
mod set;

pub use category::{Categories, EventCategory};
pub use name::EventName;
pub use set::EventSet;
