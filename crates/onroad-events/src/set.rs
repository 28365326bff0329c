//! Per-cycle event set

use crate::category::{Categories, EventCategory};
use crate::name::EventName;

/// Events raised during one control cycle.
///
/// Cleared at the start of every cycle. Keeps insertion order for
/// publishing and the running union of categories so that category tests
/// are constant time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSet {
    names: Vec<EventName>,
    categories: Categories,
}

impl EventSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every event, keeping the allocation
    pub fn clear(&mut self) {
        self.names.clear();
        self.categories = Categories::EMPTY;
    }

    /// Add an event. Adding the same name twice counts twice in [`len`](Self::len).
    pub fn add(&mut self, name: EventName) {
        self.names.push(name);
        self.categories |= name.categories();
    }

    /// Merge events reported by another subsystem
    pub fn extend<I: IntoIterator<Item = EventName>>(&mut self, names: I) {
        for name in names {
            self.add(name);
        }
    }

    /// True if any event in the set carries `category`
    pub fn has(&self, category: EventCategory) -> bool {
        self.categories.has(category)
    }

    /// True if any event carries any of `categories`
    pub fn has_any(&self, categories: Categories) -> bool {
        self.categories.intersects(categories)
    }

    pub fn contains(&self, name: EventName) -> bool {
        self.names.contains(&name)
    }

    /// Union of the categories of every event
    pub fn categories(&self) -> Categories {
        self.categories
    }

    pub fn names(&self) -> &[EventName] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<EventName> for EventSet {
    fn from_iter<I: IntoIterator<Item = EventName>>(iter: I) -> Self {
        let mut set = EventSet::new();
        set.extend(iter);
        set
    }
}
