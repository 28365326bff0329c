//! Event categories and the category bitset

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Category tag attached to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventCategory {
    Enable,
    PreEnable,
    OverrideLateral,
    OverrideLongitudinal,
    NoEntry,
    Warning,
    UserDisable,
    SoftDisable,
    ImmediateDisable,
    Permanent,
}

impl EventCategory {
    /// All categories in bit order
    pub const ALL: [EventCategory; 10] = [
        EventCategory::Enable,
        EventCategory::PreEnable,
        EventCategory::OverrideLateral,
        EventCategory::OverrideLongitudinal,
        EventCategory::NoEntry,
        EventCategory::Warning,
        EventCategory::UserDisable,
        EventCategory::SoftDisable,
        EventCategory::ImmediateDisable,
        EventCategory::Permanent,
    ];

    /// Bit used for this category inside [`Categories`]
    pub const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// A small set of categories stored as a bitmask.
///
/// Membership tests are a single `AND`; the union of every event in a cycle
/// is accumulated as events are added.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Categories(u16);

impl Categories {
    pub const EMPTY: Categories = Categories(0);

    pub const ENABLE: Categories = Categories::of(EventCategory::Enable);
    pub const PRE_ENABLE: Categories = Categories::of(EventCategory::PreEnable);
    pub const OVERRIDE_LATERAL: Categories = Categories::of(EventCategory::OverrideLateral);
    pub const OVERRIDE_LONGITUDINAL: Categories =
        Categories::of(EventCategory::OverrideLongitudinal);
    pub const NO_ENTRY: Categories = Categories::of(EventCategory::NoEntry);
    pub const WARNING: Categories = Categories::of(EventCategory::Warning);
    pub const USER_DISABLE: Categories = Categories::of(EventCategory::UserDisable);
    pub const SOFT_DISABLE: Categories = Categories::of(EventCategory::SoftDisable);
    pub const IMMEDIATE_DISABLE: Categories = Categories::of(EventCategory::ImmediateDisable);
    pub const PERMANENT: Categories = Categories::of(EventCategory::Permanent);

    /// Either axis of driver override
    pub const OVERRIDE: Categories =
        Categories(Self::OVERRIDE_LATERAL.0 | Self::OVERRIDE_LONGITUDINAL.0);

    /// Set containing a single category
    pub const fn of(category: EventCategory) -> Self {
        Categories(category.bit())
    }

    /// Union of two sets, usable in const context
    pub const fn with(self, other: Categories) -> Self {
        Categories(self.0 | other.0)
    }

    /// True if `category` is a member
    pub const fn has(self, category: EventCategory) -> bool {
        self.0 & category.bit() != 0
    }

    /// True if any member of `other` is present
    pub const fn intersects(self, other: Categories) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, category: EventCategory) {
        self.0 |= category.bit();
    }

    /// Iterate members in bit order
    pub fn iter(self) -> impl Iterator<Item = EventCategory> {
        EventCategory::ALL.into_iter().filter(move |c| self.has(*c))
    }

    pub const fn bits(self) -> u16 {
        self.0
    }
}

impl BitOr for Categories {
    type Output = Categories;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.with(rhs)
    }
}

impl BitOrAssign for Categories {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl From<EventCategory> for Categories {
    fn from(category: EventCategory) -> Self {
        Categories::of(category)
    }
}

impl FromIterator<EventCategory> for Categories {
    fn from_iter<I: IntoIterator<Item = EventCategory>>(iter: I) -> Self {
        let mut set = Categories::EMPTY;
        for category in iter {
            set.insert(category);
        }
        set
    }
}

impl fmt::Debug for Categories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for Categories {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for Categories {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let members = Vec::<EventCategory>::deserialize(deserializer)?;
        Ok(members.into_iter().collect())
    }
}
