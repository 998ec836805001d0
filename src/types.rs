use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Deref, Mul, Sub};

use parse_display::{Display, FromStr};
use serde::{Deserialize, Serialize};

use crate::utils::float;

/// A time point in simulation
#[derive(Debug, Clone, Copy, Default, Display, Serialize, Deserialize)]
#[display("{0}")]
pub struct Time(pub f64);

/// A duration of time in simulation
#[derive(Debug, Clone, Copy, Default, Display, Serialize, Deserialize)]
#[display("{0}")]
pub struct Duration(pub f64);

// Times are ordered with `total_cmp`, so they can key the event heap.
macro_rules! total_order {
    ($ty:ident) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                float::total_eq(&self.0, &other.0)
            }
        }

        impl Eq for $ty {}

        impl PartialOrd for $ty {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $ty {
            fn cmp(&self, other: &Self) -> Ordering {
                float::total_cmp(&self.0, &other.0)
            }
        }
    };
}

total_order!(Time);
total_order!(Duration);

impl Time {
    pub const ZERO: Time = Time(0.0);
}

impl Duration {
    pub const ZERO: Duration = Duration(0.0);
}

impl Deref for Duration {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<f64> for Time {
    fn from(v: f64) -> Self {
        Time(v)
    }
}

impl Add<Duration> for Time {
    type Output = Time;

    fn add(self, rhs: Duration) -> Self::Output {
        Time(self.0 + rhs.0)
    }
}

impl AddAssign<Duration> for Time {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

impl Sub for Time {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Self::Output {
        Duration(self.0 - rhs.0)
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Self) -> Self::Output {
        Duration(self.0 + rhs.0)
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Mul<f64> for Duration {
    type Output = Duration;

    fn mul(self, rhs: f64) -> Self::Output {
        Duration(self.0 * rhs)
    }
}

impl Sum for Duration {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Duration::ZERO, Add::add)
    }
}

/// Size tier of a subset, each tier has its own thread count and concurrency settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, FromStr, Serialize, Deserialize)]
#[display(style = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Small,
    Medium,
    Large,
}

impl Tier {
    /// Fixed precedence used for every tie between tiers
    pub const PRECEDENCE: [Tier; 3] = [Tier::Large, Tier::Medium, Tier::Small];

    /// Dense index for per-tier tables
    pub fn index(self) -> usize {
        match self {
            Tier::Large => 0,
            Tier::Medium => 1,
            Tier::Small => 2,
        }
    }
}

/// An indivisible unit of work, e.g. one SSTable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub size_bytes: u64,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            id: id.into(),
            size_bytes,
        }
    }
}

/// A batch of work items in file order, processed by exactly one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subset {
    pub migration_id: String,
    pub label: String,
    pub subset_id: u64,
    pub tier: Tier,
    /// as declared by the producer, not necessarily `items.len()`
    pub num_items: usize,
    /// as declared by the producer, not necessarily the sum of item sizes
    pub declared_size_bytes: u64,
    pub items: Vec<WorkItem>,
}

impl Subset {
    /// A subset whose declared counts match its items
    pub fn new(subset_id: u64, tier: Tier, items: Vec<WorkItem>) -> Self {
        Self {
            migration_id: String::new(),
            label: String::new(),
            subset_id,
            tier,
            num_items: items.len(),
            declared_size_bytes: items
                .iter()
                .fold(0, |acc: u64, i| acc.saturating_add(i.size_bytes)),
            items,
        }
    }

    /// Sum of item sizes, `None` if it does not fit in a `u64`
    pub fn checked_total_bytes(&self) -> Option<u64> {
        self.items
            .iter()
            .try_fold(0u64, |acc, i| acc.checked_add(i.size_bytes))
    }

    /// Sum of item sizes, saturating at `u64::MAX`
    pub fn total_bytes(&self) -> u64 {
        self.checked_total_bytes().unwrap_or(u64::MAX)
    }
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Subset({}, {}, items: {}, bytes: {})",
            self.tier,
            self.subset_id,
            self.items.len(),
            self.total_bytes()
        )
    }
}
