use super::tiers::{TierState, TierTable};
use crate::types::Tier;

mod from_config;
pub use from_config::from_config;

/// Admission control: decides which tier may start its next pending subset.
///
/// The engine runs one admission phase after every event, calling `begin_phase` once and then
/// `next_tier` until it returns `None`, starting one worker from the returned tier each time.
/// Implementations must only return tiers with pending subsets.
pub trait Policy {
    fn begin_phase(&mut self) {}

    fn next_tier(&mut self, tiers: &TierTable) -> Option<Tier>;
}

impl Policy for Box<dyn Policy> {
    #[inline]
    fn begin_phase(&mut self) {
        (**self).begin_phase()
    }

    #[inline]
    fn next_tier(&mut self, tiers: &TierTable) -> Option<Tier> {
        (**self).next_tier(tiers)
    }
}

fn admissible(t: &TierState) -> bool {
    t.has_pending() && t.has_capacity()
}

/// Every tier admits on its own, up to its own cap
#[derive(Debug, Default)]
pub struct Concurrent;

impl Policy for Concurrent {
    fn next_tier(&mut self, tiers: &TierTable) -> Option<Tier> {
        tiers.iter().find(|t| admissible(t)).map(|t| t.tier)
    }
}

/// Only the first tier, in precedence order, that still has work may admit
#[derive(Debug, Default)]
pub struct Sequential;

impl Policy for Sequential {
    fn next_tier(&mut self, tiers: &TierTable) -> Option<Tier> {
        tiers
            .iter()
            .find(|t| !t.is_drained())
            .filter(|t| admissible(t))
            .map(|t| t.tier)
    }
}

/// A global cap shared by all tiers, which take one slot each per pass.
///
/// Every admission phase starts its pass at LARGE, so with a cap of one the order degenerates
/// to LARGE first, like `Sequential`.
///
/// Tiers only alternate within a phase that has several free slots. Once the cap is reached,
/// slots free up one at a time and each goes to the highest-precedence tier with pending work,
/// so SMALL waits until LARGE and MEDIUM run out of pending subsets. A cursor kept across
/// phases would spread freed slots over the tiers instead.
#[derive(Debug)]
pub struct RoundRobin {
    max_concurrent_workers: usize,
    cursor: usize,
}

impl RoundRobin {
    pub fn new(max_concurrent_workers: usize) -> Self {
        Self {
            max_concurrent_workers,
            cursor: 0,
        }
    }
}

impl Policy for RoundRobin {
    fn begin_phase(&mut self) {
        self.cursor = 0;
    }

    fn next_tier(&mut self, tiers: &TierTable) -> Option<Tier> {
        if tiers.total_active() >= self.max_concurrent_workers {
            return None;
        }
        let order = Tier::PRECEDENCE;
        (0..order.len())
            .map(|k| (self.cursor + k) % order.len())
            .find(|&idx| tiers.get(order[idx]).has_pending())
            .map(|idx| {
                self.cursor = (idx + 1) % order.len();
                order[idx]
            })
    }
}
