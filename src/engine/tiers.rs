use std::collections::VecDeque;

use crate::config::TierConfigs;
use crate::types::Tier;
use crate::worker::WorkerId;

/// Queue and concurrency bookkeeping of one tier
#[derive(Debug, Clone)]
pub struct TierState {
    pub tier: Tier,
    /// queued workers, ascending by subset id
    pub pending: VecDeque<WorkerId>,
    pub active: usize,
    pub threads_per_worker: usize,
    pub max_workers: usize,
}

impl TierState {
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn has_capacity(&self) -> bool {
        self.active < self.max_workers
    }

    /// Nothing left to admit and nothing running
    pub fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.active == 0
    }
}

/// The three tiers, stored in precedence order LARGE, MEDIUM, SMALL
#[derive(Debug, Clone)]
pub struct TierTable {
    tiers: [TierState; 3],
}

impl TierTable {
    pub fn new(cfg: &TierConfigs) -> Self {
        let state = |tier: Tier| {
            let c = cfg.get(tier);
            TierState {
                tier,
                pending: Default::default(),
                active: 0,
                threads_per_worker: c.threads,
                max_workers: c.max_workers,
            }
        };
        Self {
            tiers: [state(Tier::Large), state(Tier::Medium), state(Tier::Small)],
        }
    }

    pub fn get(&self, tier: Tier) -> &TierState {
        &self.tiers[tier.index()]
    }

    pub fn get_mut(&mut self, tier: Tier) -> &mut TierState {
        &mut self.tiers[tier.index()]
    }

    /// Tiers in precedence order
    pub fn iter(&self) -> impl Iterator<Item = &TierState> {
        self.tiers.iter()
    }

    pub fn total_active(&self) -> usize {
        self.tiers.iter().map(|t| t.active).sum()
    }

    pub fn has_pending(&self) -> bool {
        self.tiers.iter().any(TierState::has_pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_follows_precedence() {
        let table = TierTable::new(&TierConfigs::default());
        let order: Vec<_> = table.iter().map(|t| t.tier).collect();
        assert_eq!(order, Tier::PRECEDENCE.to_vec());
        assert_eq!(table.get(Tier::Small).threads_per_worker, 6);
        assert_eq!(table.get(Tier::Large).max_workers, 10);
    }

    #[test]
    fn drained_needs_no_pending_and_no_active() {
        let mut table = TierTable::new(&TierConfigs::default());
        assert!(table.get(Tier::Medium).is_drained());
        table.get_mut(Tier::Medium).active = 1;
        assert!(!table.get(Tier::Medium).is_drained());
        assert_eq!(table.total_active(), 1);
        table.get_mut(Tier::Medium).active = 0;
        table.get_mut(Tier::Medium).pending.push_back(4);
        assert!(!table.get(Tier::Medium).is_drained());
        assert!(table.has_pending());
    }
}
