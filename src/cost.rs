use serde::{Deserialize, Serialize};

use crate::types::{Duration, Subset, WorkItem};

/// Turns declared item sizes into simulated processing durations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    /// simulated time units per byte
    pub cost_per_byte: f64,
}

impl CostModel {
    pub fn new(cost_per_byte: f64) -> Self {
        Self { cost_per_byte }
    }

    pub fn duration(&self, item: &WorkItem) -> Duration {
        Duration(item.size_bytes as f64 * self.cost_per_byte)
    }

    /// The subset's items in file order, each with its processing duration
    pub fn timed_items(&self, subset: &Subset) -> Vec<TimedItem> {
        subset
            .items
            .iter()
            .enumerate()
            .map(|(position, item)| TimedItem {
                position,
                size_bytes: item.size_bytes,
                duration: self.duration(item),
            })
            .collect()
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// A work item ready for scheduling.
/// `position` indexes the item in its subset, which is also its file order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedItem {
    pub position: usize,
    pub size_bytes: u64,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tier;
    use approx::assert_relative_eq;

    #[test]
    fn durations_follow_size() {
        let cost = CostModel::new(0.25);
        assert_relative_eq!(cost.duration(&WorkItem::new("a", 400)).0, 100.0);
        assert_relative_eq!(cost.duration(&WorkItem::new("z", 0)).0, 0.0);
    }

    #[test]
    fn timed_items_keep_file_order() {
        let subset = Subset::new(
            1,
            Tier::Medium,
            vec![
                WorkItem::new("c", 30),
                WorkItem::new("a", 10),
                WorkItem::new("b", 20),
            ],
        );
        let items = CostModel::default().timed_items(&subset);
        let positions: Vec<_> = items.iter().map(|i| i.position).collect();
        let sizes: Vec<_> = items.iter().map(|i| i.size_bytes).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(sizes, vec![30, 10, 20]);
        assert_relative_eq!(items[0].duration.0, 30.0);
    }
}
