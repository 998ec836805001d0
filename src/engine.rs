use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use educe::Educe;
use itertools::Itertools;
use parse_display::Display;

use crate::config::SimConfig;
use crate::cost::CostModel;
use crate::types::{Subset, Tier, Time};
use crate::utils::prelude::*;
use crate::worker::{Worker, WorkerId};

pub mod policies;
pub mod tiers;

use policies::Policy;
use tiers::TierTable;

/// An item on `thread` of `worker` finishes at `time`.
/// Ordered by time, then by the order events were posted.
#[derive(Debug, Clone, Copy, Display, Educe)]
#[educe(PartialEq, Eq, PartialOrd, Ord)]
#[display("@{time} -> worker {worker} thread {thread}")]
pub struct CompletionEvent {
    pub time: Time,
    pub seq: u64,
    #[educe(PartialEq(ignore))]
    #[educe(PartialOrd(ignore))]
    #[educe(Ord(ignore))]
    pub worker: WorkerId,
    #[educe(PartialEq(ignore))]
    #[educe(PartialOrd(ignore))]
    #[educe(Ord(ignore))]
    pub thread: usize,
}

/// Everything left once the event queue runs dry
#[derive(Debug, Clone)]
pub struct SimOutcome {
    pub config: SimConfig,
    /// clock at termination
    pub total_time: Time,
    /// indexed by `WorkerId`
    pub workers: Vec<Worker>,
    /// workers in the order they completed
    pub completion_order: Vec<WorkerId>,
    /// events in the order they were handled
    pub processed_events: Vec<CompletionEvent>,
}

/// The multi-tier discrete event engine.
///
/// One virtual clock, one min-heap of completion events, and a table of workers that events
/// refer to by id. Each step first runs an admission phase under the configured policy, then
/// handles the earliest pending event.
pub struct Simulation {
    config: SimConfig,
    cost: CostModel,
    policy: Box<dyn Policy>,

    time: Time,
    future_events: BinaryHeap<Reverse<CompletionEvent>>,
    next_seq: u64,
    processed_events: Vec<CompletionEvent>,

    tiers: TierTable,
    workers: Vec<Worker>,
    completion_order: Vec<WorkerId>,

    cancel: Option<Arc<AtomicBool>>,
}

/// Subset ids are unique per tier, and every byte count the run reports fits in a `u64`
fn check_subsets(subsets: &[Subset]) -> Result<()> {
    let mut seen = HashSet::new();
    let mut total: u64 = 0;
    for s in subsets {
        let name = format!("{}/{}", s.tier, s.subset_id);
        if !seen.insert((s.tier, s.subset_id)) {
            return Err(Error::invalid_input(
                name,
                format!("duplicate subset id {} in {} tier", s.subset_id, s.tier),
            ));
        }
        total = s
            .checked_total_bytes()
            .and_then(|bytes| total.checked_add(bytes))
            .ok_or_else(|| Error::invalid_input(name, "total input size exceeds u64::MAX bytes"))?;
    }
    Ok(())
}

impl Simulation {
    /// Validate the configuration against the input and queue every subset in its tier.
    /// Nothing is admitted yet.
    pub fn new(config: SimConfig, subsets: Vec<Subset>) -> Result<Self> {
        config.validate(&subsets)?;
        check_subsets(&subsets)?;
        let policy = policies::from_config(&config.policy)?;

        let mut tiers = TierTable::new(&config.tiers);
        // worker ids follow tier precedence, then ascending subset id
        let workers: Vec<_> = subsets
            .into_iter()
            .sorted_by_key(|s| (s.tier.index(), s.subset_id))
            .enumerate()
            .map(|(id, subset)| {
                let tier = tiers.get_mut(subset.tier);
                tier.pending.push_back(id);
                Worker::new(id, subset, tier.threads_per_worker)
            })
            .collect();

        info!(
            workers = workers.len(),
            large = tiers.get(Tier::Large).pending.len(),
            medium = tiers.get(Tier::Medium).pending.len(),
            small = tiers.get(Tier::Small).pending.len(),
            "simulation ready"
        );

        Ok(Self {
            cost: config.cost_model(),
            config,
            policy,
            time: Time::ZERO,
            future_events: Default::default(),
            next_seq: 0,
            processed_events: vec![],
            tiers,
            workers,
            completion_order: vec![],
            cancel: None,
        })
    }

    /// Poll `flag` once per step, a set flag aborts the run
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    fn post_event(&mut self, time: Time, worker: WorkerId, thread: usize) {
        let event = CompletionEvent {
            time,
            seq: self.next_seq,
            worker,
            thread,
        };
        self.next_seq += 1;
        trace!(time = %self.time, %event, "push event");
        self.future_events.push(Reverse(event));
    }

    /// Start workers for as long as the policy allows
    fn admit(&mut self) -> Result<()> {
        self.policy.begin_phase();
        while let Some(tier) = self.policy.next_tier(&self.tiers) {
            let state = self.tiers.get_mut(tier);
            let id = state.pending.pop_front().ok_or_else(|| {
                Error::invariant(format!("policy admitted from {} tier without pending subsets", tier))
            })?;
            state.active += 1;

            let started = self.workers[id].start(self.time, &self.cost)?;
            for (thread, end) in started {
                self.post_event(end, id, thread);
            }
            // empty subsets finish on the spot and hand their slot back
            if self.workers[id].is_completed() {
                self.retire(id)?;
            }
        }
        Ok(())
    }

    fn retire(&mut self, id: WorkerId) -> Result<()> {
        let worker = &self.workers[id];
        let tier = self.tiers.get_mut(worker.tier());
        tier.active = tier.active.checked_sub(1).ok_or_else(|| {
            Error::invariant(format!("{} tier has no active worker to retire", worker.tier()))
        })?;
        debug!(
            time = %self.time,
            worker = id,
            tier = %worker.tier(),
            subset = worker.subset().subset_id,
            "worker completed"
        );
        self.completion_order.push(id);
        Ok(())
    }

    /// One iteration of the control loop. Returns false once the simulation is over.
    pub fn step(&mut self) -> Result<bool> {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                warn!(time = %self.time, "simulation cancelled");
                return Err(Error::Cancelled(self.time.0));
            }
        }

        self.admit()?;

        let event = match self.future_events.pop() {
            Some(Reverse(event)) => event,
            None if self.tiers.has_pending() => {
                return Err(Error::invariant(format!(
                    "no events left at {} but subsets are still pending",
                    self.time
                )))
            }
            None => return Ok(false),
        };

        self.time = self.time.max(event.time);
        trace!(time = %self.time, %event, "handling event");
        self.processed_events.push(event);

        let worker = self
            .workers
            .get_mut(event.worker)
            .ok_or_else(|| Error::invariant(format!("event for unknown worker: {}", event)))?;
        if let Some(next) = worker.on_item_done(event.thread, self.time)? {
            self.post_event(next, event.worker, event.thread);
        }
        if self.workers[event.worker].is_completed() {
            self.retire(event.worker)?;
        }
        Ok(true)
    }

    /// Run until every subset is consumed
    pub fn run(mut self) -> Result<SimOutcome> {
        let _g = info_span!("simulate", policy = %self.config.policy).entered();

        while self.step()? {}

        if let Some(w) = self.workers.iter().find(|w| !w.is_completed()) {
            return Err(Error::invariant(format!(
                "simulation ended with worker {} still {}",
                w.id(),
                w.state()
            )));
        }

        info!(
            total_time = %self.time,
            events = self.processed_events.len(),
            workers = self.workers.len(),
            "simulation finished"
        );

        Ok(SimOutcome {
            config: self.config,
            total_time: self.time,
            workers: self.workers,
            completion_order: self.completion_order,
            processed_events: self.processed_events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyConfig;
    use crate::types::WorkItem;

    fn subset(id: u64, tier: Tier, sizes: &[u64]) -> Subset {
        let items = sizes
            .iter()
            .enumerate()
            .map(|(i, s)| WorkItem::new(format!("{}-{}", id, i), *s))
            .collect();
        Subset::new(id, tier, items)
    }

    fn config(policy: PolicyConfig, threads: usize, max_workers: usize) -> SimConfig {
        let mut cfg = SimConfig {
            policy,
            ..Default::default()
        };
        for tier in Tier::PRECEDENCE.iter() {
            let t = cfg.tiers.get_mut(*tier);
            t.threads = threads;
            t.max_workers = max_workers;
        }
        cfg
    }

    #[test]
    fn events_order_by_time_then_sequence() {
        let a = CompletionEvent {
            time: Time(5.0),
            seq: 3,
            worker: 9,
            thread: 0,
        };
        let b = CompletionEvent {
            time: Time(5.0),
            seq: 1,
            worker: 0,
            thread: 4,
        };
        let c = CompletionEvent {
            time: Time(2.0),
            seq: 7,
            worker: 1,
            thread: 1,
        };
        let mut heap: BinaryHeap<_> = vec![a, b, c].into_iter().map(Reverse).collect();
        let order: Vec<_> = std::iter::from_fn(|| heap.pop().map(|Reverse(e)| e.seq)).collect();
        assert_eq!(order, vec![7, 1, 3]);
    }

    #[test]
    fn empty_input_is_a_zero_length_run() {
        let outcome = Simulation::new(SimConfig::default(), vec![]).unwrap().run().unwrap();
        assert_eq!(outcome.total_time, Time::ZERO);
        assert!(outcome.workers.is_empty());
        assert!(outcome.processed_events.is_empty());
    }

    #[test]
    fn empty_subsets_do_not_stall_admission() {
        let subsets = vec![
            subset(1, Tier::Small, &[]),
            subset(2, Tier::Small, &[]),
            subset(3, Tier::Small, &[40]),
        ];
        let outcome = Simulation::new(config(PolicyConfig::Concurrent, 1, 1), subsets)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(outcome.total_time, Time(40.0));
        assert_eq!(outcome.completion_order, vec![0, 1, 2]);
        assert_eq!(outcome.workers[2].start_time(), Some(Time::ZERO));
    }

    #[test]
    fn duplicate_ids_in_a_tier_are_rejected() {
        let subsets = vec![subset(1, Tier::Small, &[1]), subset(1, Tier::Small, &[2])];
        assert!(matches!(
            Simulation::new(SimConfig::default(), subsets),
            Err(Error::InvalidInput { .. })
        ));
        // same id in different tiers is fine
        let subsets = vec![subset(1, Tier::Small, &[1]), subset(1, Tier::Large, &[2])];
        Simulation::new(SimConfig::default(), subsets).unwrap();
    }

    #[test]
    fn byte_totals_past_u64_are_rejected() {
        let big = u64::MAX / 2 + 1;
        // within one subset
        let subsets = vec![subset(1, Tier::Small, &[big, big])];
        assert!(matches!(
            Simulation::new(config(PolicyConfig::Concurrent, 1, 1), subsets),
            Err(Error::InvalidInput { .. })
        ));
        // across subsets, which would overflow the summary totals
        let subsets = vec![subset(1, Tier::Small, &[big]), subset(1, Tier::Large, &[big])];
        assert!(matches!(
            Simulation::new(config(PolicyConfig::Concurrent, 1, 1), subsets),
            Err(Error::InvalidInput { .. })
        ));
        // u64::MAX in total still runs
        let subsets = vec![subset(1, Tier::Small, &[big]), subset(1, Tier::Large, &[big - 1])];
        let outcome = Simulation::new(config(PolicyConfig::Concurrent, 1, 1), subsets)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(outcome.workers.iter().map(Worker::total_bytes).sum::<u64>(), u64::MAX);
    }

    #[test]
    fn invalid_config_fails_before_any_admission() {
        let cfg = config(
            PolicyConfig::RoundRobin {
                max_concurrent_workers: None,
            },
            1,
            1,
        );
        assert!(matches!(
            Simulation::new(cfg, vec![subset(1, Tier::Small, &[1])]),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn subsets_are_admitted_by_ascending_id() {
        let subsets = vec![
            subset(9, Tier::Medium, &[10]),
            subset(2, Tier::Medium, &[10]),
            subset(5, Tier::Medium, &[10]),
        ];
        let outcome = Simulation::new(config(PolicyConfig::Concurrent, 1, 1), subsets)
            .unwrap()
            .run()
            .unwrap();
        let ids: Vec<_> = outcome
            .completion_order
            .iter()
            .map(|id| outcome.workers[*id].subset().subset_id)
            .collect();
        assert_eq!(ids, vec![2, 5, 9]);
        assert_eq!(outcome.total_time, Time(30.0));
    }

    #[test]
    fn cancelled_run_fails() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut sim = Simulation::new(SimConfig::default(), vec![subset(1, Tier::Small, &[5, 5])])
            .unwrap()
            .with_cancel_flag(flag.clone());
        assert!(sim.step().unwrap());
        flag.store(true, Ordering::Relaxed);
        assert!(matches!(sim.step(), Err(Error::Cancelled(_))));
    }

    #[test]
    fn clock_never_rewinds() {
        let subsets = vec![
            subset(1, Tier::Large, &[300, 5]),
            subset(2, Tier::Medium, &[0, 70, 20, 20]),
            subset(3, Tier::Small, &[10, 0, 0, 90]),
            subset(4, Tier::Small, &[]),
        ];
        let outcome = Simulation::new(config(PolicyConfig::Concurrent, 2, 1), subsets)
            .unwrap()
            .run()
            .unwrap();
        assert!(outcome
            .processed_events
            .iter()
            .tuple_windows()
            .all(|(a, b)| a.time <= b.time));
        assert_eq!(outcome.total_time, Time(300.0));
    }
}
