use parse_display::Display;

use crate::cost::{CostModel, TimedItem};
use crate::thread::SimThread;
use crate::types::{Duration, Subset, Tier, Time};
use crate::utils::prelude::*;

/// Index of a worker in the engine's worker table
pub type WorkerId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum WorkerState {
    Queued,
    Running,
    Completed,
}

/// Distribute items over threads in file order, each to the thread that frees up earliest.
///
/// Ties go to the lowest thread index. Items are never reordered: the subsequence each thread
/// receives keeps its relative file order.
pub fn assign_earliest_available(items: impl IntoIterator<Item = TimedItem>, threads: &mut [SimThread]) {
    for item in items {
        // `min_by_key` keeps the first of equal minima, i.e. the lowest index
        match threads.iter_mut().min_by_key(|t| t.busy_until()) {
            Some(thread) => thread.assign(item),
            None => return,
        }
    }
}

/// A simulated multi-threaded worker, bound to one subset for its whole lifetime
#[derive(Debug, Clone)]
pub struct Worker {
    id: WorkerId,
    subset: Subset,
    num_threads: usize,
    state: WorkerState,
    threads: Vec<SimThread>,
    start_time: Option<Time>,
    completion_time: Option<Time>,
}

impl Worker {
    pub fn new(id: WorkerId, subset: Subset, num_threads: usize) -> Self {
        Self {
            id,
            subset,
            num_threads,
            state: WorkerState::Queued,
            threads: vec![],
            start_time: None,
            completion_time: None,
        }
    }

    /// Admit the worker at `now`: spread the subset over fresh threads and start the first item
    /// on each thread that got any. Returns `(thread, completion time)` of every started item.
    ///
    /// An empty subset completes right away.
    pub fn start(&mut self, now: Time, cost: &CostModel) -> Result<Vec<(usize, Time)>> {
        if self.state != WorkerState::Queued {
            return Err(Error::invariant(format!(
                "worker {} started at {} while {}",
                self.id, now, self.state
            )));
        }
        self.state = WorkerState::Running;
        self.start_time = Some(now);
        self.threads = (0..self.num_threads)
            .map(|id| SimThread::new(id, now))
            .collect();

        assign_earliest_available(cost.timed_items(&self.subset), &mut self.threads);

        let mut started = vec![];
        for thread in self.threads.iter_mut() {
            if let Some(end) = thread.dispatch(now)? {
                started.push((thread.id(), end));
            }
        }
        if started.is_empty() {
            self.finish(now);
        }
        debug!(
            worker = self.id,
            tier = %self.subset.tier,
            subset = self.subset.subset_id,
            items = self.subset.items.len(),
            busy_threads = started.len(),
            %now,
            "worker started"
        );
        Ok(started)
    }

    /// The item running on `thread` finished at `now`; start the next one queued on it, if any.
    /// Returns the completion time of the newly started item.
    pub fn on_item_done(&mut self, thread: usize, now: Time) -> Result<Option<Time>> {
        if self.state != WorkerState::Running {
            return Err(Error::invariant(format!(
                "completion event for thread {} of worker {} at {} while {}",
                thread, self.id, now, self.state
            )));
        }
        let id = self.id;
        let t = self
            .threads
            .get_mut(thread)
            .ok_or_else(|| Error::invariant(format!("worker {} has no thread {}", id, thread)))?;
        t.complete(now)?;
        let next = t.dispatch(now)?;

        if next.is_none() && self.threads.iter().all(SimThread::is_drained) {
            self.finish(now);
        }
        Ok(next)
    }

    fn finish(&mut self, now: Time) {
        let completion = self
            .threads
            .iter()
            .map(SimThread::completion_time)
            .max()
            .unwrap_or(now);
        self.state = WorkerState::Completed;
        self.completion_time = Some(completion);
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn tier(&self) -> Tier {
        self.subset.tier
    }

    pub fn subset(&self) -> &Subset {
        &self.subset
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state == WorkerState::Completed
    }

    pub fn threads(&self) -> &[SimThread] {
        &self.threads
    }

    pub fn start_time(&self) -> Option<Time> {
        self.start_time
    }

    pub fn completion_time(&self) -> Option<Time> {
        self.completion_time
    }

    pub fn duration(&self) -> Option<Duration> {
        Some(self.completion_time? - self.start_time?)
    }

    pub fn total_bytes(&self) -> u64 {
        self.threads.iter().map(SimThread::total_bytes).sum()
    }

    pub fn items_processed(&self) -> usize {
        self.threads.iter().map(SimThread::tasks_processed).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkItem;

    fn subset(sizes: &[u64]) -> Subset {
        let items = sizes
            .iter()
            .enumerate()
            .map(|(i, s)| WorkItem::new(format!("SST{}", i), *s))
            .collect();
        Subset::new(1, Tier::Medium, items)
    }

    /// Run a worker to completion without the engine, always advancing the earliest thread
    fn run(worker: &mut Worker, now: Time) -> Time {
        let mut pending = worker.start(now, &CostModel::default()).unwrap();
        while !pending.is_empty() {
            pending.sort_by_key(|(thread, end)| (*end, *thread));
            let (thread, end) = pending.remove(0);
            if let Some(next) = worker.on_item_done(thread, end).unwrap() {
                pending.push((thread, next));
            }
        }
        worker.completion_time().unwrap()
    }

    #[test]
    fn earliest_available_thread_gets_next_item() {
        let mut threads: Vec<_> = (0..3).map(|i| SimThread::new(i, Time::ZERO)).collect();
        let items = CostModel::default().timed_items(&subset(&[50, 10, 10, 10, 30]));
        assign_earliest_available(items, &mut threads);

        // 50 -> t0, 10 -> t1, 10 -> t2, 10 -> t1 (free at 10, before t2's tie), 30 -> t2
        assert_eq!(threads[0].busy_until(), Time(50.0));
        assert_eq!(threads[1].busy_until(), Time(20.0));
        assert_eq!(threads[2].busy_until(), Time(40.0));
    }

    #[test]
    fn single_thread_is_pure_fifo() {
        let mut worker = Worker::new(0, subset(&[5, 7, 11]), 1);
        let done = run(&mut worker, Time(100.0));
        assert_eq!(done, Time(123.0));
        let order: Vec<_> = worker.threads()[0].tasks().iter().map(|t| t.position).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn completion_is_latest_thread() {
        let mut worker = Worker::new(0, subset(&[100, 10_000]), 2);
        let done = run(&mut worker, Time::ZERO);
        assert_eq!(done, Time(10_000.0));
        assert_eq!(worker.threads()[0].completion_time(), Time(100.0));
        assert_eq!(worker.threads()[1].completion_time(), Time(10_000.0));
        assert_eq!(worker.total_bytes(), 10_100);
        assert_eq!(worker.items_processed(), 2);
        assert!(worker.is_completed());
    }

    #[test]
    fn per_thread_order_follows_file_order() {
        let mut worker = Worker::new(0, subset(&[9, 1, 4, 4, 2, 8, 3, 3, 7]), 3);
        run(&mut worker, Time::ZERO);
        for thread in worker.threads() {
            let positions: Vec<_> = thread.tasks().iter().map(|t| t.position).collect();
            let mut sorted = positions.clone();
            sorted.sort_unstable();
            assert_eq!(positions, sorted);
        }
        assert_eq!(worker.items_processed(), 9);
    }

    #[test]
    fn empty_subset_completes_instantly() {
        let mut worker = Worker::new(0, subset(&[]), 4);
        let started = worker.start(Time(7.0), &CostModel::default()).unwrap();
        assert!(started.is_empty());
        assert!(worker.is_completed());
        assert_eq!(worker.completion_time(), Some(Time(7.0)));
        assert_eq!(worker.duration(), Some(Duration::ZERO));
    }

    #[test]
    fn events_for_a_completed_worker_are_rejected() {
        let mut worker = Worker::new(0, subset(&[]), 1);
        worker.start(Time::ZERO, &CostModel::default()).unwrap();
        assert!(matches!(worker.on_item_done(0, Time::ZERO), Err(Error::Invariant(_))));
        assert!(matches!(
            worker.start(Time::ZERO, &CostModel::default()),
            Err(Error::Invariant(_))
        ));
    }
}
