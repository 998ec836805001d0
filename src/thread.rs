use std::collections::VecDeque;

use serde::Serialize;

use crate::cost::TimedItem;
use crate::types::{Duration, Time};
use crate::utils::prelude::*;

/// One processed item on a thread's timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TaskRecord {
    /// position of the item in its subset
    pub position: usize,
    pub size_bytes: u64,
    pub start: Time,
    pub end: Time,
}

impl TaskRecord {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// A simulated thread of a worker.
///
/// Items are assigned up front by the worker, then dispatched one at a time by the engine,
/// strictly in assignment order. At most one item is in flight at any time.
#[derive(Debug, Clone)]
pub struct SimThread {
    id: usize,
    queue: VecDeque<TimedItem>,
    in_flight: Option<TaskRecord>,
    busy_until: Time,
    start_time: Time,
    completion_time: Time,
    tasks: Vec<TaskRecord>,
    total_bytes: u64,
    busy_time: Duration,
}

impl SimThread {
    pub fn new(id: usize, start_time: Time) -> Self {
        Self {
            id,
            queue: Default::default(),
            in_flight: None,
            busy_until: start_time,
            start_time,
            completion_time: start_time,
            tasks: vec![],
            total_bytes: 0,
            busy_time: Duration::ZERO,
        }
    }

    /// Append an item to this thread's queue, pushing `busy_until` back by its duration
    pub fn assign(&mut self, item: TimedItem) {
        self.busy_until += item.duration;
        self.queue.push_back(item);
    }

    /// Start the next queued item at `now`, returns when it completes.
    /// `None` if nothing is left to run.
    pub fn dispatch(&mut self, now: Time) -> Result<Option<Time>> {
        if let Some(task) = &self.in_flight {
            return Err(Error::invariant(format!(
                "thread {} dispatched at {} while item {} is still running",
                self.id, now, task.position
            )));
        }
        Ok(self.queue.pop_front().map(|item| {
            let task = TaskRecord {
                position: item.position,
                size_bytes: item.size_bytes,
                start: now,
                end: now + item.duration,
            };
            trace!(thread = self.id, item = task.position, start = %task.start, end = %task.end, "dispatch");
            self.in_flight = Some(task);
            task.end
        }))
    }

    /// Record completion of the in-flight item at `now`
    pub fn complete(&mut self, now: Time) -> Result<TaskRecord> {
        let task = self.in_flight.take().ok_or_else(|| {
            Error::invariant(format!("thread {} has no running item to complete at {}", self.id, now))
        })?;
        if task.end != now {
            return Err(Error::invariant(format!(
                "item {} on thread {} ends at {} but completed at {}",
                task.position, self.id, task.end, now
            )));
        }
        self.total_bytes += task.size_bytes;
        self.busy_time += task.duration();
        self.completion_time = now;
        self.tasks.push(task);
        Ok(task)
    }

    /// Nothing queued and nothing running
    pub fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_none()
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn busy_until(&self) -> Time {
        self.busy_until
    }

    pub fn start_time(&self) -> Time {
        self.start_time
    }

    /// When the last item finished, or the start time for a thread that got no work
    pub fn completion_time(&self) -> Time {
        self.completion_time
    }

    /// Time from the worker's start until this thread finished
    pub fn elapsed(&self) -> Duration {
        self.completion_time - self.start_time
    }

    pub fn tasks(&self) -> &[TaskRecord] {
        &self.tasks
    }

    pub fn tasks_processed(&self) -> usize {
        self.tasks.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Sum of durations of processed items
    pub fn busy_time(&self) -> Duration {
        self.busy_time
    }
}
