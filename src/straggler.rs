//! Post-run classification of slow threads and the workers containing them.
//!
//! A thread is compared against the mean elapsed time of its *sibling* threads, leaving the
//! thread itself out so a single slow thread can not inflate its own baseline. Elapsed time is
//! measured from the worker's start, so workers admitted late are judged like early ones.
//! Workers with a single thread have no siblings and are never flagged.

use serde::Serialize;
use statrs::statistics::Statistics;

use crate::types::Tier;
use crate::utils::float;
use crate::worker::{Worker, WorkerId};

/// Threads finishing below `max(median * IDLE_FRACTION, IDLE_FLOOR)` did no meaningful work
const IDLE_FRACTION: f64 = 0.1;
const IDLE_FLOOR: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadVerdict {
    pub thread: usize,
    /// time from worker start until the thread finished
    pub elapsed: f64,
    /// mean elapsed time of the other threads, `None` without siblings
    pub mean_of_others: Option<f64>,
    /// how far above `mean_of_others`, in percent
    pub delay_percent: Option<f64>,
    pub is_straggler: bool,
    pub is_idle: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerVerdict {
    pub worker: WorkerId,
    pub tier: Tier,
    /// at least two threads to compare
    pub analyzable: bool,
    pub is_straggler: bool,
    pub threads: Vec<ThreadVerdict>,
}

impl WorkerVerdict {
    pub fn straggler_threads(&self) -> impl Iterator<Item = &ThreadVerdict> {
        self.threads.iter().filter(|t| t.is_straggler)
    }

    pub fn idle_threads(&self) -> impl Iterator<Item = &ThreadVerdict> {
        self.threads.iter().filter(|t| t.is_idle)
    }

    pub fn has_idle_threads(&self) -> bool {
        self.threads.iter().any(|t| t.is_idle)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierStragglers {
    pub tier: Tier,
    pub total_workers: usize,
    pub analyzable_workers: usize,
    pub straggler_workers: usize,
    pub straggler_threads: usize,
    /// share of analyzable workers that straggle
    pub straggler_percent: f64,
    pub workers_with_idle_threads: usize,
    pub workers_with_straggler_and_idle: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StragglerAnalysis {
    pub threshold_percent: f64,
    /// indexed by `WorkerId`
    pub workers: Vec<WorkerVerdict>,
    /// in tier precedence order
    pub by_tier: Vec<TierStragglers>,
}

impl StragglerAnalysis {
    pub fn straggler_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.is_straggler).count()
    }

    pub fn straggler_threads(&self) -> usize {
        self.workers
            .iter()
            .map(|w| w.straggler_threads().count())
            .sum()
    }

    pub fn analyzable_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.analyzable).count()
    }

    pub fn tier(&self, tier: Tier) -> &TierStragglers {
        &self.by_tier[tier.index()]
    }
}

/// Upper median, the element at `len / 2` once sorted
fn upper_median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(float::total_cmp);
    sorted[sorted.len() / 2]
}

pub fn classify_worker(worker: &Worker, threshold_percent: f64) -> WorkerVerdict {
    let elapsed: Vec<f64> = worker.threads().iter().map(|t| t.elapsed().0).collect();
    let analyzable = elapsed.len() >= 2;
    let factor = 1.0 + threshold_percent / 100.0;
    let idle_below = if analyzable {
        (upper_median(&elapsed) * IDLE_FRACTION).max(IDLE_FLOOR)
    } else {
        f64::NEG_INFINITY
    };

    let threads: Vec<_> = worker
        .threads()
        .iter()
        .zip(&elapsed)
        .enumerate()
        .map(|(i, (thread, &e))| {
            let mean_of_others = if analyzable {
                let others = elapsed
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, v)| *v);
                Some(others.mean())
            } else {
                None
            };
            ThreadVerdict {
                thread: thread.id(),
                elapsed: e,
                mean_of_others,
                delay_percent: mean_of_others
                    .filter(|m| *m > 0.0)
                    .map(|m| (e - m) / m * 100.0),
                is_straggler: mean_of_others.map_or(false, |m| e > m * factor),
                is_idle: e < idle_below,
            }
        })
        .collect();

    WorkerVerdict {
        worker: worker.id(),
        tier: worker.tier(),
        analyzable,
        is_straggler: threads.iter().any(|t| t.is_straggler),
        threads,
    }
}

/// Classify every thread and worker; read-only over completed workers
pub fn analyze(workers: &[Worker], threshold_percent: f64) -> StragglerAnalysis {
    let verdicts: Vec<_> = workers
        .iter()
        .map(|w| classify_worker(w, threshold_percent))
        .collect();

    let by_tier = Tier::PRECEDENCE
        .iter()
        .map(|&tier| {
            let in_tier: Vec<_> = verdicts.iter().filter(|v| v.tier == tier).collect();
            let analyzable_workers = in_tier.iter().filter(|v| v.analyzable).count();
            let straggler_workers = in_tier.iter().filter(|v| v.is_straggler).count();
            TierStragglers {
                tier,
                total_workers: in_tier.len(),
                analyzable_workers,
                straggler_workers,
                straggler_threads: in_tier.iter().map(|v| v.straggler_threads().count()).sum(),
                straggler_percent: if analyzable_workers > 0 {
                    straggler_workers as f64 / analyzable_workers as f64 * 100.0
                } else {
                    0.0
                },
                workers_with_idle_threads: in_tier.iter().filter(|v| v.has_idle_threads()).count(),
                workers_with_straggler_and_idle: in_tier
                    .iter()
                    .filter(|v| v.is_straggler && v.has_idle_threads())
                    .count(),
            }
        })
        .collect();

    StragglerAnalysis {
        threshold_percent,
        workers: verdicts,
        by_tier,
    }
}
