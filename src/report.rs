use serde::Serialize;
use statrs::statistics::Statistics;

use crate::config::SimConfig;
use crate::engine::SimOutcome;
use crate::straggler::StragglerAnalysis;
use crate::types::Tier;
use crate::worker::Worker;

/// Per-worker result, times and bytes in the engine's own units
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerRecord {
    pub worker_id: usize,
    pub tier: Tier,
    pub subset_id: u64,
    pub migration_id: String,
    pub label: String,
    pub num_threads: usize,
    pub start_time: f64,
    pub completion_time: f64,
    pub duration: f64,
    pub item_count: usize,
    pub total_bytes: u64,
    pub is_straggler: bool,
    /// duration times thread count
    pub used_cpu_time: f64,
    /// time threads spent processing items
    pub active_cpu_time: f64,
    pub cpu_inefficiency: f64,
    pub cpu_efficiency_percent: f64,
    pub idle_threads: usize,
}

/// Per-thread result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadRecord {
    pub worker_id: usize,
    pub thread_id: usize,
    pub tier: Tier,
    pub subset_id: u64,
    pub start_time: f64,
    pub completion_time: f64,
    pub duration: f64,
    pub item_count: usize,
    pub total_bytes: u64,
    pub is_straggler: bool,
    pub is_idle: bool,
    pub delay_percent: Option<f64>,
}

/// One processed item on a thread's timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRow {
    pub worker_id: usize,
    pub thread_id: usize,
    pub tier: Tier,
    pub subset_id: u64,
    pub position: usize,
    pub item_id: String,
    pub size_bytes: u64,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierSummary {
    pub tier: Tier,
    pub workers: usize,
    pub threads: usize,
    pub total_bytes: u64,
    pub analyzable_workers: usize,
    pub straggler_workers: usize,
    pub straggler_threads: usize,
    pub straggler_percent: f64,
    pub workers_with_idle_threads: usize,
    pub workers_with_straggler_and_idle: usize,
    /// mean worker duration, 0 for an empty tier
    pub mean_worker_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_execution_time: f64,
    pub total_workers: usize,
    pub total_threads: usize,
    pub total_bytes: u64,
    pub analyzable_workers: usize,
    pub straggler_workers: usize,
    pub straggler_threads: usize,
    pub straggler_threshold_percent: f64,
    pub by_tier: Vec<TierSummary>,
    pub config: SimConfig,
}

/// The complete output of one simulation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub summary: Summary,
    pub workers: Vec<WorkerRecord>,
    pub threads: Vec<ThreadRecord>,
    pub tasks: Vec<TaskRow>,
}

fn worker_record(worker: &Worker, analysis: &StragglerAnalysis) -> WorkerRecord {
    let verdict = &analysis.workers[worker.id()];
    let start = worker.start_time().map_or(0.0, |t| t.0);
    let completion = worker.completion_time().map_or(start, |t| t.0);
    let duration = completion - start;
    let used = duration * worker.num_threads() as f64;
    let active: f64 = worker.threads().iter().map(|t| t.busy_time().0).sum();
    WorkerRecord {
        worker_id: worker.id(),
        tier: worker.tier(),
        subset_id: worker.subset().subset_id,
        migration_id: worker.subset().migration_id.clone(),
        label: worker.subset().label.clone(),
        num_threads: worker.num_threads(),
        start_time: start,
        completion_time: completion,
        duration,
        item_count: worker.items_processed(),
        total_bytes: worker.total_bytes(),
        is_straggler: verdict.is_straggler,
        used_cpu_time: used,
        active_cpu_time: active,
        cpu_inefficiency: used - active,
        cpu_efficiency_percent: if used > 0.0 { active / used * 100.0 } else { 0.0 },
        idle_threads: verdict.idle_threads().count(),
    }
}

fn thread_records<'a>(
    worker: &'a Worker,
    analysis: &'a StragglerAnalysis,
) -> impl Iterator<Item = ThreadRecord> + 'a {
    let verdict = &analysis.workers[worker.id()];
    worker
        .threads()
        .iter()
        .zip(&verdict.threads)
        .map(move |(thread, v)| ThreadRecord {
            worker_id: worker.id(),
            thread_id: thread.id(),
            tier: worker.tier(),
            subset_id: worker.subset().subset_id,
            start_time: thread.start_time().0,
            completion_time: thread.completion_time().0,
            duration: thread.elapsed().0,
            item_count: thread.tasks_processed(),
            total_bytes: thread.total_bytes(),
            is_straggler: v.is_straggler,
            is_idle: v.is_idle,
            delay_percent: v.delay_percent,
        })
}

fn task_rows(worker: &Worker) -> impl Iterator<Item = TaskRow> + '_ {
    worker.threads().iter().flat_map(move |thread| {
        thread.tasks().iter().map(move |task| TaskRow {
            worker_id: worker.id(),
            thread_id: thread.id(),
            tier: worker.tier(),
            subset_id: worker.subset().subset_id,
            position: task.position,
            item_id: worker
                .subset()
                .items
                .get(task.position)
                .map(|i| i.id.clone())
                .unwrap_or_default(),
            size_bytes: task.size_bytes,
            start_time: task.start.0,
            end_time: task.end.0,
            duration: task.duration().0,
        })
    })
}

impl Report {
    pub fn new(outcome: &SimOutcome, analysis: &StragglerAnalysis) -> Self {
        let workers: Vec<_> = outcome
            .workers
            .iter()
            .map(|w| worker_record(w, analysis))
            .collect();
        let threads: Vec<_> = outcome
            .workers
            .iter()
            .flat_map(|w| thread_records(w, analysis))
            .collect();
        let tasks: Vec<_> = outcome.workers.iter().flat_map(|w| task_rows(w)).collect();

        let by_tier = Tier::PRECEDENCE
            .iter()
            .map(|&tier| {
                let in_tier: Vec<_> = workers.iter().filter(|w| w.tier == tier).collect();
                let stragglers = analysis.tier(tier);
                TierSummary {
                    tier,
                    workers: in_tier.len(),
                    threads: in_tier.iter().map(|w| w.num_threads).sum(),
                    total_bytes: in_tier.iter().map(|w| w.total_bytes).sum(),
                    analyzable_workers: stragglers.analyzable_workers,
                    straggler_workers: stragglers.straggler_workers,
                    straggler_threads: stragglers.straggler_threads,
                    straggler_percent: stragglers.straggler_percent,
                    workers_with_idle_threads: stragglers.workers_with_idle_threads,
                    workers_with_straggler_and_idle: stragglers.workers_with_straggler_and_idle,
                    mean_worker_duration: if in_tier.is_empty() {
                        0.0
                    } else {
                        in_tier.iter().map(|w| w.duration).mean()
                    },
                }
            })
            .collect();

        let summary = Summary {
            total_execution_time: outcome.total_time.0,
            total_workers: workers.len(),
            total_threads: threads.len(),
            total_bytes: workers.iter().map(|w| w.total_bytes).sum(),
            analyzable_workers: analysis.analyzable_workers(),
            straggler_workers: analysis.straggler_workers(),
            straggler_threads: analysis.straggler_threads(),
            straggler_threshold_percent: analysis.threshold_percent,
            by_tier,
            config: outcome.config.clone(),
        };

        Report {
            summary,
            workers,
            threads,
            tasks,
        }
    }

    pub fn tier(&self, tier: Tier) -> &TierSummary {
        &self.summary.by_tier[tier.index()]
    }
}
