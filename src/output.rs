use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::json;

use crate::config::OutputDir;
use crate::report::Report;
use crate::utils::prelude::*;

fn event_line(writer: impl io::Write, val: serde_json::Value) -> Result<()> {
    event_line_with_ending(writer, val, true)
}

fn event_line_with_ending(mut writer: impl io::Write, val: serde_json::Value, ending: bool) -> Result<()> {
    serde_json::to_writer(&mut writer, &val)?;
    if ending {
        writer.write_all(b",\n")?;
    }
    Ok(())
}

/// Chrome trace with one process per worker and one track per thread
pub fn render_chrome_trace(path: &Path, report: &Report) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(b"{\"traceEvents\":[\n")?;

    for worker in &report.workers {
        let pid = worker.worker_id;
        event_line(
            &mut file,
            json!({
                "name": "process_name",
                "ph": "M",
                "pid": pid,
                "args": {
                    "name": format!("{} subset {}", worker.tier, worker.subset_id),
                }
            }),
        )?;
        event_line(
            &mut file,
            json!({
                "name": "process_sort_index",
                "ph": "M",
                "pid": pid,
                "args": {
                    "sort_index": pid,
                }
            }),
        )?;
        // the whole worker lifetime on its own track
        event_line(
            &mut file,
            json!({
                "name": format!("Worker {}", pid),
                "ph": "X",
                "cat": if worker.is_straggler { "worker.straggler" } else { "worker" },
                "ts": worker.start_time,
                "dur": worker.duration,
                "tid": 0,
                "pid": pid,
                "args": {
                    "items": worker.item_count,
                    "bytes": worker.total_bytes,
                    "threads": worker.num_threads,
                    "cpu_efficiency_percent": worker.cpu_efficiency_percent,
                }
            }),
        )?;
    }

    for task in &report.tasks {
        event_line(
            &mut file,
            json!({
                "name": task.item_id,
                "ph": "X",
                "cat": "exec",
                "ts": task.start_time,
                "dur": task.duration,
                // track 0 is the worker span
                "tid": task.thread_id + 1,
                "pid": task.worker_id,
                "args": {
                    "position": task.position,
                    "bytes": task.size_bytes,
                }
            }),
        )?;
    }

    event_line_with_ending(
        &mut file,
        json!({
            "name": "Total",
            "ph": "C",
            "cat": "summary",
            "ts": report.summary.total_execution_time,
            "pid": 0,
            "args": {
                "stragglers": report.summary.straggler_workers,
            }
        }),
        false,
    )?;
    file.write_all(b"\n],\"config\":")?;
    serde_json::to_writer(&mut file, &report.summary.config)?;
    file.write_all(b"\n}")?;
    file.flush()?;
    Ok(())
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Per-worker rows
pub fn render_workers_csv(path: &Path, report: &Report) -> Result<()> {
    write_csv(path, &report.workers)
}

/// One row per processed item
pub fn render_tasks_csv(path: &Path, report: &Report) -> Result<()> {
    write_csv(path, &report.tasks)
}

/// Summary, worker and thread records as one JSON document
pub fn render_execution_report(path: &Path, report: &Report) -> Result<()> {
    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(
        file,
        &json!({
            "summary": report.summary,
            "workers": report.workers,
            "threads": report.threads,
        }),
    )?;
    Ok(())
}

/// Write every report file for `name` into `dir`, returns what was written
pub fn render_all(dir: &OutputDir, name: &str, report: &Report, with_csv: bool) -> Result<Vec<PathBuf>> {
    let _g = info_span!("output", name).entered();

    let mut written = vec![];
    if with_csv {
        let path = dir.file(format!("{}_workers.csv", name))?;
        render_workers_csv(&path, report)?;
        written.push(path);
        let path = dir.file(format!("{}_threads.csv", name))?;
        render_tasks_csv(&path, report)?;
        written.push(path);
    }
    let path = dir.file(format!("{}_summary.json", name))?;
    render_execution_report(&path, report)?;
    written.push(path);
    let path = dir.file(format!("{}_trace.json", name))?;
    render_chrome_trace(&path, report)?;
    written.push(path);

    for path in &written {
        info!(path = %path.display(), "report written");
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::engine::Simulation;
    use crate::straggler;
    use crate::types::{Subset, Tier, WorkItem};

    fn report() -> Report {
        let subsets = vec![
            Subset::new(1, Tier::Small, vec![WorkItem::new("a", 100), WorkItem::new("b", 10_000)]),
            Subset::new(2, Tier::Large, vec![WorkItem::new("c", 50)]),
        ];
        let outcome = Simulation::new(SimConfig::default(), subsets).unwrap().run().unwrap();
        let analysis = straggler::analyze(&outcome.workers, 20.0);
        Report::new(&outcome, &analysis)
    }

    #[test]
    fn all_files_are_written_and_parse() {
        let root = std::env::temp_dir().join(format!("tiersim-output-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let dir = OutputDir::new(&root);

        let written = render_all(&dir, "run", &report(), true).unwrap();
        assert_eq!(written.len(), 4);

        let trace: serde_json::Value =
            serde_json::from_reader(File::open(root.join("run_trace.json")).unwrap()).unwrap();
        assert!(trace["traceEvents"].as_array().unwrap().len() > 3);
        assert_eq!(trace["config"]["policy"]["type"], "concurrent");

        let summary: serde_json::Value =
            serde_json::from_reader(File::open(root.join("run_summary.json")).unwrap()).unwrap();
        assert_eq!(summary["summary"]["total_workers"], 2);
        assert_eq!(summary["summary"]["straggler_workers"], 1);

        let mut tasks = csv::Reader::from_path(root.join("run_threads.csv")).unwrap();
        assert_eq!(tasks.records().count(), 3);
        let mut workers = csv::Reader::from_path(root.join("run_workers.csv")).unwrap();
        let headers = workers.headers().unwrap().clone();
        assert!(headers.iter().any(|h| h == "is_straggler"));

        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn csv_can_be_left_out() {
        let root = std::env::temp_dir().join(format!("tiersim-output-nocsv-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let written = render_all(&OutputDir::new(&root), "run", &report(), false).unwrap();
        assert_eq!(written.len(), 2);
        assert!(!root.join("run_workers.csv").exists());
        std::fs::remove_dir_all(root).unwrap();
    }
}
