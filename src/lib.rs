use std::path::PathBuf;

use crate::config::{AppConfigExt, SimConfig};
use crate::engine::Simulation;
use crate::report::Report;
use crate::types::Subset;
use crate::utils::prelude::*;

pub mod config;
pub mod cost;
pub mod engine;
pub mod generate;
pub mod input;
pub mod output;
pub mod report;
pub mod straggler;
pub mod thread;
pub mod types;
pub mod utils;
pub mod worker;

/// Simulate `subsets` under `config` and classify stragglers
pub fn simulate(config: SimConfig, subsets: Vec<Subset>) -> Result<Report> {
    let _g = info_span!("sim").entered();

    let outcome = Simulation::new(config, subsets)?.run()?;
    let analysis = straggler::analyze(&outcome.workers, outcome.config.straggler_threshold_percent);
    info!(
        analyzable = analysis.analyzable_workers(),
        straggler_workers = analysis.straggler_workers(),
        straggler_threads = analysis.straggler_threads(),
        "straggler analysis"
    );
    Ok(Report::new(&outcome, &analysis))
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input_dir: PathBuf,
    pub skip_invalid: bool,
    pub output_name: String,
    pub with_csv: bool,
}

/// Scan the input tree, simulate it with the global configuration and write all reports
pub fn run_sim(opts: &RunOptions) -> Result<Report> {
    let (sim, out_dir) = {
        let cfg = config();
        (cfg.sim_config()?, cfg.output_dir()?)
    };

    let scan = input::scan_dir(&opts.input_dir, opts.skip_invalid)?;
    let report = simulate(sim, scan.subsets)?;

    {
        let _g = info_span!("output").entered();
        output::render_all(&out_dir, &opts.output_name, &report, opts.with_csv)?;
    }

    Ok(report)
}
