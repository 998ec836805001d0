use std::path::PathBuf;

use parse_display::{Display, FromStr};
use serde::Serialize;
use structopt::StructOpt;

use tiersim::config::{AppConfigExt, SimConfig};
use tiersim::generate;
use tiersim::report::Report;
use tiersim::types::Tier;
use tiersim::utils::app_config::AppConfig;
use tiersim::utils::prelude::*;
use tiersim::RunOptions;

/// Should be implemented by individual subcommand
pub trait Cmd {
    fn run(self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Display, FromStr)]
#[display(style = "snake_case")]
pub enum PolicyArg {
    Concurrent,
    Sequential,
    RoundRobin,
}

/// Simulate a directory of subset files
#[derive(StructOpt)]
pub struct Run {
    /// Root of the subset tree
    #[structopt(parse(from_os_str))]
    input_dir: PathBuf,

    /// concurrent, sequential or round_robin
    #[structopt(long)]
    policy: Option<PolicyArg>,

    /// Global cap on running workers, for round_robin
    #[structopt(long)]
    max_concurrent_workers: Option<usize>,

    /// Percent above the sibling mean that makes a thread a straggler
    #[structopt(long)]
    straggler_threshold: Option<f64>,

    /// Simulated time per byte
    #[structopt(long)]
    cost_per_byte: Option<f64>,

    #[structopt(long)]
    small_threads: Option<usize>,
    #[structopt(long)]
    small_max_workers: Option<usize>,
    #[structopt(long)]
    medium_threads: Option<usize>,
    #[structopt(long)]
    medium_max_workers: Option<usize>,
    #[structopt(long)]
    large_threads: Option<usize>,
    #[structopt(long)]
    large_max_workers: Option<usize>,

    /// Write reports here instead of the configured output_dir
    #[structopt(short, long, parse(from_os_str))]
    output_dir: Option<PathBuf>,

    /// Prefix of the report file names
    #[structopt(long, default_value = "simulation")]
    output_name: String,

    /// Only write the JSON reports
    #[structopt(long)]
    no_csv: bool,

    /// Log and skip malformed subset files instead of failing
    #[structopt(long)]
    skip_invalid: bool,
}

impl Run {
    pub fn override_config(&self, cfg: &mut AppConfig) -> Result<()> {
        if let Some(policy) = self.policy {
            cfg.set("sim.policy.type", policy.to_string())?;
        }
        if let Some(max) = self.max_concurrent_workers {
            cfg.set("sim.policy.max_concurrent_workers", max as i64)?;
        }
        if let Some(threshold) = self.straggler_threshold {
            cfg.set("sim.straggler_threshold_percent", threshold)?;
        }
        if let Some(cost) = self.cost_per_byte {
            cfg.set("sim.cost_per_byte", cost)?;
        }
        let tiers = [
            (Tier::Small, self.small_threads, self.small_max_workers),
            (Tier::Medium, self.medium_threads, self.medium_max_workers),
            (Tier::Large, self.large_threads, self.large_max_workers),
        ];
        for (tier, threads, max_workers) in tiers.iter() {
            let key = tier.to_string().to_lowercase();
            if let Some(n) = threads {
                cfg.set(&format!("sim.tiers.{}.threads", key), *n as i64)?;
            }
            if let Some(n) = max_workers {
                cfg.set(&format!("sim.tiers.{}.max_workers", key), *n as i64)?;
            }
        }
        if let Some(dir) = &self.output_dir {
            cfg.set("output_dir", dir.to_string_lossy().into_owned())?;
        }
        Ok(())
    }
}

fn print_summary(report: &Report) {
    let s = &report.summary;
    println!("Total execution time: {}", s.total_execution_time);
    println!(
        "Workers: {}  Threads: {}  Bytes: {}",
        s.total_workers, s.total_threads, s.total_bytes
    );
    println!(
        "Stragglers (>{}% over siblings): {} workers, {} threads, of {} analyzable workers",
        s.straggler_threshold_percent, s.straggler_workers, s.straggler_threads, s.analyzable_workers
    );
    for tier in &s.by_tier {
        println!(
            "  {:<6} workers {:>4}  threads {:>5}  stragglers {:>4} ({:.1}%)  idle {:>4}  mean duration {}",
            tier.tier,
            tier.workers,
            tier.threads,
            tier.straggler_workers,
            tier.straggler_percent,
            tier.workers_with_idle_threads,
            tier.mean_worker_duration
        );
    }
}

impl Cmd for Run {
    fn run(self) -> Result<()> {
        let opts = RunOptions {
            input_dir: self.input_dir,
            skip_invalid: self.skip_invalid,
            output_name: self.output_name,
            with_csv: !self.no_csv,
        };
        let report = tiersim::run_sim(&opts)?;
        print_summary(&report);
        Ok(())
    }
}

/// Write a reproducible synthetic subset tree
#[derive(StructOpt)]
pub struct Generate {
    #[structopt(parse(from_os_str))]
    output_dir: PathBuf,

    #[structopt(short, long, default_value = "50")]
    num_files: usize,

    #[structopt(short, long, default_value = "stripy zebra")]
    seed: String,
}

impl Cmd for Generate {
    fn run(self) -> Result<()> {
        let subsets = generate::generate(generate::seeded_rng(&self.seed), self.num_files);
        let written = generate::write_tree(&self.output_dir, &subsets)?;
        info!(files = written.len(), dir = %self.output_dir.display(), "generated subsets");
        Ok(())
    }
}

#[derive(Serialize)]
struct EffectiveConfig {
    output_dir: PathBuf,
    sim: SimConfig,
}

/// Show the effective configuration
#[derive(StructOpt)]
pub struct Config {}

impl Cmd for Config {
    fn run(self) -> Result<()> {
        let effective = {
            let cfg = config();
            EffectiveConfig {
                output_dir: cfg.get("output_dir")?,
                sim: cfg.sim_config()?,
            }
        };
        print!("{}", serde_yaml::to_string(&effective)?);

        Ok(())
    }
}
