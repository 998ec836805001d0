use std::path::PathBuf;

use structopt::clap::AppSettings;
use structopt::StructOpt;

use crate::commands::{self, Cmd};
use tiersim::utils::prelude::*;

#[derive(StructOpt)]
#[structopt(
    about = "Predict completion time and stragglers of a tiered data migration",
    global_settings = &[AppSettings::VersionlessSubcommands, AppSettings::ColoredHelp],
)]
pub struct Opt {
    /// Set a custom config file
    #[structopt(short, long, global = true, value_name = "FILE", parse(from_os_str))]
    config: Option<PathBuf>,

    /// Apply a preset from the config
    #[structopt(short, long, global = true, value_name = "NAME")]
    preset: Option<String>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt)]
enum Command {
    Run(commands::Run),
    Generate(commands::Generate),
    Config(commands::Config),
}

impl Opt {
    /// Merge the config file and preset into the global config, then command line overrides
    pub fn load_config(&self) -> Result<()> {
        let mut cfg = config_mut();
        if let Some(path) = &self.config {
            cfg.use_file(path)?;
        }
        if let Some(name) = &self.preset {
            cfg.use_preset(name)?;
        }
        match &self.cmd {
            Command::Run(run) => run.override_config(&mut cfg),
            _ => Ok(()),
        }
    }

    /// Whether the command prints its results to stdout
    pub fn produces_output(&self) -> bool {
        matches!(self.cmd, Command::Run(_) | Command::Config(_))
    }

    pub fn execute(self) -> Result<()> {
        match self.cmd {
            Command::Run(cmd) => cmd.run(),
            Command::Generate(cmd) => cmd.run(),
            Command::Config(cmd) => cmd.run(),
        }
    }
}
