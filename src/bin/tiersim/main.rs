use structopt::StructOpt;
use tiersim::utils;
use tiersim::utils::prelude::*;

mod cli;
mod commands;

fn main() -> Result<()> {
    // panic setup should be done early
    utils::panic::setup();
    // basic logging setup
    let mut logging = utils::logging::setup()?;

    // initialize configuration
    utils::app_config::setup()?;

    let opt = cli::Opt::from_args();
    opt.load_config()?;
    // the config may change logging
    logging.reconfigure(opt.produces_output())?;

    trace!("Start cli execution");
    opt.execute()
}
