//! Tokay CLI - the bridge process.
//!
//! Listens to the configured request exchange(s) for VFd requests, wraps
//! each into the JSON VFd expects, and writes it to VFd's request pipe.
//! Responses read back from the response pipe are wrapped into the
//! advertised reply format and published to the response exchange.
//!
//! Only the selected config section (default `tokay`) affects this process,
//! so several bridge instances can share one config file.

mod error;
mod runner;

use std::path::PathBuf;

use clap::{ArgAction, Parser};

#[derive(Parser)]
#[command(name = "tokay")]
#[command(version = tokay::VERSION)]
#[command(about = "Exchange request listener for VFd", long_about = None)]
#[command(disable_help_flag = true)]
// -V is the verbosity knob here, not the version flag
#[command(disable_version_flag = true)]
pub struct Cli {
    /// configuration file
    #[arg(short = 'c', value_name = "path", default_value = tokay::config::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// configuration file section
    #[arg(short = 's', value_name = "name", default_value = tokay::config::DEFAULT_SECTION)]
    pub section: String,

    /// dump raw json to the log
    #[arg(short = 'j')]
    pub jdump: bool,

    /// no-exec: log and drop messages instead of forwarding them
    #[arg(short = 'n')]
    pub no_exec: bool,

    /// broker port
    #[arg(short = 'P', value_name = "port")]
    pub port: Option<u16>,

    /// verbosity level n
    #[arg(short = 'V', value_name = "n", default_value_t = 0)]
    pub verbosity: u8,

    /// shorthand for -V 1
    #[arg(short = 'v')]
    pub verbose: bool,

    /// print additional usage details
    #[arg(short = '?', long = "help", action = ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    /// `-v` is shorthand for `-V 1` unless `-V` asked for more.
    pub fn effective_verbosity(&self) -> u8 {
        if self.verbosity == 0 && self.verbose {
            1
        } else {
            self.verbosity
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = runner::run(cli).await {
        e.exit();
    }

    // bypass the runtime teardown: a pipe read may still be parked on the
    // blocking pool and would otherwise hold the process open
    std::process::exit(0);
}
