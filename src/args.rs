//! Command-line argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// SFTP file bridge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file (default: platform config dir, or $SFTP_BRIDGE_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for rolling log files (default: platform log dir, or $SFTP_BRIDGE_LOG_DIR)
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Log at debug level (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Poll the remote directory on the configured schedule until Ctrl-C
    Run,
    /// Upload files to the remote upload directory
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Run a single polling pass and exit
    Poll,
}
