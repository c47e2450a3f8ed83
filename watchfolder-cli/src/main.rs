//! watchfolder: folder-based change detection with checksum debounce.
//!
//! # Usage
//!
//! ```text
//! watchfolder [--config PATH] daemon start [--json]|stop|status
//! watchfolder [--config PATH] instance create <definition> [--id ID]
//! watchfolder [--config PATH] instance destroy|files <id>
//! watchfolder [--config PATH] instance list
//! watchfolder [--config PATH] resolve <path>
//! watchfolder checksum <file>
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand,
    inspect::{ChecksumArgs, ResolveArgs},
    instance::InstanceCommand,
};

#[derive(Parser, Debug)]
#[command(
    name = "watchfolder",
    version,
    about = "Watch folders and run actions once dropped files settle",
    long_about = None,
)]
struct Cli {
    /// Configuration file. Defaults to ./watchfolder.yaml.
    #[arg(long, global = true, env = "WATCHFOLDER_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run or control the watch folder daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Create, destroy and inspect watch folder instances.
    Instance {
        #[command(subcommand)]
        command: InstanceCommand,
    },

    /// Print the instance id that owns a path.
    Resolve(ResolveArgs),

    /// Print the content checksum of a file.
    Checksum(ChecksumArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Daemon { command } => commands::daemon::run(command, config),
        Commands::Instance { command } => commands::instance::run(command, config),
        Commands::Resolve(args) => args.run(config),
        Commands::Checksum(args) => args.run(),
    }
}
