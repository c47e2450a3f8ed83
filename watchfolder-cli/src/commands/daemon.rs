//! `watchfolder daemon`: foreground daemon and socket control.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use watchfolder_daemon::paths::socket_path;
use watchfolder_daemon::{request_status, request_stop, start_blocking, DaemonError};

use super::{home_dir, load_setup};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (watcher + task runner + socket).
    Start(StartArgs),
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Log JSON lines instead of human-readable text.
    #[arg(long)]
    pub json: bool,
}

pub fn run(command: DaemonCommand, config: Option<&Path>) -> Result<()> {
    let home = home_dir()?;

    match command {
        DaemonCommand::Start(args) => {
            let setup = load_setup(config)?;
            start_blocking(&home, setup, args.json).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => {
            let status = match request_status(&home) {
                Ok(status) => status,
                Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query daemon status"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&status)
                    .context("failed to render daemon status JSON")?
            );
        }
    }

    Ok(())
}
