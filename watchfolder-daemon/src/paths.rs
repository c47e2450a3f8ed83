use std::path::{Path, PathBuf};
use std::time::Duration;

pub use watchfolder_core::store::state_dir_at;

pub const DAEMON_SOCKET: &str = "watchfolder.sock";

/// How often the task runner drains due recheck tasks.
pub const RUNNER_TICK: Duration = Duration::from_millis(250);

pub fn socket_path(home: &Path) -> PathBuf {
    state_dir_at(home).join(DAEMON_SOCKET)
}
