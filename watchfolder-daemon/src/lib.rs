//! Watch folder daemon: notify watcher + task runner + control socket.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod source;

pub use error::DaemonError;
pub use protocol::{request_status, request_stop, send_request, DaemonRequest, DaemonResponse};
pub use runtime::{init_tracing, run, start_blocking, DaemonStats};
