//! Control protocol spoken over the daemon's Unix socket.
//!
//! One JSON document per line in each direction:
//!
//! ```text
//! -> {"cmd":"status"}
//! <- {"ok":true,"data":{"running":true,...}}
//! -> {"cmd":"reload"}
//! <- {"ok":false,"error":"invalid request: unknown variant `reload`, ..."}
//! ```

use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// Status polls made while a freshly started daemon binds its socket.
const STARTUP_ATTEMPTS: u32 = 5;
const STARTUP_BACKOFF: Duration = Duration::from_millis(100);

/// Commands the daemon understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DaemonRequest {
    Status,
    Stop,
}

/// Reply envelope: `data` on success, `error` on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Unwrap the envelope; a failure reply becomes a protocol error.
    pub fn into_data(self) -> Result<Value, DaemonError> {
        match (self.ok, self.error) {
            (true, _) => Ok(self.data.unwrap_or(Value::Null)),
            (false, Some(message)) => Err(DaemonError::Protocol(message)),
            (false, None) => Err(DaemonError::Protocol("daemon reported a failure".into())),
        }
    }
}

/// Connection errors that mean nobody is listening on the socket.
fn is_not_running(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}

struct Client {
    socket: PathBuf,
    stream: UnixStream,
}

impl Client {
    fn connect(home: &Path) -> Result<Self, DaemonError> {
        let socket = socket_path(home);
        match UnixStream::connect(&socket) {
            Ok(stream) => Ok(Self { socket, stream }),
            Err(err) if is_not_running(&err) => Err(DaemonError::DaemonNotRunning { socket }),
            Err(err) => Err(io_err(socket, err)),
        }
    }

    fn call(self, request: DaemonRequest) -> Result<DaemonResponse, DaemonError> {
        let Client { socket, mut stream } = self;
        let mut line = serde_json::to_vec(&request)?;
        line.push(b'\n');
        stream.write_all(&line).map_err(|e| io_err(&socket, e))?;

        let mut reply = String::new();
        BufReader::new(stream)
            .read_line(&mut reply)
            .map_err(|e| io_err(&socket, e))?;
        if reply.trim().is_empty() {
            return Err(DaemonError::Protocol(format!(
                "no reply from daemon at {}",
                socket.display()
            )));
        }
        Ok(serde_json::from_str(&reply)?)
    }
}

/// Send one request to the daemon running under `home`.
pub fn send_request(home: &Path, request: DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    Client::connect(home)?.call(request)
}

/// Fetch the status payload. A daemon that is still starting gets a few
/// short retries before it counts as not running.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let mut attempt = 1;
    loop {
        match send_request(home, DaemonRequest::Status) {
            Err(DaemonError::DaemonNotRunning { .. }) if attempt < STARTUP_ATTEMPTS => {
                attempt += 1;
                std::thread::sleep(STARTUP_BACKOFF);
            }
            result => return result?.into_data(),
        }
    }
}

/// Ask the daemon to shut down gracefully.
pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    send_request(home, DaemonRequest::Stop)?.into_data()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn missing_socket_means_not_running() {
        let home = TempDir::new().expect("home");
        let err = send_request(home.path(), DaemonRequest::Status).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }), "got: {err}");
    }

    #[test]
    fn requests_are_tagged_by_command() {
        assert_eq!(
            serde_json::to_string(&DaemonRequest::Stop).unwrap(),
            r#"{"cmd":"stop"}"#
        );
        let parsed: DaemonRequest = serde_json::from_str(r#"{"cmd":"status"}"#).unwrap();
        assert_eq!(parsed, DaemonRequest::Status);
        assert!(serde_json::from_str::<DaemonRequest>(r#"{"cmd":"reload"}"#).is_err());
    }

    #[test]
    fn failure_replies_become_protocol_errors() {
        let err = DaemonResponse::error("busy").into_data().unwrap_err();
        assert_eq!(err.to_string(), "daemon protocol error: busy");

        let data = DaemonResponse::ok(json!({"running": true})).into_data().unwrap();
        assert_eq!(data["running"], json!(true));
    }

    #[test]
    fn replies_omit_empty_fields_on_the_wire() {
        let encoded = serde_json::to_string(&DaemonResponse::error("boom")).unwrap();
        assert_eq!(encoded, r#"{"ok":false,"error":"boom"}"#);
    }
}
