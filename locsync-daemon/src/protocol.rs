//! Control socket protocol: one JSON object per line in each direction.
//!
//! | request               | response `data`                 |
//! |-----------------------|---------------------------------|
//! | `{"cmd":"status"}`    | runtime stats, in-flight paths  |
//! | `{"cmd":"reconcile"}` | totals of a reconciliation pass |
//! | `{"cmd":"stop"}`      | `{"stopping": true}`            |
//!
//! Every response is `{"ok": bool, "data"?: .., "error"?: ".."}`.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

const STATUS_ATTEMPTS: usize = 5;
const STATUS_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ControlRequest {
    Status,
    Reconcile,
    Stop,
}

impl ControlRequest {
    pub fn name(self) -> &'static str {
        match self {
            ControlRequest::Status => "status",
            ControlRequest::Reconcile => "reconcile",
            ControlRequest::Stop => "stop",
        }
    }

    /// Parse one request line. Unknown commands become a readable error.
    pub fn parse(line: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(line).map_err(|err| format!("invalid request JSON: {err}"))?;
        let cmd = value
            .get("cmd")
            .and_then(Value::as_str)
            .ok_or_else(|| "request is missing 'cmd'".to_string())?
            .to_string();
        serde_json::from_value(value).map_err(|_| format!("unknown command '{cmd}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
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

    /// `data` of a successful response; the daemon's message otherwise.
    pub fn into_result(self) -> Result<Value, DaemonError> {
        match (self.ok, self.data, self.error) {
            (true, data, _) => Ok(data.unwrap_or(Value::Null)),
            (false, _, message) => Err(DaemonError::Protocol(
                message.unwrap_or_else(|| "daemon reported an unspecified error".to_string()),
            )),
        }
    }
}

/// Blocking client for the control socket under a state directory.
#[derive(Debug, Clone)]
pub struct ControlClient {
    socket: PathBuf,
}

impl ControlClient {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            socket: socket_path(state_dir),
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// One request, one response line.
    pub fn send(&self, request: ControlRequest) -> Result<ControlResponse, DaemonError> {
        let mut stream = self.connect()?;

        let mut payload = serde_json::to_vec(&request)?;
        payload.push(b'\n');
        stream
            .write_all(&payload)
            .and_then(|()| stream.flush())
            .map_err(|e| io_err(&self.socket, e))?;

        let mut line = String::new();
        let read = BufReader::new(stream)
            .read_line(&mut line)
            .map_err(|e| io_err(&self.socket, e))?;
        if read == 0 {
            return Err(DaemonError::Protocol(format!(
                "no response to '{}' before the socket closed",
                request.name()
            )));
        }
        Ok(serde_json::from_str(line.trim_end())?)
    }

    fn connect(&self) -> Result<UnixStream, DaemonError> {
        if !self.socket.exists() {
            return Err(self.not_running());
        }
        UnixStream::connect(&self.socket).map_err(|err| match err.kind() {
            ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => {
                self.not_running()
            }
            _ => io_err(&self.socket, err),
        })
    }

    fn not_running(&self) -> DaemonError {
        DaemonError::DaemonNotRunning {
            socket: self.socket.clone(),
        }
    }
}

/// Send one request to the daemon under `state_dir`.
pub(crate) fn send_request(
    state_dir: &Path,
    request: ControlRequest,
) -> Result<ControlResponse, DaemonError> {
    ControlClient::new(state_dir).send(request)
}

/// Status payload. A daemon that is still creating its socket gets a few
/// short retries.
pub fn request_status(state_dir: &Path) -> Result<Value, DaemonError> {
    let client = ControlClient::new(state_dir);
    let mut attempt = 1;
    loop {
        match client.send(ControlRequest::Status) {
            Err(DaemonError::DaemonNotRunning { .. }) if attempt < STATUS_ATTEMPTS => {
                attempt += 1;
                std::thread::sleep(STATUS_RETRY_DELAY);
            }
            result => return result?.into_result(),
        }
    }
}

pub fn request_stop(state_dir: &Path) -> Result<(), DaemonError> {
    send_request(state_dir, ControlRequest::Stop)?
        .into_result()
        .map(|_| ())
}

pub fn request_reconcile(state_dir: &Path) -> Result<Value, DaemonError> {
    send_request(state_dir, ControlRequest::Reconcile)?.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_socket_means_not_running() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = request_stop(dir.path()).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }), "got: {err}");
    }

    #[test]
    fn error_response_becomes_protocol_error() {
        let err = ControlResponse::error("unknown command 'x'")
            .into_result()
            .unwrap_err();
        assert_eq!(err.to_string(), "daemon protocol error: unknown command 'x'");
        assert_eq!(
            ControlResponse::ok(json!({"a": 1})).into_result().unwrap(),
            json!({"a": 1})
        );
    }

    #[test]
    fn requests_encode_as_cmd_objects() {
        assert_eq!(
            serde_json::to_string(&ControlRequest::Status).unwrap(),
            r#"{"cmd":"status"}"#
        );
        assert_eq!(
            ControlRequest::parse(r#"{"cmd":"reconcile"}"#),
            Ok(ControlRequest::Reconcile)
        );
    }

    #[test]
    fn unknown_and_malformed_requests_are_described() {
        assert_eq!(
            ControlRequest::parse(r#"{"cmd":"sync"}"#),
            Err("unknown command 'sync'".to_string())
        );
        assert_eq!(
            ControlRequest::parse(r#"{"command":"stop"}"#),
            Err("request is missing 'cmd'".to_string())
        );
        assert!(ControlRequest::parse("stop")
            .unwrap_err()
            .starts_with("invalid request JSON"));
    }
}
