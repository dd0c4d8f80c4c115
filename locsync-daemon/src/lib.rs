//! # locsync-daemon
//!
//! Watch mode. A recursive watcher over the content root feeds stable
//! add/change/unlink events to the dispatcher; a Unix control socket under
//! the state directory answers `status`, `reconcile` and `stop`.

pub mod error;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod watcher;

pub use error::DaemonError;
pub use paths::{socket_path, DAEMON_SOCKET};
pub use protocol::{
    request_reconcile, request_status, request_stop, ControlClient, ControlRequest,
    ControlResponse,
};
pub use runtime::{init_tracing, run, run_with, start_blocking, RuntimeStats};
pub use watcher::{initial_scan, watch, Stabilizer, WatchEvent, WatchKind};
