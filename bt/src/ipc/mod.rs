//! Inter-Process Communication with the daemon
//!
//! The CLI and chat bridges talk to the daemon over a Unix Domain Socket.
//! Each connection carries one JSON request line and one JSON response line.

use std::path::PathBuf;

pub mod client;
pub mod handler;
pub mod listener;
pub mod messages;

pub use client::{DaemonClient, Reply};
pub use handler::CommandHandler;
pub use messages::{DaemonHealth, DaemonMessage, DaemonResponse, MAX_MESSAGE_SIZE};

/// Get the socket path for daemon IPC
///
/// Uses the same base directory as other daemon files (PID file, version file).
pub fn get_socket_path() -> PathBuf {
    crate::daemon::runtime_dir().join("daemon.sock")
}
