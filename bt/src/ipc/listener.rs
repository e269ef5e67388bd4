//! Daemon side of the command socket
//!
//! [`serve`] owns the accept loop. Every connection carries exactly one JSON
//! request line and gets exactly one JSON response line back, produced by the
//! [`CommandHandler`]. A client that goes quiet before finishing its line is
//! answered with an error after [`REQUEST_READ_TIMEOUT`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::get_socket_path;
use super::handler::CommandHandler;
use super::messages::{DaemonMessage, DaemonResponse, MAX_MESSAGE_SIZE};

/// A client gets this long to deliver its request line
pub const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Bind the daemon socket in the runtime dir
pub fn create_listener() -> Result<(UnixListener, PathBuf)> {
    create_listener_at(&get_socket_path())
}

/// Bind at `socket_path`, replacing whatever a crashed daemon left behind
pub fn create_listener_at(socket_path: &Path) -> Result<(UnixListener, PathBuf)> {
    debug!(?socket_path, "create_listener_at: called");
    if let Some(dir) = socket_path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    }
    match std::fs::remove_file(socket_path) {
        Ok(()) => debug!(?socket_path, "Removed leftover socket"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e).context("Cannot remove leftover socket"),
    }

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("Cannot bind command socket at {}", socket_path.display()))?;
    info!(?socket_path, "Command socket bound");
    Ok((listener, socket_path.to_path_buf()))
}

/// Best-effort removal of the socket file at shutdown
pub fn cleanup_socket(socket_path: &Path) {
    match std::fs::remove_file(socket_path) {
        Ok(()) => debug!(?socket_path, "cleanup_socket: removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(?socket_path, error = %e, "Could not remove command socket"),
    }
}

/// Read one request line, refusing anything over [`MAX_MESSAGE_SIZE`]
pub async fn read_message(stream: &mut UnixStream) -> Result<DaemonMessage> {
    let mut limited = BufReader::new(stream).take(MAX_MESSAGE_SIZE as u64 + 1);
    let mut raw = String::new();
    let read = limited.read_line(&mut raw).await.context("Failed to read request")?;

    if read > MAX_MESSAGE_SIZE {
        return Err(eyre::eyre!("Request too large: over {} bytes", MAX_MESSAGE_SIZE));
    }
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(eyre::eyre!("Empty request"));
    }

    let msg = serde_json::from_str(raw).context("Request is not a valid command")?;
    debug!(?msg, "read_message: decoded");
    Ok(msg)
}

/// [`read_message`] bounded by `limit`
pub async fn read_message_within(stream: &mut UnixStream, limit: Duration) -> Result<DaemonMessage> {
    tokio::time::timeout(limit, read_message(stream))
        .await
        .map_err(|_| eyre::eyre!("No request received within {:?}", limit))?
}

/// Write `response` as a single line
pub async fn send_response(stream: &mut UnixStream, response: &DaemonResponse) -> Result<()> {
    let mut line = serde_json::to_string(response).context("Failed to encode response")?;
    line.push('\n');
    stream.write_all(line.as_bytes()).await.context("Failed to send response")?;
    stream.flush().await.context("Failed to send response")?;
    Ok(())
}

/// Serve one connection: one request, one response
///
/// Returns true when the request asked the daemon to shut down.
pub async fn handle_connection(stream: UnixStream, handler: &CommandHandler) -> Result<bool> {
    handle_connection_within(stream, handler, REQUEST_READ_TIMEOUT).await
}

async fn handle_connection_within(mut stream: UnixStream, handler: &CommandHandler, limit: Duration) -> Result<bool> {
    let (response, shutdown) = match read_message_within(&mut stream, limit).await {
        Ok(msg) => {
            let shutdown = matches!(msg, DaemonMessage::Shutdown);
            (handler.handle(msg).await, shutdown)
        }
        Err(e) => {
            warn!(error = %e, "Rejected IPC request");
            (
                DaemonResponse::Error {
                    message: format!("{:#}", e),
                },
                false,
            )
        }
    };
    send_response(&mut stream, &response).await?;
    Ok(shutdown)
}

/// Accept connections until the shutdown flag flips or a `Shutdown` request arrives
///
/// Each connection runs on its own task.
pub async fn serve(listener: UnixListener, handler: Arc<CommandHandler>, shutdown: watch::Sender<bool>) {
    info!("Command socket accepting connections");
    let mut stop = shutdown.subscribe();
    let shutdown = Arc::new(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let handler = handler.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            match handle_connection(stream, &handler).await {
                                Ok(true) => {
                                    info!("Shutdown requested over IPC");
                                    shutdown.send_replace(true);
                                }
                                Ok(false) => {}
                                Err(e) => debug!(error = %e, "serve: connection error"),
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept IPC connection"),
                }
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
    info!("Command socket closed");
}
