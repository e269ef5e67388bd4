//! Socket client for the BreakTime daemon
//!
//! The CLI and chat bridges both go through [`DaemonClient`]. Each call opens
//! a fresh connection, writes one JSON line and reads one JSON line back.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use super::get_socket_path;
use super::messages::{DaemonHealth, DaemonMessage, DaemonResponse, MAX_MESSAGE_SIZE};
use crate::domain::{BreakCategory, BreakSession, EventKind, PersonId, Requester};
use crate::notify::Notification;
use crate::state::RecoveryStats;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Responses carry session lists and notification batches
const MAX_RESPONSE_SIZE: usize = 4 * 1024 * 1024;

/// Rendered outcome of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub success: bool,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl Default for DaemonClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonClient {
    pub fn new() -> Self {
        Self {
            socket_path: get_socket_path(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Talk to a daemon listening somewhere other than the runtime dir
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// Start or end a break
    pub async fn break_action(
        &self,
        who: &Requester,
        action: EventKind,
        category: BreakCategory,
        reason: Option<String>,
    ) -> Result<Reply> {
        debug!(person = who.person_id, %action, %category, "DaemonClient::break_action: called");
        let msg = DaemonMessage::break_action(who, action, category, reason);
        self.reply(msg).await
    }

    /// Supply the reason for a pending Other break
    pub async fn provide_reason(&self, who: &Requester, reason: &str) -> Result<Reply> {
        debug!(person = who.person_id, "DaemonClient::provide_reason: called");
        let msg = DaemonMessage::ProvideReason {
            person_id: who.person_id,
            display_name: who.display_name.clone(),
            reason: reason.to_string(),
            conversation: who.conversation,
        };
        self.reply(msg).await
    }

    /// Abandon a pending Other break
    pub async fn cancel_reason(&self, who: &Requester) -> Result<Reply> {
        let msg = DaemonMessage::CancelReason {
            person_id: who.person_id,
            display_name: who.display_name.clone(),
        };
        self.reply(msg).await
    }

    /// Rendered summary for one person and day
    pub async fn summary(&self, person_id: PersonId, display_name: &str, date: Option<NaiveDate>) -> Result<Reply> {
        let msg = DaemonMessage::Summary {
            person_id,
            display_name: display_name.to_string(),
            date,
        };
        self.reply(msg).await
    }

    /// Every open session
    pub async fn active(&self) -> Result<Vec<BreakSession>> {
        match self.send_message(DaemonMessage::Active).await? {
            DaemonResponse::Sessions { sessions } => Ok(sessions),
            other => Err(unexpected(other)),
        }
    }

    /// Run reconciliation now
    pub async fn reconcile(&self) -> Result<RecoveryStats> {
        match self.send_message(DaemonMessage::Reconcile).await? {
            DaemonResponse::Recovered { stats } => Ok(stats),
            other => Err(unexpected(other)),
        }
    }

    /// Drain the daemon's notification outbox
    pub async fn notifications(&self) -> Result<Vec<Notification>> {
        match self.send_message(DaemonMessage::Notifications).await? {
            DaemonResponse::Notifications { items } => Ok(items),
            other => Err(unexpected(other)),
        }
    }

    /// Version string of a responsive daemon
    pub async fn ping(&self) -> Result<String> {
        match self.send_message(DaemonMessage::Ping).await? {
            DaemonResponse::Pong { version } => Ok(version),
            other => Err(unexpected(other)),
        }
    }

    /// Version, open session count and sync counters
    pub async fn status(&self) -> Result<DaemonHealth> {
        match self.send_message(DaemonMessage::Status).await? {
            DaemonResponse::Status { health } => Ok(health),
            other => Err(unexpected(other)),
        }
    }

    /// Ask the daemon to finish in-flight work and exit
    pub async fn shutdown(&self) -> Result<()> {
        match self.send_message(DaemonMessage::Shutdown).await? {
            DaemonResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn reply(&self, msg: DaemonMessage) -> Result<Reply> {
        match self.send_message(msg).await? {
            DaemonResponse::Reply { success, text } => Ok(Reply { success, text }),
            other => Err(unexpected(other)),
        }
    }

    /// One request, one response, bounded by the client timeout end to end
    pub async fn send_message(&self, msg: DaemonMessage) -> Result<DaemonResponse> {
        debug!(socket = ?self.socket_path, ?msg, "DaemonClient::send_message: called");
        let line = encode_request(&msg)?;

        let response = tokio::time::timeout(self.timeout, self.exchange(&line))
            .await
            .map_err(|_| eyre::eyre!("BreakTime daemon did not answer within {:?}", self.timeout))??;

        debug!(?response, "DaemonClient::send_message: answered");
        Ok(response)
    }

    async fn exchange(&self, line: &str) -> Result<DaemonResponse> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .with_context(|| format!("Cannot reach BreakTime daemon at {}", self.socket_path.display()))?;

        stream.write_all(line.as_bytes()).await.context("Failed to send request")?;
        stream.flush().await.context("Failed to send request")?;

        let mut reader = BufReader::new(stream).take(MAX_RESPONSE_SIZE as u64 + 1);
        let mut raw = String::new();
        let read = reader.read_line(&mut raw).await.context("Failed to read daemon response")?;
        if read > MAX_RESPONSE_SIZE {
            return Err(eyre::eyre!("Daemon response exceeds {} bytes", MAX_RESPONSE_SIZE));
        }
        if read == 0 {
            return Err(eyre::eyre!("Daemon closed the connection without answering"));
        }

        serde_json::from_str(raw.trim()).context("Malformed daemon response")
    }
}

fn encode_request(msg: &DaemonMessage) -> Result<String> {
    let mut line = serde_json::to_string(msg).context("Failed to encode request")?;
    if line.len() >= MAX_MESSAGE_SIZE {
        return Err(eyre::eyre!("Request is {} bytes, limit is {}", line.len(), MAX_MESSAGE_SIZE));
    }
    line.push('\n');
    Ok(line)
}

fn unexpected(response: DaemonResponse) -> eyre::Report {
    match response {
        DaemonResponse::Error { message } => eyre::eyre!("Daemon error: {}", message),
        other => eyre::eyre!("Unexpected response: {:?}", other),
    }
}
