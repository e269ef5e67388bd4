//! Outbound notifications
//!
//! Reminders and summaries are addressed to a [`Recipient`] and handed to a
//! [`Notifier`]. The daemon uses an [`OutboxNotifier`] that a chat bridge
//! drains over IPC.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::{ConversationId, PersonId};

/// Where a notification should be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "to", content = "id", rename_all = "lowercase")]
pub enum Recipient {
    Person(PersonId),
    Conversation(ConversationId),
}

impl Recipient {
    /// The conversation if there is one, otherwise the person directly
    pub fn route(person: PersonId, conversation: Option<ConversationId>) -> Self {
        match conversation {
            Some(id) => Self::Conversation(id),
            None => Self::Person(person),
        }
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Person(id) => write!(f, "person:{}", id),
            Self::Conversation(id) => write!(f, "conversation:{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub to: Recipient,
    pub text: String,
    pub created_at: NaiveDateTime,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> eyre::Result<()>;
}

/// Bounded in-memory outbox; the oldest entry is dropped when full
#[derive(Debug)]
pub struct OutboxNotifier {
    capacity: usize,
    queue: Mutex<VecDeque<Notification>>,
}

impl OutboxNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Take every queued notification, oldest first
    pub fn drain(&self) -> Vec<Notification> {
        let mut queue = self.queue.lock().unwrap_or_else(|p| p.into_inner());
        queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn notify(&self, notification: Notification) -> eyre::Result<()> {
        debug!(to = %notification.to, "OutboxNotifier::notify: called");
        let mut queue = self.queue.lock().unwrap_or_else(|p| p.into_inner());
        if queue.len() >= self.capacity {
            if let Some(dropped) = queue.pop_front() {
                warn!(to = %dropped.to, "Outbox full, dropping oldest notification");
            }
        }
        queue.push_back(notification);
        Ok(())
    }
}

/// Forwards notifications into an mpsc channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, notification: Notification) -> eyre::Result<()> {
        self.tx
            .send(notification)
            .map_err(|_| eyre::eyre!("Notification channel closed"))
    }
}
