//! Best-effort replication of break events
//!
//! Events are queued to a [`SyncWorker`] which pushes them through a
//! [`CircuitBreaker`] to a [`SyncGateway`]. Nothing here can fail a break
//! command; outcomes only show up in logs and in the counters a
//! [`SyncMonitor`] reports.

mod breaker;
mod error;
mod graph;
mod worker;

use async_trait::async_trait;

pub use breaker::{BreakerConfig, BreakerPhase, BreakerStats, CircuitBreaker};
pub use error::SyncError;
pub use graph::GraphSyncGateway;
pub use worker::{SyncHandle, SyncMonitor, SyncStatus, SyncWorker};

use crate::domain::BreakEvent;

/// Remote destination for break events
#[async_trait]
pub trait SyncGateway: Send + Sync {
    /// Push one event; called only through the circuit breaker
    async fn push(&self, event: &BreakEvent) -> Result<(), SyncError>;

    /// Short name for logs
    fn name(&self) -> &str;
}
