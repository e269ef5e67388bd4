//! Sync worker
//!
//! A bounded queue between the command path and the gateway. Enqueueing
//! never waits: when the queue is full the event is dropped and counted.
//! A [`SyncMonitor`] reads the counters without keeping the queue open.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BreakerPhase, BreakerStats, CircuitBreaker, SyncGateway};
use crate::domain::BreakEvent;

/// Point-in-time view of replication health
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub gateway: String,
    pub phase: BreakerPhase,
    pub breaker: BreakerStats,
    /// Events never queued because the queue was full or closed
    pub dropped: u64,
}

#[derive(Debug, Clone)]
pub struct SyncMonitor {
    gateway: String,
    breaker: Arc<CircuitBreaker>,
    dropped: Arc<AtomicU64>,
}

impl SyncMonitor {
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            gateway: self.gateway.clone(),
            phase: self.breaker.phase(),
            breaker: self.breaker.stats(),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Cheap, cloneable sender side of the sync queue
#[derive(Debug, Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<BreakEvent>,
    monitor: SyncMonitor,
}

impl SyncHandle {
    /// Queue an event for replication; returns false if it was dropped
    pub fn enqueue(&self, event: BreakEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.monitor.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(person = event.person_id, kind = %event.kind, "Sync queue full, event not replicated");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.monitor.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(person = event.person_id, kind = %event.kind, "Sync worker stopped, event not replicated");
                false
            }
        }
    }

    pub fn monitor(&self) -> SyncMonitor {
        self.monitor.clone()
    }
}

pub struct SyncWorker {
    rx: mpsc::Receiver<BreakEvent>,
    gateway: Arc<dyn SyncGateway>,
    breaker: Arc<CircuitBreaker>,
}

impl SyncWorker {
    /// Create a worker and the handle that feeds it
    pub fn new(gateway: Arc<dyn SyncGateway>, breaker: Arc<CircuitBreaker>, capacity: usize) -> (Self, SyncHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = SyncHandle {
            tx,
            monitor: SyncMonitor {
                gateway: gateway.name().to_string(),
                breaker: breaker.clone(),
                dropped: Arc::new(AtomicU64::new(0)),
            },
        };
        (Self { rx, gateway, breaker }, handle)
    }

    /// Spawn the worker; it stops once every handle is dropped and the queue is drained
    pub fn spawn(gateway: Arc<dyn SyncGateway>, breaker: Arc<CircuitBreaker>, capacity: usize) -> (SyncHandle, JoinHandle<()>) {
        let (worker, handle) = Self::new(gateway, breaker, capacity);
        (handle, tokio::spawn(worker.run()))
    }

    pub async fn run(mut self) {
        info!(gateway = self.gateway.name(), "Sync worker started");
        while let Some(event) = self.rx.recv().await {
            match self.breaker.call(self.gateway.as_ref(), &event).await {
                Ok(()) => debug!(person = event.person_id, kind = %event.kind, "SyncWorker::run: replicated"),
                Err(e) if e.is_short_circuit() => {
                    debug!(person = event.person_id, error = %e, "SyncWorker::run: skipped while circuit open")
                }
                Err(e) => warn!(person = event.person_id, kind = %event.kind, error = %e, "Sync failed"),
            }
        }
        let stats = self.breaker.stats();
        info!(?stats, "Sync worker stopped");
    }
}
