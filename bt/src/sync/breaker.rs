//! Circuit breaker around the sync gateway
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: first call after the cool-down expires
//! Half-Open → Closed: the single trial call succeeds
//! Half-Open → Open: the trial call fails (fresh cool-down)
//! ```
//!
//! Calls rejected while open never reach the gateway and leave the failure
//! counter alone. Every forwarded call runs under a hard timeout and a
//! timeout counts as a failure.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{SyncError, SyncGateway};
use crate::domain::BreakEvent;

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open
    pub cooldown: Duration,
    /// Hard limit on a single gateway call
    pub call_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(300),
            call_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerPhase {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerStats {
    /// Calls forwarded to the gateway
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Calls rejected without touching the gateway
    pub short_circuited: u64,
    /// Times the circuit opened
    pub trips: u64,
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
    trial_in_flight: bool,
    stats: BreakerStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Forward,
    Trial,
    Reject { retry_after: Duration },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn phase(&self) -> BreakerPhase {
        self.phase_at(Instant::now())
    }

    pub fn phase_at(&self, now: Instant) -> BreakerPhase {
        let state = self.lock();
        if state.trial_in_flight {
            return BreakerPhase::HalfOpen;
        }
        match state.open_until {
            Some(until) if now < until => BreakerPhase::Open,
            Some(_) => BreakerPhase::HalfOpen,
            None => BreakerPhase::Closed,
        }
    }

    pub fn stats(&self) -> BreakerStats {
        self.lock().stats.clone()
    }

    /// Push `event` through the breaker using the current time
    pub async fn call(&self, gateway: &dyn SyncGateway, event: &BreakEvent) -> Result<(), SyncError> {
        self.call_at(Instant::now(), gateway, event).await
    }

    /// Push `event` through the breaker as if the call started at `now`
    pub async fn call_at(&self, now: Instant, gateway: &dyn SyncGateway, event: &BreakEvent) -> Result<(), SyncError> {
        let trial = match self.admit(now) {
            Admission::Reject { retry_after } => {
                debug!(gateway = gateway.name(), ?retry_after, "CircuitBreaker::call_at: short-circuited");
                return Err(SyncError::CircuitOpen { retry_after });
            }
            Admission::Trial => {
                info!(gateway = gateway.name(), "Circuit half-open, sending trial call");
                true
            }
            Admission::Forward => false,
        };

        let started = Instant::now();
        let result = match tokio::time::timeout(self.config.call_timeout, gateway.push(event)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(self.config.call_timeout)),
        };

        match &result {
            Ok(()) => self.on_success(trial),
            Err(e) => self.on_failure(now + started.elapsed(), trial, e),
        }
        result
    }

    fn admit(&self, now: Instant) -> Admission {
        let mut state = self.lock();
        if state.trial_in_flight {
            state.stats.short_circuited += 1;
            return Admission::Reject {
                retry_after: self.config.call_timeout,
            };
        }
        match state.open_until {
            Some(until) if now < until => {
                state.stats.short_circuited += 1;
                Admission::Reject {
                    retry_after: until - now,
                }
            }
            Some(_) => {
                state.trial_in_flight = true;
                state.stats.attempted += 1;
                Admission::Trial
            }
            None => {
                state.stats.attempted += 1;
                Admission::Forward
            }
        }
    }

    fn on_success(&self, trial: bool) {
        let mut state = self.lock();
        if trial || state.open_until.is_some() {
            info!("Circuit closed");
        }
        state.consecutive_failures = 0;
        state.open_until = None;
        state.trial_in_flight = false;
        state.stats.succeeded += 1;
    }

    fn on_failure(&self, at: Instant, trial: bool, error: &SyncError) {
        let mut state = self.lock();
        state.stats.failed += 1;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        if trial {
            state.trial_in_flight = false;
            state.open_until = Some(at + self.config.cooldown);
            state.stats.trips += 1;
            warn!(%error, cooldown = ?self.config.cooldown, "Trial call failed, circuit re-opened");
        } else if state.open_until.is_none() && state.consecutive_failures >= self.config.failure_threshold {
            state.open_until = Some(at + self.config.cooldown);
            state.stats.trips += 1;
            warn!(
                %error,
                failures = state.consecutive_failures,
                cooldown = ?self.config.cooldown,
                "Circuit opened"
            );
        } else {
            debug!(%error, failures = state.consecutive_failures, "CircuitBreaker::on_failure: counted");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
