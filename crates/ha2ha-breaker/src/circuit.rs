//! Per-peer circuit breaker.
//!
//! CLOSED admits requests. Failures count both consecutively and inside a
//! sliding window; crossing either threshold (or a CRITICAL failure, or a
//! manual trip) opens the circuit. OPEN refuses requests until the reset
//! timeout elapses, then silently becomes HALF_OPEN on the next read and
//! admits exactly one probe. A probe success closes the circuit; a probe
//! failure re-opens it with a fresh reset clock.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use ha2ha_core::constants::{
    BREAKER_FAILURE_THRESHOLD, BREAKER_RESET_TIMEOUT_SECS, BREAKER_WINDOW_SECS,
    BREAKER_WINDOW_THRESHOLD,
};
use ha2ha_trust::ViolationSeverity;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// One failure inside the sliding window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailureRecord {
    pub at: DateTime<Utc>,
    pub severity: ViolationSeverity,
    pub reason: String,
}

#[derive(Clone, Copy, Debug)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub window_threshold: u32,
    pub window: Duration,
    pub reset_timeout: Duration,
    pub trip_on_critical: bool,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: BREAKER_FAILURE_THRESHOLD,
            window_threshold: BREAKER_WINDOW_THRESHOLD,
            window: Duration::seconds(BREAKER_WINDOW_SECS),
            reset_timeout: Duration::seconds(BREAKER_RESET_TIMEOUT_SECS),
            trip_on_critical: true,
        }
    }
}

/// Outcome of a `can_proceed` consultation.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProceedDecision {
    pub allowed: bool,
    pub state: CircuitState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<DateTime<Utc>>,
}

pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    window: VecDeque<FailureRecord>,
    total_successes: u64,
    total_failures: u64,
    last_trip_at: Option<DateTime<Utc>>,
    last_trip_reason: Option<String>,
    /// Whether the half-open probe slot is taken.
    probe_in_flight: bool,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            window: VecDeque::new(),
            total_successes: 0,
            total_failures: 0,
            last_trip_at: None,
            last_trip_reason: None,
            probe_in_flight: false,
            config,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn last_trip(&self) -> Option<(DateTime<Utc>, &str)> {
        match (&self.last_trip_at, &self.last_trip_reason) {
            (Some(at), Some(reason)) => Some((*at, reason.as_str())),
            _ => None,
        }
    }

    pub fn totals(&self) -> (u64, u64) {
        (self.total_successes, self.total_failures)
    }

    fn prune_window(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.config.window;
        while matches!(self.window.front(), Some(f) if f.at < cutoff) {
            self.window.pop_front();
        }
    }

    fn reset_deadline(&self) -> Option<DateTime<Utc>> {
        self.last_trip_at.map(|at| at + self.config.reset_timeout)
    }

    /// Whether a request may proceed now. Reading an OPEN breaker past its
    /// reset deadline transitions it to HALF_OPEN, which admits one probe.
    pub fn can_proceed(&mut self, now: DateTime<Utc>) -> ProceedDecision {
        match self.state {
            CircuitState::Closed => ProceedDecision {
                allowed: true,
                state: CircuitState::Closed,
                retry_at: None,
            },
            CircuitState::Open => {
                let deadline = self.reset_deadline();
                if matches!(deadline, Some(d) if now >= d) {
                    self.state = CircuitState::HalfOpen;
                    self.probe_in_flight = true;
                    ProceedDecision {
                        allowed: true,
                        state: CircuitState::HalfOpen,
                        retry_at: None,
                    }
                } else {
                    ProceedDecision {
                        allowed: false,
                        state: CircuitState::Open,
                        retry_at: deadline,
                    }
                }
            }
            CircuitState::HalfOpen => {
                if self.probe_in_flight {
                    // One probe at a time; others wait for its outcome.
                    ProceedDecision {
                        allowed: false,
                        state: CircuitState::HalfOpen,
                        retry_at: self.reset_deadline(),
                    }
                } else {
                    self.probe_in_flight = true;
                    ProceedDecision {
                        allowed: true,
                        state: CircuitState::HalfOpen,
                        retry_at: None,
                    }
                }
            }
        }
    }

    /// Record a successful interaction. Closes a half-open circuit.
    pub fn record_success(&mut self) {
        self.total_successes += 1;
        self.consecutive_failures = 0;
        self.probe_in_flight = false;
        if self.state == CircuitState::HalfOpen {
            info!("circuit probe succeeded; closing");
            self.state = CircuitState::Closed;
        }
    }

    /// Record a failed interaction. Returns the trip reason when this
    /// failure opened the circuit.
    pub fn record_failure(
        &mut self,
        severity: ViolationSeverity,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Option<String> {
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.prune_window(now);
        self.window.push_back(FailureRecord {
            at: now,
            severity,
            reason: reason.to_string(),
        });

        if self.state == CircuitState::HalfOpen {
            self.probe_in_flight = false;
            return Some(self.trip("half-open probe failed", now));
        }
        if self.state == CircuitState::Open {
            return None;
        }

        if severity == ViolationSeverity::Critical && self.config.trip_on_critical {
            return Some(self.trip(&format!("critical failure: {reason}"), now));
        }
        if self.consecutive_failures >= self.config.failure_threshold {
            return Some(self.trip(
                &format!("{} consecutive failures", self.consecutive_failures),
                now,
            ));
        }
        if self.window.len() as u32 >= self.config.window_threshold {
            return Some(self.trip(
                &format!("{} failures inside the window", self.window.len()),
                now,
            ));
        }
        None
    }

    /// Open the circuit now, recording the reason. Also used for manual trips.
    pub fn trip(&mut self, reason: &str, now: DateTime<Utc>) -> String {
        warn!(reason, "circuit opened");
        self.state = CircuitState::Open;
        self.last_trip_at = Some(now);
        self.last_trip_reason = Some(reason.to_string());
        self.probe_in_flight = false;
        reason.to_string()
    }

    /// Manual reset to CLOSED, attributed to an approver.
    pub fn reset(&mut self, approver: &str) {
        info!(approver, "circuit manually reset");
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.window.clear();
        self.probe_in_flight = false;
    }
}
