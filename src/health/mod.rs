//! C3 — Health Checker: runs a service's configured probe on its interval
//! and emits `healthy`/`unhealthy` transitions.

pub mod checker;
pub mod probes;

use std::time::SystemTime;

use thiserror::Error;

pub use checker::spawn_health_checker;
pub use probes::{Probe, ProbeTemplate};

/// Outcome of one probe evaluation (spec §4.3).
#[derive(Debug, Clone, PartialEq)]
pub enum Health {
    Healthy(Healthy),
    Unhealthy(Unhealthy),
}

impl Health {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Health::Healthy(_))
    }

    pub fn last_error(&self) -> Option<&str> {
        match self {
            Health::Unhealthy(u) => Some(&u.last_error),
            Health::Healthy(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Healthy {
    pub status_time: SystemTime,
}

impl PartialEq for Healthy {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Healthy {
    pub fn now() -> Self {
        Self {
            status_time: SystemTime::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Unhealthy {
    pub status_time: SystemTime,
    pub last_error: String,
    pub consecutive_failures: u32,
}

impl PartialEq for Unhealthy {
    fn eq(&self, other: &Self) -> bool {
        self.last_error == other.last_error
            && self.consecutive_failures == other.consecutive_failures
    }
}

impl Unhealthy {
    pub fn new(last_error: String, consecutive_failures: u32) -> Self {
        Self {
            status_time: SystemTime::now(),
            last_error,
            consecutive_failures,
        }
    }
}

#[derive(Error, Debug)]
pub enum HealthCheckerError {
    #[error("probe timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("probe failed: {0}")]
    Failed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Dispatches one probe evaluation. Implemented for [`Probe`] directly
/// (spec §9: "tagged variant, dispatch on kind" rather than a boxed trait
/// object, since the set of probe kinds is closed).
#[cfg_attr(test, mockall::automock)]
pub trait HealthChecker {
    fn check_health(&self) -> Result<(), HealthCheckerError>;
}
