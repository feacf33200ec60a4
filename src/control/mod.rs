//! C6 — Control Plane: the narrow command surface the CLI and the
//! OS-service adapter both drive (spec §4.6). Thin by design — all of the
//! actual coordination lives in the Scheduler; this module's job is just to
//! translate that into the shape callers on either side expect.

pub mod error;

pub use error::ControlError;

use std::time::Duration;

use crossbeam::channel::Receiver;
use serde::Serialize;

use crate::event::EngineEvent;
use crate::scheduler::{Scheduler, ServiceStatus};

/// Serializable snapshot returned by [`ControlPlane::status`], printed by
/// the `status` CLI command (spec §4.6 `status()`).
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub services: Vec<ServiceStatusView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatusView {
    pub name: String,
    pub state: crate::supervisor::State,
    pub pid: Option<u32>,
    pub generation: u64,
    pub consecutive_failures: u32,
    pub last_exit: Option<crate::supervisor::runtime::LastExit>,
}

impl From<ServiceStatus> for ServiceStatusView {
    fn from(s: ServiceStatus) -> Self {
        Self {
            name: s.name,
            state: s.state,
            pid: s.pid,
            generation: s.generation,
            consecutive_failures: s.consecutive_failures,
            last_exit: s.last_exit,
        }
    }
}

/// Wraps a [`Scheduler`] behind the four calls of spec §4.6, translating
/// its errors into [`ControlError`] for the CLI's exit-code mapping (§6).
#[derive(Clone)]
pub struct ControlPlane {
    scheduler: Scheduler,
}

impl ControlPlane {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    /// Idempotent; returns once every service is past `Starting` (spec
    /// §4.6). `start_all` is safe to call more than once — already-released
    /// services are left alone by the scheduler.
    pub fn start_all(&self) -> Result<(), ControlError> {
        self.scheduler.start_all().map_err(ControlError::from)
    }

    /// Idempotent; blocks until reverse-order shutdown completes or the
    /// hard cap fires.
    pub fn stop_all(&self, grace: Duration) -> Result<(), ControlError> {
        self.scheduler.stop_all(grace).map_err(ControlError::from)
    }

    /// Snapshot of every service's `{name, state, pid?, generation,
    /// consecutive_failures, last_exit?}` (spec §4.6).
    pub fn status(&self) -> Result<StatusSnapshot, ControlError> {
        let statuses = self.scheduler.status()?;
        Ok(StatusSnapshot {
            services: statuses.into_iter().map(ServiceStatusView::from).collect(),
        })
    }

    /// Queues a single service's restart cycle (spec §4.6 `restart(name)`).
    pub fn restart(&self, name: &str) -> Result<(), ControlError> {
        self.scheduler.restart(name).map_err(ControlError::from)
    }

    /// Subscribes to the raw transition stream, consumed by the CLI's
    /// foreground mode.
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.scheduler.subscribe()
    }

    pub fn shutdown(self) {
        self.scheduler.shutdown();
    }
}
