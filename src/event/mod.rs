//! The event system used for communication between components: the health
//! checker and process runner publish into a per-service supervisor, which
//! in turn publishes structured transition events consumed by the scheduler
//! and the control plane's fan-out (spec §4.4, §4.5, §4.6).

pub mod broadcaster;
pub mod cancellation;
pub mod channel;

use crate::health::Health;
use crate::supervisor::state::State;
use std::time::SystemTime;

/// A structured record published on every supervisor state transition
/// (spec §4.4: `{service, from, to, generation, reason, ts}`).
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub service: String,
    pub from: State,
    pub to: State,
    pub generation: u64,
    pub reason: String,
    pub ts: SystemTime,
}

/// Internal events a supervisor's collaborator threads (health checker,
/// process runner) publish to the supervisor's driver loop.
#[derive(Clone, Debug, PartialEq)]
pub enum SupervisorEvent {
    /// A health probe completed, tagged with the generation it was issued
    /// under. Stale generations are dropped by the driver loop (spec §9).
    Health { generation: u64, health: Health },
    /// The supervised child process exited.
    ChildExited {
        generation: u64,
        code: Option<i32>,
        signal: Option<i32>,
    },
}

/// The event a `Scheduler` publishes to the outside world (control plane,
/// CLI foreground stream).
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    Transition(Transition),
}
