use std::time::SystemTime;

use super::state::State;

/// `{code, signal, wall time}` of a supervised child's most recent
/// termination (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct LastExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub at: SystemTime,
}

/// Dynamic per-service state owned exclusively by its Supervisor (spec §3).
/// Readers outside the owning Supervisor only ever see immutable snapshots
/// published on transitions — this struct itself is never shared.
#[derive(Debug, Clone)]
pub struct ServiceRuntime {
    pub state: State,
    pub pid: Option<u32>,
    pub generation: u64,
    pub consecutive_failures: u32,
    pub last_exit: Option<LastExit>,
}

impl Default for ServiceRuntime {
    fn default() -> Self {
        Self {
            state: State::Pending,
            pid: None,
            generation: 0,
            consecutive_failures: 0,
            last_exit: None,
        }
    }
}

impl ServiceRuntime {
    /// Bumps the generation counter for a fresh spawn attempt, tagging every
    /// async event (probe, timer) issued afterward (spec §3 invariant 3).
    pub fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn record_exit(&mut self, code: Option<i32>, signal: Option<i32>) {
        self.pid = None;
        self.last_exit = Some(LastExit {
            code,
            signal,
            at: SystemTime::now(),
        });
    }

    pub fn enter(&mut self, state: State) {
        if state == State::Healthy {
            self.consecutive_failures = 0;
        }
        self.state = state;
    }
}
