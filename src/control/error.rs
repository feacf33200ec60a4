use thiserror::Error;

use crate::scheduler::SchedulerError;

/// Errors the Control Plane (C6) surfaces to its two callers: the CLI and
/// the OS-service adapter. Both map this into an exit code / SCM status via
/// [`ControlError::exit_code`] (spec §6's "exit codes: 0 success, 1 generic
/// error, 2 config error, 3 already running, 4 not running").
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("already running")]
    AlreadyRunning,

    #[error("not running")]
    NotRunning,

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl ControlError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ControlError::AlreadyRunning => 3,
            ControlError::NotRunning => 4,
            ControlError::Scheduler(_) => 1,
        }
    }
}
