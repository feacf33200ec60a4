use thiserror::Error;

use crate::config::ConfigError;
use crate::control::ControlError;
use crate::logging::tracing_init::TracingInitError;
use crate::service::ServiceError;

/// Aggregates only the load-time-fatal subset plus whatever the invoked
/// subcommand can fail with, for the exit-code mapping in spec §6 (`0`
/// success, `1` generic, `2` config error, `3` already running, `4` not
/// running). Runtime errors of a running service never reach this type —
/// they live on `ServiceRuntime.last_exit`/the event stream instead (spec
/// §7).
#[derive(Error, Debug)]
pub enum ProcessComposeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Tracing(#[from] TracingInitError),
}

impl ProcessComposeError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ProcessComposeError::Config(_) => 2,
            ProcessComposeError::Service(ServiceError::AlreadyInstalled) => 3,
            ProcessComposeError::Service(ServiceError::NotInstalled) => 4,
            ProcessComposeError::Control(ControlError::AlreadyRunning) => 3,
            ProcessComposeError::Control(ControlError::NotRunning) => 4,
            ProcessComposeError::Service(_) => 1,
            ProcessComposeError::Control(_) => 1,
            ProcessComposeError::Tracing(_) => 1,
        }
    }
}
