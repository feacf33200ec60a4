use thiserror::Error;

/// Failure modes surfaced verbatim to the owning Supervisor (spec §4.1, §7).
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("executable not found: {0}")]
    NotFound(String),

    #[error("permission denied spawning: {0}")]
    Permission(String),

    #[error("process already started")]
    AlreadyStarted,

    #[error("process not started")]
    NotStarted,

    #[error("os error: {0}")]
    Os(#[source] std::io::Error),
}

impl From<std::io::Error> for ProcessError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => ProcessError::NotFound(err.to_string()),
            ErrorKind::PermissionDenied => ProcessError::Permission(err.to_string()),
            _ => ProcessError::Os(err),
        }
    }
}
