use std::io;

use thiserror::Error;

/// Errors the OS-Service Adapter (C7) can report back to the CLI (spec
/// §4.7, §7 `os.permission`/`os.resource`).
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("service is already installed")]
    AlreadyInstalled,

    #[error("service is not installed")]
    NotInstalled,

    #[error("must run with elevated/root permissions to {0}")]
    PermissionDenied(&'static str),

    #[error("{0}")]
    Command(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[cfg(windows)]
    #[error("Windows service manager error: {0}")]
    Windows(#[from] windows_service::Error),
}
