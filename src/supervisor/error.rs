use thiserror::Error;

use crate::process::ProcessError;
use crate::utils::thread_context::ThreadContextStopperError;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("process error: {0}")]
    Process(#[from] ProcessError),
    #[error("error stopping supervisor thread: {0}")]
    Stop(#[from] ThreadContextStopperError),
}
