//! C1 — Process Runner: spawns, streams, and tears down a single service's
//! OS process (and its process tree) on the supervisor's behalf.

pub mod error;
pub mod runner;
pub mod shutdown;
pub mod stream;

#[cfg(windows)]
pub mod job_object;

pub use error::ProcessError;
pub use runner::{JobHandle, ProcessRunner, StdioPolicy, Started, Unstarted};
pub use shutdown::ProcessTerminator;
pub use stream::OutputEvent;
