use thiserror::Error;

use super::graph::GraphError;

/// Errors the Dependency Scheduler (C5) can report. Everything here is a
/// boot-time or command-dispatch concern; once a service is running, its own
/// failures surface through `ServiceStatus`/the event stream instead (spec
/// §7: "the supervisor process never aborts on a child's error").
#[derive(Error, Debug, PartialEq)]
pub enum SchedulerError {
    #[error("depends_on references unknown service '{0}'")]
    UnknownDependency(String),

    #[error(transparent)]
    Cycle(#[from] GraphError),

    #[error("no such service '{0}'")]
    UnknownService(String),

    #[error("engine thread is no longer running")]
    EngineStopped,
}
