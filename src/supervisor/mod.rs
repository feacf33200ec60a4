//! C4 — Service Supervisor: one instance per service, owning a Process
//! Runner and a Health Checker, driving the lifecycle state machine and
//! applying the restart policy (spec §4.4).

pub mod error;
pub mod restart_policy;
pub mod runtime;
pub mod spec;
pub mod state;
pub mod supervisor;

pub use error::SupervisorError;
pub use restart_policy::RestartPolicy;
pub use runtime::ServiceRuntime;
pub use spec::ServiceSpec;
pub use state::State;
pub use supervisor::{NotStartedSupervisor, StartedSupervisor};
