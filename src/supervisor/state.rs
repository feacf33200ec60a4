/// The Service Supervisor's lifecycle, one instance per service (spec §4.4).
#[cfg_attr(doc, aquamarine::aquamarine)]
/// ```mermaid
/// graph LR
///     Pending -->|scheduler releases| WaitingDeps
///     WaitingDeps -->|all deps Healthy| Delaying
///     Delaying -->|startup_delay elapsed| Starting
///     Starting -->|spawn ok| Probing
///     Starting -->|spawn err| Failed
///     Probing -->|first healthy, or no healthcheck| Healthy
///     Probing -->|child exits| Restarting
///     Healthy -->|child exits| Restarting
///     Healthy -->|unhealthy event| Restarting
///     Healthy -->|unhealthy event, restart disabled| Unhealthy
///     Restarting -->|backoff elapsed| Starting
///     Restarting -->|budget exhausted| Failed
///     Starting -->|stop requested| Stopping
///     Probing -->|stop requested| Stopping
///     Healthy -->|stop requested| Stopping
///     Unhealthy -->|stop requested| Stopping
///     Restarting -->|stop requested| Stopping
///     Stopping --> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Pending,
    WaitingDeps,
    Delaying,
    Starting,
    Probing,
    Healthy,
    Unhealthy,
    Restarting,
    Stopping,
    Stopped,
    Failed,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Stopped | State::Failed)
    }

    /// Whether the scheduler considers this service ready for its
    /// dependents to proceed past `WaitingDeps` (spec §4.5).
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, State::Healthy)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            State::Pending => "pending",
            State::WaitingDeps => "waiting_deps",
            State::Delaying => "delaying",
            State::Starting => "starting",
            State::Probing => "probing",
            State::Healthy => "healthy",
            State::Unhealthy => "unhealthy",
            State::Restarting => "restarting",
            State::Stopping => "stopping",
            State::Stopped => "stopped",
            State::Failed => "failed",
        };
        f.write_str(s)
    }
}
