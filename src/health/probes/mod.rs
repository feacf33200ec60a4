pub mod cmd;
pub mod http;
pub mod process;
pub mod tcp;

use std::time::Duration;

use super::{HealthChecker, HealthCheckerError};

/// The closed set of probe kinds a service can declare (spec §4.3).
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    /// The default: the supervised PID is still alive.
    Process { pid: u32 },
    /// `GET {url}` must return a 2xx status within `timeout`.
    Http { url: String, timeout: Duration },
    /// A TCP connect to `addr` must succeed within `timeout`.
    Tcp { addr: String, timeout: Duration },
    /// A shell-invokable command must exit 0 within `timeout`.
    Cmd { shell: String, timeout: Duration },
}

impl HealthChecker for Probe {
    fn check_health(&self) -> Result<(), HealthCheckerError> {
        match self {
            Probe::Process { pid } => process::check(*pid),
            Probe::Http { url, timeout } => http::check(url, *timeout),
            Probe::Tcp { addr, timeout } => tcp::check(addr, *timeout),
            Probe::Cmd { shell, timeout } => cmd::check(shell, *timeout),
        }
    }
}

/// A probe as declared in configuration, before a PID exists. Every kind
/// but `Process` is already fully concrete; `Process` is completed with the
/// freshly spawned PID at the start of each generation.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeTemplate {
    Process,
    Http { url: String, timeout: Duration },
    Tcp { addr: String, timeout: Duration },
    Cmd { shell: String, timeout: Duration },
}

impl ProbeTemplate {
    pub fn instantiate(&self, pid: u32) -> Probe {
        match self {
            ProbeTemplate::Process => Probe::Process { pid },
            ProbeTemplate::Http { url, timeout } => Probe::Http {
                url: url.clone(),
                timeout: *timeout,
            },
            ProbeTemplate::Tcp { addr, timeout } => Probe::Tcp {
                addr: addr.clone(),
                timeout: *timeout,
            },
            ProbeTemplate::Cmd { shell, timeout } => Probe::Cmd {
                shell: shell.clone(),
                timeout: *timeout,
            },
        }
    }
}
