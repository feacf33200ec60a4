use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::health::{HealthCheckParams, ProbeTemplate};
use crate::process::StdioPolicy;

use super::RestartPolicy;

/// The static, immutable-after-load half of a service (spec §3). Owned by
/// the Scheduler and handed to each Supervisor at construction.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub work_dir: PathBuf,
    pub start_cmd: Vec<String>,
    pub env: HashMap<String, String>,
    pub log_redirect: bool,
    pub startup_delay: Duration,
    pub depends_on: Vec<String>,
    pub healthcheck: Option<(ProbeTemplate, HealthCheckParams)>,
    pub restart_policy: RestartPolicy,
    pub stop_grace: Duration,
}

impl ServiceSpec {
    pub fn stdio_policy(&self) -> StdioPolicy {
        if self.log_redirect {
            StdioPolicy::Pipe
        } else {
            StdioPolicy::Inherit
        }
    }
}
