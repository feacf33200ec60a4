//! Loads and validates `config.yaml` (spec §6). Loading is a two-pass
//! affair, mirroring the collaborator's `SuperAgentConfigLoader`/
//! `SuperAgentConfigLoaderFile` split: [`raw::RawConfig`] is a literal,
//! all-optional mirror of the YAML shape; [`validate`] turns that into a
//! fully-resolved [`Config`] or rejects it with a [`ConfigError`] naming
//! the offending field/service.

pub mod error;
pub mod raw;

pub use error::ConfigError;
pub use raw::RawConfig;

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::health::{HealthCheckParams, ProbeTemplate};
use crate::scheduler::Graph;
use crate::supervisor::restart_policy::{Backoff, BackoffStrategy, FailureBudget};
use crate::supervisor::{RestartPolicy, ServiceSpec};

use raw::{RawHealthCheck, RawService};

const DEFAULT_SYS_SERVICE_NAME: &str = "process-compose";
const DEFAULT_SYS_SERVICE_DESC: &str = "Process Compose supervisor";
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(30);
const DEFAULT_HEALTHCHECK_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_HEALTHCHECK_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_HEALTHCHECK_RETRIES: u32 = 3;

/// The fully-resolved, immutable-after-load configuration (spec §3
/// "Service (static)").
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub app_data_home: PathBuf,
    pub sys_service_name: String,
    pub sys_service_desc: String,
    pub services: HashMap<String, ServiceSpec>,
}

pub trait ConfigLoader {
    fn load_config(&self) -> Result<Config, ConfigError>;
}

/// Loads `config.yaml` from a fixed path. `binary_dir` is the directory
/// each service's `work_dir` is derived from (spec §3: "directory sibling
/// to the supervisor binary, named after the service").
pub struct ConfigLoaderFile {
    file_path: PathBuf,
    binary_dir: PathBuf,
}

impl ConfigLoaderFile {
    pub fn new(file_path: PathBuf, binary_dir: PathBuf) -> Self {
        Self {
            file_path,
            binary_dir,
        }
    }
}

impl ConfigLoader for ConfigLoaderFile {
    fn load_config(&self) -> Result<Config, ConfigError> {
        let path_display = self.file_path.to_string_lossy().to_string();

        let f = File::open(&self.file_path).map_err(|source| ConfigError::Io {
            path: path_display.clone(),
            source,
        })?;
        let raw: RawConfig = serde_yaml::from_reader(f).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        validate(raw, &self.binary_dir)
    }
}

/// Applies defaults, cross-checks `depends_on`, and builds/validates the
/// dependency DAG (spec §6 "Config validation").
pub fn validate(raw: RawConfig, binary_dir: &Path) -> Result<Config, ConfigError> {
    let app_data_home = raw.app_data_home.unwrap_or_else(default_app_data_home);

    let mut services = HashMap::with_capacity(raw.services.len());
    let mut depends_on_map: HashMap<String, Vec<String>> = HashMap::with_capacity(raw.services.len());

    for (name, raw_service) in raw.services {
        let spec = resolve_service(&name, raw_service, binary_dir)?;
        depends_on_map.insert(name.clone(), spec.depends_on.clone());
        services.insert(name, spec);
    }

    for (name, deps) in &depends_on_map {
        for dep in deps {
            if !depends_on_map.contains_key(dep) {
                return Err(ConfigError::Invalid(format!(
                    "service '{name}' depends_on unknown service '{dep}'"
                )));
            }
        }
    }

    Graph::new(depends_on_map).topo_order()?;

    Ok(Config {
        log_level: raw.log_level.unwrap_or_else(|| "info".to_string()),
        app_data_home,
        sys_service_name: raw
            .sys_service_name
            .unwrap_or_else(|| DEFAULT_SYS_SERVICE_NAME.to_string()),
        sys_service_desc: raw
            .sys_service_desc
            .unwrap_or_else(|| DEFAULT_SYS_SERVICE_DESC.to_string()),
        services,
    })
}

fn default_app_data_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".process-compose")
}

fn resolve_service(name: &str, raw: RawService, binary_dir: &Path) -> Result<ServiceSpec, ConfigError> {
    if raw.start_cmd.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "service '{name}': start_cmd must be non-empty"
        )));
    }

    let (healthcheck, restart_enabled) = resolve_healthcheck(name, raw.healthcheck)?;

    Ok(ServiceSpec {
        name: name.to_string(),
        work_dir: binary_dir.join(name),
        start_cmd: raw.start_cmd,
        env: HashMap::new(),
        log_redirect: raw.log_redirect.unwrap_or(false),
        startup_delay: raw.startup_delay.unwrap_or(Duration::ZERO),
        depends_on: raw.depends_on.unwrap_or_default(),
        healthcheck,
        restart_policy: RestartPolicy::new(
            restart_enabled,
            BackoffStrategy::Exponential(Backoff::default()),
            FailureBudget::default(),
        ),
        stop_grace: raw.stop_grace.unwrap_or(DEFAULT_STOP_GRACE),
    })
}

/// Maps both healthcheck shapes (spec §6 "Compatibility mapping") into a
/// `(ProbeTemplate, HealthCheckParams)` pair plus the standalone restart
/// flag, or `(None, restart)` if healthchecking is disabled/unconfigured.
fn resolve_healthcheck(
    service_name: &str,
    raw: Option<RawHealthCheck>,
) -> Result<(Option<(ProbeTemplate, HealthCheckParams)>, bool), ConfigError> {
    let Some(raw) = raw else {
        return Ok((None, true));
    };

    let old_shape_present = raw.enable.is_some() || raw.url.is_some() || raw.check_delay.is_some();
    let new_shape_present = raw.test_type.is_some()
        || raw.test_target.is_some()
        || raw.timeout.is_some()
        || raw.interval.is_some()
        || raw.start_period.is_some();

    if old_shape_present && new_shape_present {
        return Err(ConfigError::Invalid(format!(
            "service '{service_name}': healthcheck mixes the old (enable/url/check_delay) shape with the new (test_type/test_target/start_period) shape"
        )));
    }

    let restart = raw.restart.unwrap_or(true);

    if raw.enable == Some(false) {
        return Ok((None, restart));
    }

    let (test_type, test_target, start_period) = if old_shape_present {
        let test_target = raw.url.clone().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "service '{service_name}': healthcheck.url is required when using the old healthcheck shape"
            ))
        })?;
        ("http".to_string(), Some(test_target), raw.check_delay.unwrap_or(Duration::ZERO))
    } else {
        (
            raw.test_type.clone().unwrap_or_else(|| "process".to_string()),
            raw.test_target.clone(),
            raw.start_period.unwrap_or(Duration::ZERO),
        )
    };

    let timeout = raw.timeout.unwrap_or(DEFAULT_HEALTHCHECK_TIMEOUT);
    let params = HealthCheckParams {
        interval: raw.interval.unwrap_or(DEFAULT_HEALTHCHECK_INTERVAL),
        retries: raw.retries.unwrap_or(DEFAULT_HEALTHCHECK_RETRIES),
        start_period,
    };

    let require_target = |kind: &str| {
        test_target.clone().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "service '{service_name}': healthcheck.test_target is required for test_type={kind}"
            ))
        })
    };

    let template = match test_type.as_str() {
        "process" => ProbeTemplate::Process,
        "http" => ProbeTemplate::Http {
            url: require_target("http")?,
            timeout,
        },
        "tcp" => ProbeTemplate::Tcp {
            addr: require_target("tcp")?,
            timeout,
        },
        "cmd" => ProbeTemplate::Cmd {
            shell: require_target("cmd")?,
            timeout,
        },
        other => {
            return Err(ConfigError::Invalid(format!(
                "service '{service_name}': unknown healthcheck.test_type '{other}'"
            )))
        }
    };

    Ok((Some((template, params)), restart))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn raw_service(start_cmd: &[&str]) -> RawService {
        RawService {
            start_cmd: start_cmd.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_empty_start_cmd() {
        let mut raw = RawConfig::default();
        raw.services.insert("a".to_string(), RawService::default());
        let err = validate(raw, Path::new("/bin")).unwrap_err();
        assert_matches!(err, ConfigError::Invalid(_));
    }

    #[test]
    fn rejects_unknown_depends_on() {
        let mut raw = RawConfig::default();
        let mut svc = raw_service(&["sleep", "1"]);
        svc.depends_on = Some(vec!["ghost".to_string()]);
        raw.services.insert("a".to_string(), svc);
        let err = validate(raw, Path::new("/bin")).unwrap_err();
        assert_matches!(err, ConfigError::Invalid(_));
    }

    #[test]
    fn rejects_dependency_cycles() {
        let mut raw = RawConfig::default();
        let mut a = raw_service(&["true"]);
        a.depends_on = Some(vec!["b".to_string()]);
        let mut b = raw_service(&["true"]);
        b.depends_on = Some(vec!["a".to_string()]);
        raw.services.insert("a".to_string(), a);
        raw.services.insert("b".to_string(), b);
        let err = validate(raw, Path::new("/bin")).unwrap_err();
        assert_matches!(err, ConfigError::Cycle(_));
    }

    #[test]
    fn old_and_new_healthcheck_shapes_conflict() {
        let mut raw = RawConfig::default();
        let mut svc = raw_service(&["true"]);
        svc.healthcheck = Some(RawHealthCheck {
            url: Some("http://127.0.0.1/health".to_string()),
            test_type: Some("process".to_string()),
            ..Default::default()
        });
        raw.services.insert("a".to_string(), svc);
        let err = validate(raw, Path::new("/bin")).unwrap_err();
        assert_matches!(err, ConfigError::Invalid(_));
    }

    #[test]
    fn old_shape_maps_to_http_probe() {
        let mut raw = RawConfig::default();
        let mut svc = raw_service(&["true"]);
        svc.healthcheck = Some(RawHealthCheck {
            url: Some("http://127.0.0.1:8080/ok".to_string()),
            check_delay: Some(Duration::from_secs(2)),
            ..Default::default()
        });
        raw.services.insert("a".to_string(), svc);
        let config = validate(raw, Path::new("/bin")).unwrap();
        let (template, params) = config.services["a"].healthcheck.clone().unwrap();
        assert_eq!(template, ProbeTemplate::Http { url: "http://127.0.0.1:8080/ok".to_string(), timeout: DEFAULT_HEALTHCHECK_TIMEOUT });
        assert_eq!(params.start_period, Duration::from_secs(2));
    }

    #[test]
    fn defaults_to_process_probe_when_unconfigured() {
        let mut raw = RawConfig::default();
        raw.services.insert("a".to_string(), raw_service(&["true"]));
        let config = validate(raw, Path::new("/bin")).unwrap();
        assert!(config.services["a"].healthcheck.is_none());
        assert_eq!(config.services["a"].work_dir, Path::new("/bin/a"));
    }

    #[test]
    fn enable_false_disables_healthcheck_but_keeps_restart() {
        let mut raw = RawConfig::default();
        let mut svc = raw_service(&["true"]);
        svc.healthcheck = Some(RawHealthCheck {
            enable: Some(false),
            restart: Some(false),
            ..Default::default()
        });
        raw.services.insert("a".to_string(), svc);
        let config = validate(raw, Path::new("/bin")).unwrap();
        assert!(config.services["a"].healthcheck.is_none());
        assert!(!config.services["a"].restart_policy.enabled);
    }
}
