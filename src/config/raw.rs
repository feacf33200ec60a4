use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Mirrors `config.yaml` exactly (spec §6); every field is optional here so
/// a missing key is a defaulting decision for [`super::validate`], not a
/// parse error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub log_level: Option<String>,
    pub app_data_home: Option<PathBuf>,
    pub sys_service_name: Option<String>,
    pub sys_service_desc: Option<String>,
    pub services: HashMap<String, RawService>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawService {
    pub start_cmd: Vec<String>,
    pub log_redirect: Option<bool>,
    #[serde(default, deserialize_with = "duration_str::deserialize_option_duration")]
    pub startup_delay: Option<Duration>,
    pub depends_on: Option<Vec<String>>,
    pub healthcheck: Option<RawHealthCheck>,
    #[serde(default, deserialize_with = "duration_str::deserialize_option_duration")]
    pub stop_grace: Option<Duration>,
}

/// Union of both healthcheck shapes seen in the source material (spec §6's
/// config note and §9's open question): the canonical
/// `test_type`/`test_target`/`start_period` set, and the older
/// `enable`/`restart`/`url`/`check_delay` set. [`super::validate`] rejects
/// the combination if both shapes disagree rather than guessing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawHealthCheck {
    // Canonical shape.
    pub test_type: Option<String>,
    pub test_target: Option<String>,
    #[serde(default, deserialize_with = "duration_str::deserialize_option_duration")]
    pub timeout: Option<Duration>,
    #[serde(default, deserialize_with = "duration_str::deserialize_option_duration")]
    pub interval: Option<Duration>,
    pub retries: Option<u32>,
    #[serde(default, deserialize_with = "duration_str::deserialize_option_duration")]
    pub start_period: Option<Duration>,
    pub restart: Option<bool>,

    // Older shape (compatibility layer, spec §6 "Compatibility mapping").
    pub enable: Option<bool>,
    pub url: Option<String>,
    #[serde(default, deserialize_with = "duration_str::deserialize_option_duration")]
    pub check_delay: Option<Duration>,
}
