use thiserror::Error;

use crate::scheduler::GraphError;

/// Fatal, load-time-only errors (spec §7: `config.invalid`/`config.cycle`
/// are the only two rows that abort the process itself).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error reading config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Cycle(#[from] GraphError),
}
