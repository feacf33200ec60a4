//! Initializes the supervisor process's own diagnostic logging — distinct
//! from [`super::redirector`], which captures a managed service's stdout/
//! stderr. Writes to stdout and to `{app_data_home}/supervisor.log` (spec
//! §6 filesystem layout), level controlled by `config.yaml`'s `log_level`.

use std::fs::OpenOptions;
use std::path::Path;

use thiserror::Error;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum TracingInitError {
    #[error("could not open supervisor log file: {0}")]
    Io(#[from] std::io::Error),
    #[error("tracing subscriber already initialized")]
    AlreadyInitialized,
}

pub fn init(app_data_home: &Path, log_level: &str) -> Result<(), TracingInitError> {
    std::fs::create_dir_all(app_data_home)?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(app_data_home.join("supervisor.log"))?;

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout.and(log_file))
        .try_init()
        .map_err(|_| TracingInitError::AlreadyInitialized)
}
