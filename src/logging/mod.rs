//! C2 — Log Redirector: copies a service's stdout/stderr into a per-service
//! rotating file under `{app_data_home}/{service}/logs/` when enabled.

pub mod redirector;
pub mod rotation;
pub mod tracing_init;

pub use redirector::LogRedirector;
pub use rotation::{log_path, RotatingFile, RotationPolicy};
pub use tracing_init::init as init_tracing;
