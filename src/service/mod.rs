//! C7 — OS-Service Adapter: receives host-level `start`/`stop`/`status`
//! callbacks from the platform service manager and forwards them to the
//! Control Plane (spec §4.7). Two backends behind one trait: systemd unit
//! files on Linux, the Windows SCM elsewhere.

pub mod error;

#[cfg(not(target_family = "windows"))]
pub mod systemd;

#[cfg(target_family = "windows")]
pub mod windows;

pub use error::ServiceError;

use std::path::PathBuf;

/// Everything a backend needs to render/register itself; assembled from
/// `config.yaml`'s `sys_service_name`/`sys_service_desc` (spec §6) plus the
/// running binary's own path.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub description: String,
    pub binary_path: PathBuf,
    pub working_dir: PathBuf,
}

/// Host-level lifecycle a platform service manager can drive (spec §4.7).
pub trait OsServiceAdapter {
    /// Registers the binary as a host service under `config.name`.
    fn install(&self) -> Result<(), ServiceError>;
    /// Removes the host service registration.
    fn uninstall(&self) -> Result<(), ServiceError>;
    /// Asks the host service manager to start the registered service.
    fn start(&self) -> Result<(), ServiceError>;
    /// Asks the host service manager to stop the registered service.
    fn stop(&self) -> Result<(), ServiceError>;
    /// Asks the host service manager for the registered service's current
    /// state (spec §6's `status` command, at the OS-registration level —
    /// the rich per-service `StatusSnapshot` is only reachable from inside
    /// the running process itself, via the event stream).
    fn query_status(&self) -> Result<String, ServiceError>;
}

/// Picks the backend for the host this binary is running on.
#[cfg(not(target_family = "windows"))]
pub fn platform_adapter(config: ServiceConfig) -> Box<dyn OsServiceAdapter> {
    Box::new(systemd::SystemdAdapter::new(config))
}

#[cfg(target_family = "windows")]
pub fn platform_adapter(config: ServiceConfig) -> Box<dyn OsServiceAdapter> {
    Box::new(windows::WindowsServiceAdapter::new(config))
}
