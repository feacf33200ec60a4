//! systemd backend for the OS-Service Adapter (spec §4.7): renders a unit
//! file, reloads/enables it via `systemctl`, and shells out for
//! start/stop. Restart policy is this engine's own job, not systemd's —
//! the unit is deliberately `Restart=no`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use super::{OsServiceAdapter, ServiceConfig};
use crate::service::error::ServiceError;
use crate::utils::is_elevated::is_elevated;

const UNIT_DIR: &str = "/etc/systemd/system";

pub struct SystemdAdapter {
    config: ServiceConfig,
    unit_dir: PathBuf,
}

impl SystemdAdapter {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            unit_dir: PathBuf::from(UNIT_DIR),
        }
    }

    fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(format!("{}.service", self.config.name))
    }

    fn render_unit(&self) -> String {
        format!(
            "[Unit]\n\
             Description={desc}\n\
             After=network.target\n\
             \n\
             [Service]\n\
             Type=simple\n\
             ExecStart={exec}\n\
             WorkingDirectory={work_dir}\n\
             Restart=no\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            desc = self.config.description,
            exec = self.config.binary_path.display(),
            work_dir = self.config.working_dir.display(),
        )
    }

    fn require_root(&self, action: &'static str) -> Result<(), ServiceError> {
        if !is_elevated().unwrap_or(false) {
            return Err(ServiceError::PermissionDenied(action));
        }
        Ok(())
    }

    fn systemctl(&self, args: &[&str]) -> Result<(), ServiceError> {
        let output = Command::new("systemctl")
            .args(args)
            .output()
            .map_err(ServiceError::Io)?;
        if !output.status.success() {
            return Err(ServiceError::Command(format!(
                "systemctl {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}

fn unit_exists(path: &Path) -> bool {
    path.is_file()
}

impl OsServiceAdapter for SystemdAdapter {
    fn install(&self) -> Result<(), ServiceError> {
        self.require_root("install")?;
        if unit_exists(&self.unit_path()) {
            return Err(ServiceError::AlreadyInstalled);
        }
        info!(service = %self.config.name, "writing systemd unit");
        fs::write(self.unit_path(), self.render_unit())?;
        self.systemctl(&["daemon-reload"])?;
        self.systemctl(&["enable", &self.config.name])?;
        Ok(())
    }

    fn uninstall(&self) -> Result<(), ServiceError> {
        self.require_root("uninstall")?;
        if !unit_exists(&self.unit_path()) {
            return Err(ServiceError::NotInstalled);
        }
        let _ = self.systemctl(&["stop", &self.config.name]);
        self.systemctl(&["disable", &self.config.name])?;
        fs::remove_file(self.unit_path())?;
        self.systemctl(&["daemon-reload"])?;
        Ok(())
    }

    fn start(&self) -> Result<(), ServiceError> {
        if !unit_exists(&self.unit_path()) {
            return Err(ServiceError::NotInstalled);
        }
        self.systemctl(&["start", &self.config.name])
    }

    fn stop(&self) -> Result<(), ServiceError> {
        if !unit_exists(&self.unit_path()) {
            return Err(ServiceError::NotInstalled);
        }
        self.systemctl(&["stop", &self.config.name])
    }

    fn query_status(&self) -> Result<String, ServiceError> {
        if !unit_exists(&self.unit_path()) {
            return Err(ServiceError::NotInstalled);
        }
        let output = Command::new("systemctl")
            .args(["is-active", &self.config.name])
            .output()
            .map_err(ServiceError::Io)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServiceConfig {
        ServiceConfig {
            name: "process-compose-test".to_string(),
            description: "test service".to_string(),
            binary_path: PathBuf::from("/usr/local/bin/process-compose"),
            working_dir: PathBuf::from("/usr/local/bin"),
        }
    }

    #[test]
    fn renders_a_simple_no_restart_unit() {
        let adapter = SystemdAdapter::new(config());
        let unit = adapter.render_unit();
        assert!(unit.contains("ExecStart=/usr/local/bin/process-compose"));
        assert!(unit.contains("Restart=no"));
        assert!(unit.contains("Type=simple"));
    }
}
