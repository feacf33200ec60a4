//! Windows SCM backend for the OS-Service Adapter (spec §4.7), mirroring
//! the collaborator's `install_agent_control_as_windows_service`: stop and
//! delete any previous registration, then create, describe, and start.

use std::ffi::OsString;
use std::sync::mpsc;
use std::sync::OnceLock;
use std::time::Duration;

use tracing::info;
use windows_service::service::{
    ServiceAccess, ServiceControl, ServiceControlAccept, ServiceErrorControl, ServiceExitCode,
    ServiceInfo, ServiceStartType, ServiceState, ServiceStatus, ServiceType,
};
use windows_service::service_control_handler::{self, ServiceControlHandlerResult};
use windows_service::service_dispatcher;
use windows_service::service_manager::{ServiceManager, ServiceManagerAccess};
use windows_sys::Win32::Foundation::ERROR_SERVICE_DOES_NOT_EXIST;

use super::{OsServiceAdapter, ServiceConfig};
use crate::service::error::ServiceError;
use crate::utils::is_elevated::is_elevated;

pub struct WindowsServiceAdapter {
    config: ServiceConfig,
}

impl WindowsServiceAdapter {
    pub fn new(config: ServiceConfig) -> Self {
        Self { config }
    }

    fn require_elevated(&self) -> Result<(), ServiceError> {
        if !is_elevated().unwrap_or(false) {
            return Err(ServiceError::PermissionDenied(
                "manage the Windows service registration",
            ));
        }
        Ok(())
    }

    fn stop_and_delete_if_exists(&self) -> Result<(), ServiceError> {
        let manager = ServiceManager::local_computer(None::<&str>, ServiceManagerAccess::CONNECT)?;
        let access = ServiceAccess::QUERY_STATUS | ServiceAccess::STOP | ServiceAccess::DELETE;
        let service = match manager.open_service(&self.config.name, access) {
            Ok(service) => service,
            Err(windows_service::Error::Winapi(err))
                if err.raw_os_error() == Some(ERROR_SERVICE_DOES_NOT_EXIST as i32) =>
            {
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let status = service.query_status()?;
        if status.current_state != ServiceState::Stopped {
            info!(service = %self.config.name, "stopping existing service registration");
            service.stop()?;
        }
        service.delete()?;
        Ok(())
    }
}

impl OsServiceAdapter for WindowsServiceAdapter {
    fn install(&self) -> Result<(), ServiceError> {
        self.require_elevated()?;
        self.stop_and_delete_if_exists()?;

        let manager_access = ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE;
        let manager = ServiceManager::local_computer(None::<&str>, manager_access)?;

        info!(service = %self.config.name, "creating and starting Windows service");
        let service_info = ServiceInfo {
            name: OsString::from(&self.config.name),
            display_name: OsString::from(&self.config.description),
            service_type: ServiceType::OWN_PROCESS,
            start_type: ServiceStartType::AutoStart,
            error_control: ServiceErrorControl::Normal,
            executable_path: self.config.binary_path.clone(),
            launch_arguments: vec![],
            dependencies: vec![],
            account_name: None,
            account_password: None,
        };
        let service = manager.create_service(&service_info, ServiceAccess::CHANGE_CONFIG | ServiceAccess::START)?;
        service.set_description(&self.config.description)?;
        service.start(&[std::ffi::OsStr::new("start")])?;
        Ok(())
    }

    fn uninstall(&self) -> Result<(), ServiceError> {
        self.require_elevated()?;
        self.stop_and_delete_if_exists()
    }

    fn start(&self) -> Result<(), ServiceError> {
        let manager = ServiceManager::local_computer(None::<&str>, ServiceManagerAccess::CONNECT)?;
        let service = manager
            .open_service(&self.config.name, ServiceAccess::START)
            .map_err(|_| ServiceError::NotInstalled)?;
        service.start(&[std::ffi::OsStr::new("start")])?;
        Ok(())
    }

    fn stop(&self) -> Result<(), ServiceError> {
        let manager = ServiceManager::local_computer(None::<&str>, ServiceManagerAccess::CONNECT)?;
        let service = manager
            .open_service(&self.config.name, ServiceAccess::STOP)
            .map_err(|_| ServiceError::NotInstalled)?;
        service.stop()?;
        Ok(())
    }

    fn query_status(&self) -> Result<String, ServiceError> {
        let manager = ServiceManager::local_computer(None::<&str>, ServiceManagerAccess::CONNECT)?;
        let service = manager
            .open_service(&self.config.name, ServiceAccess::QUERY_STATUS)
            .map_err(|_| ServiceError::NotInstalled)?;
        let status = service.query_status()?;
        Ok(format!("{:?}", status.current_state))
    }
}

/// What the SCM dispatcher calls back into once it hands control to this
/// process. `on_start`/`on_stop` must return quickly — SCM gives 30 s to
/// acknowledge a start request (spec §4.7) — so both are expected to hand
/// the real work to a background thread themselves (`ControlPlane::start_all`
/// is blocking, so the caller is responsible for spawning it off-thread).
pub struct ServiceCallbacks {
    pub on_start: Box<dyn Fn() + Send + Sync>,
    pub on_stop: Box<dyn Fn() + Send + Sync>,
}

static CALLBACKS: OnceLock<ServiceCallbacks> = OnceLock::new();

windows_service::define_windows_service!(ffi_service_main, service_main);

/// Registers with the SCM and blocks until the service is told to stop.
/// Must be called from the process the SCM itself launched (not from an
/// interactive `install`/`start`/`stop` CLI invocation).
pub fn run_service_dispatcher(name: &str, callbacks: ServiceCallbacks) -> Result<(), ServiceError> {
    CALLBACKS
        .set(callbacks)
        .map_err(|_| ServiceError::Command("service dispatcher already running".into()))?;
    service_dispatcher::start(name, ffi_service_main).map_err(ServiceError::from)
}

/// Attempts to hand this process off to the SCM dispatcher, returning
/// `true` if it was in fact launched by the SCM (in which case `run_service_dispatcher`
/// has already run the whole service lifecycle and returned) or `false`
/// if it wasn't (an interactive invocation, which should fall through to
/// the ordinary foreground console loop).
pub fn try_run_as_service(
    name: &str,
    on_start: Box<dyn Fn() + Send + Sync>,
    on_stop: Box<dyn Fn() + Send + Sync>,
) -> bool {
    run_service_dispatcher(name, ServiceCallbacks { on_start, on_stop }).is_ok()
}

fn service_main(_args: Vec<OsString>) {
    let _ = run();
}

fn run() -> Result<(), ServiceError> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let event_handler = move |control_event| -> ServiceControlHandlerResult {
        match control_event {
            ServiceControl::Stop => {
                let _ = shutdown_tx.send(());
                ServiceControlHandlerResult::NoError
            }
            ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
            _ => ServiceControlHandlerResult::NotImplemented,
        }
    };

    let status_handle = service_control_handler::register("process-compose", event_handler)?;

    status_handle.set_service_status(ServiceStatus {
        service_type: ServiceType::OWN_PROCESS,
        current_state: ServiceState::StartPending,
        controls_accepted: ServiceControlAccept::empty(),
        exit_code: ServiceExitCode::Win32(0),
        checkpoint: 0,
        wait_hint: Duration::from_secs(5),
        process_id: None,
    })?;

    if let Some(callbacks) = CALLBACKS.get() {
        (callbacks.on_start)();
    }

    status_handle.set_service_status(ServiceStatus {
        service_type: ServiceType::OWN_PROCESS,
        current_state: ServiceState::Running,
        controls_accepted: ServiceControlAccept::STOP,
        exit_code: ServiceExitCode::Win32(0),
        checkpoint: 0,
        wait_hint: Duration::default(),
        process_id: None,
    })?;

    let _ = shutdown_rx.recv();

    status_handle.set_service_status(ServiceStatus {
        service_type: ServiceType::OWN_PROCESS,
        current_state: ServiceState::StopPending,
        controls_accepted: ServiceControlAccept::empty(),
        exit_code: ServiceExitCode::Win32(0),
        checkpoint: 0,
        wait_hint: Duration::from_secs(5),
        process_id: None,
    })?;

    if let Some(callbacks) = CALLBACKS.get() {
        (callbacks.on_stop)();
    }

    status_handle.set_service_status(ServiceStatus {
        service_type: ServiceType::OWN_PROCESS,
        current_state: ServiceState::Stopped,
        controls_accepted: ServiceControlAccept::empty(),
        exit_code: ServiceExitCode::Win32(0),
        checkpoint: 0,
        wait_hint: Duration::default(),
        process_id: None,
    })?;

    Ok(())
}
