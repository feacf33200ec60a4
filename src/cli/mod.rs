//! Command-line entry point (spec §6 "CLI surface"). Mirrors the
//! collaborator's `Cli::parse()` + dispatch shape, scaled down to this
//! crate's five-command surface.

pub mod error;

pub use error::ProcessComposeError;

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use crossbeam::channel::RecvTimeoutError;
use tracing::info;

use crate::config::{Config, ConfigLoader, ConfigLoaderFile};
use crate::context::Context;
use crate::control::ControlPlane;
use crate::event::EngineEvent;
use crate::scheduler::Scheduler;
use crate::service::{platform_adapter, OsServiceAdapter, ServiceConfig};

const CONFIG_ENV_VAR: &str = "PROCESS_COMPOSE_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "config.yaml";
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(30);

/// How often the foreground event loop wakes up on its own to re-check
/// whether shutdown was signalled, even with no transition arriving.
const EVENT_LOOP_POLL_TICK: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about = "Single-node, container-less process supervisor", long_about = None)]
pub struct Cli {
    /// Overrides the default config path (`<binary_dir>/config.yaml`), or
    /// the `PROCESS_COMPOSE_CONFIG` environment variable if set.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register as an OS service under `sys_service_name`.
    Install,
    /// Unregister the OS service.
    Uninstall,
    /// Ask the host service manager to start the registered service.
    Start,
    /// Ask the host service manager to stop the registered service.
    Stop,
    /// Print the host service's registration status.
    Status,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    fn config_path(&self, binary_dir: &std::path::Path) -> PathBuf {
        self.config
            .clone()
            .or_else(|| env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
            .unwrap_or_else(|| binary_dir.join(DEFAULT_CONFIG_FILE))
    }
}

/// Runs the parsed command to completion, returning the process exit code
/// (spec §6 exit codes).
pub fn run(cli: Cli) -> i32 {
    match run_fallible(cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("process-compose: {err}");
            err.exit_code()
        }
    }
}

fn run_fallible(cli: Cli) -> Result<(), ProcessComposeError> {
    let current_exe = env::current_exe().unwrap_or_else(|_| PathBuf::from("process-compose"));
    let binary_dir = current_exe
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));

    let config_path = cli.config_path(&binary_dir);
    let loader = ConfigLoaderFile::new(config_path, binary_dir.clone());
    let config = loader.load_config()?;

    let service_config = ServiceConfig {
        name: config.sys_service_name.clone(),
        description: config.sys_service_desc.clone(),
        binary_path: current_exe,
        working_dir: binary_dir,
    };

    match cli.command {
        None => run_foreground(config),
        Some(Command::Install) => Ok(platform_adapter(service_config).install()?),
        Some(Command::Uninstall) => Ok(platform_adapter(service_config).uninstall()?),
        Some(Command::Start) => Ok(platform_adapter(service_config).start()?),
        Some(Command::Stop) => Ok(platform_adapter(service_config).stop()?),
        Some(Command::Status) => {
            let status = platform_adapter(service_config).query_status()?;
            println!("{status}");
            Ok(())
        }
    }
}

/// The no-args foreground mode (spec §6): load config, start the
/// scheduler, stream transition events to stdout, stop everything on
/// SIGINT/CTRL+C.
///
/// On Windows this doubles as the entry point the SCM itself launches
/// (spec §4.7): `sys_service_name` is registered with
/// `executable_path` pointing back at this same binary with no
/// arguments, so the very first thing this mode does is try to hand off
/// to the SCM dispatcher. That only succeeds when the process was in
/// fact started by the SCM; an interactive invocation falls straight
/// through to the console loop below.
fn run_foreground(config: Config) -> Result<(), ProcessComposeError> {
    crate::logging::init_tracing(&config.app_data_home, &config.log_level)?;

    #[cfg(windows)]
    let sys_service_name = config.sys_service_name.clone();

    let scheduler = Scheduler::new(config.services, config.app_data_home)
        .map_err(crate::control::ControlError::from)?;
    let control = ControlPlane::new(scheduler);
    let events = control.subscribe();

    #[cfg(windows)]
    {
        let start_control = control.clone();
        let stop_control = control.clone();
        if crate::service::windows::try_run_as_service(
            &sys_service_name,
            Box::new(move || {
                let _ = start_control.start_all();
            }),
            Box::new(move || {
                let _ = stop_control.stop_all(DEFAULT_STOP_GRACE);
            }),
        ) {
            return Ok(());
        }
    }

    let shutdown_ctx: Context<bool> = Context::new();
    let stop_control = control.clone();
    let signal_ctx = shutdown_ctx.clone();
    ctrlc::set_handler(move || {
        info!("received interrupt, stopping all services");
        let _ = stop_control.stop_all(DEFAULT_STOP_GRACE);
        let _ = signal_ctx.cancel_all(true);
    })
    .expect("failed to register Ctrl+C handler");

    control.start_all()?;
    info!("all services past startup");

    // Rather than block forever on `events.recv()` (which `ctrlc`'s handler
    // used to race past with `process::exit`, killing this thread mid-print),
    // poll with a timeout and only stop once the handler has signalled
    // shutdown *and* there's nothing left queued — every Stopped transition
    // `stop_all` waited on inside the handler is already sitting in the
    // channel by the time that signal fires, so this still prints all of
    // them before returning.
    loop {
        match events.recv_timeout(EVENT_LOOP_POLL_TICK) {
            Ok(EngineEvent::Transition(t)) => {
                println!(
                    "{} {} -> {} (gen {}): {}",
                    t.service, t.from, t.to, t.generation, t.reason
                );
            }
            Err(RecvTimeoutError::Timeout) => {
                if shutdown_ctx.is_cancelled() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}
