use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use crossbeam::channel::{self, RecvTimeoutError};
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::event::channel::{pub_sub, EventPublisher};
use crate::event::{EngineEvent, SupervisorEvent, Transition};
use crate::health::{self, Health};
use crate::logging::{log_path, LogRedirector, RotationPolicy};
use crate::process::{ProcessRunner, ProcessTerminator};
use crate::utils::thread_context::StartedThreadContext;
use crate::utils::threads::spawn_named_thread;

use super::runtime::ServiceRuntime;
use super::spec::ServiceSpec;
use super::state::State;

/// The poll tick used while waiting for a state-machine event, so the
/// driver loop can also notice `ctx` cancellation promptly (spec §5: every
/// wait in the core is cancellable).
const DRIVER_TICK: Duration = Duration::from_millis(200);

pub struct NotStartedSupervisor {
    spec: ServiceSpec,
    app_data_home: PathBuf,
    engine_publisher: EventPublisher<EngineEvent>,
}

impl NotStartedSupervisor {
    pub fn new(
        spec: ServiceSpec,
        app_data_home: PathBuf,
        engine_publisher: EventPublisher<EngineEvent>,
    ) -> Self {
        Self {
            spec,
            app_data_home,
            engine_publisher,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Spawns the driver thread that owns this service for its whole
    /// lifetime. Called by the Scheduler only once every `depends_on`
    /// prerequisite has reached `Healthy` (spec §4.4 invariant 2) — the
    /// `WaitingDeps` state is therefore already behind this call by
    /// construction; the driver enters at `Delaying`.
    pub fn start(self) -> StartedSupervisor {
        let ctx: Context<bool> = Context::new();
        let status = Arc::new(Mutex::new(ServiceRuntime::default()));

        let name = self.spec.name.clone();
        let driver_ctx = ctx.clone();
        let driver_status = status.clone();

        let join_handle = spawn_named_thread(format!("supervisor-{name}"), move || {
            run(
                self.spec,
                self.app_data_home,
                self.engine_publisher,
                driver_ctx,
                driver_status,
            );
        });

        StartedSupervisor {
            name,
            ctx,
            join_handle,
            status,
        }
    }
}

pub struct StartedSupervisor {
    name: String,
    ctx: Context<bool>,
    join_handle: JoinHandle<()>,
    status: Arc<Mutex<ServiceRuntime>>,
}

impl StartedSupervisor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> ServiceRuntime {
        self.status.lock().unwrap().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Requests shutdown (spec §4.5: the Scheduler calls this in reverse
    /// topological order) and blocks until the driver thread has reached a
    /// terminal state and exited. The caller is responsible for the overall
    /// shutdown hard cap; this call itself has no timeout.
    pub fn stop(self) {
        let _ = self.ctx.cancel_all(true);
        let _ = self.join_handle.join();
    }
}

fn run(
    spec: ServiceSpec,
    app_data_home: PathBuf,
    engine_publisher: EventPublisher<EngineEvent>,
    ctx: Context<bool>,
    status: Arc<Mutex<ServiceRuntime>>,
) {
    let mut restart_policy = spec.restart_policy.clone();
    let generation_counter = Arc::new(AtomicU64::new(0));

    transition(&spec.name, &status, &engine_publisher, State::WaitingDeps, "released by scheduler");
    transition(&spec.name, &status, &engine_publisher, State::Delaying, "starting up");

    if ctx.sleep_or_cancelled(spec.startup_delay) {
        transition(&spec.name, &status, &engine_publisher, State::Stopping, "cancelled during startup delay");
        transition(&spec.name, &status, &engine_publisher, State::Stopped, "stopped before first spawn");
        return;
    }

    'respawn: loop {
        transition(&spec.name, &status, &engine_publisher, State::Starting, "spawning child");

        let (runner, log_redirector) = match spawn(&spec, &app_data_home) {
            Ok(pair) => pair,
            Err(err) => {
                error!(service = %spec.name, %err, "spawn failed");
                transition(&spec.name, &status, &engine_publisher, State::Failed, &format!("spawn error: {err}"));
                return;
            }
        };

        let pid = runner.pid();
        let job_handle = runner.job_handle();
        let generation = {
            let mut guard = status.lock().unwrap();
            guard.pid = Some(pid);
            guard.next_generation()
        };
        generation_counter.store(generation, Ordering::SeqCst);
        info!(service = %spec.name, pid, generation, "spawned");

        let (exit_tx, exit_rx) = pub_sub::<SupervisorEvent>();
        {
            let exit_tx = exit_tx.clone();
            let service = spec.name.clone();
            spawn_named_thread(format!("wait-{service}"), move || match runner.wait() {
                Ok((exit_status, _duration)) => {
                    let _ = exit_tx.publish(SupervisorEvent::ChildExited {
                        generation,
                        code: exit_status.code(),
                        signal: exit_signal(&exit_status),
                    });
                }
                Err(err) => {
                    warn!(%service, %err, "error waiting for child");
                    let _ = exit_tx.publish(SupervisorEvent::ChildExited {
                        generation,
                        code: None,
                        signal: None,
                    });
                }
            });
        }

        let health_thread = spec.healthcheck.as_ref().map(|(template, params)| {
            let probe = template.instantiate(pid);
            health::spawn_health_checker(
                spec.name.clone(),
                probe,
                *params,
                generation_counter.clone(),
                exit_tx.clone(),
            )
        });

        if spec.healthcheck.is_none() {
            // No healthcheck: become Healthy once the process has survived
            // one scheduler tick, to avoid flapping on immediate exit
            // (spec §4.4).
            if !ctx.sleep_or_cancelled(Duration::from_millis(50)) {
                transition(&spec.name, &status, &engine_publisher, State::Healthy, "no healthcheck configured");
                restart_policy.reset_backoff();
            }
        } else {
            transition(&spec.name, &status, &engine_publisher, State::Probing, "waiting for first probe result");
        }

        let mut became_healthy_this_generation = spec.healthcheck.is_none();

        let outcome = 'drive: loop {
            if ctx.is_cancelled() {
                break 'drive DriveOutcome::Shutdown;
            }

            match exit_rx.as_ref().recv_timeout(DRIVER_TICK) {
                Ok(SupervisorEvent::ChildExited { generation: g, code, signal }) if g == generation => {
                    status.lock().unwrap().record_exit(code, signal);
                    warn!(service = %spec.name, ?code, ?signal, "child exited");
                    break 'drive DriveOutcome::ChildExited;
                }
                Ok(SupervisorEvent::Health { generation: g, health }) if g == generation => {
                    match health {
                        Health::Healthy(_) => {
                            if !became_healthy_this_generation {
                                became_healthy_this_generation = true;
                                transition(&spec.name, &status, &engine_publisher, State::Healthy, "first successful probe");
                                restart_policy.reset_backoff();
                            }
                        }
                        Health::Unhealthy(u) => {
                            transition(
                                &spec.name,
                                &status,
                                &engine_publisher,
                                State::Unhealthy,
                                &format!("probe failed {} consecutive times: {}", u.consecutive_failures, u.last_error),
                            );
                            status.lock().unwrap().consecutive_failures = u.consecutive_failures;
                            break 'drive DriveOutcome::Unhealthy;
                        }
                    }
                }
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break 'drive DriveOutcome::ChildExited,
            }
        };

        if let Some(health_thread) = health_thread {
            stop_collaborator(health_thread);
        }

        match outcome {
            DriveOutcome::Shutdown => {
                transition(&spec.name, &status, &engine_publisher, State::Stopping, "stop requested");
                terminate(pid, job_handle.clone(), spec.stop_grace, &exit_rx, generation);
                status.lock().unwrap().pid = None;
                transition(&spec.name, &status, &engine_publisher, State::Stopped, "shutdown complete");
                if let Some(redirector) = log_redirector {
                    redirector.join();
                }
                return;
            }
            DriveOutcome::Unhealthy => {
                terminate(pid, job_handle.clone(), spec.stop_grace, &exit_rx, generation);
                status.lock().unwrap().pid = None;
                if let Some(redirector) = log_redirector {
                    redirector.join();
                }
                match restart_policy.next_delay() {
                    Some(delay) => {
                        transition(&spec.name, &status, &engine_publisher, State::Restarting, "unhealthy, backing off before restart");
                        if ctx.sleep_or_cancelled(delay) {
                            transition(&spec.name, &status, &engine_publisher, State::Stopping, "cancelled during backoff");
                            transition(&spec.name, &status, &engine_publisher, State::Stopped, "stopped during backoff");
                            return;
                        }
                        continue 'respawn;
                    }
                    None => {
                        transition(&spec.name, &status, &engine_publisher, State::Failed, "restart policy exhausted after unhealthy");
                        return;
                    }
                }
            }
            DriveOutcome::ChildExited => {
                if let Some(redirector) = log_redirector {
                    redirector.join();
                }
                match restart_policy.next_delay() {
                    Some(delay) => {
                        transition(&spec.name, &status, &engine_publisher, State::Restarting, "child exited, backing off before restart");
                        if ctx.sleep_or_cancelled(delay) {
                            transition(&spec.name, &status, &engine_publisher, State::Stopping, "cancelled during backoff");
                            transition(&spec.name, &status, &engine_publisher, State::Stopped, "stopped during backoff");
                            return;
                        }
                        continue 'respawn;
                    }
                    None => {
                        transition(&spec.name, &status, &engine_publisher, State::Failed, "restart policy exhausted after child exit");
                        return;
                    }
                }
            }
        }
    }
}

enum DriveOutcome {
    Shutdown,
    Unhealthy,
    ChildExited,
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

fn spawn(
    spec: &ServiceSpec,
    app_data_home: &PathBuf,
) -> Result<(ProcessRunner<crate::process::Started>, Option<LogRedirector>), crate::process::ProcessError> {
    let runner = ProcessRunner::new(&spec.work_dir, &spec.start_cmd, &spec.env, spec.stdio_policy())?;
    let mut started = runner.start()?;

    let redirector = if spec.log_redirect {
        let (tx, rx) = channel::unbounded();
        started.stream(tx)?;
        let path = log_path(app_data_home, &spec.name);
        Some(LogRedirector::spawn(&spec.name, path, RotationPolicy::default(), rx))
    } else {
        None
    };

    Ok((started, redirector))
}

/// Sends a polite termination signal and waits up to `grace` for the
/// child's own wait thread to report `ChildExited` on `exit_rx` before
/// escalating to an unconditional kill (spec §4.1, §4.5).
fn terminate(
    pid: u32,
    job_handle: Option<crate::process::JobHandle>,
    grace: Duration,
    exit_rx: &crate::event::channel::EventConsumer<SupervisorEvent>,
    generation: u64,
) {
    let deadline = std::time::Instant::now() + grace;
    let _ = ProcessTerminator::with_job(pid, job_handle).shutdown(|| loop {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        if remaining.is_zero() {
            return false;
        }
        match exit_rx.as_ref().recv_timeout(remaining) {
            Ok(SupervisorEvent::ChildExited { generation: g, .. }) if g == generation => {
                return true;
            }
            Ok(_) => continue,
            Err(_) => return false,
        }
    });
}

fn stop_collaborator(thread: StartedThreadContext) {
    if let Err(err) = thread.stop() {
        warn!(%err, "collaborator thread did not stop cleanly");
    }
}

fn transition(
    service: &str,
    status: &Arc<Mutex<ServiceRuntime>>,
    publisher: &EventPublisher<EngineEvent>,
    to: State,
    reason: &str,
) {
    let (from, generation) = {
        let mut guard = status.lock().unwrap();
        let from = guard.state;
        guard.enter(to);
        (from, guard.generation)
    };

    debug!(service, %from, %to, reason, "state transition");

    let _ = publisher.publish(EngineEvent::Transition(Transition {
        service: service.to_string(),
        from,
        to,
        generation,
        reason: reason.to_string(),
        ts: SystemTime::now(),
    }));
}
