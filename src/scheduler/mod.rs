//! C5 — Dependency Scheduler: computes the start order from `depends_on`,
//! gates each Supervisor's start on readiness of its prerequisites, and
//! coordinates reverse-order shutdown (spec §4.5).
//!
//! The Scheduler is the sole owner of every `Supervisor` (spec §3
//! "Ownership"). All mutation of the release state happens on one
//! dedicated engine thread; callers interact through request/reply
//! messages, mirroring the rest of the crate's "one owner thread per
//! concurrent resource" shape (`supervisor::run`, `health::spawn_health_checker`).

pub mod error;
pub mod graph;

pub use error::SchedulerError;
pub use graph::{Graph, GraphError};

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use crossbeam::select;
use tracing::{info, warn};

use crate::event::broadcaster::UnboundedBroadcast;
use crate::event::channel::{pub_sub, EventConsumer, EventPublisher};
use crate::event::{EngineEvent, Transition};
use crate::supervisor::runtime::LastExit;
use crate::supervisor::{NotStartedSupervisor, ServiceSpec, StartedSupervisor, State};
use crate::utils::threads::spawn_named_thread;

/// How often the startup/shutdown convergence loops re-check their stop
/// condition even with no new transition arriving, so a race where every
/// relevant event already landed before the loop started can't wedge.
const POLL_TICK: Duration = Duration::from_millis(100);

/// Default per-shutdown-wave hard-cap multiplier applied on top of the
/// slowest single node's grace period (spec §4.5 step 2: "2x grace x depth").
const HARD_CAP_GRACE_MULTIPLIER: u32 = 2;

/// A point-in-time view of one service, handed out by [`Scheduler::status`]
/// (spec §4.6 `status()`).
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub name: String,
    pub state: State,
    pub pid: Option<u32>,
    pub generation: u64,
    pub consecutive_failures: u32,
    pub last_exit: Option<LastExit>,
}

enum Command {
    StartAll(Sender<()>),
    StopAll(Duration, Sender<()>),
    Status(Sender<Vec<ServiceStatus>>),
    Restart(String, Sender<Result<(), SchedulerError>>),
}

/// The externally-facing handle. Cloning is cheap (it's just a sender and a
/// broadcast handle); every clone talks to the same engine thread.
#[derive(Clone)]
pub struct Scheduler {
    command_tx: Sender<Command>,
    broadcast: UnboundedBroadcast<EngineEvent>,
    join_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Scheduler {
    /// Builds the dependency graph, validates it's a DAG, and spawns the
    /// engine thread. Every service starts out un-released (spec §4.5 step
    /// 2: "the scheduler releases every node whose prerequisites have all
    /// reached Healthy" — nobody has, yet).
    pub fn new(
        specs: HashMap<String, ServiceSpec>,
        app_data_home: PathBuf,
    ) -> Result<Self, SchedulerError> {
        for spec in specs.values() {
            for dep in &spec.depends_on {
                if !specs.contains_key(dep) {
                    return Err(SchedulerError::UnknownDependency(dep.clone()));
                }
            }
        }

        let depends_on: HashMap<String, Vec<String>> = specs
            .iter()
            .map(|(name, spec)| (name.clone(), spec.depends_on.clone()))
            .collect();
        let graph = Graph::new(depends_on);
        graph.topo_order()?;

        let (internal_tx, internal_rx) = pub_sub::<EngineEvent>();
        let (command_tx, command_rx) = channel::unbounded::<Command>();
        let broadcast = UnboundedBroadcast::default();

        let slots: HashMap<String, Slot> = specs
            .iter()
            .map(|(name, spec)| {
                let supervisor = NotStartedSupervisor::new(
                    spec.clone(),
                    app_data_home.clone(),
                    internal_tx.clone(),
                );
                (name.clone(), Slot::NotStarted(supervisor))
            })
            .collect();

        let remaining: HashMap<String, HashSet<String>> = specs
            .iter()
            .map(|(name, spec)| (name.clone(), spec.depends_on.iter().cloned().collect()))
            .collect();

        let engine = EngineState {
            specs,
            graph,
            app_data_home,
            internal_tx,
            internal_rx,
            slots,
            remaining,
            blocked: HashSet::new(),
            generation_offset: HashMap::new(),
            broadcast: broadcast.clone(),
        };

        let join_handle = spawn_named_thread("scheduler-engine", move || engine_loop(engine, command_rx));

        Ok(Self {
            command_tx,
            broadcast,
            join_handle: Arc::new(Mutex::new(Some(join_handle))),
        })
    }

    /// Drops this handle's sender and joins the engine thread. Only the
    /// last live `Scheduler` clone actually triggers the join (the engine
    /// thread exits once every `Sender<Command>` clone is gone); callers
    /// that don't hold the last clone just drop their sender.
    pub fn shutdown(self) {
        let handle = self.join_handle.lock().unwrap().take();
        drop(self.command_tx);
        drop(self.broadcast);
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Idempotent; releases every initially-ready service and blocks until
    /// every service is past `Starting` (`Healthy` or `Failed`), or past
    /// `Starting` but permanently blocked behind a failed prerequisite (spec
    /// §4.6).
    pub fn start_all(&self) -> Result<(), SchedulerError> {
        self.call(Command::StartAll)
    }

    /// Idempotent; requests reverse-order shutdown and blocks until it
    /// completes or the hard cap fires (spec §4.5, §4.6).
    pub fn stop_all(&self, grace: Duration) -> Result<(), SchedulerError> {
        let (tx, rx) = channel::bounded(1);
        self.command_tx
            .send(Command::StopAll(grace, tx))
            .map_err(|_| SchedulerError::EngineStopped)?;
        rx.recv().map_err(|_| SchedulerError::EngineStopped)
    }

    pub fn status(&self) -> Result<Vec<ServiceStatus>, SchedulerError> {
        let (tx, rx) = channel::bounded(1);
        self.command_tx
            .send(Command::Status(tx))
            .map_err(|_| SchedulerError::EngineStopped)?;
        rx.recv().map_err(|_| SchedulerError::EngineStopped)
    }

    /// Queues a single service to cycle `Stopping` → (restart policy) → a
    /// new generation (spec §4.6 `restart(name)`).
    pub fn restart(&self, name: &str) -> Result<(), SchedulerError> {
        let (tx, rx) = channel::bounded(1);
        self.command_tx
            .send(Command::Restart(name.to_string(), tx))
            .map_err(|_| SchedulerError::EngineStopped)?;
        rx.recv().map_err(|_| SchedulerError::EngineStopped)?
    }

    /// Subscribes to the raw transition event stream (spec §4.6's event
    /// stream consumed by the CLI's foreground mode).
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.broadcast.subscribe()
    }

    fn call<F>(&self, make_cmd: F) -> Result<(), SchedulerError>
    where
        F: FnOnce(Sender<()>) -> Command,
    {
        let (tx, rx) = channel::bounded(1);
        self.command_tx
            .send(make_cmd(tx))
            .map_err(|_| SchedulerError::EngineStopped)?;
        rx.recv().map_err(|_| SchedulerError::EngineStopped)
    }
}

enum Slot {
    NotStarted(NotStartedSupervisor),
    Started(StartedSupervisor),
    /// A node that finished (or never needed) shutdown; retains its last
    /// known runtime snapshot purely for `status()`.
    Stopped(ServiceStatus),
}

struct EngineState {
    specs: HashMap<String, ServiceSpec>,
    graph: Graph,
    app_data_home: PathBuf,
    internal_tx: EventPublisher<EngineEvent>,
    internal_rx: EventConsumer<EngineEvent>,
    slots: HashMap<String, Slot>,
    remaining: HashMap<String, HashSet<String>>,
    blocked: HashSet<String>,
    generation_offset: HashMap<String, u64>,
    broadcast: UnboundedBroadcast<EngineEvent>,
}

/// The engine's whole-lifetime loop. `do_start_all`/`do_stop_all` each drain
/// `internal_rx` themselves while they're in charge of the thread (they have
/// their own convergence condition to wait on), but the steady state between
/// commands — a running, already-`Healthy` fleet restarting, flipping
/// `unhealthy`, or failing on its own — has no such caller. This top-level
/// select is what keeps broadcasting (and applying release/block logic for)
/// every `Transition` during that window too, so a subscriber never sees the
/// stream stall just because no `Command` happens to be in flight (grounded
/// on `AgentControl::process_events`'s top-level `select!` in
/// `agent_control.rs`, which runs for the whole lifetime of its owned
/// sub-agent collection rather than only while handling one request).
fn engine_loop(mut state: EngineState, command_rx: Receiver<Command>) {
    loop {
        select! {
            recv(command_rx) -> cmd => match cmd {
                Ok(Command::StartAll(reply)) => {
                    do_start_all(&mut state);
                    let _ = reply.send(());
                }
                Ok(Command::StopAll(grace, reply)) => {
                    do_stop_all(&mut state, grace);
                    let _ = reply.send(());
                }
                Ok(Command::Status(reply)) => {
                    let _ = reply.send(do_status(&state));
                }
                Ok(Command::Restart(name, reply)) => {
                    let _ = reply.send(do_restart(&mut state, &name));
                }
                Err(_) => {
                    info!("scheduler engine thread exiting: no more command senders");
                    return;
                }
            },
            recv(state.internal_rx.as_ref()) -> event => match event {
                Ok(EngineEvent::Transition(t)) => {
                    state.broadcast.broadcast(EngineEvent::Transition(t.clone()));
                    apply_release_logic(&mut state, &t);
                }
                Err(_) => {
                    // Every supervisor still holds a clone of `internal_tx`
                    // (so does `EngineState` itself); this channel only
                    // disconnects once the engine itself is torn down, by
                    // which point nothing is left to forward.
                }
            },
        }
    }
}

fn do_start_all(state: &mut EngineState) {
    release_ready(state);

    loop {
        if every_slot_past_starting(state) {
            return;
        }
        match state.internal_rx.as_ref().recv_timeout(POLL_TICK) {
            Ok(EngineEvent::Transition(t)) => {
                state.broadcast.broadcast(EngineEvent::Transition(t.clone()));
                apply_release_logic(state, &t);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn release_ready(state: &mut EngineState) {
    let ready: Vec<String> = state
        .remaining
        .iter()
        .filter(|(name, deps)| deps.is_empty() && !state.blocked.contains(*name))
        .map(|(name, _)| name.clone())
        .filter(|name| matches!(state.slots.get(name), Some(Slot::NotStarted(_))))
        .collect();

    for name in ready {
        release(state, &name);
    }
}

fn release(state: &mut EngineState, name: &str) {
    let Some(Slot::NotStarted(_)) = state.slots.get(name) else {
        return;
    };
    let Some(Slot::NotStarted(supervisor)) = state.slots.remove(name) else {
        unreachable!("checked above");
    };
    info!(service = name, "releasing for start");
    state.slots.insert(name.to_string(), Slot::Started(supervisor.start()));
}

fn apply_release_logic(state: &mut EngineState, transition: &Transition) {
    match transition.to {
        State::Healthy => {
            let dependents: Vec<String> = state
                .graph
                .dependents_of(&transition.service)
                .map(str::to_string)
                .collect();
            for dependent in dependents {
                if state.blocked.contains(&dependent) {
                    continue;
                }
                if let Some(remaining) = state.remaining.get_mut(&dependent) {
                    remaining.remove(&transition.service);
                    if remaining.is_empty() {
                        release(state, &dependent);
                    }
                }
            }
        }
        State::Failed => {
            block_dependents(state, &transition.service);
        }
        _ => {}
    }
}

/// A prerequisite failing permanently blocks every not-yet-released
/// dependent, transitively (spec §4.4: "dependent is not restarted
/// automatically" — and if the prerequisite never recovers, a dependent
/// waiting on it never gets released either).
fn block_dependents(state: &mut EngineState, name: &str) {
    let dependents: Vec<String> = state.graph.dependents_of(name).map(str::to_string).collect();
    for dependent in dependents {
        if state.blocked.insert(dependent.clone()) {
            warn!(service = %dependent, blocked_by = name, "service will never start: prerequisite failed");
            block_dependents(state, &dependent);
        }
    }
}

fn every_slot_past_starting(state: &EngineState) -> bool {
    state.slots.iter().all(|(name, slot)| match slot {
        Slot::NotStarted(_) => state.blocked.contains(name),
        Slot::Started(s) => matches!(s.snapshot().state, State::Healthy | State::Failed),
        Slot::Stopped(_) => true,
    })
}

fn do_status(state: &EngineState) -> Vec<ServiceStatus> {
    let mut statuses: Vec<ServiceStatus> = state
        .slots
        .iter()
        .map(|(name, slot)| match slot {
            Slot::NotStarted(_) => ServiceStatus {
                name: name.clone(),
                state: if state.blocked.contains(name) {
                    State::Failed
                } else {
                    State::WaitingDeps
                },
                pid: None,
                generation: state.generation_offset.get(name).copied().unwrap_or(0),
                consecutive_failures: 0,
                last_exit: None,
            },
            Slot::Started(s) => {
                let runtime = s.snapshot();
                ServiceStatus {
                    name: name.clone(),
                    state: runtime.state,
                    pid: runtime.pid,
                    generation: runtime.generation
                        + state.generation_offset.get(name).copied().unwrap_or(0),
                    consecutive_failures: runtime.consecutive_failures,
                    last_exit: runtime.last_exit,
                }
            }
            Slot::Stopped(status) => status.clone(),
        })
        .collect();
    statuses.sort_by(|a, b| a.name.cmp(&b.name));
    statuses
}

fn do_restart(state: &mut EngineState, name: &str) -> Result<(), SchedulerError> {
    let spec = state
        .specs
        .get(name)
        .cloned()
        .ok_or_else(|| SchedulerError::UnknownService(name.to_string()))?;

    if let Some(slot) = state.slots.remove(name) {
        if let Slot::Started(started) = slot {
            let last = started.snapshot();
            started.stop();
            *state.generation_offset.entry(name.to_string()).or_insert(0) += last.generation;
        }
    }

    let supervisor = NotStartedSupervisor::new(
        spec,
        state.app_data_home.clone(),
        state.internal_tx.clone(),
    );
    state.slots.insert(name.to_string(), Slot::Started(supervisor.start()));
    state.blocked.remove(name);
    Ok(())
}

/// Stops every running service in reverse dependency order (dependents
/// before prerequisites), waving through the graph as each node's
/// dependents finish (spec §4.5 step 1). Enforces an overall hard cap of
/// `HARD_CAP_GRACE_MULTIPLIER * grace * depth`, past which every
/// still-running service is force-stopped concurrently regardless of
/// ordering (spec §4.5 step 2).
fn do_stop_all(state: &mut EngineState, grace: Duration) {
    let depth = state.graph.topo_order().map(|o| o.len()).unwrap_or(1).max(1) as u32;
    let hard_cap = grace * HARD_CAP_GRACE_MULTIPLIER * depth;
    let deadline = Instant::now() + hard_cap;

    let mut remaining_dependents: HashMap<String, HashSet<String>> = state
        .slots
        .keys()
        .map(|name| {
            let dependents: HashSet<String> = state
                .graph
                .dependents_of(name)
                .filter(|d| matches!(state.slots.get(*d), Some(Slot::Started(_))))
                .map(str::to_string)
                .collect();
            (name.clone(), dependents)
        })
        .collect();

    let (stopped_tx, stopped_rx) = channel::unbounded::<String>();

    let initially_stoppable: Vec<String> = remaining_dependents
        .iter()
        .filter(|(name, deps)| deps.is_empty() && matches!(state.slots.get(*name), Some(Slot::Started(_))))
        .map(|(name, _)| name.clone())
        .collect();
    for name in initially_stoppable {
        spawn_stop(state, &name, stopped_tx.clone());
    }

    let total_started = state
        .slots
        .values()
        .filter(|s| matches!(s, Slot::Started(_)))
        .count();
    let mut stopped_count = 0usize;

    while stopped_count < total_started {
        let remaining_time = deadline.saturating_duration_since(Instant::now());
        if remaining_time.is_zero() {
            warn!("shutdown hard cap reached; force-stopping remaining services in parallel");
            force_stop_remaining(state, stopped_tx.clone());
            break;
        }

        // Selects over both the wave-completion channel and the raw
        // transition stream so a subscriber keeps seeing Stopping/Stopped
        // (and any late ChildExited) events for the whole wave-wait, not
        // just in a batch once every node has stopped.
        select! {
            recv(stopped_rx) -> msg => match msg {
                Ok(name) => {
                    stopped_count += 1;
                    for deps in remaining_dependents.values_mut() {
                        deps.remove(&name);
                    }
                    let newly_stoppable: Vec<String> = remaining_dependents
                        .iter()
                        .filter(|(n, deps)| {
                            deps.is_empty() && matches!(state.slots.get(*n), Some(Slot::Started(_)))
                        })
                        .map(|(n, _)| n.clone())
                        .collect();
                    for n in newly_stoppable {
                        spawn_stop(state, &n, stopped_tx.clone());
                    }
                }
                Err(_) => break,
            },
            recv(state.internal_rx.as_ref()) -> event => match event {
                Ok(EngineEvent::Transition(t)) => {
                    state.broadcast.broadcast(EngineEvent::Transition(t));
                }
                Err(_) => {}
            },
            default(remaining_time.min(POLL_TICK)) => continue,
        }
    }

    // Catch-all: anything still queued (e.g. a final Stopped published after
    // the loop above already observed `stopped_count == total_started`) is
    // broadcast here rather than left to stall until the next command.
    while let Ok(EngineEvent::Transition(t)) = state.internal_rx.as_ref().try_recv() {
        state.broadcast.broadcast(EngineEvent::Transition(t));
    }
}

fn spawn_stop(state: &mut EngineState, name: &str, stopped_tx: Sender<String>) {
    let Some(slot) = state.slots.remove(name) else {
        return;
    };
    match slot {
        Slot::Started(started) => {
            let owned_name = name.to_string();
            std::thread::spawn(move || {
                started.stop();
                let _ = stopped_tx.send(owned_name);
            });
            // Leave a placeholder so `status()` during shutdown doesn't see
            // a hole; replaced with the final snapshot once stop completes
            // is not tracked further here (the process is exiting anyway).
            state.slots.insert(
                name.to_string(),
                Slot::Stopped(ServiceStatus {
                    name: name.to_string(),
                    state: State::Stopping,
                    pid: None,
                    generation: state.generation_offset.get(name).copied().unwrap_or(0),
                    consecutive_failures: 0,
                    last_exit: None,
                }),
            );
        }
        other => {
            state.slots.insert(name.to_string(), other);
        }
    }
}

fn force_stop_remaining(state: &mut EngineState, stopped_tx: Sender<String>) {
    let names: Vec<String> = state
        .slots
        .iter()
        .filter(|(_, s)| matches!(s, Slot::Started(_)))
        .map(|(n, _)| n.clone())
        .collect();
    for name in names {
        spawn_stop(state, &name, stopped_tx.clone());
    }
}
