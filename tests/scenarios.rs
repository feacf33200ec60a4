//! End-to-end coverage for the six scenarios of spec §8 "Testable
//! Properties", driven through the public `Scheduler`/`ControlPlane`/
//! `config` surface rather than the compiled binary — there's no IPC path
//! into an already-running process to assert against from the outside
//! (see `cli::run_foreground`'s doc comment).

use std::collections::HashMap;
use std::io::Write;
use std::net::TcpListener;
use std::path::PathBuf;
use std::time::Duration;

use process_compose::config;
use process_compose::control::ControlPlane;
use process_compose::health::{HealthCheckParams, ProbeTemplate};
use process_compose::scheduler::{Scheduler, SchedulerError};
use process_compose::supervisor::restart_policy::{Backoff, BackoffStrategy, FailureBudget};
use process_compose::supervisor::{RestartPolicy, ServiceSpec, State};

fn process_probe_spec(name: &str, start_cmd: &[&str], depends_on: &[&str]) -> ServiceSpec {
    ServiceSpec {
        name: name.to_string(),
        work_dir: PathBuf::from("."),
        start_cmd: start_cmd.iter().map(|s| s.to_string()).collect(),
        env: HashMap::new(),
        log_redirect: false,
        startup_delay: Duration::ZERO,
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        healthcheck: None,
        restart_policy: RestartPolicy::new(
            false,
            BackoffStrategy::Fixed(Backoff::default()),
            FailureBudget::new(1, Duration::from_secs(60)),
        ),
        stop_grace: Duration::from_secs(2),
    }
}

fn sleeper(name: &str, depends_on: &[&str]) -> ServiceSpec {
    process_probe_spec(name, &["sh", "-c", "sleep 30"], depends_on)
}

/// Scenario 1: linear chain A <- B <- C. First-`Healthy` order must be A,
/// B, C; `stop_all` must produce `Stopped` in reverse, C, B, A.
#[test]
fn linear_chain_healthy_then_stopped_in_reverse_order() {
    let mut specs = HashMap::new();
    specs.insert("a".to_string(), sleeper("a", &[]));
    specs.insert("b".to_string(), sleeper("b", &["a"]));
    specs.insert("c".to_string(), sleeper("c", &["b"]));

    let scheduler = Scheduler::new(specs, PathBuf::from(".")).unwrap();
    let events = scheduler.subscribe();
    scheduler.start_all().unwrap();

    let mut healthy_order = Vec::new();
    while healthy_order.len() < 3 {
        if let Ok(process_compose::event::EngineEvent::Transition(t)) = events.recv() {
            if t.to == State::Healthy {
                healthy_order.push(t.service);
            }
        }
    }
    assert_eq!(healthy_order, vec!["a", "b", "c"]);

    scheduler.stop_all(Duration::from_secs(5)).unwrap();

    let mut stopped_order = Vec::new();
    while let Ok(process_compose::event::EngineEvent::Transition(t)) =
        events.recv_timeout(Duration::from_millis(200))
    {
        if t.to == State::Stopped {
            stopped_order.push(t.service);
        }
    }
    assert_eq!(stopped_order, vec!["c", "b", "a"]);

    scheduler.shutdown();
}

/// Scenario 2: fan-out. B, C, D all depend only on A and must all reach
/// `Healthy`; their relative order is unconstrained.
#[test]
fn fan_out_all_dependents_become_healthy() {
    let mut specs = HashMap::new();
    specs.insert("a".to_string(), sleeper("a", &[]));
    specs.insert("b".to_string(), sleeper("b", &["a"]));
    specs.insert("c".to_string(), sleeper("c", &["a"]));
    specs.insert("d".to_string(), sleeper("d", &["a"]));

    let scheduler = Scheduler::new(specs, PathBuf::from(".")).unwrap();
    scheduler.start_all().unwrap();

    let statuses = scheduler.status().unwrap();
    assert_eq!(statuses.len(), 4);
    for status in &statuses {
        assert_eq!(status.state, State::Healthy, "{} should be healthy", status.name);
    }

    scheduler.stop_all(Duration::from_secs(5)).unwrap();
    scheduler.shutdown();
}

fn respond_after(delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        std::thread::sleep(delay);
        if let Ok((mut stream, _)) = listener.accept() {
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
        }
    });
    format!("http://{addr}/ok")
}

/// Scenario 3: HTTP health success. The probe endpoint only starts
/// accepting connections after a delay; the service must reach `Healthy`
/// only once the probe succeeds, never transitioning to `Unhealthy` first.
#[test]
fn http_probe_becomes_healthy_once_endpoint_responds() {
    let url = respond_after(Duration::from_millis(500));

    let mut spec = process_probe_spec("web", &["sh", "-c", "sleep 30"], &[]);
    spec.healthcheck = Some((
        ProbeTemplate::Http {
            url,
            timeout: Duration::from_millis(500),
        },
        HealthCheckParams {
            interval: Duration::from_millis(300),
            retries: 3,
            start_period: Duration::from_millis(200),
        },
    ));

    let mut specs = HashMap::new();
    specs.insert("web".to_string(), spec);

    let scheduler = Scheduler::new(specs, PathBuf::from(".")).unwrap();
    let events = scheduler.subscribe();
    scheduler.start_all().unwrap();

    let mut saw_unhealthy = false;
    let mut became_healthy = false;
    while let Ok(process_compose::event::EngineEvent::Transition(t)) =
        events.recv_timeout(Duration::from_millis(50))
    {
        match t.to {
            State::Unhealthy => saw_unhealthy = true,
            State::Healthy => became_healthy = true,
            _ => {}
        }
        if became_healthy {
            break;
        }
    }

    assert!(became_healthy, "service never reached healthy");
    assert!(!saw_unhealthy, "service flapped through unhealthy before going healthy");

    scheduler.stop_all(Duration::from_secs(2)).unwrap();
    scheduler.shutdown();
}

/// Scenario 4: flaky child. A service whose command exits quickly with a
/// nonzero code must restart with monotonically increasing generations
/// until the failure budget trips, then go `Failed`.
#[test]
fn flaky_child_restarts_until_budget_exhausted_then_fails() {
    let mut spec = process_probe_spec("flaky", &["sh", "-c", "sleep 0.1; exit 1"], &[]);
    spec.restart_policy = RestartPolicy::new(
        true,
        BackoffStrategy::Fixed(Backoff::default().with_initial_delay(Duration::from_millis(50))),
        FailureBudget::new(3, Duration::from_secs(60)),
    );

    let mut specs = HashMap::new();
    specs.insert("flaky".to_string(), spec);

    let scheduler = Scheduler::new(specs, PathBuf::from(".")).unwrap();
    let events = scheduler.subscribe();
    scheduler.start_all().unwrap();

    let mut generations_seen = Vec::new();
    let mut reached_failed = false;
    while let Ok(process_compose::event::EngineEvent::Transition(t)) =
        events.recv_timeout(Duration::from_secs(2))
    {
        generations_seen.push(t.generation);
        if t.to == State::Failed {
            reached_failed = true;
            break;
        }
    }

    assert!(reached_failed, "flaky service never reached failed");
    let mut sorted = generations_seen.clone();
    sorted.sort_unstable();
    assert_eq!(generations_seen, sorted, "generation must be monotonic");

    let statuses = scheduler.status().unwrap();
    let status = statuses.iter().find(|s| s.name == "flaky").unwrap();
    assert_eq!(status.state, State::Failed);

    scheduler.stop_all(Duration::from_secs(2)).unwrap();
    scheduler.shutdown();
}

/// Scenario 5: cycle rejection. Loading a config whose services depend on
/// each other cyclically must fail before any process is spawned.
#[test]
fn cyclic_config_is_rejected_without_spawning() {
    let yaml = r#"
services:
  a:
    start_cmd: ["sh", "-c", "sleep 30"]
    depends_on: ["b"]
  b:
    start_cmd: ["sh", "-c", "sleep 30"]
    depends_on: ["a"]
"#;
    let raw: config::RawConfig = serde_yaml::from_str(yaml).unwrap();
    let err = config::validate(raw, &PathBuf::from(".")).unwrap_err();
    assert!(matches!(err, config::ConfigError::Cycle(_)));
}

/// Scenario 6: forced shutdown. A service that ignores SIGTERM must still
/// be brought down by `stop_all`'s hard-cap fallback within the grace
/// window plus a bounded margin.
#[test]
fn forced_shutdown_kills_a_sigterm_ignoring_child() {
    let mut specs = HashMap::new();
    specs.insert(
        "stubborn".to_string(),
        process_probe_spec(
            "stubborn",
            &["sh", "-c", "trap '' TERM; sleep 30"],
            &[],
        ),
    );

    let scheduler = Scheduler::new(specs, PathBuf::from(".")).unwrap();
    let control = ControlPlane::new(scheduler);
    control.start_all().unwrap();

    let start = std::time::Instant::now();
    control.stop_all(Duration::from_secs(2)).unwrap();
    let elapsed = start.elapsed();

    let statuses = control.status().unwrap();
    let status = statuses.services.iter().find(|s| s.name == "stubborn").unwrap();
    assert_eq!(status.state, State::Stopped);
    assert!(
        elapsed < Duration::from_secs(10),
        "forced shutdown took too long: {elapsed:?}"
    );

    control.shutdown();
}

/// `restart(s)` strictly increments generation by exactly one (spec §8
/// round-trip property).
#[test]
fn restart_increments_generation_by_exactly_one() {
    let mut specs = HashMap::new();
    specs.insert("solo".to_string(), sleeper("solo", &[]));

    let scheduler = Scheduler::new(specs, PathBuf::from(".")).unwrap();
    scheduler.start_all().unwrap();

    let before = scheduler.status().unwrap();
    let before_gen = before.iter().find(|s| s.name == "solo").unwrap().generation;

    scheduler.restart("solo").unwrap();
    std::thread::sleep(Duration::from_millis(300));

    let after = scheduler.status().unwrap();
    let after_gen = after.iter().find(|s| s.name == "solo").unwrap().generation;
    assert_eq!(after_gen, before_gen + 1);

    scheduler.stop_all(Duration::from_secs(2)).unwrap();
    scheduler.shutdown();
}

/// `start_all` called twice leaves the state set unchanged (spec §8
/// round-trip property).
#[test]
fn start_all_is_idempotent() {
    let mut specs = HashMap::new();
    specs.insert("solo".to_string(), sleeper("solo", &[]));

    let scheduler = Scheduler::new(specs, PathBuf::from(".")).unwrap();
    scheduler.start_all().unwrap();
    scheduler.start_all().unwrap();

    let statuses = scheduler.status().unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].state, State::Healthy);

    scheduler.stop_all(Duration::from_secs(2)).unwrap();
    scheduler.stop_all(Duration::from_secs(2)).unwrap();
    scheduler.shutdown();
}

#[test]
fn unknown_dependency_is_rejected() {
    let mut specs = HashMap::new();
    specs.insert("a".to_string(), sleeper("a", &["ghost"]));
    let err = Scheduler::new(specs, PathBuf::from(".")).unwrap_err();
    assert!(matches!(err, SchedulerError::UnknownDependency(_)));
}
