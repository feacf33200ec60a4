use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::event::channel::EventPublisher;
use crate::event::SupervisorEvent;
use crate::utils::thread_context::{NotStartedThreadContext, StartedThreadContext};

use super::{Health, HealthChecker, Healthy, Unhealthy};

/// Parameters governing one service's probe loop (spec §4.3).
#[derive(Debug, Clone, Copy)]
pub struct HealthCheckParams {
    pub interval: Duration,
    pub retries: u32,
    pub start_period: Duration,
}

impl Default for HealthCheckParams {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            retries: 3,
            start_period: Duration::ZERO,
        }
    }
}

/// Drives `checker` on `params.interval`, suppressing probes until
/// `params.start_period` has elapsed since this call. Maintains a rolling
/// failure counter that resets on every success and emits `unhealthy` once
/// it reaches `params.retries`; the first success after spawn emits
/// `healthy` exactly once for `generation`, and every success after that is
/// a heartbeat only (spec §4.3).
///
/// `generation` lets the owning Supervisor discard stale events: whenever a
/// service restarts, the caller bumps the shared counter before spawning a
/// fresh checker, so events from a checker whose generation has since been
/// superseded are easy for the reader to filter out even though this
/// function itself does not filter — it only stamps.
pub fn spawn_health_checker<H>(
    service: String,
    checker: H,
    params: HealthCheckParams,
    generation: Arc<AtomicU64>,
    publisher: EventPublisher<SupervisorEvent>,
) -> StartedThreadContext
where
    H: HealthChecker + Send + 'static,
{
    let thread_name = format!("healthcheck-{service}");
    let spawn_generation = generation.load(Ordering::SeqCst);

    NotStartedThreadContext::new(thread_name, move |stop_consumer| {
        if stop_consumer.is_cancelled(params.start_period) {
            return;
        }

        let mut consecutive_failures: u32 = 0;

        loop {
            let live_generation = generation.load(Ordering::SeqCst);
            if live_generation != spawn_generation {
                debug!(service, "health checker superseded by a newer generation, exiting");
                return;
            }

            let health = match checker.check_health() {
                Ok(()) => {
                    consecutive_failures = 0;
                    Health::Healthy(Healthy::now())
                }
                Err(err) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    warn!(service, %err, consecutive_failures, "health probe failed");
                    Health::Unhealthy(Unhealthy::new(err.to_string(), consecutive_failures))
                }
            };

            // Every success is published: the Supervisor, which tracks
            // whether it has already left `Probing`, treats the first one
            // as the `healthy` transition and the rest as heartbeats.
            let should_emit = match &health {
                Health::Healthy(_) => true,
                Health::Unhealthy(_) => consecutive_failures >= params.retries,
            };

            if should_emit {
                let _ = publisher.publish(SupervisorEvent::Health {
                    generation: spawn_generation,
                    health,
                });
            }

            if stop_consumer.is_cancelled(params.interval) {
                return;
            }
        }
    })
    .start()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::channel::pub_sub;
    use crate::health::{HealthCheckerError, MockHealthChecker};
    use std::sync::atomic::AtomicU32;
    use tracing_test::{logs_contain, traced_test};

    struct AlwaysHealthy;
    impl HealthChecker for AlwaysHealthy {
        fn check_health(&self) -> Result<(), HealthCheckerError> {
            Ok(())
        }
    }

    struct AlwaysUnhealthy;
    impl HealthChecker for AlwaysUnhealthy {
        fn check_health(&self) -> Result<(), HealthCheckerError> {
            Err(HealthCheckerError::Failed("nope".to_string()))
        }
    }

    struct FlakyThenHealthy {
        calls: AtomicU32,
        fail_first_n: u32,
    }
    impl HealthChecker for FlakyThenHealthy {
        fn check_health(&self) -> Result<(), HealthCheckerError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                Err(HealthCheckerError::Failed("warming up".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn emits_healthy_quickly_when_probe_succeeds() {
        let (tx, rx) = pub_sub::<SupervisorEvent>();
        let generation = Arc::new(AtomicU64::new(0));
        let params = HealthCheckParams {
            interval: Duration::from_millis(20),
            retries: 3,
            start_period: Duration::ZERO,
        };
        let started = spawn_health_checker(
            "svc".to_string(),
            AlwaysHealthy,
            params,
            generation,
            tx,
        );

        let event = rx.as_ref().recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(
            event,
            SupervisorEvent::Health { health: Health::Healthy(_), .. }
        ));
        started.stop().unwrap();
    }

    #[test]
    #[traced_test]
    fn emits_unhealthy_after_retries_exhausted() {
        let (tx, rx) = pub_sub::<SupervisorEvent>();
        let generation = Arc::new(AtomicU64::new(0));
        let params = HealthCheckParams {
            interval: Duration::from_millis(5),
            retries: 2,
            start_period: Duration::ZERO,
        };
        let started = spawn_health_checker(
            "svc".to_string(),
            AlwaysUnhealthy,
            params,
            generation,
            tx,
        );

        let mut unhealthy_seen = false;
        for _ in 0..20 {
            if let Ok(SupervisorEvent::Health {
                health: Health::Unhealthy(u),
                ..
            }) = rx.as_ref().recv_timeout(Duration::from_secs(1))
            {
                assert!(u.consecutive_failures >= 2);
                unhealthy_seen = true;
                break;
            }
        }
        assert!(unhealthy_seen);
        assert!(logs_contain("health probe failed"));
        started.stop().unwrap();
    }

    #[test]
    fn start_period_suppresses_initial_probes() {
        let (tx, rx) = pub_sub::<SupervisorEvent>();
        let generation = Arc::new(AtomicU64::new(0));
        let params = HealthCheckParams {
            interval: Duration::from_millis(10),
            retries: 1,
            start_period: Duration::from_millis(200),
        };
        let started = spawn_health_checker(
            "svc".to_string(),
            AlwaysHealthy,
            params,
            generation,
            tx,
        );

        assert!(rx.as_ref().recv_timeout(Duration::from_millis(50)).is_err());
        let event = rx.as_ref().recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(event, SupervisorEvent::Health { .. }));
        started.stop().unwrap();
    }

    #[test]
    fn recovers_to_healthy_after_initial_failures() {
        let (tx, rx) = pub_sub::<SupervisorEvent>();
        let generation = Arc::new(AtomicU64::new(0));
        let params = HealthCheckParams {
            interval: Duration::from_millis(5),
            retries: 5,
            start_period: Duration::ZERO,
        };
        let checker = FlakyThenHealthy {
            calls: AtomicU32::new(0),
            fail_first_n: 3,
        };
        let started = spawn_health_checker("svc".to_string(), checker, params, generation, tx);

        let mut saw_healthy = false;
        for _ in 0..50 {
            if let Ok(SupervisorEvent::Health {
                health: Health::Healthy(_),
                ..
            }) = rx.as_ref().recv_timeout(Duration::from_secs(1))
            {
                saw_healthy = true;
                break;
            }
        }
        assert!(saw_healthy);
        started.stop().unwrap();
    }

    #[test]
    fn mocked_checker_drives_a_healthy_event() {
        let (tx, rx) = pub_sub::<SupervisorEvent>();
        let generation = Arc::new(AtomicU64::new(0));
        let params = HealthCheckParams {
            interval: Duration::from_millis(500),
            retries: 3,
            start_period: Duration::ZERO,
        };

        let mut checker = MockHealthChecker::new();
        checker.expect_check_health().times(1..).returning(|| Ok(()));

        let started = spawn_health_checker("svc".to_string(), checker, params, generation, tx);

        let event = rx.as_ref().recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(
            event,
            SupervisorEvent::Health { health: Health::Healthy(_), .. }
        ));
        started.stop().unwrap();
    }
}
