use std::cmp::max;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Exponential/linear/fixed backoff before a restart attempt, plus a rolling
/// failure-budget window that trips the Supervisor into `Failed` once too
/// many restarts happen too quickly (spec §4.4).
///
/// The backoff half mirrors the collaborator's sequence-reset-on-quiet-period
/// design; the failure budget is this engine's own addition, since the
/// collaborator's restart policy has no equivalent cap.
#[derive(Clone, Debug)]
pub struct RestartPolicy {
    pub enabled: bool,
    backoff: BackoffStrategy,
    budget: FailureBudget,
}

impl RestartPolicy {
    pub fn new(enabled: bool, backoff: BackoffStrategy, budget: FailureBudget) -> Self {
        Self {
            enabled,
            backoff,
            budget,
        }
    }

    /// Records a failure and returns the delay to wait before the next
    /// restart attempt, or `None` if restarts are disabled or the failure
    /// budget has been exhausted (the Supervisor should go `Failed`).
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        if !self.budget.record_and_check() {
            return None;
        }
        Some(self.backoff.next_delay())
    }

    /// Resets the backoff sequence (but not the failure budget window) on a
    /// successful transition to `Healthy` (spec §4.4: "reset on the next
    /// Healthy").
    pub fn reset_backoff(&mut self) {
        self.backoff.reset();
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::new(
            true,
            BackoffStrategy::Exponential(Backoff::default()),
            FailureBudget::default(),
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BackoffStrategy {
    Fixed(Backoff),
    Linear(Backoff),
    Exponential(Backoff),
}

/// Duration since the last retry past which the sequence resets to its
/// starting delay, matching the collaborator's `last_retry_interval` design.
pub const LAST_RETRY_INTERVAL: Duration = Duration::new(30, 0);

impl BackoffStrategy {
    fn next_delay(&mut self) -> Duration {
        match self {
            BackoffStrategy::Fixed(b) => b.next_delay(fixed),
            BackoffStrategy::Linear(b) => b.next_delay(linear),
            BackoffStrategy::Exponential(b) => b.next_delay(exponential),
        }
    }

    fn reset(&mut self) {
        match self {
            BackoffStrategy::Fixed(b)
            | BackoffStrategy::Linear(b)
            | BackoffStrategy::Exponential(b) => b.reset(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Backoff {
    last_retry: Option<Instant>,
    tries: usize,
    initial_delay: Duration,
    max_delay: Duration,
    last_retry_interval: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            last_retry: None,
            tries: 0,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            last_retry_interval: LAST_RETRY_INTERVAL,
        }
    }
}

impl Backoff {
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_last_retry_interval(mut self, last_retry_interval: Duration) -> Self {
        self.last_retry_interval = last_retry_interval;
        self
    }

    fn next_delay<F>(&mut self, backoff_func: F) -> Duration
    where
        F: Fn(usize, Duration) -> Duration,
    {
        if let Some(last) = self.last_retry {
            if last.elapsed() > self.last_retry_interval {
                self.tries = 0;
            }
        }

        let delay = backoff_func(self.tries, self.initial_delay).min(self.max_delay);
        self.last_retry = Some(Instant::now());
        self.tries += 1;
        delay
    }

    fn reset(&mut self) {
        self.tries = 0;
        self.last_retry = None;
    }
}

fn fixed(_tries: usize, initial_delay: Duration) -> Duration {
    initial_delay
}

fn linear(tries: usize, initial_delay: Duration) -> Duration {
    initial_delay * max(tries as u32, 1)
}

fn exponential(tries: usize, initial_delay: Duration) -> Duration {
    initial_delay * 2u32.pow(tries as u32)
}

/// Caps restarts per rolling time window (spec §4.4: "default 5 within
/// 60 s"). Once the window holds `max_failures` entries, the budget is
/// exhausted and the caller should stop retrying.
#[derive(Clone, Debug)]
pub struct FailureBudget {
    max_failures: usize,
    window: Duration,
    occurrences: VecDeque<Instant>,
}

impl Default for FailureBudget {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

impl FailureBudget {
    pub fn new(max_failures: usize, window: Duration) -> Self {
        Self {
            max_failures,
            window,
            occurrences: VecDeque::new(),
        }
    }

    /// Records one restart attempt and reports whether the budget still
    /// permits another retry.
    fn record_and_check(&mut self) -> bool {
        let now = Instant::now();
        while let Some(&front) = self.occurrences.front() {
            if now.duration_since(front) > self.window {
                self.occurrences.pop_front();
            } else {
                break;
            }
        }
        self.occurrences.push_back(now);
        self.occurrences.len() <= self.max_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::thread::sleep;

    #[rstest]
    #[case::fixed(BackoffStrategy::Fixed(Backoff::default()), Duration::from_secs(1))]
    #[case::linear(BackoffStrategy::Linear(Backoff::default()), Duration::from_secs(1))]
    #[case::exponential(BackoffStrategy::Exponential(Backoff::default()), Duration::from_secs(1))]
    fn every_strategy_starts_at_the_initial_delay(
        #[case] mut strategy: BackoffStrategy,
        #[case] expected_first_delay: Duration,
    ) {
        assert_eq!(strategy.next_delay(), expected_first_delay);
    }

    #[test]
    fn exponential_backoff_caps_at_max_delay() {
        let b = Backoff::default().with_max_delay(Duration::from_secs(4));
        let mut strategy = BackoffStrategy::Exponential(b);
        assert_eq!(strategy.next_delay(), Duration::from_secs(1));
        assert_eq!(strategy.next_delay(), Duration::from_secs(2));
        assert_eq!(strategy.next_delay(), Duration::from_secs(4));
        assert_eq!(strategy.next_delay(), Duration::from_secs(4));
    }

    #[test]
    fn sequence_resets_after_quiet_period() {
        let mut strategy = BackoffStrategy::Linear(
            Backoff::default().with_last_retry_interval(Duration::from_millis(1)),
        );
        assert_eq!(strategy.next_delay(), Duration::from_secs(1));
        sleep(Duration::from_millis(5));
        assert_eq!(strategy.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn reset_backoff_restarts_the_sequence() {
        let mut policy = RestartPolicy::new(
            true,
            BackoffStrategy::Linear(Backoff::default()),
            FailureBudget::new(100, Duration::from_secs(60)),
        );
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
        policy.reset_backoff();
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn disabled_policy_never_retries() {
        let mut policy =
            RestartPolicy::new(false, BackoffStrategy::Fixed(Backoff::default()), FailureBudget::default());
        assert_eq!(policy.next_delay(), None);
    }

    #[test]
    fn failure_budget_trips_after_max_within_window() {
        let mut budget = FailureBudget::new(2, Duration::from_secs(60));
        assert!(budget.record_and_check());
        assert!(budget.record_and_check());
        assert!(!budget.record_and_check());
    }

    #[test]
    fn failure_budget_resets_outside_window() {
        let mut budget = FailureBudget::new(1, Duration::from_millis(5));
        assert!(budget.record_and_check());
        sleep(Duration::from_millis(20));
        assert!(budget.record_and_check());
    }
}
