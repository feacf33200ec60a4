use super::channel::EventConsumer;
use crossbeam::channel::RecvTimeoutError;
use std::time::Duration;

pub type CancellationMessage = ();

impl EventConsumer<CancellationMessage> {
    /// Returns `true` if a cancellation message (or a channel error) arrives
    /// before `timeout` elapses. Otherwise blocks for the full timeout and
    /// returns `false`. Used as the sleep primitive for every cancellable
    /// wait in the engine (probe interval, restart backoff, startup delay).
    pub fn is_cancelled(&self, timeout: Duration) -> bool {
        let timed_out = matches!(
            self.as_ref().recv_timeout(timeout),
            Err(RecvTimeoutError::Timeout)
        );
        !timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::super::channel::pub_sub;
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn is_cancelled_false_on_timeout() {
        let (_publisher, consumer) = pub_sub::<CancellationMessage>();
        assert!(!consumer.is_cancelled(Duration::from_millis(10)));
    }

    #[test]
    fn is_cancelled_true_when_signalled() {
        let (publisher, consumer) = pub_sub::<CancellationMessage>();
        thread::spawn(move || publisher.publish(()).unwrap());
        assert!(consumer.is_cancelled(Duration::from_secs(5)));
    }
}
