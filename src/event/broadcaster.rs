use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// A simple, unbounded broadcast channel for low-throughput use cases.
///
/// Every subscriber gets its own channel; every message sent through the
/// broadcaster is cloned out to every live subscriber. The Control Plane
/// (C6) uses one of these for the transition-event stream consumed by the
/// foreground CLI and the status command.
///
/// Not optimized for high throughput: this engine emits at most a handful of
/// events per service per second.
#[derive(Debug, Clone, Default)]
pub struct UnboundedBroadcast<T> {
    subscribed_senders: Arc<Mutex<Vec<Sender<T>>>>,
}

impl<T> UnboundedBroadcast<T>
where
    T: Clone,
{
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        self.subscribed_senders
            .lock()
            .expect("failed to acquire the lock")
            .push(tx);
        rx
    }

    /// Sends `message` to every still-connected subscriber. Disconnected
    /// subscribers are dropped from the list; this never blocks or fails.
    pub fn broadcast(&self, message: T) {
        self.subscribed_senders
            .lock()
            .expect("failed to acquire the lock")
            .retain(|s| s.send(message.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fans_out_to_every_subscriber() {
        let broadcaster = UnboundedBroadcast::default();
        let sub1 = broadcaster.subscribe();
        let sub2 = broadcaster.subscribe();

        broadcaster.broadcast("hello");

        assert_eq!(sub1.recv().unwrap(), "hello");
        assert_eq!(sub2.recv().unwrap(), "hello");
    }

    #[test]
    fn drops_disconnected_subscribers() {
        let broadcaster = UnboundedBroadcast::default();
        {
            let _sub = broadcaster.subscribe();
        }
        // the dropped subscriber's sender is pruned on the next broadcast
        broadcaster.broadcast("first");
        assert_eq!(broadcaster.subscribed_senders.lock().unwrap().len(), 0);
    }
}
