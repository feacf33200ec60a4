use std::path::PathBuf;
use std::thread::JoinHandle;

use crossbeam::channel::Receiver;

use crate::process::OutputEvent;
use crate::utils::threads::spawn_named_thread;

use super::rotation::{RotatingFile, RotationPolicy};

/// Drains a service's [`OutputEvent`] stream onto a rotating log file until
/// the channel is closed (spec §4.2, C2). Spawned only when a service's
/// `log_redirect` is `true`; otherwise the Process Runner inherits stdio and
/// no redirector exists for that service.
pub struct LogRedirector {
    handle: JoinHandle<()>,
}

impl LogRedirector {
    pub fn spawn(service: &str, path: PathBuf, policy: RotationPolicy, events: Receiver<OutputEvent>) -> Self {
        let name = format!("log-redirect-{service}");
        let handle = spawn_named_thread(name, move || {
            let mut file = match RotatingFile::open(path.clone(), policy) {
                Ok(f) => f,
                Err(err) => {
                    tracing::error!(?err, path = %path.display(), "failed to open log file");
                    return;
                }
            };

            for event in events.iter() {
                let line = match &event {
                    OutputEvent::Stdout(l) => l,
                    OutputEvent::Stderr(l) => l,
                };
                if let Err(err) = file.write_line(line) {
                    tracing::warn!(?err, "failed to write log line");
                }
            }
        });

        Self { handle }
    }

    /// Blocks until the redirector thread drains and exits (the channel's
    /// sender side must be dropped by the caller first).
    pub fn join(self) {
        let _ = self.handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn drains_events_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        let (tx, rx) = crossbeam::channel::unbounded();

        let redirector = LogRedirector::spawn("svc", path.clone(), RotationPolicy::default(), rx);
        tx.send(OutputEvent::Stdout("hello".to_string())).unwrap();
        tx.send(OutputEvent::Stderr("oops".to_string())).unwrap();
        drop(tx);
        redirector.join();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("hello"));
        assert!(contents.contains("oops"));
    }
}
