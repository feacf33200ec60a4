use std::process::Command;
use std::sync::mpsc;
use std::time::Duration;

use crate::health::HealthCheckerError;

/// Runs `shell` through `sh -c` and requires exit code 0 within `timeout`
/// (spec §4.3). The child is detached onto a watchdog thread so a probe
/// that outlives its deadline can be treated as a failure and abandoned
/// without blocking the checker's own loop.
pub fn check(shell: &str, timeout: Duration) -> Result<(), HealthCheckerError> {
    let shell = shell.to_string();
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        let result = Command::new("sh").arg("-c").arg(&shell).status();
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => Err(HealthCheckerError::Failed(format!(
            "command exited with {status}"
        ))),
        Ok(Err(err)) => Err(HealthCheckerError::Io(err)),
        Err(_) => Err(HealthCheckerError::Timeout(timeout)),
    }
}
