use crate::health::HealthCheckerError;

/// Liveness via `kill(pid, 0)` (POSIX) — sends no signal, just checks the
/// process still exists and is ours to see.
#[cfg(unix)]
pub fn check(pid: u32) -> Result<(), HealthCheckerError> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => Ok(()),
        Err(err) => Err(HealthCheckerError::Failed(format!(
            "process {pid} not alive: {err}"
        ))),
    }
}

#[cfg(not(unix))]
pub fn check(_pid: u32) -> Result<(), HealthCheckerError> {
    // Liveness on Windows is implied by the Job Object/wait handle owned by
    // the Process Runner; a dedicated `process` probe is POSIX-only here.
    Ok(())
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        let pid = std::process::id();
        assert!(check(pid).is_ok());
    }

    #[test]
    fn nonexistent_pid_is_not_alive() {
        // A high, positive pid that is virtually guaranteed unused and
        // cannot be misread as a process-group id.
        assert!(check(999_999).is_err());
    }
}
