use super::error::ProcessError;

/// Gracefully shuts down a supervised process (and its process group),
/// escalating to an unconditional kill if it outlives its grace period.
pub struct ProcessTerminator {
    pid: u32,
    #[cfg(windows)]
    job: Option<super::runner::JobHandle>,
}

impl ProcessTerminator {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            #[cfg(windows)]
            job: None,
        }
    }

    /// Like [`new`](Self::new), but also carries the child's Job Object
    /// handle so a forced kill tears down the whole process tree on
    /// Windows rather than just the top-level process.
    #[cfg(windows)]
    pub fn with_job(pid: u32, job: Option<super::runner::JobHandle>) -> Self {
        Self { pid, job }
    }

    #[cfg(not(windows))]
    pub fn with_job(pid: u32, _job: Option<super::runner::JobHandle>) -> Self {
        Self::new(pid)
    }

    /// Sends SIGTERM to the whole process group, then calls `wait_for_exit`
    /// (a caller-supplied, cancellable wait that returns `true` if the
    /// process exited before `grace` elapsed). If it returns `false`, the
    /// process group is sent an unconditional SIGKILL.
    #[cfg(unix)]
    pub fn shutdown<F>(self, wait_for_exit: F) -> Result<(), ProcessError>
    where
        F: FnOnce() -> bool,
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        // A negative pid targets the whole process group (spec §4.1: "kill
        // the whole process group/job object").
        let group = Pid::from_raw(-(self.pid as i32));

        signal::kill(group, Signal::SIGTERM)
            .or_else(|_| signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM))
            .map_err(|err| ProcessError::Os(std::io::Error::from(err)))?;

        if !wait_for_exit() {
            let _ = signal::kill(group, Signal::SIGKILL);
            let _ = signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGKILL);
        }
        Ok(())
    }

    #[cfg(windows)]
    pub fn shutdown<F>(self, _wait_for_exit: F) -> Result<(), ProcessError>
    where
        F: FnOnce() -> bool,
    {
        // Windows has no polite-signal equivalent to SIGTERM for an arbitrary
        // child process, so there is no grace window to wait out here: kill
        // the whole Job Object (process tree) right away.
        if let Some(job) = &self.job {
            return job.kill().map_err(ProcessError::Os);
        }

        // No Job Object (creation or assignment failed at spawn time): fall
        // back to terminating just the top-level process by pid.
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};

        unsafe {
            let handle = OpenProcess(PROCESS_TERMINATE, 0, self.pid);
            if handle == 0 {
                return Err(ProcessError::Os(std::io::Error::last_os_error()));
            }
            let ok = TerminateProcess(handle, 1);
            CloseHandle(handle);
            if ok == 0 {
                return Err(ProcessError::Os(std::io::Error::last_os_error()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::thread::{self, sleep};
    use std::time::{Duration as StdDuration, Instant};

    #[test]
    fn shutdown_escalates_to_sigkill_when_grace_expires() {
        let mut trap = Command::new("sh")
            .arg("-c")
            .arg("trap 'sleep 30; exit 0' TERM; while true; do sleep 1; done")
            .spawn()
            .unwrap();

        sleep(StdDuration::from_millis(300));
        let pid = trap.id();

        let start = Instant::now();
        thread::spawn(move || {
            let _ = ProcessTerminator::new(pid).shutdown(|| false);
        });

        let status = trap.wait().unwrap();
        assert!(start.elapsed() < StdDuration::from_secs(5));
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            assert_eq!(status.signal(), Some(9));
        }
    }

    #[test]
    fn shutdown_does_not_escalate_when_exits_in_time() {
        let mut trap = Command::new("sh")
            .arg("-c")
            .arg("trap 'exit 0' TERM; while true; do sleep 1; done")
            .spawn()
            .unwrap();

        sleep(StdDuration::from_millis(300));
        let pid = trap.id();

        thread::spawn(move || {
            let _ = ProcessTerminator::new(pid).shutdown(|| true);
        });

        let status = trap.wait().unwrap();
        assert_eq!(status.code(), Some(0));
    }
}
