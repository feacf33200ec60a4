use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crossbeam::channel::Sender;

use super::error::ProcessError;
use super::stream::OutputEvent;

#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// How a spawned child's stdout/stderr are handled (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioPolicy {
    /// Inherit the supervisor's own stdio.
    Inherit,
    /// Pipe both streams so the Log Redirector (C2) can consume them.
    Pipe,
}

pub struct Unstarted;
pub struct Started;

/// A Job Object handle on Windows (used for process-tree containment at both
/// spawn and shutdown time); a zero-sized placeholder elsewhere.
#[cfg(windows)]
pub type JobHandle = std::sync::Arc<super::job_object::JobObject>;
#[cfg(not(windows))]
pub type JobHandle = ();

/// A typestate wrapper around [`std::process::Command`]/[`std::process::Child`]
/// (spec §4.1 C1 contract: `spawn`/`wait`).
///
/// The `Unstarted` state owns a fully configured but not-yet-spawned
/// [`Command`]; `.start()` consumes it and yields a `Started` handle carrying
/// the live child and its pid.
pub struct ProcessRunner<State = Unstarted> {
    cmd: Option<Command>,
    process: Option<Child>,
    spawned_at: Option<Instant>,
    job: Option<JobHandle>,
    state: PhantomData<State>,
}

impl ProcessRunner {
    /// Builds a not-yet-started runner. `argv0` is resolved relative to
    /// `work_dir` when it begins with `./`, matching the static `Service`
    /// contract in spec §3.
    pub fn new(
        work_dir: &Path,
        argv: &[String],
        env: &HashMap<String, String>,
        stdio_policy: StdioPolicy,
    ) -> Result<Self, ProcessError> {
        let (argv0, args) = argv.split_first().ok_or(ProcessError::NotFound(
            "start_cmd must be non-empty".to_string(),
        ))?;

        let resolved_argv0: PathBuf = if let Some(rest) = argv0.strip_prefix("./") {
            work_dir.join(rest)
        } else {
            PathBuf::from(argv0)
        };

        let mut command = Command::new(resolved_argv0);
        command.args(args).current_dir(work_dir).envs(env);

        match stdio_policy {
            StdioPolicy::Inherit => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            StdioPolicy::Pipe => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        place_in_own_process_group(&mut command);

        Ok(Self {
            cmd: Some(command),
            process: None,
            spawned_at: None,
            job: None,
            state: PhantomData,
        })
    }

    /// Spawns the child. Process-group discipline (spec §4.1) is applied
    /// before this returns: the child is the leader of its own process group
    /// on POSIX, allowing subtree termination via the negative pid; on
    /// Windows it is assigned to a fresh Job Object for the same purpose.
    pub fn start(mut self) -> Result<ProcessRunner<Started>, ProcessError> {
        let child = self
            .cmd
            .take()
            .ok_or(ProcessError::AlreadyStarted)?
            .spawn()?;

        let job = assign_job_object(&child);

        Ok(ProcessRunner {
            cmd: None,
            process: Some(child),
            spawned_at: Some(Instant::now()),
            job,
            state: PhantomData,
        })
    }
}

#[cfg(windows)]
fn assign_job_object(child: &Child) -> Option<JobHandle> {
    use std::os::windows::io::AsRawHandle;

    use super::job_object::JobObject;

    let job = match JobObject::create() {
        Ok(job) => job,
        Err(err) => {
            tracing::warn!(%err, "failed to create Job Object for process-tree containment");
            return None;
        }
    };

    let handle = child.as_raw_handle() as windows_sys::Win32::Foundation::HANDLE;
    if let Err(err) = job.assign(handle) {
        tracing::warn!(%err, "failed to assign child process to Job Object");
        return None;
    }

    Some(std::sync::Arc::new(job))
}

#[cfg(not(windows))]
fn assign_job_object(_child: &Child) -> Option<JobHandle> {
    None
}

impl ProcessRunner<Started> {
    pub fn pid(&self) -> u32 {
        self.process
            .as_ref()
            .expect("a Started ProcessRunner always has a process")
            .id()
    }

    /// A cloneable handle to this child's Job Object on Windows (`None`
    /// elsewhere, or if containment setup failed at spawn time), so a
    /// caller can still terminate the whole process tree after the
    /// `ProcessRunner` itself has been moved onto a wait thread.
    pub fn job_handle(&self) -> Option<JobHandle> {
        self.job.clone()
    }

    /// Detaches stdout/stderr collection onto a background thread, which
    /// publishes each line as an [`OutputEvent`]. Returns immediately; the
    /// collector thread runs until both streams reach EOF.
    pub fn stream(&mut self, sender: Sender<OutputEvent>) -> Result<(), ProcessError> {
        let child = self
            .process
            .as_mut()
            .ok_or(ProcessError::NotStarted)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        std::thread::spawn(move || {
            let mut out_lines = stdout.map(BufReader::new).map(BufReader::lines);
            let mut err_lines = stderr.map(BufReader::new).map(BufReader::lines);

            loop {
                let mut progressed = false;
                if let Some(lines) = out_lines.as_mut() {
                    match lines.next() {
                        Some(Ok(line)) => {
                            progressed = true;
                            let _ = sender.send(OutputEvent::Stdout(line));
                        }
                        Some(Err(_)) | None => out_lines = None,
                    }
                }
                if let Some(lines) = err_lines.as_mut() {
                    match lines.next() {
                        Some(Ok(line)) => {
                            progressed = true;
                            let _ = sender.send(OutputEvent::Stderr(line));
                        }
                        Some(Err(_)) | None => err_lines = None,
                    }
                }
                if out_lines.is_none() && err_lines.is_none() {
                    break;
                }
                if !progressed {
                    break;
                }
            }
        });

        Ok(())
    }

    /// Blocks until the child exits, returning its terminal status and the
    /// wall-clock duration since spawn (spec §4.1 `wait`).
    pub fn wait(mut self) -> Result<(ExitStatus, Duration), ProcessError> {
        let child = self.process.as_mut().ok_or(ProcessError::NotStarted)?;
        let status = child.wait()?;
        let duration = self
            .spawned_at
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);
        Ok((status, duration))
    }
}

#[cfg(unix)]
fn place_in_own_process_group(command: &mut Command) {
    // SAFETY: `setsid` is async-signal-safe and is the only call made in the
    // child between fork and exec.
    unsafe {
        command.pre_exec(|| {
            nix::unistd::setsid().map_err(std::io::Error::from)?;
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn place_in_own_process_group(_command: &mut Command) {
    // Windows process-group discipline is handled by assigning the child to
    // a Job Object after spawn (see `process::job_object`), not at Command
    // construction time.
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn rejects_empty_start_cmd() {
        let err = ProcessRunner::new(Path::new("."), &[], &HashMap::new(), StdioPolicy::Inherit)
            .unwrap_err();
        assert!(matches!(err, ProcessError::NotFound(_)));
    }

    #[test]
    fn resolves_dot_slash_relative_to_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(
            dir.path(),
            &["./does-not-exist".to_string()],
            &HashMap::new(),
            StdioPolicy::Inherit,
        )
        .unwrap();
        let err = runner.start().unwrap_err();
        assert!(matches!(err, ProcessError::NotFound(_)));
    }

    #[test]
    fn spawns_and_waits_for_exit() {
        let runner = ProcessRunner::new(
            Path::new("."),
            &["true".to_string()],
            &HashMap::new(),
            StdioPolicy::Inherit,
        )
        .unwrap();
        let started = runner.start().unwrap();
        assert!(started.pid() > 0);
        let (status, _duration) = started.wait().unwrap();
        assert_eq!(status.code(), Some(0));
    }

    #[test]
    fn streams_stdout_and_stderr_lines() {
        let runner = ProcessRunner::new(
            Path::new("."),
            &[
                "sh".to_string(),
                "-c".to_string(),
                "echo out-line; echo err-line 1>&2".to_string(),
            ],
            &HashMap::new(),
            StdioPolicy::Pipe,
        )
        .unwrap();
        let mut started = runner.start().unwrap();
        let (tx, rx) = crossbeam::channel::unbounded();
        started.stream(tx).unwrap();

        let (status, _) = started.wait().unwrap();
        assert_eq!(status.code(), Some(0));

        let events: Vec<OutputEvent> = rx.try_iter().collect();
        let has_stdout = events
            .iter()
            .any(|e| matches!(e, OutputEvent::Stdout(l) if l == "out-line"));
        let has_stderr = events
            .iter()
            .any(|e| matches!(e, OutputEvent::Stderr(l) if l == "err-line"));
        assert!(has_stdout && has_stderr);
    }

    #[test]
    fn exit_signal_is_reported() {
        let runner = ProcessRunner::new(
            Path::new("."),
            &["sh".to_string(), "-c".to_string(), "kill -TERM $$".to_string()],
            &HashMap::new(),
            StdioPolicy::Inherit,
        )
        .unwrap();
        let started = runner.start().unwrap();
        let (status, _) = started.wait().unwrap();
        assert_eq!(status.signal(), Some(nix::sys::signal::Signal::SIGTERM as i32));
    }
}
