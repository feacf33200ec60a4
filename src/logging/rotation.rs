use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Size-based rotation policy for a single service's log file (spec §4.2).
#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    pub max_size_bytes: u64,
    pub keep: u32,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: 10 * 1024 * 1024,
            keep: 5,
        }
    }
}

/// A single append-only, line-flushed log file that rotates itself once
/// `policy.max_size_bytes` is exceeded, cascading `{name}.log.1..N` and
/// dropping anything past `keep`.
pub struct RotatingFile {
    path: PathBuf,
    policy: RotationPolicy,
    file: File,
    written: u64,
}

impl RotatingFile {
    pub fn open(path: PathBuf, policy: RotationPolicy) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            policy,
            file,
            written,
        })
    }

    /// Appends a single line (newline-terminated) and flushes immediately.
    /// Rotates first if the write would exceed the configured size.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        use std::io::Write;

        let incoming = line.len() as u64 + 1;
        if self.written > 0 && self.written + incoming > self.policy.max_size_bytes {
            self.rotate()?;
        }
        writeln!(self.file, "{line}")?;
        self.file.flush()?;
        self.written += incoming;
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        // Drop the oldest kept backup, then cascade `.{N-1}` -> `.{N}` down
        // to `.1`, then move the live file to `.1`.
        let oldest = self.backup_path(self.policy.keep);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.policy.keep).rev() {
            let from = self.backup_path(n);
            if from.exists() {
                fs::rename(&from, self.backup_path(n + 1))?;
            }
        }
        if self.policy.keep > 0 {
            fs::rename(&self.path, self.backup_path(1))?;
        } else {
            fs::remove_file(&self.path)?;
        }

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }
}

pub fn log_path(app_data_home: &Path, service: &str) -> PathBuf {
    app_data_home
        .join(service)
        .join("logs")
        .join(format!("{service}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_flushes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        let mut rf = RotatingFile::open(path.clone(), RotationPolicy::default()).unwrap();
        rf.write_line("hello").unwrap();
        rf.write_line("world").unwrap();
        drop(rf);

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "hello\nworld\n");
    }

    #[test]
    fn rotates_when_over_size_and_cascades_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        let policy = RotationPolicy {
            max_size_bytes: 10,
            keep: 2,
        };
        let mut rf = RotatingFile::open(path.clone(), policy).unwrap();

        for i in 0..5 {
            rf.write_line(&format!("line{i}")).unwrap();
        }

        assert!(path.exists());
        let backup1 = dir.path().join("svc.log.1");
        assert!(backup1.exists(), "expected a .1 backup to exist");
    }

    #[test]
    fn drops_backups_past_keep() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        let policy = RotationPolicy {
            max_size_bytes: 6,
            keep: 1,
        };
        let mut rf = RotatingFile::open(path.clone(), policy).unwrap();
        for i in 0..10 {
            rf.write_line(&format!("l{i}")).unwrap();
        }
        assert!(!dir.path().join("svc.log.2").exists());
    }
}
