use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

const PID_FILE: &str = "inputstatsd.pid";

/// Single-instance lock backed by a PID file in the data directory.
///
/// Acquiring checks whether the recorded PID still names a live process: a
/// live one means another daemon owns the data directory and acquisition
/// fails, a dead or unparsable one is treated as a stale file from a crash
/// and replaced. Dropping the guard removes the file only when it still
/// holds our PID.
pub struct InstanceGuard {
    path: PathBuf,
    pid: u32,
}

impl InstanceGuard {
    pub fn acquire(data_dir: &Path) -> Result<InstanceGuard> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("create data dir {}", data_dir.display()))?;
        let path = data_dir.join(PID_FILE);

        if let Ok(raw) = std::fs::read_to_string(&path) {
            match raw.trim().parse::<u32>() {
                Ok(pid) if process_alive(pid) => {
                    bail!("another instance is running (pid {pid})");
                }
                Ok(pid) => {
                    info!("removing stale pid file (pid {pid} is gone)");
                }
                Err(_) => {
                    warn!("pid file {} is unparsable; replacing it", path.display());
                }
            }
        }

        let pid = std::process::id();
        std::fs::write(&path, pid.to_string())
            .with_context(|| format!("write pid file {}", path.display()))?;
        Ok(InstanceGuard { path, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        // Only remove the file if it is still ours.
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().parse::<u32>() == Ok(self.pid) => {
                let _ = std::fs::remove_file(&self.path);
            }
            _ => {}
        }
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    Command::new("ps")
        .args(["-p", &pid.to_string()])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

#[cfg(windows)]
fn process_alive(pid: u32) -> bool {
    Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/NH"])
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).contains(&pid.to_string()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_writes_our_pid() {
        let dir = TempDir::new().unwrap();
        let guard = InstanceGuard::acquire(dir.path()).unwrap();

        let raw = std::fs::read_to_string(dir.path().join(PID_FILE)).unwrap();
        assert_eq!(raw.trim().parse::<u32>().unwrap(), guard.pid());
        assert_eq!(guard.pid(), std::process::id());
    }

    #[test]
    fn second_acquire_in_same_process_fails() {
        let dir = TempDir::new().unwrap();
        let _guard = InstanceGuard::acquire(dir.path()).unwrap();
        // Our own PID is alive, so a second acquisition must be refused.
        assert!(InstanceGuard::acquire(dir.path()).is_err());
    }

    #[test]
    fn refused_acquire_leaves_the_data_dir_untouched() {
        let dir = TempDir::new().unwrap();
        let _guard = InstanceGuard::acquire(dir.path()).unwrap();
        assert!(InstanceGuard::acquire(dir.path()).is_err());

        // The loser backed off before opening any database: the pid file
        // is the only thing in the data dir.
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(PID_FILE)]);
        assert!(!dir.path().join("input.db").exists());
    }

    #[test]
    fn stale_pid_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        // PID near the u32 ceiling; no live process will have it.
        std::fs::write(dir.path().join(PID_FILE), "4294967294").unwrap();

        let guard = InstanceGuard::acquire(dir.path()).unwrap();
        assert_eq!(guard.pid(), std::process::id());
    }

    #[test]
    fn unparsable_pid_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(PID_FILE), "not-a-pid").unwrap();
        assert!(InstanceGuard::acquire(dir.path()).is_ok());
    }

    #[test]
    fn drop_removes_only_our_own_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PID_FILE);

        {
            let _guard = InstanceGuard::acquire(dir.path()).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());

        {
            let _guard = InstanceGuard::acquire(dir.path()).unwrap();
            // Another process took over the file; the guard must leave it.
            std::fs::write(&path, "12345").unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "12345");
    }
}
