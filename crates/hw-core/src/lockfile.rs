//! Advisory lock files that serialize mutating operations.
//!
//! `apply`, `stop` and `run` on one session must not interleave: each of them
//! mutates the live tmux session and the registry across many separate
//! commands. Every such operation holds `<state>/locks/<session>.lock` for
//! its whole duration. The registry file has its own short-lived lock for
//! each read-modify-write.
//!
//! ## Race safety
//!
//! Acquisition uses `O_CREAT | O_EXCL`, so if two processes race exactly one
//! wins the create. The loser gets `AlreadyExists` and inspects the holder.
//!
//! ## Stale lock recovery
//!
//! The lock records the holder's PID. If that process is dead (crash,
//! SIGKILL) the lock is removed and acquisition is retried once. Removal
//! first renames the file to a private name and checks it is still the
//! stale lock that was inspected, so a lock freshly created by another
//! contender in between is put back rather than deleted.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Suffix counter for reclaimed lock files within this process.
static RECLAIM_SEQ: AtomicU64 = AtomicU64::new(0);

/// Contents of a lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    /// What the holder is doing (`apply`, `stop`, `registry`, ...).
    pub operation: String,
    pub acquired_at: String,
}

impl LockInfo {
    fn current(operation: &str) -> Self {
        Self {
            pid: std::process::id(),
            operation: operation.to_string(),
            acquired_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Placeholder for a holder that has created the file but not yet
    /// written it.
    fn unknown() -> Self {
        Self {
            pid: 0,
            operation: "unknown".into(),
            acquired_at: String::new(),
        }
    }

    /// Check if the PID in this lock is still alive.
    pub fn is_alive(&self) -> bool {
        pid_alive(self.pid)
    }
}

/// Result of a single acquisition attempt.
enum AcquireResult {
    Acquired,
    Held(LockInfo),
    StaleRemoved,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("{path} is held by pid {pid} ({operation})")]
    Held {
        path: PathBuf,
        pid: u32,
        operation: String,
    },
    #[error("timed out waiting for {0}")]
    Timeout(PathBuf),
    #[error("failed to acquire {0} after stale cleanup")]
    Contended(PathBuf),
    #[error("lock I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An acquired lock. The file is removed when the guard is dropped.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Acquire the per-session lock under `locks_dir`, failing immediately if
    /// a live process holds it.
    pub fn session(locks_dir: &Path, session: &str, operation: &str) -> Result<Self, LockError> {
        Self::acquire(locks_dir.join(format!("{session}.lock")), operation)
    }

    /// Acquire `path`, failing immediately if a live process holds it.
    pub fn acquire(path: PathBuf, operation: &str) -> Result<Self, LockError> {
        for attempt in 0..2 {
            match try_acquire(&path, operation) {
                Ok(AcquireResult::Acquired) => return Ok(Self { path }),
                Ok(AcquireResult::Held(info)) => {
                    return Err(LockError::Held {
                        path,
                        pid: info.pid,
                        operation: info.operation,
                    })
                }
                Ok(AcquireResult::StaleRemoved) if attempt == 0 => {
                    tracing::info!(path = %path.display(), "stale lock removed, retrying acquire");
                    continue;
                }
                Ok(AcquireResult::StaleRemoved) => break,
                Err(source) => return Err(LockError::Io { path, source }),
            }
        }
        Err(LockError::Contended(path))
    }

    /// Acquire `path`, polling while another live process holds it.
    pub fn acquire_blocking(
        path: PathBuf,
        operation: &str,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        let deadline = Instant::now() + timeout;
        loop {
            match Self::acquire(path.clone(), operation) {
                Err(LockError::Held { .. } | LockError::Contended(_))
                    if Instant::now() < deadline =>
                {
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(LockError::Held { .. } | LockError::Contended(_)) => {
                    return Err(LockError::Timeout(path))
                }
                other => return other,
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a lock file. Returns `None` if missing or unparseable.
    pub fn read(path: &Path) -> Option<LockInfo> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn try_acquire(path: &Path, operation: &str) -> std::io::Result<AcquireResult> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match OpenOptions::new()
        .write(true)
        .create_new(true) // O_CREAT | O_EXCL
        .open(path)
    {
        Ok(mut file) => {
            let json = serde_json::to_string(&LockInfo::current(operation))
                .map_err(std::io::Error::other)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
            Ok(AcquireResult::Acquired)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            let existing = FileLock::read(path);
            match existing {
                Some(info) if info.is_alive() => Ok(AcquireResult::Held(info)),
                // A holder may be between create and write; an empty file is
                // not stale yet.
                None if is_fresh(path) => Ok(AcquireResult::Held(LockInfo::unknown())),
                stale => reclaim(path, stale.as_ref()),
            }
        }
        Err(e) => Err(e),
    }
}

/// Remove the stale lock at `path` whose contents were read as `observed`.
///
/// The file is renamed aside before deletion; if what was moved is not the
/// inspected lock, another process replaced it in the meantime and it is
/// linked back into place.
fn reclaim(path: &Path, observed: Option<&LockInfo>) -> std::io::Result<AcquireResult> {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(
        ".stale.{}.{}",
        std::process::id(),
        RECLAIM_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    let claimed = path.with_file_name(name);

    match std::fs::rename(path, &claimed) {
        Ok(()) => {}
        // Someone else already cleaned it up.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AcquireResult::StaleRemoved),
        Err(e) => return Err(e),
    }

    let moved = FileLock::read(&claimed);
    let unchanged = match (observed, moved.as_ref()) {
        (Some(before), Some(after)) => before == after,
        (None, None) => !is_fresh(&claimed),
        _ => false,
    };
    if unchanged {
        tracing::info!(path = %path.display(), "removing stale lock");
        std::fs::remove_file(&claimed)?;
        return Ok(AcquireResult::StaleRemoved);
    }

    tracing::debug!(path = %path.display(), "lock changed hands during cleanup, restoring");
    if let Err(e) = std::fs::hard_link(&claimed, path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to restore lock");
    }
    std::fs::remove_file(&claimed)?;
    Ok(AcquireResult::Held(moved.unwrap_or_else(LockInfo::unknown)))
}

fn is_fresh(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|age| age < Duration::from_secs(2))
}

/// Check if a process with the given PID is alive.
#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    // SAFETY: kill with signal 0 checks existence without sending a signal.
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    // Assume alive; avoids reclaiming a lock we cannot verify.
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_pid_is_alive() {
        assert!(pid_alive(std::process::id()));
    }

    #[test]
    fn bogus_pid_is_dead() {
        // PID 4_000_000 is extremely unlikely to exist.
        assert!(!pid_alive(4_000_000));
    }

    #[test]
    fn lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let guard = FileLock::session(dir.path(), "acme", "apply").unwrap();
        assert!(guard.path().exists());

        let info = FileLock::read(guard.path()).unwrap();
        assert_eq!(info.pid, std::process::id());
        assert_eq!(info.operation, "apply");

        let err = FileLock::session(dir.path(), "acme", "stop").unwrap_err();
        assert!(matches!(err, LockError::Held { operation, .. } if operation == "apply"));

        // Other sessions are independent.
        let _other = FileLock::session(dir.path(), "globex", "apply").unwrap();

        let path = guard.path().to_path_buf();
        drop(guard);
        assert!(!path.exists());
        FileLock::session(dir.path(), "acme", "stop").unwrap();
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acme.lock");
        let stale = LockInfo {
            pid: 4_000_000,
            operation: "apply".into(),
            acquired_at: "2026-01-01T00:00:00Z".into(),
        };
        std::fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        let guard = FileLock::session(dir.path(), "acme", "run").unwrap();
        assert_eq!(FileLock::read(guard.path()).unwrap().operation, "run");
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn reclaim_removes_the_inspected_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acme.lock");
        let stale = LockInfo {
            pid: 4_000_000,
            operation: "apply".into(),
            acquired_at: "2026-01-01T00:00:00Z".into(),
        };
        std::fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        let result = reclaim(&path, Some(&stale)).unwrap();
        assert!(matches!(result, AcquireResult::StaleRemoved));
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn reclaim_restores_a_lock_replaced_after_inspection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acme.lock");
        let stale = LockInfo {
            pid: 4_000_000,
            operation: "apply".into(),
            acquired_at: "2026-01-01T00:00:00Z".into(),
        };
        // Between our read and the cleanup, a live process took the lock.
        let fresh = LockInfo::current("stop");
        std::fs::write(&path, serde_json::to_string(&fresh).unwrap()).unwrap();

        let result = reclaim(&path, Some(&stale)).unwrap();
        match result {
            AcquireResult::Held(info) => assert_eq!(info, fresh),
            _ => panic!("the replacement lock must be reported as held"),
        }
        assert_eq!(FileLock::read(&path), Some(fresh));
        assert_eq!(entries(dir.path()), vec!["acme.lock".to_string()]);
    }

    #[test]
    fn reclaim_of_vanished_lock_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = reclaim(&dir.path().join("acme.lock"), None).unwrap();
        assert!(matches!(result, AcquireResult::StaleRemoved));
    }

    #[test]
    fn blocking_acquire_times_out_on_live_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json.lock");
        let _held = FileLock::acquire(path.clone(), "registry").unwrap();

        let err = FileLock::acquire_blocking(path, "registry", Duration::from_millis(60))
            .unwrap_err();
        assert!(matches!(err, LockError::Timeout(_)));
    }
}
