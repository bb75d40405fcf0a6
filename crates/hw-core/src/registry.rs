use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::lockfile::{FileLock, LockError};
use crate::plan::Plan;
use crate::spec::{Spec, SpecError};

/// How long an upsert/remove waits for another process's registry write.
const REGISTRY_LOCK_WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Status recorded at the last orchestrator write. Only a display hint:
/// liveness is always re-checked against the multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Stopped,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Running => "running",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Persisted metadata for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(deserialize_with = "lenient_timestamp")]
    pub created: DateTime<Utc>,
    pub workspace: PathBuf,
    /// The spec the session was built from, kept as raw JSON and only
    /// parsed on demand by [`SessionRecord::spec`].
    pub config: serde_json::Value,
    pub status: SessionStatus,
    #[serde(default)]
    pub rooms: usize,
    #[serde(default)]
    pub agents: usize,
}

impl SessionRecord {
    /// Record for a freshly built session.
    pub fn running(spec: &Spec, plan: &Plan) -> std::result::Result<Self, SpecError> {
        Ok(Self {
            created: Utc::now(),
            workspace: plan.workspace_root.clone(),
            config: spec.to_stored()?,
            status: SessionStatus::Running,
            rooms: plan.room_count(),
            agents: plan.agent_count(),
        })
    }

    /// Parse the stored spec.
    pub fn spec(&self) -> std::result::Result<Spec, SpecError> {
        Spec::from_stored(&self.config)
    }
}

/// RFC 3339, or an offset-less ISO timestamp taken as local time.
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_timestamp(&text)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp '{text}'")))
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(stamp) = DateTime::parse_from_rfc3339(text) {
        return Some(stamp.with_timezone(&Utc));
    }
    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())?;
    let stamp = match Local.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        None => naive.and_utc(),
    };
    Some(stamp)
}

pub type Sessions = BTreeMap<String, SessionRecord>;

/// The file as stored, entries not yet interpreted.
type RawSessions = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("registry lock: {0}")]
    Lock(#[from] LockError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// File-backed registry: one JSON object mapping session name to record.
///
/// Reads are advisory. A missing or corrupt file loads as empty; a corrupt
/// file is moved aside to `<file>.corrupt` with a warning so a later save
/// does not silently overwrite it.
pub struct SessionRegistry {
    path: PathBuf,
}

impl SessionRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        sibling(&self.path, "lock")
    }

    /// Load every readable record. Never fails.
    ///
    /// Entries that do not parse are skipped with a warning and left
    /// untouched on disk by later writes.
    pub fn load(&self) -> Sessions {
        self.load_raw()
            .into_iter()
            .filter_map(|(name, value)| match serde_json::from_value(value) {
                Ok(record) => Some((name, record)),
                Err(e) => {
                    warn!(session = %name, error = %e, "skipping unreadable registry entry");
                    None
                }
            })
            .collect()
    }

    fn load_raw(&self) -> RawSessions {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return RawSessions::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "registry unreadable, treating as empty");
                return RawSessions::new();
            }
        };
        if data.trim().is_empty() {
            return RawSessions::new();
        }
        match serde_json::from_str(&data) {
            Ok(sessions) => sessions,
            Err(e) => {
                let aside = sibling(&self.path, "corrupt");
                warn!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "registry is corrupt, treating as empty"
                );
                if let Err(e) = std::fs::rename(&self.path, &aside) {
                    warn!(error = %e, "failed to move corrupt registry aside");
                }
                RawSessions::new()
            }
        }
    }

    /// Replace the whole file atomically (temp file + rename).
    pub fn save(&self, sessions: &Sessions) -> Result<()> {
        let raw = sessions
            .iter()
            .map(|(name, record)| Ok((name.clone(), serde_json::to_value(record)?)))
            .collect::<Result<RawSessions>>()?;
        self.save_raw(&raw)
    }

    fn save_raw(&self, sessions: &RawSessions) -> Result<()> {
        let io_err = |source: std::io::Error| RegistryError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(sessions)?;
        let tmp = sibling(&self.path, &format!("tmp.{}", std::process::id()));
        let mut file = std::fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(json.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(e));
        }
        debug!(path = %self.path.display(), count = sessions.len(), "registry saved");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SessionRecord> {
        self.load().remove(name)
    }

    /// Insert or replace one record.
    pub fn upsert(&self, name: &str, record: SessionRecord) -> Result<()> {
        let _guard = FileLock::acquire_blocking(self.lock_path(), "registry", REGISTRY_LOCK_WAIT)?;
        let mut sessions = self.load_raw();
        sessions.insert(name.to_string(), serde_json::to_value(&record)?);
        self.save_raw(&sessions)
    }

    /// Remove one record. Returns `true` if it existed.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let _guard = FileLock::acquire_blocking(self.lock_path(), "registry", REGISTRY_LOCK_WAIT)?;
        let mut sessions = self.load_raw();
        if sessions.remove(name).is_none() {
            return Ok(false);
        }
        self.save_raw(&sessions)?;
        Ok(true)
    }

    /// Update the recorded status of an existing entry. Returns `false` when
    /// there is no such readable entry.
    pub fn set_status(&self, name: &str, status: SessionStatus) -> Result<bool> {
        let _guard = FileLock::acquire_blocking(self.lock_path(), "registry", REGISTRY_LOCK_WAIT)?;
        let mut sessions = self.load_raw();
        let Some(entry) = sessions.get_mut(name) else {
            return Ok(false);
        };
        let Ok(mut record) = serde_json::from_value::<SessionRecord>(entry.clone()) else {
            return Ok(false);
        };
        record.status = status;
        *entry = serde_json::to_value(&record)?;
        self.save_raw(&sessions)?;
        Ok(true)
    }
}

/// `sessions.json` -> `sessions.json.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
