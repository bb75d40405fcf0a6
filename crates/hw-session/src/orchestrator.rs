//! Session lifecycle: `apply`, `stop`, `list`, `attach`, `run`.
//!
//! The [`Orchestrator`] owns no state of its own. Every operation re-reads
//! the registry and asks the multiplexer whether the session is live, since
//! sessions can be killed or renamed behind our back.

use std::path::{Path, PathBuf};

use hw_core::config::Config;
use hw_core::lockfile::{FileLock, LockError};
use hw_core::plan::{pane_matches, plan, PaneAddress, Plan};
use hw_core::registry::{RegistryError, SessionRecord, SessionRegistry, SessionStatus};
use hw_core::spec::{validate_session_name, Spec, SpecError};
use hw_core::workspace::{FsMaterializer, Materializer, WorkspaceError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::driver::{DriverError, Multiplexer, Target, TmuxDriver};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("invalid spec: {0}")]
    Validation(#[from] SpecError),

    #[error("session '{0}' is already running")]
    Conflict(String),

    /// A multiplexer call failed. Steps completed before it are not rolled back.
    #[error("{step} failed: {source}")]
    Driver {
        step: String,
        #[source]
        source: DriverError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("session '{session}' is busy: {source}")]
    Lock {
        session: String,
        #[source]
        source: LockError,
    },

    #[error("session '{0}' is not running")]
    NotRunning(String),

    #[error("session '{0}' is running but has no registry record")]
    NotFound(String),

    #[error("session '{session}' has no room '{room}'")]
    UnknownRoom { session: String, room: String },
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

fn step(description: impl Into<String>) -> impl FnOnce(DriverError) -> OrchestratorError {
    let step = description.into();
    move |source| OrchestratorError::Driver { step, source }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApplyOutcome {
    /// `--dry-run`: nothing was touched.
    DryRun(Plan),
    Applied(ApplyReport),
}

#[derive(Debug)]
pub struct ApplyReport {
    pub plan: Plan,
    /// Agent directories, in plan order.
    pub directories: Vec<PathBuf>,
    pub record: SessionRecord,
}

/// What happened to the registry entry on `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordChange {
    MarkedStopped,
    Removed,
    Absent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub session: String,
    pub killed: bool,
    pub workspace_removed: Option<PathBuf>,
    pub record: RecordChange,
}

impl StopReport {
    /// Nothing was live and nothing was recorded.
    pub fn is_noop(&self) -> bool {
        !self.killed && self.workspace_removed.is_none() && self.record == RecordChange::Absent
    }
}

/// Liveness as observed from the multiplexer at `list` time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    Running,
    Stopped,
    /// The liveness probe itself failed.
    Unknown,
}

impl std::fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LiveStatus::Running => "running",
            LiveStatus::Stopped => "stopped",
            LiveStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub name: String,
    pub observed: LiveStatus,
    pub record: SessionRecord,
}

impl SessionSummary {
    /// The registry disagrees with the multiplexer.
    pub fn is_drifted(&self) -> bool {
        matches!(
            (self.observed, self.record.status),
            (LiveStatus::Running, SessionStatus::Stopped) | (LiveStatus::Stopped, SessionStatus::Running)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTarget {
    pub address: PaneAddress,
    pub agent: String,
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub session: String,
    pub sent: Vec<RunTarget>,
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    driver: Box<dyn Multiplexer>,
    materializer: Box<dyn Materializer>,
    registry: SessionRegistry,
    locks_dir: PathBuf,
    base_path: PathBuf,
    cwd: PathBuf,
}

impl Orchestrator {
    /// Orchestrator driving the real tmux binary and filesystem.
    pub fn new(config: &Config) -> Self {
        let materializer =
            FsMaterializer::new([config.workspace.base_path.clone(), config.state_dir()]);
        Self::with_components(
            config,
            Box::new(TmuxDriver::new(&config.tmux)),
            Box::new(materializer),
        )
    }

    /// Orchestrator with injected collaborators (for testing).
    pub fn with_components(
        config: &Config,
        driver: Box<dyn Multiplexer>,
        materializer: Box<dyn Materializer>,
    ) -> Self {
        Self {
            driver,
            materializer,
            registry: SessionRegistry::new(config.registry_path()),
            locks_dir: config.locks_dir(),
            base_path: config.workspace.base_path.clone(),
            cwd: std::env::current_dir().unwrap_or_else(|_| config.workspace.base_path.clone()),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Directory under which `name`'s agent directories live.
    pub fn workspace_root(&self, name: &str, spec: &Spec) -> PathBuf {
        match spec.base_path() {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => self.cwd.join(path),
            None => self.base_path.join(name),
        }
    }

    pub fn plan(&self, name: &str, spec: &Spec) -> Result<Plan> {
        Ok(plan(name, spec, &self.workspace_root(name, spec))?)
    }

    /// Session names reach tmux targets, lock file names and the default
    /// workspace path, so every entry point checks them first.
    fn check_name(name: &str) -> Result<()> {
        Ok(validate_session_name(name)?)
    }

    fn lock(&self, name: &str, operation: &str) -> Result<FileLock> {
        FileLock::session(&self.locks_dir, name, operation).map_err(|source| {
            OrchestratorError::Lock {
                session: name.to_string(),
                source,
            }
        })
    }

    async fn is_live(&self, name: &str) -> Result<bool> {
        self.driver
            .session_exists(name)
            .await
            .map_err(step(format!("check session '{name}'")))
    }

    // ---- apply ----

    /// Build `spec` as a live session named `name`.
    pub async fn apply(&self, name: &str, spec: &Spec, dry_run: bool) -> Result<ApplyOutcome> {
        let plan = self.plan(name, spec)?;
        if dry_run {
            return Ok(ApplyOutcome::DryRun(plan));
        }
        let record = SessionRecord::running(spec, &plan)?;

        let _lock = self.lock(name, "apply")?;
        if self.is_live(name).await? {
            return Err(OrchestratorError::Conflict(name.to_string()));
        }

        let directories = self.materializer.materialize(&plan)?;
        if let Err(e) = self.build(&plan).await {
            warn!(
                session = name,
                error = %e,
                "session left partially built; stop it before re-applying"
            );
            return Err(e);
        }

        self.registry.upsert(name, record.clone())?;
        info!(
            session = name,
            rooms = record.rooms,
            agents = record.agents,
            "session applied"
        );
        Ok(ApplyOutcome::Applied(ApplyReport {
            plan,
            directories,
            record,
        }))
    }

    async fn build(&self, plan: &Plan) -> Result<()> {
        let session = plan.session.as_str();
        let Some(first) = plan.windows.first() else {
            return Ok(());
        };
        self.driver
            .create_session(session, &first.name)
            .await
            .map_err(step(format!("create session '{session}'")))?;

        for window in &plan.windows {
            let target = Target::window(session, window.index);
            if window.index == 0 {
                // The session's initial window becomes the first room.
                self.driver
                    .rename_window(&target, &window.name)
                    .await
                    .map_err(step(format!("rename window {}", window.index)))?;
            } else {
                self.driver
                    .create_window(session, &window.name)
                    .await
                    .map_err(step(format!("create window '{}'", window.name)))?;
            }

            for _ in 0..window.splits() {
                self.driver
                    .split_window(&target)
                    .await
                    .map_err(step(format!("split window '{}'", window.name)))?;
                self.driver
                    .retile(&target)
                    .await
                    .map_err(step(format!("retile window '{}'", window.name)))?;
            }
            debug!(session, window = %window.name, panes = window.panes.len(), "window built");
        }

        for (_, pane) in plan.panes() {
            let target = Target::pane(session, pane.address);
            let describe = |what: &str| format!("{what} for '{}' ({})", pane.agent, pane.address);

            self.driver
                .send_keys(&target, &format!("cd {}", shell_quote(&pane.working_dir)))
                .await
                .map_err(step(describe("change directory")))?;
            self.driver
                .set_pane_title(&target, &pane.title)
                .await
                .map_err(step(describe("set title")))?;
            if let Some(init) = &pane.init_command {
                self.driver
                    .send_keys(&target, init)
                    .await
                    .map_err(step(describe("init command")))?;
            }
        }
        Ok(())
    }

    // ---- stop ----

    /// Kill `name` if live. Idempotent.
    ///
    /// Without `clean_dirs` the record is kept with status `stopped`; with it
    /// the workspace and the record are both removed.
    pub async fn stop(&self, name: &str, clean_dirs: bool) -> Result<StopReport> {
        Self::check_name(name)?;
        let _lock = self.lock(name, "stop")?;

        let killed = if self.is_live(name).await? {
            self.driver
                .kill_session(name)
                .await
                .map_err(step(format!("kill session '{name}'")))?;
            true
        } else {
            info!(session = name, "session not running");
            false
        };

        let existing = self.registry.get(name);
        let mut workspace_removed = None;
        if clean_dirs {
            let root = existing
                .as_ref()
                .map(|r| r.workspace.clone())
                .unwrap_or_else(|| self.base_path.join(name));
            if self.materializer.remove(&root)? {
                workspace_removed = Some(root);
            }
        }

        let record = match (existing.is_some(), clean_dirs) {
            (false, _) => RecordChange::Absent,
            (true, true) => {
                self.registry.remove(name)?;
                RecordChange::Removed
            }
            (true, false) => {
                self.registry.set_status(name, SessionStatus::Stopped)?;
                RecordChange::MarkedStopped
            }
        };

        info!(session = name, killed, record = ?record, "session stopped");
        Ok(StopReport {
            session: name.to_string(),
            killed,
            workspace_removed,
            record,
        })
    }

    // ---- list ----

    /// Every recorded session with its observed liveness.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let mut out = Vec::new();
        for (name, record) in self.registry.load() {
            let observed = match self.driver.session_exists(&name).await {
                Ok(true) => LiveStatus::Running,
                Ok(false) => LiveStatus::Stopped,
                Err(e) => {
                    warn!(session = %name, error = %e, "liveness probe failed");
                    LiveStatus::Unknown
                }
            };
            out.push(SessionSummary {
                name,
                observed,
                record,
            });
        }
        out
    }

    // ---- attach ----

    /// Hand the terminal to `name`, optionally focused on `room`.
    pub async fn attach(&self, name: &str, room: Option<&str>) -> Result<()> {
        Self::check_name(name)?;
        if !self.is_live(name).await? {
            return Err(OrchestratorError::NotRunning(name.to_string()));
        }
        let target = match room {
            None => Target::Session(name.to_string()),
            Some(room) => self.resolve_room(name, room)?,
        };
        info!(session = name, target = %target, "attaching");
        self.driver
            .attach(&target)
            .await
            .map_err(step(format!("attach to '{target}'")))
    }

    fn resolve_room(&self, name: &str, room: &str) -> Result<Target> {
        let Some(record) = self.registry.get(name) else {
            // Unrecorded session: let tmux resolve the window itself.
            return Ok(match room.parse::<usize>() {
                Ok(window) => Target::window(name, window),
                Err(_) => Target::NamedWindow {
                    session: name.to_string(),
                    name: room.to_string(),
                },
            });
        };
        let plan = recorded_plan(name, &record)?;
        plan.find_window(room)
            .map(|w| Target::window(name, w.index))
            .ok_or_else(|| OrchestratorError::UnknownRoom {
                session: name.to_string(),
                room: room.to_string(),
            })
    }

    // ---- run ----

    /// Type `command` into every pane selected by `filter`.
    pub async fn run(&self, name: &str, command: &str, filter: Option<&str>) -> Result<RunReport> {
        Self::check_name(name)?;
        let _lock = self.lock(name, "run")?;
        if !self.is_live(name).await? {
            return Err(OrchestratorError::NotRunning(name.to_string()));
        }
        let record = self
            .registry
            .get(name)
            .ok_or_else(|| OrchestratorError::NotFound(name.to_string()))?;
        let plan = recorded_plan(name, &record)?;

        let mut sent = Vec::new();
        let mut skipped = 0;
        for (window, pane) in plan.panes() {
            if !pane_matches(window, pane, filter) {
                skipped += 1;
                continue;
            }
            self.driver
                .send_keys(&Target::pane(name, pane.address), command)
                .await
                .map_err(step(format!("send to '{}' ({})", pane.agent, pane.address)))?;
            sent.push(RunTarget {
                address: pane.address,
                agent: pane.agent.clone(),
                room: window.room.clone(),
            });
        }

        info!(session = name, sent = sent.len(), skipped, "command broadcast");
        Ok(RunReport {
            session: name.to_string(),
            sent,
            skipped,
        })
    }
}

/// Recompute the plan a session was built from.
fn recorded_plan(name: &str, record: &SessionRecord) -> Result<Plan> {
    let spec = record.spec()?;
    Ok(plan(name, &spec, &record.workspace)?)
}

/// Quote a path for a POSIX shell.
fn shell_quote(path: &Path) -> String {
    let raw = path.display().to_string();
    if !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:@%".contains(c))
    {
        return raw;
    }
    format!("'{}'", raw.replace('\'', r"'\''"))
}
