use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info};

use crate::plan::{PanePlan, Plan, PlanMode, WindowPlan};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// Creating a directory or writing a seed file failed.
    #[error("workspace I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Refused to delete a path that is not a session workspace.
    #[error("refusing to remove {path}: {reason}")]
    Unsafe { path: PathBuf, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;

// ---------------------------------------------------------------------------
// Materializer trait
// ---------------------------------------------------------------------------

/// Creates and removes the on-disk side of a session.
pub trait Materializer: Send + Sync {
    /// Create every planned agent directory and its seed files. Existing
    /// directories are reused and seed files rewritten. Returns the agent
    /// directories in plan order.
    fn materialize(&self, plan: &Plan) -> Result<Vec<PathBuf>>;

    /// Recursively delete a workspace root. Returns `false` if it did not exist.
    fn remove(&self, root: &Path) -> Result<bool>;
}

/// Writes directories and README/task files to the local filesystem.
pub struct FsMaterializer {
    /// Paths that must never be deleted (the base directory and the state
    /// directory).
    protected: Vec<PathBuf>,
}

impl Default for FsMaterializer {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl FsMaterializer {
    pub fn new(protected: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            protected: protected.into_iter().collect(),
        }
    }

    fn check_removable(&self, root: &Path) -> Result<()> {
        let unsafe_path = |reason| WorkspaceError::Unsafe {
            path: root.to_path_buf(),
            reason,
        };
        let root = normalize(root);
        if root.parent().is_none() {
            return Err(unsafe_path("filesystem root"));
        }
        if dirs::home_dir().is_some_and(|home| normalize(&home) == root) {
            return Err(unsafe_path("home directory"));
        }
        for protected in &self.protected {
            let protected = normalize(protected);
            if protected.starts_with(&root) {
                return Err(unsafe_path("contains haconiwa state or base directory"));
            }
        }
        Ok(())
    }
}

impl Materializer for FsMaterializer {
    fn materialize(&self, plan: &Plan) -> Result<Vec<PathBuf>> {
        let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        create_dir(&plan.workspace_root)?;

        let mut created = Vec::with_capacity(plan.agent_count());
        for (window, pane) in plan.panes() {
            create_dir(&pane.working_dir)?;

            let readme = match plan.mode {
                PlanMode::Declarative => declarative_readme(window, pane, &now),
                PlanMode::Legacy => legacy_readme(pane, &now),
            };
            write_file(&pane.working_dir.join("README.md"), &readme)?;

            if plan.mode == PlanMode::Declarative {
                if let Some(task) = &pane.task {
                    write_file(
                        &pane.working_dir.join("current_task.md"),
                        &format!("# Current Task\n\n{task}\n"),
                    )?;
                }
            }
            debug!(agent = %pane.agent, dir = %pane.working_dir.display(), "agent directory ready");
            created.push(pane.working_dir.clone());
        }

        info!(
            session = %plan.session,
            root = %plan.workspace_root.display(),
            agents = created.len(),
            "workspace materialized"
        );
        Ok(created)
    }

    fn remove(&self, root: &Path) -> Result<bool> {
        if !root.exists() {
            return Ok(false);
        }
        self.check_removable(root)?;
        std::fs::remove_dir_all(root).map_err(|source| WorkspaceError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        info!(root = %root.display(), "workspace removed");
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Seed files
// ---------------------------------------------------------------------------

fn declarative_readme(window: &WindowPlan, pane: &PanePlan, now: &str) -> String {
    format!(
        "# {agent}\n\nRole: {role}\nRoom: {room}\nOrganization: {org}\nCreated: {now}\n\n## Description\n{desc}\n",
        agent = pane.agent,
        role = pane.role,
        room = window.room,
        org = pane.organization.as_deref().unwrap_or("default"),
        desc = pane.description.as_deref().unwrap_or("No description provided"),
    )
}

fn legacy_readme(pane: &PanePlan, now: &str) -> String {
    let org = pane.organization.as_deref().unwrap_or_default();
    let role = title_case(&pane.role);
    format!(
        "# {org} - {role}\n\nOrganization: {org}\nTask: {task}\nRole: {role}\nCreated: {now}\n",
        task = pane.task.as_deref().unwrap_or_default(),
    )
}

/// `worker-a` -> `Worker-A`
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        at_word_start = !c.is_alphabetic();
    }
    out
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| WorkspaceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|source| WorkspaceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Lexical normalization; resolves symlinks when the path exists.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
