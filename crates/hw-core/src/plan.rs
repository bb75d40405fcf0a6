//! Topology planner.
//!
//! [`plan`] turns a [`Spec`] into the ordered window/pane layout that the
//! orchestrator builds and later re-targets. It performs no I/O, so the same
//! stored spec always yields the same addresses.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::spec::{validate_session_name, LegacySpec, SpaceSpec, Spec, SpecError, LEGACY_ROLES};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which kind of spec produced a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    Declarative,
    Legacy,
}

/// Logical (0-based) position of a pane inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PaneAddress {
    pub window: usize,
    pub pane: usize,
}

impl std::fmt::Display for PaneAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.window, self.pane)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanePlan {
    pub address: PaneAddress,
    pub agent: String,
    pub role: String,
    pub title: String,
    pub working_dir: PathBuf,
    pub init_command: Option<String>,
    pub organization: Option<String>,
    pub description: Option<String>,
    pub task: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowPlan {
    pub index: usize,
    /// Name given to the tmux window.
    pub name: String,
    /// Room the window belongs to; used for `run --filter` matching.
    pub room: String,
    pub description: Option<String>,
    pub panes: Vec<PanePlan>,
}

impl WindowPlan {
    /// Number of split + re-tile cycles needed after the window exists.
    pub fn splits(&self) -> usize {
        self.panes.len().saturating_sub(1)
    }
}

/// Deterministic window/pane layout for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub session: String,
    pub mode: PlanMode,
    pub workspace_root: PathBuf,
    pub windows: Vec<WindowPlan>,
}

impl Plan {
    pub fn room_count(&self) -> usize {
        self.windows.len()
    }

    pub fn agent_count(&self) -> usize {
        self.windows.iter().map(|w| w.panes.len()).sum()
    }

    /// Pane count per window, in window order.
    pub fn pane_counts(&self) -> Vec<usize> {
        self.windows.iter().map(|w| w.panes.len()).collect()
    }

    /// Every pane paired with its window, in creation order.
    pub fn panes(&self) -> impl Iterator<Item = (&WindowPlan, &PanePlan)> {
        self.windows
            .iter()
            .flat_map(|w| w.panes.iter().map(move |p| (w, p)))
    }

    /// Resolve a room reference (room name, window name, or window index).
    pub fn find_window(&self, reference: &str) -> Option<&WindowPlan> {
        self.windows
            .iter()
            .find(|w| w.room == reference || w.name == reference)
            .or_else(|| {
                self.windows
                    .iter()
                    .find(|w| w.room.eq_ignore_ascii_case(reference))
            })
            .or_else(|| {
                let index: usize = reference.parse().ok()?;
                self.windows.get(index)
            })
    }

    /// Human-readable summary printed by `apply --dry-run`.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Execution plan for '{}'", self.session);
        let _ = writeln!(out, "  Workspace: {}", self.workspace_root.display());
        let _ = writeln!(out, "  Rooms: {}", self.room_count());
        let _ = writeln!(out, "  Total agents: {}", self.agent_count());
        for window in &self.windows {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "  Window {} '{}' (room '{}', {} agents)",
                window.index,
                window.name,
                window.room,
                window.panes.len()
            );
            for pane in &window.panes {
                let _ = writeln!(
                    out,
                    "    [{}] {} ({}) -> {}",
                    pane.address,
                    pane.agent,
                    pane.role,
                    pane.working_dir.display()
                );
            }
        }
        out
    }
}

/// Whether `filter` selects a pane in `window`.
///
/// An empty filter selects everything; otherwise the filter must be a
/// case-insensitive substring of the room name or the pane's role.
pub fn pane_matches(window: &WindowPlan, pane: &PanePlan, filter: Option<&str>) -> bool {
    let needle = match filter.map(str::trim) {
        None | Some("") => return true,
        Some(f) => f.to_lowercase(),
    };
    window.room.to_lowercase().contains(&needle) || pane.role.to_lowercase().contains(&needle)
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Compute the plan for `session` with all agent directories rooted at
/// `workspace_root`.
pub fn plan(session: &str, spec: &Spec, workspace_root: &Path) -> Result<Plan, SpecError> {
    validate_session_name(session)?;
    spec.validate()?;

    let (mode, windows) = match spec {
        Spec::Declarative(space) => (PlanMode::Declarative, plan_declarative(space, workspace_root)),
        Spec::Legacy(legacy) => (PlanMode::Legacy, plan_legacy(legacy, workspace_root)),
    };

    Ok(Plan {
        session: session.to_string(),
        mode,
        workspace_root: workspace_root.to_path_buf(),
        windows,
    })
}

fn plan_declarative(space: &SpaceSpec, root: &Path) -> Vec<WindowPlan> {
    let agents_dir = root.join("agents");
    space
        .rooms
        .iter()
        .enumerate()
        .map(|(window, room)| {
            let panes = space
                .agents_in(&room.name)
                .enumerate()
                .map(|(pane, agent)| PanePlan {
                    address: PaneAddress { window, pane },
                    agent: agent.name.clone(),
                    role: agent.role.clone(),
                    title: agent.name.clone(),
                    working_dir: agents_dir.join(&agent.name),
                    init_command: agent.init_command.clone(),
                    organization: agent.organization.clone(),
                    description: agent.description.clone(),
                    task: agent.task.clone(),
                })
                .collect();
            WindowPlan {
                index: window,
                name: room.name.clone(),
                room: room.name.clone(),
                description: room.description.clone(),
                panes,
            }
        })
        .collect()
}

fn plan_legacy(legacy: &LegacySpec, root: &Path) -> Vec<WindowPlan> {
    legacy
        .orgs
        .iter()
        .enumerate()
        .map(|(window, org)| {
            let number = window + 1;
            let org_dir = root.join(format!("org-{number:02}"));
            let panes = LEGACY_ROLES
                .iter()
                .enumerate()
                .map(|(pane, role)| PanePlan {
                    address: PaneAddress { window, pane },
                    agent: format!("{}-{role}", org.name),
                    role: role.to_string(),
                    title: format!("{}-{}", truncate(&org.name, 8), truncate(role, 6)),
                    working_dir: org_dir.join(format!("{number:02}{role}")),
                    init_command: None,
                    organization: Some(org.name.clone()),
                    description: None,
                    task: Some(org.task.clone()),
                })
                .collect();
            WindowPlan {
                index: window,
                name: format!("org-{number:02}"),
                room: org.name.clone(),
                description: Some(org.task.clone()),
                panes,
            }
        })
        .collect()
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
