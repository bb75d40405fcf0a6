//! Topology specs: the declarative `space` document and the legacy
//! four-organization layout.
//!
//! A [`Spec`] is what the planner consumes. It is also what the registry
//! stores (as JSON) so the plan can be recomputed later without inspecting
//! the live multiplexer.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Fixed roles every legacy organization expands to, in pane order.
pub const LEGACY_ROLES: [&str; 4] = ["boss", "worker-a", "worker-b", "worker-c"];

/// Organizations used by `start` when no override is given.
pub const DEFAULT_ORGS: [(&str, &str); 4] = [
    ("Frontend", "UI Development"),
    ("Backend", "API Development"),
    ("Database", "Schema Design"),
    ("DevOps", "Infrastructure"),
];

/// Maximum number of organizations a legacy spec may carry.
pub const MAX_LEGACY_ORGS: usize = 4;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Validation failures. All of these are reported before any side effect.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("failed to read spec file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse spec: {0}")]
    Parse(String),

    #[error("missing '{0}' field")]
    MissingField(&'static str),

    #[error("spec declares no rooms")]
    NoRooms,

    #[error("agent '{agent}' references undeclared room '{room}'")]
    UnknownRoom { agent: String, room: String },

    #[error("room '{0}' is declared more than once")]
    DuplicateRoom(String),

    #[error("agent '{0}' is declared more than once")]
    DuplicateAgent(String),

    #[error("invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: &'static str,
    },

    #[error("legacy spec has {0} organizations (at most 4 allowed)")]
    TooManyOrganizations(usize),

    #[error("failed to encode spec for the registry: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, SpecError>;

// ---------------------------------------------------------------------------
// Declarative spec
// ---------------------------------------------------------------------------

/// A room: one multiplexer window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An agent: one pane inside its room's window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    #[serde(default = "default_role")]
    pub role: String,
    pub room: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_command: Option<String>,
}

fn default_role() -> String {
    "worker".into()
}

/// The `space` object of a declarative document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceSpec {
    #[serde(default = "default_space_name")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<PathBuf>,
    #[serde(default)]
    pub rooms: Vec<RoomSpec>,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

fn default_space_name() -> String {
    "default-company".into()
}

impl SpaceSpec {
    /// Agents assigned to `room`, in declaration order.
    pub fn agents_in<'a>(&'a self, room: &'a str) -> impl Iterator<Item = &'a AgentSpec> + 'a {
        self.agents.iter().filter(move |a| a.room == room)
    }

    fn validate(&self) -> Result<()> {
        validate_session_name(&self.name)?;
        if self.rooms.is_empty() {
            return Err(SpecError::NoRooms);
        }

        let mut rooms = HashSet::new();
        for room in &self.rooms {
            validate_target_name("room", &room.name)?;
            if !rooms.insert(room.name.as_str()) {
                return Err(SpecError::DuplicateRoom(room.name.clone()));
            }
        }

        let mut agents = HashSet::new();
        for agent in &self.agents {
            validate_path_component("agent", &agent.name)?;
            if !rooms.contains(agent.room.as_str()) {
                return Err(SpecError::UnknownRoom {
                    agent: agent.name.clone(),
                    room: agent.room.clone(),
                });
            }
            if !agents.insert(agent.name.as_str()) {
                return Err(SpecError::DuplicateAgent(agent.name.clone()));
            }
        }
        Ok(())
    }
}

/// A parsed declarative document (`version` + `space`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecDocument {
    pub version: String,
    pub space: SpaceSpec,
}

impl SpecDocument {
    /// Load a document from disk. `.json` files are parsed as JSON,
    /// everything else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SpecError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_yaml::from_str(text).map_err(|e| SpecError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| SpecError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    fn from_value(mut value: serde_json::Value) -> Result<Self> {
        let obj = value
            .as_object_mut()
            .ok_or_else(|| SpecError::Parse("document is not a mapping".into()))?;

        let version = match obj.get("version") {
            None | Some(serde_json::Value::Null) => return Err(SpecError::MissingField("version")),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(SpecError::Parse(format!(
                    "'version' must be a string, got {other}"
                )))
            }
        };
        let space = match obj.remove("space") {
            None | Some(serde_json::Value::Null) => return Err(SpecError::MissingField("space")),
            Some(space) => serde_json::from_value::<SpaceSpec>(space)
                .map_err(|e| SpecError::Parse(format!("space: {e}")))?,
        };

        let doc = Self { version, space };
        doc.space.validate()?;
        Ok(doc)
    }

    /// Convert into the planner's input.
    pub fn into_spec(self) -> Spec {
        Spec::Declarative(self.space)
    }
}

// ---------------------------------------------------------------------------
// Legacy spec
// ---------------------------------------------------------------------------

/// One legacy organization; expands to the four [`LEGACY_ROLES`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgSpec {
    pub name: String,
    pub task: String,
}

impl OrgSpec {
    pub fn new(name: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task: task.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegacySpec {
    pub orgs: Vec<OrgSpec>,
}

impl LegacySpec {
    /// Build a four-organization spec, filling every empty slot from
    /// [`DEFAULT_ORGS`].
    pub fn with_overrides(overrides: [Option<OrgSpec>; 4]) -> Self {
        let orgs = overrides
            .into_iter()
            .zip(DEFAULT_ORGS)
            .map(|(given, (name, task))| given.unwrap_or_else(|| OrgSpec::new(name, task)))
            .collect();
        Self { orgs }
    }

    fn validate(&self) -> Result<()> {
        if self.orgs.is_empty() {
            return Err(SpecError::NoRooms);
        }
        if self.orgs.len() > MAX_LEGACY_ORGS {
            return Err(SpecError::TooManyOrganizations(self.orgs.len()));
        }
        for org in &self.orgs {
            if org.name.trim().is_empty() {
                return Err(SpecError::InvalidName {
                    kind: "organization",
                    name: org.name.clone(),
                    reason: "must not be empty",
                });
            }
        }
        Ok(())
    }
}

impl Default for LegacySpec {
    fn default() -> Self {
        Self::with_overrides([None, None, None, None])
    }
}

// ---------------------------------------------------------------------------
// Spec
// ---------------------------------------------------------------------------

/// Planner input. Serialized untagged so the registry echoes the plain
/// `space` object or `{"orgs": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Spec {
    // Tried first: `deny_unknown_fields` keeps a space object from matching.
    Legacy(LegacySpec),
    Declarative(SpaceSpec),
}

impl Spec {
    /// The session name carried by the spec itself. Legacy specs are named
    /// by the caller.
    pub fn declared_name(&self) -> Option<&str> {
        match self {
            Spec::Declarative(space) => Some(&space.name),
            Spec::Legacy(_) => None,
        }
    }

    /// Explicit workspace root, if the spec pins one.
    pub fn base_path(&self) -> Option<&Path> {
        match self {
            Spec::Declarative(space) => space.base_path.as_deref(),
            Spec::Legacy(_) => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Spec::Declarative(space) => space.validate(),
            Spec::Legacy(legacy) => legacy.validate(),
        }
    }

    /// JSON form stored in the registry.
    pub fn to_stored(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| SpecError::Encode(e.to_string()))
    }

    /// Parse a spec previously produced by [`Spec::to_stored`].
    pub fn from_stored(value: &serde_json::Value) -> Result<Self> {
        let spec = Spec::deserialize(value).map_err(|e| SpecError::Parse(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }
}

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

/// Names used inside tmux targets (`session:window.pane`).
pub fn validate_target_name(kind: &'static str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SpecError::InvalidName {
            kind,
            name: name.to_string(),
            reason: "must not be empty",
        });
    }
    if name.contains([':', '.']) {
        return Err(SpecError::InvalidName {
            kind,
            name: name.to_string(),
            reason: "must not contain ':' or '.'",
        });
    }
    Ok(())
}

/// Session names end up both in tmux targets and as the default
/// workspace directory under the base path.
pub fn validate_session_name(name: &str) -> Result<()> {
    validate_target_name("session", name)?;
    validate_path_component("session", name)
}

fn validate_path_component(kind: &'static str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SpecError::InvalidName {
            kind,
            name: name.to_string(),
            reason: "must not be empty",
        });
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(SpecError::InvalidName {
            kind,
            name: name.to_string(),
            reason: "must be a single path component",
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Example document
// ---------------------------------------------------------------------------

/// Sample declarative document written by `haconiwa example`.
pub const EXAMPLE_YAML: &str = r#"version: "1.0"
metadata:
  description: "Multi-room development environment"

space:
  name: "dev-company"
  base_path: "./dev-workspace"

  rooms:
    - name: "frontend"
      description: "Frontend development room"
    - name: "backend"
      description: "Backend development room"
    - name: "devops"
      description: "DevOps and infrastructure room"

  agents:
    - name: "frontend-pm"
      role: "pm"
      room: "frontend"
      organization: "frontend-team"
      description: "Frontend project manager"
      task: "Coordinate UI/UX development"
    - name: "react-dev"
      role: "worker"
      room: "frontend"
      organization: "frontend-team"
      description: "React developer"
      task: "Implement React components"
    - name: "css-dev"
      role: "worker"
      room: "frontend"
      organization: "frontend-team"
      description: "CSS specialist"
      task: "Design and style components"

    - name: "backend-pm"
      role: "pm"
      room: "backend"
      organization: "backend-team"
      description: "Backend project manager"
      task: "Coordinate API development"
    - name: "api-dev"
      role: "worker"
      room: "backend"
      organization: "backend-team"
      description: "API developer"
      task: "Implement REST APIs"
    - name: "db-dev"
      role: "worker"
      room: "backend"
      organization: "backend-team"
      description: "Database developer"
      task: "Design database schema"

    - name: "devops-pm"
      role: "pm"
      room: "devops"
      organization: "devops-team"
      description: "DevOps project manager"
      task: "Coordinate infrastructure"
    - name: "infra-dev"
      role: "worker"
      room: "devops"
      organization: "devops-team"
      description: "Infrastructure engineer"
      task: "Setup cloud infrastructure"
      init_command: "echo 'Infrastructure engineer ready'"
"#;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
