use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [`WorkspaceConfig::base_path`].
pub const ENV_BASE_PATH: &str = "HACONIWA_BASE_PATH";
/// Environment variable overriding [`TmuxConfig::binary`].
pub const ENV_TMUX: &str = "HACONIWA_TMUX";
/// Environment variable overriding [`GeneralConfig::log_level`].
pub const ENV_LOG_LEVEL: &str = "HACONIWA_LOG_LEVEL";

/// Layouts tmux accepts for `select-layout`.
const TMUX_LAYOUTS: [&str; 5] = [
    "even-horizontal",
    "even-vertical",
    "main-horizontal",
    "main-vertical",
    "tiled",
];

/// Top-level configuration loaded from `~/.haconiwa/config.toml`.
///
/// Built once at startup and passed down explicitly; nothing reads
/// configuration from globals.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub tmux: TmuxConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl Config {
    /// Load config from `~/.haconiwa/config.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `HACONIWA_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in
    /// production, a map in tests).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base) = lookup(ENV_BASE_PATH).filter(|v| !v.is_empty()) {
            self.workspace.base_path = PathBuf::from(base);
        }
        if let Some(bin) = lookup(ENV_TMUX).filter(|v| !v.is_empty()) {
            self.tmux.binary = PathBuf::from(bin);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
            self.general.log_level = level;
        }
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tmux.validate()?;
        if self.workspace.base_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "workspace.base_path must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Directory holding the registry and lock files.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.base_path.join(".haconiwa")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.registry
            .path
            .clone()
            .unwrap_or_else(|| self.state_dir().join("sessions.json"))
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.state_dir().join("locks")
    }

    /// Default workspace root for a session that does not pin `base_path`.
    pub fn session_root(&self, session: &str) -> PathBuf {
        self.workspace.base_path.join(session)
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".haconiwa")
            .join("config.toml")
    }

    /// Make relative paths absolute against `cwd` so paths sent to panes
    /// and stored in the registry do not depend on where tmux was started.
    pub fn resolve_paths(&mut self, cwd: &Path) {
        if self.workspace.base_path.is_relative() {
            self.workspace.base_path = cwd.join(&self.workspace.base_path);
        }
        if let Some(path) = self.registry.path.as_mut() {
            if path.is_relative() {
                *path = cwd.join(&*path);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Parent of every session workspace and of the `.haconiwa` state directory.
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
        }
    }
}

fn default_base_path() -> PathBuf {
    PathBuf::from("haconiwa-workspaces")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmuxConfig {
    #[serde(default = "default_tmux_binary")]
    pub binary: PathBuf,
    /// Upper bound for a single tmux invocation.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Extra attempts for `has-session` after a spawn failure or timeout.
    #[serde(default = "default_probe_retries")]
    pub probe_retries: u32,
    #[serde(default = "default_probe_backoff_ms")]
    pub probe_backoff_ms: u64,
    /// Forces the window index origin. Unset means ask the server for its
    /// `base-index`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_index: Option<usize>,
    /// Forces the pane index origin. Unset means ask the server for its
    /// `pane-base-index`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane_base_index: Option<usize>,
    #[serde(default = "default_layout")]
    pub layout: String,
}

impl Default for TmuxConfig {
    fn default() -> Self {
        Self {
            binary: default_tmux_binary(),
            command_timeout_ms: default_command_timeout_ms(),
            probe_retries: default_probe_retries(),
            probe_backoff_ms: default_probe_backoff_ms(),
            base_index: None,
            pane_base_index: None,
            layout: default_layout(),
        }
    }
}

impl TmuxConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn probe_backoff(&self) -> Duration {
        Duration::from_millis(self.probe_backoff_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.binary.as_os_str().is_empty() {
            return Err(ConfigError::Validation("tmux.binary must not be empty".into()));
        }
        if self.command_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "tmux.command_timeout_ms must be greater than zero".into(),
            ));
        }
        if !TMUX_LAYOUTS.contains(&self.layout.as_str()) {
            return Err(ConfigError::Validation(format!(
                "tmux.layout '{}' is not one of {}",
                self.layout,
                TMUX_LAYOUTS.join(", ")
            )));
        }
        Ok(())
    }
}

fn default_tmux_binary() -> PathBuf {
    PathBuf::from("tmux")
}
fn default_command_timeout_ms() -> u64 {
    10_000
}
fn default_probe_retries() -> u32 {
    2
}
fn default_probe_backoff_ms() -> u64 {
    200
}
fn default_layout() -> String {
    "tiled".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    /// Override for the registry file; defaults to `<base>/.haconiwa/sessions.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}
