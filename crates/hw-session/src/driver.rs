use std::borrow::Cow;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use hw_core::config::TmuxConfig;
use hw_core::plan::PaneAddress;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The tmux binary could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// tmux did not exit within the configured timeout.
    #[error("`{command}` timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    /// tmux exited with a non-zero status.
    #[error("`{command}` failed ({code}): {stderr}")]
    Failed {
        command: String,
        code: String,
        stderr: String,
    },
}

impl DriverError {
    /// Whether a retry could plausibly succeed without side effects.
    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::Spawn { .. } | DriverError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// A tmux target with logical (0-based) indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Session(String),
    Window { session: String, window: usize },
    NamedWindow { session: String, name: String },
    Pane { session: String, address: PaneAddress },
}

impl Target {
    pub fn window(session: &str, window: usize) -> Self {
        Target::Window {
            session: session.to_string(),
            window,
        }
    }

    pub fn pane(session: &str, address: PaneAddress) -> Self {
        Target::Pane {
            session: session.to_string(),
            address,
        }
    }
}

/// Index origins of the tmux server, added to logical indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexBase {
    pub window: usize,
    pub pane: usize,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Session(s) => write!(f, "{s}"),
            Target::Window { session, window } => write!(f, "{session}:{window}"),
            Target::NamedWindow { session, name } => write!(f, "{session}:{name}"),
            Target::Pane { session, address } => write!(f, "{session}:{address}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Multiplexer trait
// ---------------------------------------------------------------------------

/// The operations the orchestrator needs from a terminal multiplexer.
///
/// Calls are issued one at a time, in plan order; pane indices depend on
/// the order panes were created.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    async fn session_exists(&self, name: &str) -> Result<bool>;

    /// Create a detached session whose initial window is named `first_window`.
    async fn create_session(&self, name: &str, first_window: &str) -> Result<()>;

    /// Append a window to `session`.
    async fn create_window(&self, session: &str, name: &str) -> Result<()>;

    async fn rename_window(&self, window: &Target, name: &str) -> Result<()>;

    async fn split_window(&self, window: &Target) -> Result<()>;

    /// Re-apply the even layout to every pane of `window`.
    async fn retile(&self, window: &Target) -> Result<()>;

    /// Type `text` literally into the pane, then press Enter.
    async fn send_keys(&self, pane: &Target, text: &str) -> Result<()>;

    async fn set_pane_title(&self, pane: &Target, title: &str) -> Result<()>;

    /// Kill a session. Killing a session that is already gone succeeds.
    async fn kill_session(&self, name: &str) -> Result<()>;

    /// Hand the terminal over to `target` until the user detaches.
    async fn attach(&self, target: &Target) -> Result<()>;
}

// ---------------------------------------------------------------------------
// TmuxRunner trait (for testability)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TmuxOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Abstraction over spawning the tmux binary so argv can be asserted in tests.
#[async_trait]
pub trait TmuxRunner: Send + Sync {
    /// Run tmux with captured output.
    async fn run(&self, args: &[String]) -> Result<TmuxOutput>;

    /// Run tmux attached to the current terminal.
    async fn run_interactive(&self, args: &[String]) -> Result<TmuxOutput>;
}

/// Real runner that shells out to the configured tmux binary.
pub struct RealTmuxRunner {
    binary: PathBuf,
    timeout: Duration,
}

impl RealTmuxRunner {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn describe(&self, args: &[String]) -> String {
        describe(&self.binary.display().to_string(), args)
    }
}

#[async_trait]
impl TmuxRunner for RealTmuxRunner {
    async fn run(&self, args: &[String]) -> Result<TmuxOutput> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                return Err(DriverError::Timeout {
                    command: self.describe(args),
                    after: self.timeout,
                })
            }
            Ok(Err(source)) => {
                return Err(DriverError::Spawn {
                    command: self.describe(args),
                    source,
                })
            }
            Ok(Ok(output)) => output,
        };

        Ok(TmuxOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn run_interactive(&self, args: &[String]) -> Result<TmuxOutput> {
        let status = tokio::process::Command::new(&self.binary)
            .args(args)
            .status()
            .await
            .map_err(|source| DriverError::Spawn {
                command: self.describe(args),
                source,
            })?;

        Ok(TmuxOutput {
            success: status.success(),
            code: status.code(),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

fn describe(program: &str, args: &[String]) -> String {
    let mut out = program.to_string();
    for arg in args {
        out.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            out.push_str(&format!("{arg:?}"));
        } else {
            out.push_str(arg);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// TmuxDriver
// ---------------------------------------------------------------------------

/// [`Multiplexer`] backed by the tmux command line.
///
/// Session targets use tmux's `=name` exact-match form so `acme` never
/// resolves to `acme-staging`. Logical indices are shifted by the server's
/// `base-index` / `pane-base-index`, read from the server the first time an
/// indexed target is needed unless the config pins them.
pub struct TmuxDriver {
    runner: Box<dyn TmuxRunner>,
    base_index: Option<usize>,
    pane_base_index: Option<usize>,
    index_base: OnceLock<IndexBase>,
    layout: String,
    probe_retries: u32,
    probe_backoff: Duration,
    nested: bool,
}

impl TmuxDriver {
    /// Driver using the real tmux binary from `config`.
    pub fn new(config: &TmuxConfig) -> Self {
        let runner = RealTmuxRunner::new(config.binary.clone(), config.command_timeout());
        Self::with_runner(config, Box::new(runner))
            .nested(std::env::var_os("TMUX").is_some_and(|v| !v.is_empty()))
    }

    /// Driver with a custom runner (for testing).
    pub fn with_runner(config: &TmuxConfig, runner: Box<dyn TmuxRunner>) -> Self {
        Self {
            runner,
            base_index: config.base_index,
            pane_base_index: config.pane_base_index,
            index_base: OnceLock::new(),
            layout: config.layout.clone(),
            probe_retries: config.probe_retries,
            probe_backoff: config.probe_backoff(),
            nested: false,
        }
    }

    /// Whether this process already runs inside a tmux client; attach then
    /// switches the client instead of nesting.
    pub fn nested(mut self, nested: bool) -> Self {
        self.nested = nested;
        self
    }

    /// Render a target in tmux syntax.
    pub fn render(target: &Target, base: IndexBase) -> String {
        match target {
            Target::Session(s) => format!("={s}"),
            Target::Window { session, window } => {
                format!("={session}:{}", window + base.window)
            }
            Target::NamedWindow { session, name } => format!("={session}:={name}"),
            Target::Pane { session, address } => format!(
                "={session}:{}.{}",
                address.window + base.window,
                address.pane + base.pane
            ),
        }
    }

    /// Render `target`, looking up the index origins only when it has indices.
    async fn target(&self, target: &Target) -> String {
        let base = match target {
            Target::Window { .. } | Target::Pane { .. } => self.index_base().await,
            Target::Session(_) | Target::NamedWindow { .. } => IndexBase::default(),
        };
        Self::render(target, base)
    }

    /// Configured origins win; otherwise ask the server. A failed query
    /// (usually no server yet) falls back to 0 and is retried next time.
    async fn index_base(&self) -> IndexBase {
        if let Some(base) = self.index_base.get() {
            return *base;
        }
        let window = match self.base_index {
            Some(index) => Some(index),
            None => self.show_index(args(["show-options", "-gv", "base-index"])).await,
        };
        let pane = match self.pane_base_index {
            Some(index) => Some(index),
            None => {
                self.show_index(args(["show-window-options", "-gv", "pane-base-index"]))
                    .await
            }
        };
        match (window, pane) {
            (Some(window), Some(pane)) => {
                let base = IndexBase { window, pane };
                debug!(window, pane, "tmux index base");
                *self.index_base.get_or_init(|| base)
            }
            _ => IndexBase {
                window: window.unwrap_or(0),
                pane: pane.unwrap_or(0),
            },
        }
    }

    async fn show_index(&self, argv: Vec<String>) -> Option<usize> {
        match self.runner.run(&argv).await {
            Ok(output) if output.success => output.stdout.trim().parse().ok(),
            Ok(output) => {
                debug!(args = ?argv, stderr = %output.stderr.trim(), "option query failed");
                None
            }
            Err(e) => {
                debug!(args = ?argv, error = %e, "option query failed");
                None
            }
        }
    }

    async fn exec(&self, args: Vec<String>) -> Result<TmuxOutput> {
        debug!(args = ?args, "tmux");
        let output = self.runner.run(&args).await?;
        if output.success {
            Ok(output)
        } else {
            Err(failed(&args, &output))
        }
    }
}

fn failed(args: &[String], output: &TmuxOutput) -> DriverError {
    DriverError::Failed {
        command: describe("tmux", args),
        code: output
            .code
            .map(|c| format!("exit {c}"))
            .unwrap_or_else(|| "signal".into()),
        stderr: output.stderr.trim().to_string(),
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// tmux treats an argument ending in `;` as a command separator and a
/// trailing `\;` as a literal `;`, so the final semicolon gets a backslash.
fn escape_separator(text: &str) -> Cow<'_, str> {
    match text.strip_suffix(';') {
        Some(head) => Cow::Owned(format!("{head}\\;")),
        None => Cow::Borrowed(text),
    }
}

/// stderr fragments tmux prints when a session is already gone.
const SESSION_GONE: [&str; 4] = [
    "can't find session",
    "session not found",
    "no server running",
    "error connecting to",
];

#[async_trait]
impl Multiplexer for TmuxDriver {
    async fn session_exists(&self, name: &str) -> Result<bool> {
        let argv = args(["has-session", "-t", &self.target(&Target::Session(name.into())).await]);
        let mut attempt = 0;
        loop {
            match self.runner.run(&argv).await {
                Ok(output) => return Ok(output.success),
                Err(e) if e.is_transient() && attempt < self.probe_retries => {
                    attempt += 1;
                    warn!(session = name, attempt, error = %e, "liveness probe failed, retrying");
                    tokio::time::sleep(self.probe_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn create_session(&self, name: &str, first_window: &str) -> Result<()> {
        self.exec(args(["new-session", "-d", "-s", name, "-n", first_window]))
            .await
            .map(drop)
    }

    async fn create_window(&self, session: &str, name: &str) -> Result<()> {
        let target = format!("={session}:");
        self.exec(args(["new-window", "-d", "-t", &target, "-n", name]))
            .await
            .map(drop)
    }

    async fn rename_window(&self, window: &Target, name: &str) -> Result<()> {
        self.exec(args(["rename-window", "-t", &self.target(window).await, name]))
            .await
            .map(drop)
    }

    async fn split_window(&self, window: &Target) -> Result<()> {
        self.exec(args(["split-window", "-h", "-t", &self.target(window).await]))
            .await
            .map(drop)
    }

    async fn retile(&self, window: &Target) -> Result<()> {
        self.exec(args(["select-layout", "-t", &self.target(window).await, &self.layout]))
            .await
            .map(drop)
    }

    async fn send_keys(&self, pane: &Target, text: &str) -> Result<()> {
        let target = self.target(pane).await;
        let text = escape_separator(text);
        // Literal text and the Enter key in one tmux invocation.
        self.exec(args([
            "send-keys", "-t", &target, "-l", "--", &text, ";", "send-keys", "-t", &target, "Enter",
        ]))
        .await
        .map(drop)
    }

    async fn set_pane_title(&self, pane: &Target, title: &str) -> Result<()> {
        self.exec(args(["select-pane", "-t", &self.target(pane).await, "-T", title]))
            .await
            .map(drop)
    }

    async fn kill_session(&self, name: &str) -> Result<()> {
        let argv = args(["kill-session", "-t", &self.target(&Target::Session(name.into())).await]);
        let output = self.runner.run(&argv).await?;
        if output.success {
            return Ok(());
        }
        if SESSION_GONE.iter().any(|s| output.stderr.contains(s)) {
            debug!(session = name, "session already gone");
            return Ok(());
        }
        Err(failed(&argv, &output))
    }

    async fn attach(&self, target: &Target) -> Result<()> {
        let verb = if self.nested { "switch-client" } else { "attach-session" };
        let argv = args([verb, "-t", &self.target(target).await]);
        let output = self.runner.run_interactive(&argv).await?;
        if output.success {
            Ok(())
        } else {
            Err(failed(&argv, &output))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// A mock tmux runner that records argv and returns canned responses.
    #[derive(Clone, Default)]
    struct MockTmuxRunner {
        responses: Arc<Mutex<Vec<Result<TmuxOutput>>>>,
        commands: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl MockTmuxRunner {
        fn with_responses(responses: Vec<Result<TmuxOutput>>) -> Self {
            Self {
                responses: Arc::new(Mutex::new(responses)),
                commands: Arc::default(),
            }
        }

        fn commands(&self) -> Vec<Vec<String>> {
            self.commands.lock().unwrap().clone()
        }

        fn next(&self, args: &[String]) -> Result<TmuxOutput> {
            self.commands.lock().unwrap().push(args.to_vec());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(ok_output())
            } else {
                responses.remove(0)
            }
        }
    }

    #[async_trait]
    impl TmuxRunner for MockTmuxRunner {
        async fn run(&self, args: &[String]) -> Result<TmuxOutput> {
            self.next(args)
        }

        async fn run_interactive(&self, args: &[String]) -> Result<TmuxOutput> {
            self.next(args)
        }
    }

    fn ok_output() -> TmuxOutput {
        TmuxOutput {
            success: true,
            code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    fn err_output(stderr: &str) -> TmuxOutput {
        TmuxOutput {
            success: false,
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    fn timeout() -> DriverError {
        DriverError::Timeout {
            command: "tmux has-session".into(),
            after: Duration::from_millis(1),
        }
    }

    /// Driver with index origins pinned to 0 so argv assertions see no
    /// option queries.
    fn driver(runner: &MockTmuxRunner) -> TmuxDriver {
        let config = TmuxConfig {
            probe_backoff_ms: 1,
            base_index: Some(0),
            pane_base_index: Some(0),
            ..TmuxConfig::default()
        };
        TmuxDriver::with_runner(&config, Box::new(runner.clone()))
    }

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn builds_expected_argv_for_topology_calls() {
        let runner = MockTmuxRunner::default();
        let tmux = driver(&runner);
        let window = Target::window("acme", 1);
        let pane = Target::pane("acme", PaneAddress { window: 1, pane: 2 });

        tmux.create_session("acme", "frontend").await.unwrap();
        tmux.rename_window(&Target::window("acme", 0), "frontend").await.unwrap();
        tmux.create_window("acme", "backend").await.unwrap();
        tmux.split_window(&window).await.unwrap();
        tmux.retile(&window).await.unwrap();
        tmux.set_pane_title(&pane, "api-dev").await.unwrap();

        assert_eq!(
            runner.commands(),
            vec![
                argv(&["new-session", "-d", "-s", "acme", "-n", "frontend"]),
                argv(&["rename-window", "-t", "=acme:0", "frontend"]),
                argv(&["new-window", "-d", "-t", "=acme:", "-n", "backend"]),
                argv(&["split-window", "-h", "-t", "=acme:1"]),
                argv(&["select-layout", "-t", "=acme:1", "tiled"]),
                argv(&["select-pane", "-t", "=acme:1.2", "-T", "api-dev"]),
            ]
        );
    }

    #[tokio::test]
    async fn send_keys_is_literal_then_enter() {
        let runner = MockTmuxRunner::default();
        let tmux = driver(&runner);
        let pane = Target::pane("acme", PaneAddress { window: 0, pane: 3 });

        tmux.send_keys(&pane, "-v Enter").await.unwrap();

        assert_eq!(
            runner.commands(),
            vec![argv(&[
                "send-keys", "-t", "=acme:0.3", "-l", "--", "-v Enter", ";", "send-keys", "-t",
                "=acme:0.3", "Enter",
            ])]
        );
    }

    #[tokio::test]
    async fn send_keys_escapes_trailing_semicolon() {
        let runner = MockTmuxRunner::default();
        let tmux = driver(&runner);
        let pane = Target::pane("acme", PaneAddress { window: 0, pane: 0 });

        tmux.send_keys(&pane, "echo a;").await.unwrap();
        tmux.send_keys(&pane, r"find . -exec rm {} \;").await.unwrap();
        tmux.send_keys(&pane, "a; b").await.unwrap();

        let texts: Vec<_> = runner.commands().into_iter().map(|c| c[5].clone()).collect();
        assert_eq!(texts, vec![r"echo a\;", r"find . -exec rm {} \\;", "a; b"]);
    }

    #[test]
    fn render_applies_base_indices() {
        let base = IndexBase { window: 1, pane: 1 };

        assert_eq!(TmuxDriver::render(&Target::Session("acme".into()), base), "=acme");
        assert_eq!(TmuxDriver::render(&Target::window("acme", 0), base), "=acme:1");
        assert_eq!(
            TmuxDriver::render(&Target::pane("acme", PaneAddress { window: 2, pane: 0 }), base),
            "=acme:3.1"
        );
        assert_eq!(
            TmuxDriver::render(
                &Target::NamedWindow {
                    session: "acme".into(),
                    name: "org-01".into()
                },
                base
            ),
            "=acme:=org-01"
        );
    }

    fn stdout(text: &str) -> TmuxOutput {
        TmuxOutput {
            stdout: text.to_string(),
            ..ok_output()
        }
    }

    #[tokio::test]
    async fn index_base_is_read_from_the_server_once() {
        let runner = MockTmuxRunner::with_responses(vec![Ok(stdout("1\n")), Ok(stdout("1\n"))]);
        let tmux = TmuxDriver::with_runner(&TmuxConfig::default(), Box::new(runner.clone()));

        tmux.split_window(&Target::window("acme", 0)).await.unwrap();
        tmux.set_pane_title(&Target::pane("acme", PaneAddress { window: 1, pane: 2 }), "api-dev")
            .await
            .unwrap();

        assert_eq!(
            runner.commands(),
            vec![
                argv(&["show-options", "-gv", "base-index"]),
                argv(&["show-window-options", "-gv", "pane-base-index"]),
                argv(&["split-window", "-h", "-t", "=acme:1"]),
                argv(&["select-pane", "-t", "=acme:2.3", "-T", "api-dev"]),
            ]
        );
    }

    #[tokio::test]
    async fn configured_index_base_skips_the_query() {
        let config = TmuxConfig {
            base_index: Some(1),
            pane_base_index: None,
            ..TmuxConfig::default()
        };
        let runner = MockTmuxRunner::with_responses(vec![Ok(stdout("0\n"))]);
        let tmux = TmuxDriver::with_runner(&config, Box::new(runner.clone()));

        tmux.split_window(&Target::window("acme", 0)).await.unwrap();

        assert_eq!(
            runner.commands(),
            vec![
                argv(&["show-window-options", "-gv", "pane-base-index"]),
                argv(&["split-window", "-h", "-t", "=acme:1"]),
            ]
        );
    }

    #[tokio::test]
    async fn failed_index_query_falls_back_to_zero_and_is_retried() {
        let runner = MockTmuxRunner::with_responses(vec![
            Ok(err_output("no server running on /tmp/tmux-0/default")),
            Ok(err_output("no server running on /tmp/tmux-0/default")),
            Ok(ok_output()),
            Ok(stdout("1\n")),
            Ok(stdout("0\n")),
        ]);
        let tmux = TmuxDriver::with_runner(&TmuxConfig::default(), Box::new(runner.clone()));

        tmux.split_window(&Target::window("acme", 0)).await.unwrap();
        tmux.split_window(&Target::window("acme", 0)).await.unwrap();

        let commands = runner.commands();
        assert_eq!(commands.len(), 6);
        assert_eq!(commands[2], argv(&["split-window", "-h", "-t", "=acme:0"]));
        assert_eq!(commands[5], argv(&["split-window", "-h", "-t", "=acme:1"]));
    }

    #[tokio::test]
    async fn session_targets_need_no_index_query() {
        let runner = MockTmuxRunner::default();
        let tmux = TmuxDriver::with_runner(&TmuxConfig::default(), Box::new(runner.clone()));

        tmux.kill_session("acme").await.unwrap();

        assert_eq!(runner.commands(), vec![argv(&["kill-session", "-t", "=acme"])]);
    }

    #[tokio::test]
    async fn session_exists_reflects_exit_status() {
        let runner = MockTmuxRunner::with_responses(vec![
            Ok(ok_output()),
            Ok(err_output("can't find session: acme")),
        ]);
        let tmux = driver(&runner);

        assert!(tmux.session_exists("acme").await.unwrap());
        assert!(!tmux.session_exists("acme").await.unwrap());
        assert_eq!(runner.commands()[0], argv(&["has-session", "-t", "=acme"]));
    }

    #[tokio::test]
    async fn session_probe_retries_transient_failures() {
        let runner = MockTmuxRunner::with_responses(vec![Err(timeout()), Ok(ok_output())]);
        let tmux = driver(&runner);

        assert!(tmux.session_exists("acme").await.unwrap());
        assert_eq!(runner.commands().len(), 2);
    }

    #[tokio::test]
    async fn session_probe_gives_up_after_retries() {
        let runner =
            MockTmuxRunner::with_responses(vec![Err(timeout()), Err(timeout()), Err(timeout())]);
        let tmux = driver(&runner);

        let err = tmux.session_exists("acme").await.unwrap_err();
        assert!(matches!(err, DriverError::Timeout { .. }));
        assert_eq!(runner.commands().len(), 3);
    }

    #[tokio::test]
    async fn structural_calls_are_not_retried() {
        let runner = MockTmuxRunner::with_responses(vec![Err(timeout())]);
        let tmux = driver(&runner);

        let err = tmux.split_window(&Target::window("acme", 0)).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(runner.commands().len(), 1);
    }

    #[tokio::test]
    async fn failed_command_carries_stderr() {
        let runner = MockTmuxRunner::with_responses(vec![Ok(err_output("no space for new pane\n"))]);
        let tmux = driver(&runner);

        let err = tmux.split_window(&Target::window("acme", 0)).await.unwrap_err();
        match err {
            DriverError::Failed { command, stderr, .. } => {
                assert_eq!(command, "tmux split-window -h -t =acme:0");
                assert_eq!(stderr, "no space for new pane");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn kill_tolerates_missing_session() {
        let runner = MockTmuxRunner::with_responses(vec![
            Ok(err_output("can't find session: acme")),
            Ok(err_output("permission denied")),
        ]);
        let tmux = driver(&runner);

        tmux.kill_session("acme").await.unwrap();
        assert!(tmux.kill_session("acme").await.is_err());
    }

    #[tokio::test]
    async fn attach_switches_client_when_nested() {
        let runner = MockTmuxRunner::default();
        let plain = driver(&runner);
        let nested = driver(&runner).nested(true);

        plain.attach(&Target::Session("acme".into())).await.unwrap();
        nested.attach(&Target::window("acme", 2)).await.unwrap();

        assert_eq!(
            runner.commands(),
            vec![
                argv(&["attach-session", "-t", "=acme"]),
                argv(&["switch-client", "-t", "=acme:2"]),
            ]
        );
    }
}
