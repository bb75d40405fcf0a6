mod commands;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use hw_core::config::Config;
use hw_session::orchestrator::Orchestrator;
use tracing::Instrument;

/// haconiwa -- build multi-agent tmux workspaces from a room/agent spec.
#[derive(Parser)]
#[command(name = "haconiwa", version, about)]
struct Cli {
    /// Parent directory for session workspaces and the `.haconiwa` state dir.
    #[arg(long, global = true)]
    base_path: Option<PathBuf>,

    /// Config file to use instead of `~/.haconiwa/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    /// Debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a session from a YAML or JSON spec file.
    Apply {
        /// Spec file (`.json` is parsed as JSON, anything else as YAML).
        #[arg(short, long)]
        file: PathBuf,
        /// Print the plan without touching tmux, disk, or the registry.
        #[arg(long)]
        dry_run: bool,
    },

    /// Kill a session. Safe to repeat.
    Stop {
        name: String,
        /// Also delete the workspace directory and forget the session.
        #[arg(long)]
        clean_dirs: bool,
    },

    /// Show recorded sessions and whether they are actually running.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Attach to a running session.
    Attach {
        name: String,
        /// Room name, window name, or window index to focus.
        #[arg(short, long)]
        room: Option<String>,
    },

    /// Type a command into the panes of a running session.
    Run {
        name: String,
        /// Command text, sent literally followed by Enter.
        #[arg(long)]
        cmd: String,
        /// Only panes whose room or role contains this text (case-insensitive).
        #[arg(long)]
        filter: Option<String>,
    },

    /// Build the fixed four-organization layout.
    Start {
        name: String,
        #[arg(long, num_args = 2, value_names = ["NAME", "TASK"])]
        org1: Option<Vec<String>>,
        #[arg(long, num_args = 2, value_names = ["NAME", "TASK"])]
        org2: Option<Vec<String>>,
        #[arg(long, num_args = 2, value_names = ["NAME", "TASK"])]
        org3: Option<Vec<String>>,
        #[arg(long, num_args = 2, value_names = ["NAME", "TASK"])]
        org4: Option<Vec<String>>,
        #[arg(long)]
        dry_run: bool,
    },

    /// Write a sample spec file.
    Example {
        /// Destination file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Apply { .. } => "apply",
            Commands::Stop { .. } => "stop",
            Commands::List { .. } => "list",
            Commands::Attach { .. } => "attach",
            Commands::Run { .. } => "run",
            Commands::Start { .. } => "start",
            Commands::Example { .. } => "example",
        }
    }

    fn session(&self) -> Option<&str> {
        match self {
            Commands::Stop { name, .. }
            | Commands::Attach { name, .. }
            | Commands::Run { name, .. }
            | Commands::Start { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Config file, then `HACONIWA_*` variables, then command-line flags.
fn load_config(cli: &Cli, cwd: &Path) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::load().context("loading ~/.haconiwa/config.toml")?,
    };
    config.apply_env();
    if let Some(base) = &cli.base_path {
        config.workspace.base_path = base.clone();
    }
    if cli.log_json {
        config.general.log_json = true;
    }
    config.resolve_paths(cwd);
    config.validate()?;
    Ok(config)
}

async fn dispatch(command: Commands, config: &Config) -> anyhow::Result<()> {
    let orchestrator = || Orchestrator::new(config);
    match command {
        Commands::Apply { file, dry_run } => {
            commands::apply::run(&orchestrator(), &file, dry_run).await
        }
        Commands::Stop { name, clean_dirs } => {
            commands::stop::run(&orchestrator(), &name, clean_dirs).await
        }
        Commands::List { json } => commands::list::run(&orchestrator(), json).await,
        Commands::Attach { name, room } => {
            commands::attach::run(&orchestrator(), &name, room.as_deref()).await
        }
        Commands::Run { name, cmd, filter } => {
            commands::run::run(&orchestrator(), &name, &cmd, filter.as_deref()).await
        }
        Commands::Start {
            name,
            org1,
            org2,
            org3,
            org4,
            dry_run,
        } => {
            let orgs = [org1, org2, org3, org4];
            commands::start::run(&orchestrator(), &name, orgs, dry_run).await
        }
        Commands::Example { output, force } => commands::example::run(output.as_deref(), force),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("resolving the working directory")?;
    let config = load_config(&cli, &cwd)?;

    let level = hw_telemetry::logging::effective_level(&config.general.log_level, cli.verbose);
    if config.general.log_json {
        hw_telemetry::logging::init_logging_json("haconiwa", &level);
    } else {
        hw_telemetry::logging::init_logging("haconiwa", &level);
    }

    let (span, trace_id) =
        hw_telemetry::tracing_setup::create_operation_span(cli.command.name(), cli.command.session());
    tracing::debug!(
        trace_id = %trace_id,
        base = %config.workspace.base_path.display(),
        "starting"
    );

    dispatch(cli.command, &config).instrument(span).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("haconiwa").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn parses_apply_with_dry_run() {
        let cli = parse(&["apply", "-f", "space.yaml", "--dry-run"]);
        match cli.command {
            Commands::Apply { file, dry_run } => {
                assert_eq!(file, PathBuf::from("space.yaml"));
                assert!(dry_run);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn parses_run_with_filter() {
        let cli = parse(&["run", "acme", "--cmd", "git status", "--filter", "worker"]);
        assert_eq!(cli.command.name(), "run");
        assert_eq!(cli.command.session(), Some("acme"));
        match cli.command {
            Commands::Run { cmd, filter, .. } => {
                assert_eq!(cmd, "git status");
                assert_eq!(filter.as_deref(), Some("worker"));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parses_start_org_pairs() {
        let cli = parse(&["start", "acme", "--org2", "Payments", "Billing API"]);
        match cli.command {
            Commands::Start { org1, org2, .. } => {
                assert!(org1.is_none());
                assert_eq!(org2, Some(vec!["Payments".to_string(), "Billing API".to_string()]));
            }
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn start_org_requires_two_values() {
        let result = Cli::try_parse_from(["haconiwa", "start", "acme", "--org1", "OnlyName"]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = parse(&["list", "--base-path", "/tmp/ws", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.base_path, Some(PathBuf::from("/tmp/ws")));
    }

    #[test]
    fn attach_room_short_flag() {
        let cli = parse(&["attach", "acme", "-r", "backend"]);
        match cli.command {
            Commands::Attach { room, .. } => assert_eq!(room.as_deref(), Some("backend")),
            _ => panic!("expected attach"),
        }
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "[workspace]\nbase_path = \"from-file\"\n").unwrap();

        let path = config_path.to_str().unwrap();
        let cli = parse(&["--config", path, "--base-path", "flag-base", "--log-json", "list"]);
        let config = load_config(&cli, dir.path()).unwrap();

        assert_eq!(config.workspace.base_path, dir.path().join("flag-base"));
        assert!(config.general.log_json);
    }

    #[test]
    fn relative_config_base_is_resolved_against_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "[workspace]\nbase_path = \"from-file\"\n").unwrap();

        let cli = parse(&["--config", config_path.to_str().unwrap(), "list"]);
        let config = load_config(&cli, dir.path()).unwrap();

        assert!(config.workspace.base_path.ends_with("from-file"));
        assert!(config.workspace.base_path.is_absolute());
    }
}
