use hw_session::orchestrator::{Orchestrator, SessionSummary};
use serde_json::json;

/// Run the `list` subcommand: registry entries with live status from tmux.
pub async fn run(orchestrator: &Orchestrator, json_output: bool) -> anyhow::Result<()> {
    let sessions = orchestrator.list().await;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&to_json(&sessions))?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!("No sessions recorded.");
        return Ok(());
    }
    print!("{}", render_table(&sessions));
    Ok(())
}

fn to_json(sessions: &[SessionSummary]) -> serde_json::Value {
    sessions
        .iter()
        .map(|s| {
            json!({
                "name": s.name,
                "status": s.observed,
                "recorded_status": s.record.status,
                "rooms": s.record.rooms,
                "agents": s.record.agents,
                "created": s.record.created,
                "workspace": s.record.workspace,
            })
        })
        .collect()
}

fn render_table(sessions: &[SessionSummary]) -> String {
    let width = sessions
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut out = format!(
        "{:<width$}  {:<8}  {:>5}  {:>6}  {:<19}  WORKSPACE\n",
        "NAME", "STATUS", "ROOMS", "AGENTS", "CREATED"
    );
    out.push_str(&"-".repeat(width + 52));
    out.push('\n');
    for s in sessions {
        let status = if s.is_drifted() {
            format!("{}*", s.observed)
        } else {
            s.observed.to_string()
        };
        out.push_str(&format!(
            "{:<width$}  {:<8}  {:>5}  {:>6}  {:<19}  {}\n",
            s.name,
            status,
            s.record.rooms,
            s.record.agents,
            s.record.created.format("%Y-%m-%d %H:%M:%S"),
            s.record.workspace.display()
        ));
    }
    if sessions.iter().any(SessionSummary::is_drifted) {
        out.push_str("\n* differs from the recorded status\n");
    }
    out
}
