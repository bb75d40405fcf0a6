use hw_session::orchestrator::Orchestrator;

use super::{ok, report_failure};

/// Run the `run` subcommand: broadcast `cmd` to matching panes.
pub async fn run(
    orchestrator: &Orchestrator,
    name: &str,
    cmd: &str,
    filter: Option<&str>,
) -> anyhow::Result<()> {
    if cmd.trim().is_empty() {
        anyhow::bail!("--cmd must not be empty");
    }

    let report = orchestrator
        .run(name, cmd, filter)
        .await
        .map_err(|err| report_failure(name, err))?;

    for target in &report.sent {
        println!("  ✓ {} ({}, pane {})", target.agent, target.room, target.address);
    }
    let total = report.sent.len() + report.skipped;
    match filter {
        Some(f) if report.sent.is_empty() => {
            println!("No panes in '{name}' match filter '{f}' ({total} panes checked).")
        }
        Some(f) => ok(format!(
            "Sent to {} of {total} panes matching '{f}'",
            report.sent.len()
        )),
        None => ok(format!("Sent to all {total} panes")),
    }
    Ok(())
}
