use hw_session::orchestrator::{Orchestrator, RecordChange, StopReport};

use super::{ok, report_failure};

/// Run the `stop` subcommand.
pub async fn run(orchestrator: &Orchestrator, name: &str, clean_dirs: bool) -> anyhow::Result<()> {
    let report = orchestrator
        .stop(name, clean_dirs)
        .await
        .map_err(|err| report_failure(name, err))?;
    for line in describe(&report) {
        ok(line);
    }
    Ok(())
}

/// One line per thing that happened.
fn describe(report: &StopReport) -> Vec<String> {
    let name = &report.session;
    if report.is_noop() {
        return vec![format!("Session '{name}' is not running; nothing to stop")];
    }

    let mut lines = Vec::new();
    if report.killed {
        lines.push(format!("Killed session '{name}'"));
    } else {
        lines.push(format!("Session '{name}' was not running"));
    }
    if let Some(path) = &report.workspace_removed {
        lines.push(format!("Removed workspace {}", path.display()));
    }
    match report.record {
        RecordChange::MarkedStopped => lines.push(format!("Marked '{name}' as stopped")),
        RecordChange::Removed => lines.push(format!("Forgot '{name}'")),
        RecordChange::Absent => {}
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn report(killed: bool, removed: Option<&str>, record: RecordChange) -> StopReport {
        StopReport {
            session: "acme".into(),
            killed,
            workspace_removed: removed.map(PathBuf::from),
            record,
        }
    }

    #[test]
    fn noop_is_a_single_informational_line() {
        let lines = describe(&report(false, None, RecordChange::Absent));
        assert_eq!(lines, vec!["Session 'acme' is not running; nothing to stop"]);
    }

    #[test]
    fn clean_stop_lists_every_step() {
        let lines = describe(&report(true, Some("/ws/acme"), RecordChange::Removed));
        assert_eq!(
            lines,
            vec![
                "Killed session 'acme'".to_string(),
                "Removed workspace /ws/acme".to_string(),
                "Forgot 'acme'".to_string(),
            ]
        );
    }

    #[test]
    fn already_dead_session_is_still_marked() {
        let lines = describe(&report(false, None, RecordChange::MarkedStopped));
        assert_eq!(lines[0], "Session 'acme' was not running");
        assert_eq!(lines[1], "Marked 'acme' as stopped");
    }
}
