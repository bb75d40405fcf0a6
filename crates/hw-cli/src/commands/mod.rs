pub mod apply;
pub mod attach;
pub mod example;
pub mod list;
pub mod run;
pub mod start;
pub mod stop;

use std::fmt::Display;

use hw_session::orchestrator::OrchestratorError;

/// Print a success marker line.
pub fn ok(message: impl Display) {
    println!("✓ {message}");
}

/// Print a failure marker line.
pub fn fail(message: impl Display) {
    eprintln!("✗ {message}");
}

/// Print the failure marker and turn an orchestrator error into the
/// command's error, adding a recovery hint where there is one.
pub fn report_failure(session: &str, err: OrchestratorError) -> anyhow::Error {
    fail(&err);
    let hint = match &err {
        OrchestratorError::Driver { .. } => Some(format!(
            "the session may be partially built; run `haconiwa stop {session} --clean-dirs` before retrying"
        )),
        OrchestratorError::Conflict(_) => Some(format!(
            "stop it first with `haconiwa stop {session}` or attach with `haconiwa attach {session}`"
        )),
        OrchestratorError::NotRunning(_) => {
            Some("see `haconiwa list` for recorded sessions".to_string())
        }
        OrchestratorError::Lock { .. } => {
            Some("another haconiwa command is working on this session".to_string())
        }
        _ => None,
    };
    match hint {
        Some(hint) => anyhow::Error::new(err).context(hint),
        None => anyhow::Error::new(err),
    }
}
