use hw_session::orchestrator::Orchestrator;

use super::report_failure;

pub async fn run(orchestrator: &Orchestrator, name: &str, room: Option<&str>) -> anyhow::Result<()> {
    orchestrator
        .attach(name, room)
        .await
        .map_err(|err| report_failure(name, err))
}
