use hw_core::spec::{LegacySpec, OrgSpec, Spec};
use hw_session::orchestrator::Orchestrator;

/// Run the `start` subcommand: the fixed four-organization layout, with any
/// `--orgN NAME TASK` overrides.
pub async fn run(
    orchestrator: &Orchestrator,
    name: &str,
    orgs: [Option<Vec<String>>; 4],
    dry_run: bool,
) -> anyhow::Result<()> {
    let spec = Spec::Legacy(LegacySpec::with_overrides(orgs.map(org_override)));
    super::apply::build(orchestrator, name, &spec, dry_run).await
}

fn org_override(values: Option<Vec<String>>) -> Option<OrgSpec> {
    match values.as_deref() {
        Some([name, task]) => Some(OrgSpec::new(name, task)),
        _ => None,
    }
}
