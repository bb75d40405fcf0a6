use std::path::Path;

use anyhow::Context;
use hw_core::spec::{Spec, SpecDocument};
use hw_session::orchestrator::{ApplyOutcome, ApplyReport, Orchestrator};

use super::{ok, report_failure};

/// Run the `apply` subcommand: build the session described by `file`.
pub async fn run(orchestrator: &Orchestrator, file: &Path, dry_run: bool) -> anyhow::Result<()> {
    let document = SpecDocument::from_path(file)
        .with_context(|| format!("invalid spec file {}", file.display()))?;
    let name = document.space.name.clone();
    ok(format!(
        "Loaded '{}' (version {}) from {}",
        name,
        document.version,
        file.display()
    ));
    build(orchestrator, &name, &document.into_spec(), dry_run).await
}

/// Shared by `apply` and `start`.
pub async fn build(
    orchestrator: &Orchestrator,
    name: &str,
    spec: &Spec,
    dry_run: bool,
) -> anyhow::Result<()> {
    match orchestrator.apply(name, spec, dry_run).await {
        Ok(ApplyOutcome::DryRun(plan)) => {
            print!("{}", plan.render_summary());
            println!();
            println!("Dry run: nothing was created.");
            Ok(())
        }
        Ok(ApplyOutcome::Applied(report)) => {
            print_report(&report);
            Ok(())
        }
        Err(err) => Err(report_failure(name, err)),
    }
}

fn print_report(report: &ApplyReport) {
    let plan = &report.plan;
    ok(format!(
        "Workspace ready at {} ({} agent directories)",
        plan.workspace_root.display(),
        report.directories.len()
    ));
    ok(format!(
        "Created session '{}' with {} windows",
        plan.session,
        plan.room_count()
    ));
    for window in &plan.windows {
        println!("  ✓ {} ({} panes)", window.name, window.panes.len());
    }
    ok(format!("Registered '{}'", plan.session));
    println!();
    println!(
        "Session '{}' is running: {} rooms, {} agents.",
        plan.session, report.record.rooms, report.record.agents
    );
    println!("  Attach with: haconiwa attach {}", plan.session);
}
