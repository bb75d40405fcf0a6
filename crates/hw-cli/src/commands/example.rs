use std::path::Path;

use hw_core::spec::EXAMPLE_YAML;

use super::ok;

/// Run the `example` subcommand: print or write the sample spec.
pub fn run(output: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let Some(path) = output else {
        print!("{EXAMPLE_YAML}");
        return Ok(());
    };
    write_example(path, force)?;
    ok(format!("Wrote example spec to {}", path.display()));
    println!("  Apply with: haconiwa apply -f {}", path.display());
    Ok(())
}

fn write_example(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, EXAMPLE_YAML)?;
    Ok(())
}
