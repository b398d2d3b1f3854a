use anyhow::{bail, Context, Result};

use crate::app::App;
use crate::render::terminal::render_outcome;
use crate::OutputFormat;

/// Recreate every domain resource. Only runs with `--force-recreate`.
pub async fn run_repair(
    app: &App,
    force_recreate: bool,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    if !force_recreate {
        bail!(
            "Repair replaces every remote resource with an empty one. \
             Run `status` first, then pass --force-recreate to proceed."
        );
    }

    let outcome = app.manager.force_recreate_all().await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Plain => println!("{}", render_outcome(&outcome, use_color)),
    }

    outcome.into_result()?;
    Ok(())
}

pub async fn run_reset(app: &App, format: &OutputFormat) -> Result<()> {
    app.manager.reset().await.context("Reset failed")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "reset": true })),
        OutputFormat::Plain => println!("Sync credentials and resource ids cleared"),
    }
    Ok(())
}
