use std::path::Path;

use anyhow::Result;

use crate::app::App;
use crate::render::terminal::render_outcome;
use crate::OutputFormat;

pub async fn run(app: &App, state_path: &Path, format: &OutputFormat, use_color: bool) -> Result<()> {
    let local = App::load_state(state_path)?;
    let report = app.manager.sync(&local).await;

    // Adopt the merge even when some domains failed to upload
    if let Some(merged) = &report.merged {
        App::save_state(state_path, merged)?;
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report.outcome)?),
        OutputFormat::Plain => println!("{}", render_outcome(&report.outcome, use_color)),
    }

    report.outcome.into_result()?;
    Ok(())
}
