use anyhow::Result;

use crate::app::App;
use crate::render::terminal::render_diagnostics;
use crate::OutputFormat;

pub async fn run(app: &App, format: &OutputFormat, use_color: bool) -> Result<()> {
    let report = app.manager.status().await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Plain => {
            let status = app.manager.sync_status();
            println!("{}", render_diagnostics(&report, &status, use_color));
        }
    }
    Ok(())
}
