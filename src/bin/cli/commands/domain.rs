use std::path::Path;

use anyhow::{Context, Result};

use docsync_lib::sync::{Domain, DomainPayload};

use crate::app::App;
use crate::OutputFormat;

/// Upload one domain, from `file` or from the local state
pub async fn run_push(
    app: &App,
    domain: Domain,
    file: Option<&Path>,
    format: &OutputFormat,
) -> Result<()> {
    let payload = match file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            DomainPayload::from_json(domain, &content)
                .with_context(|| format!("{} is not a valid {} payload", path.display(), domain))?
        }
        None => App::load_state(&app.state_path())?.payload(domain),
    };

    app.manager
        .upload_domain(&payload)
        .await
        .with_context(|| format!("Failed to push {}", domain))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "domain": domain, "pushed": true })),
        OutputFormat::Plain => println!("Pushed {}", domain),
    }
    Ok(())
}

/// Download one domain, print it and store it in the local state
pub async fn run_pull(app: &App, domain: Domain, format: &OutputFormat) -> Result<()> {
    let payload = app
        .manager
        .download_domain(domain)
        .await
        .with_context(|| format!("Failed to pull {}", domain))?;

    let state_path = app.state_path();
    let mut state = App::load_state(&state_path)?;
    state.set_payload(payload.clone());
    App::save_state(&state_path, &state)?;

    match format {
        OutputFormat::Json => println!("{}", payload.to_json()?),
        OutputFormat::Plain => {
            println!("Pulled {} into {}", domain, state_path.display());
            println!("{}", payload.to_json()?);
        }
    }
    Ok(())
}
