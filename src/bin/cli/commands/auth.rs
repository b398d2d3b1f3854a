use anyhow::{bail, Context, Result};

use crate::app::App;
use crate::OutputFormat;

pub async fn run_login(
    app: &App,
    code: Option<&str>,
    token: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let user = match (code, token) {
        (Some(code), _) => app
            .manager
            .authenticate(code)
            .await
            .context("Sign-in failed")?,
        (None, Some(token)) => app
            .manager
            .authenticate_with_token(token)
            .await
            .context("Sign-in failed")?,
        (None, None) => bail!("Pass --code or --token"),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&user)?),
        OutputFormat::Plain => println!("Signed in as {}", user.login),
    }
    Ok(())
}

pub async fn run_logout(app: &App, format: &OutputFormat) -> Result<()> {
    app.manager.logout().await.context("Sign-out failed")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "authenticated": false })),
        OutputFormat::Plain => println!("Signed out, local sync credentials removed"),
    }
    Ok(())
}

pub async fn run_whoami(app: &App, format: &OutputFormat) -> Result<()> {
    let user = app
        .manager
        .current_user()
        .await
        .context("Could not determine the signed-in user")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&user)?),
        OutputFormat::Plain => match &user.name {
            Some(name) => println!("{} ({})", user.login, name),
            None => println!("{}", user.login),
        },
    }
    Ok(())
}
