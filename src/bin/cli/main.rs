mod app;
mod commands;
mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use docsync_lib::sync::Domain;

#[derive(Parser)]
#[command(name = "docsync-cli", about = "Sync local app state with remote documents", version)]
struct Cli {
    /// Data directory (default: platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (default: <data-dir>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in or out
    #[command(subcommand)]
    Auth(AuthCommand),

    /// Show the signed-in user
    Whoami,

    /// Sync every domain with the local state file
    Sync {
        /// Local state file (default: <data-dir>/state.json)
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// Upload a single domain
    Push {
        /// Domain key (metadata, trackers, challenges, todos, analytics)
        domain: Domain,
        /// Read the payload from a JSON file instead of the local state
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Download a single domain into the local state
    Pull {
        /// Domain key (metadata, trackers, challenges, todos, analytics)
        domain: Domain,
    },

    /// Check credentials and remote resources
    Status,

    /// Recreate every remote resource
    Repair {
        /// Confirm the destructive recreate
        #[arg(long)]
        force_recreate: bool,
    },

    /// Forget the token and all resource ids
    Reset,

    /// Keep syncing in the background until interrupted
    Watch,
}

#[derive(Subcommand)]
enum AuthCommand {
    /// Sign in with an OAuth authorization code or a bearer token
    Login {
        /// Authorization code to exchange for a token
        #[arg(long, conflicts_with = "token", required_unless_present = "token")]
        code: Option<String>,
        /// Bearer token to use directly
        #[arg(long)]
        token: Option<String>,
    },

    /// Sign out and remove local credentials
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let use_color = !cli.no_color && atty_check();
    let app = app::App::new(cli.data_dir.as_deref(), cli.config.as_deref())?;

    match cli.command {
        Command::Auth(AuthCommand::Login { code, token }) => {
            commands::auth::run_login(&app, code.as_deref(), token.as_deref(), &cli.format).await?;
        }
        Command::Auth(AuthCommand::Logout) => {
            commands::auth::run_logout(&app, &cli.format).await?;
        }
        Command::Whoami => {
            commands::auth::run_whoami(&app, &cli.format).await?;
        }
        Command::Sync { state } => {
            let state_path = state.unwrap_or_else(|| app.state_path());
            commands::sync::run(&app, &state_path, &cli.format, use_color).await?;
        }
        Command::Push { domain, file } => {
            commands::domain::run_push(&app, domain, file.as_deref(), &cli.format).await?;
        }
        Command::Pull { domain } => {
            commands::domain::run_pull(&app, domain, &cli.format).await?;
        }
        Command::Status => {
            commands::status::run(&app, &cli.format, use_color).await?;
        }
        Command::Repair { force_recreate } => {
            commands::repair::run_repair(&app, force_recreate, &cli.format, use_color).await?;
        }
        Command::Reset => {
            commands::repair::run_reset(&app, &cli.format).await?;
        }
        Command::Watch => {
            commands::watch::run(&app, &cli.format).await?;
        }
    }

    Ok(())
}

/// Check if stdout is a terminal (for color support)
fn atty_check() -> bool {
    unsafe { libc_isatty(1) != 0 }
}

extern "C" {
    #[link_name = "isatty"]
    fn libc_isatty(fd: i32) -> i32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_domain_argument() {
        let cli = Cli::try_parse_from(["docsync-cli", "pull", "todos"]).unwrap();
        assert!(matches!(cli.command, Command::Pull { domain: Domain::Todos }));

        assert!(Cli::try_parse_from(["docsync-cli", "pull", "notes"]).is_err());
    }

    #[test]
    fn test_login_requires_code_or_token() {
        assert!(Cli::try_parse_from(["docsync-cli", "auth", "login"]).is_err());
        assert!(Cli::try_parse_from(["docsync-cli", "auth", "login", "--code", "c", "--token", "t"]).is_err());
        assert!(Cli::try_parse_from(["docsync-cli", "auth", "login", "--token", "t"]).is_ok());
    }
}
