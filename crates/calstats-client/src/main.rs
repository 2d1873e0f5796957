//! calstats CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use calstats_client::cli::{AuthAction, Cli, Command, ConfigAction, StatsArgs};
use calstats_client::commands;
use calstats_client::commands::auth::CredentialArgs;
use calstats_client::config::ClientConfig;
use calstats_client::error::ClientResult;
use calstats_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ClientConfig::load_from(path),
        None => ClientConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_tracing(TracingConfig::cli(cli.debug || config.debug)) {
        eprintln!("warning: {}", e);
    }

    match run(cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if e.is_reauth_required() {
                eprintln!("run `calstats auth google` to sign in again");
            }
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli, config: &ClientConfig) -> ClientResult<()> {
    match cli.command {
        Some(Command::Auth { action }) => match action {
            AuthAction::Google {
                client_id,
                client_secret,
                credentials_file,
                account,
                force,
            } => {
                let credentials = CredentialArgs {
                    client_id,
                    client_secret,
                    credentials_file,
                };
                commands::auth::google(credentials, account, force, config).await
            }
            AuthAction::Logout { account } => commands::auth::logout(account, config),
        },
        Some(Command::Stats(args)) => commands::stats::run(args, config).await,
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::config::dump(config),
            ConfigAction::Validate => commands::config::validate(config),
            ConfigAction::Path => commands::config::path(config),
        },
        Some(Command::Status { account }) => commands::status::run(account, config),
        None => commands::stats::run(StatsArgs::default(), config).await,
    }
}
