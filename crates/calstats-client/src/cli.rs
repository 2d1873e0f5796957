//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// calstats - statistics about your calendar
#[derive(Debug, Parser)]
#[command(name = "calstats")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CALSTATS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in or out
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Fetch events and print statistics (the default)
    Stats(StatsArgs),

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show the state of the stored session
    Status {
        /// Account to inspect
        #[arg(long)]
        account: Option<String>,
    },
}

#[derive(Debug, Default, clap::Args)]
pub struct StatsArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Account whose session is used
    #[arg(long)]
    pub account: Option<String>,

    /// Calendar to analyze instead of the configured one
    #[arg(long)]
    pub calendar: Option<String>,
}

/// Authentication actions.
#[derive(Debug, Subcommand)]
pub enum AuthAction {
    /// Sign in to Google Calendar
    Google {
        /// OAuth client ID (from Google Cloud Console)
        #[arg(long, env = "GOOGLE_CLIENT_ID")]
        client_id: Option<String>,

        /// OAuth client secret (from Google Cloud Console)
        #[arg(long, env = "GOOGLE_CLIENT_SECRET")]
        client_secret: Option<String>,

        /// Path to Google Cloud Console credentials JSON file
        #[arg(long, env = "GOOGLE_CREDENTIALS_FILE")]
        credentials_file: Option<PathBuf>,

        /// Account name to store the session under
        #[arg(long)]
        account: Option<String>,

        /// Sign in again even if the session is still usable
        #[arg(long, short)]
        force: bool,
    },

    /// Remove the stored session
    Logout {
        #[arg(long)]
        account: Option<String>,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration and session paths
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_defaults_to_none() {
        let cli = Cli::try_parse_from(["calstats"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.debug);
    }

    #[test]
    fn stats_flags() {
        let cli =
            Cli::try_parse_from(["calstats", "stats", "--json", "--account", "work", "-v"]).unwrap();
        assert!(cli.debug);
        match cli.command {
            Some(Command::Stats(args)) => {
                assert!(args.json);
                assert_eq!(args.account.as_deref(), Some("work"));
                assert!(args.calendar.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn auth_logout() {
        let cli = Cli::try_parse_from(["calstats", "auth", "logout", "--account", "work"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Auth {
                action: AuthAction::Logout { account: Some(ref a) }
            }) if a == "work"
        ));
    }
}
