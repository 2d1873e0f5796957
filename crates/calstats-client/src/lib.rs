//! The `calstats` command-line client.
//!
//! Signs in to Google, keeps the session usable between runs and prints
//! statistics about the last 30 days and the next 7 days of the calendar.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
