//! Configuration commands.

use calstats_providers::validate_account_name;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Prints the effective configuration as TOML.
pub fn dump(config: &ClientConfig) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", ClientConfig::default_path().display());
    println!("{}", toml_str);
    Ok(())
}

/// Checks the configuration without contacting Google.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    check(config)?;
    if config.google.as_ref().is_some_and(|g| g.has_credentials()) {
        println!("Google credentials are valid.");
    }
    println!("Configuration is valid.");
    Ok(())
}

fn check(config: &ClientConfig) -> ClientResult<()> {
    let google = config.google();
    validate_account_name(google.account())
        .map_err(|e| ClientError::Config(e.message().to_string()))?;
    if google.calendar_id().trim().is_empty() {
        return Err(ClientError::Config(
            "Google calendar_id must not be empty".to_string(),
        ));
    }
    if google.has_credentials() {
        google.to_provider_config()?;
    }
    Ok(())
}

/// Prints the configuration file and session directory paths.
pub fn path(config: &ClientConfig) -> ClientResult<()> {
    println!("config:   {}", ClientConfig::default_path().display());
    println!("sessions: {}", config.session_dir().display());
    Ok(())
}
