//! CLI command implementations

pub mod audit;
pub mod card;
pub mod logs;
pub mod movement;
pub mod status;
pub mod transfer;
pub mod user;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use miniverse_core::services::{EntryPoint, LogEvent, LoggingService};
use miniverse_core::{Error, MiniverseContext, OperationResult};

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let miniverse_dir = get_miniverse_dir().ok()?;
    // Ensure directory exists
    std::fs::create_dir_all(&miniverse_dir).ok()?;
    LoggingService::new(&miniverse_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Record a successful command, ignoring any errors (logging should never break the app)
pub fn log_command(logger: &Option<LoggingService>, command: &str) {
    if let Some(l) = logger {
        let _ = l.log_command(command);
    }
}

/// Record a failed command
///
/// Ledger errors are logged by kind only; their messages can name users and
/// amounts.
pub fn log_failure(logger: &Option<LoggingService>, command: &str, error: &anyhow::Error) {
    let Some(l) = logger else {
        return;
    };
    let event = LogEvent::new("command_failed").with_command(command);
    let event = match error.downcast_ref::<Error>() {
        Some(ledger_error) => event.with_ledger_error(ledger_error),
        None => event.with_error("cli", "command failed"),
    };
    let _ = l.log(event);
}

/// Get the miniverse directory from environment or default
pub fn get_miniverse_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("MINIVERSE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".miniverse"))
        .ok_or_else(|| anyhow!("Could not find home directory; set MINIVERSE_DIR"))
}

/// Get or create miniverse context
pub fn get_context() -> Result<MiniverseContext> {
    let miniverse_dir = get_miniverse_dir()?;

    // Create directory if it doesn't exist
    std::fs::create_dir_all(&miniverse_dir)
        .with_context(|| format!("Failed to create miniverse directory: {:?}", miniverse_dir))?;

    MiniverseContext::new(&miniverse_dir).context("Failed to initialize miniverse context")
}

/// Print a ledger result, as an `OperationResult` envelope with `--json`
///
/// Failures are returned as well so the process exits non-zero.
pub fn emit<T: Serialize>(
    json: bool,
    result: miniverse_core::domain::result::Result<T>,
    human: impl FnOnce(&T),
) -> Result<()> {
    match result {
        Ok(data) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&OperationResult::ok(&data))?);
            } else {
                human(&data);
            }
            Ok(())
        }
        Err(e) => {
            if json {
                let mut envelope = OperationResult::<()>::fail(e.to_string());
                envelope.retryable = Some(e.is_retryable());
                println!("{}", serde_json::to_string_pretty(&envelope)?);
            }
            Err(e.into())
        }
    }
}
