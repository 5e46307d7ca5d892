//! Miniverse CLI - wallets, movements and transfers in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{audit, card, logs, movement, status, transfer, user};

/// Miniverse - a wallet ledger in your terminal
#[derive(Parser)]
#[command(name = "mv", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and inspect users
    User {
        #[command(subcommand)]
        command: user::UserCommands,
    },

    /// Record and inspect single movements
    Movement {
        #[command(subcommand)]
        command: movement::MovementCommands,
    },

    /// Send money and inspect transfers
    Transfer {
        #[command(subcommand)]
        command: transfer::TransferCommands,
    },

    /// Manage payment cards
    Card {
        #[command(subcommand)]
        command: card::CardCommands,
    },

    /// Show ledger status and summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recompute balances from movements and report divergences
    Audit {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    /// Command name as recorded in the event log
    fn name(&self) -> String {
        match self {
            Commands::User { command } => format!("user {}", command.name()),
            Commands::Movement { command } => format!("movement {}", command.name()),
            Commands::Transfer { command } => format!("transfer {}", command.name()),
            Commands::Card { command } => format!("card {}", command.name()),
            Commands::Status { .. } => "status".to_string(),
            Commands::Audit { .. } => "audit".to_string(),
            Commands::Logs { .. } => "logs".to_string(),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // Diagnostics go to stderr so --json output stays parseable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let logger = commands::get_logger();
    let name = cli.command.name();
    let logged = !matches!(cli.command, Commands::Logs { .. });

    debug!(command = %name, "dispatching");
    let result = run(cli);

    match result {
        Ok(()) => {
            debug!(command = %name, "command finished");
            if logged {
                commands::log_command(&logger, &name);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            debug!(command = %name, error = %e, "command failed");
            if logged {
                commands::log_failure(&logger, &name, &e);
            }
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::User { command } => user::run(command),
        Commands::Movement { command } => movement::run(command),
        Commands::Transfer { command } => transfer::run(command),
        Commands::Card { command } => card::run(command),
        Commands::Status { json } => status::run(json),
        Commands::Audit { json } => audit::run(json),
        Commands::Logs { command } => logs::run(command),
    }
}
