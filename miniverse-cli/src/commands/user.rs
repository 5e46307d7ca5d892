//! User commands - create users, show profiles, balances and history

use std::io::BufRead;

use anyhow::{anyhow, Result};
use clap::Subcommand;
use colored::Colorize;
use rust_decimal::Decimal;

use super::{emit, get_context};
use crate::commands::movement::print_movements;
use crate::commands::transfer::print_transfers;
use crate::output;
use miniverse_core::UserId;

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a new user
    Create {
        /// User id (e.g. a phone number)
        id: String,
        /// Display name (defaults to the id)
        #[arg(long)]
        name: Option<String>,
        /// Opening funds, recorded as a deposit
        #[arg(long)]
        funds: Option<Decimal>,
        /// Secret to store (prompted for, or read from stdin, when omitted)
        #[arg(long, env = "MINIVERSE_USER_SECRET", hide_env_values = true)]
        secret: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a user
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Show a user's balance
    Balance {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// List a user's movements
    Movements {
        id: String,
        /// Embed the owner in each movement
        #[arg(long)]
        expand: bool,
        #[arg(long)]
        json: bool,
    },
    /// List transfers a user sent or received
    Transfers {
        id: String,
        /// Embed both legs of each transfer
        #[arg(long)]
        expand: bool,
        #[arg(long)]
        json: bool,
    },
}

impl UserCommands {
    pub fn name(&self) -> &'static str {
        match self {
            UserCommands::Create { .. } => "create",
            UserCommands::Show { .. } => "show",
            UserCommands::Balance { .. } => "balance",
            UserCommands::Movements { .. } => "movements",
            UserCommands::Transfers { .. } => "transfers",
        }
    }
}

/// Accept either a bare id or a `/user/{id}` reference
fn parse_user(ctx: &miniverse_core::MiniverseContext, raw: &str) -> Result<UserId> {
    Ok(ctx.references.parse_user(raw)?)
}

fn read_secret(id: &str) -> Result<String> {
    if atty::is(atty::Stream::Stdin) {
        let secret = dialoguer::Password::new()
            .with_prompt(format!("Secret for {}", id))
            .with_confirmation("Repeat secret", "Secrets do not match")
            .interact()?;
        return Ok(secret);
    }
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let secret = line.trim_end_matches(['\r', '\n']).to_string();
    if secret.is_empty() {
        return Err(anyhow!("No secret given on stdin"));
    }
    Ok(secret)
}

pub fn run(command: UserCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        UserCommands::Create {
            id,
            name,
            funds,
            secret,
            json,
        } => {
            let user_id = UserId::new(id.as_str())?;
            let secret = match secret {
                Some(s) => s,
                None => read_secret(&id)?,
            };
            let name = name.unwrap_or_else(|| id.clone());
            let result = ctx.user_service.create(&user_id, &name, &secret, funds);
            emit(json, result, |uri| {
                output::success(&format!("Created user {}", id));
                println!("  {}", uri.dimmed());
            })
        }
        UserCommands::Show { id, json } => {
            let user_id = parse_user(&ctx, &id)?;
            emit(json, ctx.user_service.get(&user_id), |user| {
                println!("{}", user.name.bold());
                let mut table = output::create_table();
                table.add_row(vec!["Id", user.id.as_str()]);
                table.add_row(vec!["Reference", &user.uri]);
                table.add_row(vec!["Balance", &user.balance.normalize().to_string()]);
                table.add_row(vec!["Created", &output::format_time(&user.created_at)]);
                println!("{}", table);
            })
        }
        UserCommands::Balance { id, json } => {
            let user_id = parse_user(&ctx, &id)?;
            emit(json, ctx.user_service.balance(&user_id), |balance| {
                println!("{}", output::format_amount(balance.balance));
            })
        }
        UserCommands::Movements { id, expand, json } => {
            let user_id = parse_user(&ctx, &id)?;
            emit(json, ctx.journal.list_for_user(&user_id, expand), |movements| {
                print_movements(movements)
            })
        }
        UserCommands::Transfers { id, expand, json } => {
            let user_id = parse_user(&ctx, &id)?;
            emit(json, ctx.transfers.list_for_user(&user_id, expand), |transfers| {
                print_transfers(transfers)
            })
        }
    }
}
