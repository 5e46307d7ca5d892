//! Movement commands - record deposits and withdrawals, show movements

use anyhow::Result;
use clap::Subcommand;
use rust_decimal::Decimal;

use super::{emit, get_context};
use crate::output;
use miniverse_core::services::{Expandable, MovementView};
use miniverse_core::MovementType;

#[derive(Subcommand)]
pub enum MovementCommands {
    /// Record a deposit (positive) or withdrawal (negative)
    Record {
        /// User id or reference
        user: String,
        /// Signed amount
        #[arg(allow_hyphen_values = true)]
        amount: Decimal,
        /// Movement type (FUNDS_DEPOSIT, FUNDS_WITHDRAWAL, ...)
        #[arg(long = "type", default_value = "FUNDS_DEPOSIT")]
        kind: String,
        #[arg(long)]
        json: bool,
    },
    /// Show a movement
    Show {
        /// Movement id or reference
        id: String,
        /// Embed the owning user
        #[arg(long)]
        expand: bool,
        #[arg(long)]
        json: bool,
    },
}

impl MovementCommands {
    pub fn name(&self) -> &'static str {
        match self {
            MovementCommands::Record { .. } => "record",
            MovementCommands::Show { .. } => "show",
        }
    }
}

pub fn print_movements(movements: &[MovementView]) {
    if movements.is_empty() {
        println!("No movements found.");
        return;
    }

    let mut table = output::create_table();
    table.set_header(vec!["Id", "User", "Amount", "Type", "Created"]);
    for m in movements {
        let user = match &m.user {
            Expandable::Reference(uri) => uri.clone(),
            Expandable::Expanded(user) => format!("{} ({})", user.name, user.id),
        };
        table.add_row(vec![
            m.id.to_string(),
            user,
            output::format_amount(m.amount),
            m.kind.to_string(),
            output::format_time(&m.created_at),
        ]);
    }
    println!("{}", table);
}

pub fn run(command: MovementCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        MovementCommands::Record {
            user,
            amount,
            kind,
            json,
        } => {
            let owner = ctx.references.parse_user(&user)?;
            let kind: MovementType = kind.parse()?;
            let result = ctx
                .journal
                .record(&owner, amount, kind)
                .map(|id| ctx.journal.reference(id));
            emit(json, result, |uri| {
                output::success(&format!("Recorded {} for {}", kind, owner));
                println!("  {}", uri);
            })
        }
        MovementCommands::Show { id, expand, json } => {
            let id = ctx.references.parse_movement(&id)?;
            emit(json, ctx.journal.get(id, expand), |m| {
                print_movements(std::slice::from_ref(m))
            })
        }
    }
}
