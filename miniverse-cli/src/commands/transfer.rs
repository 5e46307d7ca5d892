//! Transfer commands - send money between users, show transfers

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use rust_decimal::Decimal;

use super::{emit, get_context};
use crate::output;
use miniverse_core::services::{Expandable, MovementView, TransferView};
use miniverse_core::TransferType;

#[derive(Subcommand)]
pub enum TransferCommands {
    /// Send money from one user to another
    Send {
        /// Sender id or reference
        sender: String,
        /// Receiver id or reference
        receiver: String,
        /// Amount to move (positive)
        amount: Decimal,
        /// Free-text comment
        #[arg(long, default_value = "")]
        comment: String,
        /// PUBLIC or PRIVATE
        #[arg(long = "type", default_value = "PUBLIC")]
        kind: String,
        #[arg(long)]
        json: bool,
    },
    /// Pair two existing movements into a transfer
    Link {
        /// Withdrawal movement id or reference
        withdrawal: String,
        /// Deposit movement id or reference
        deposit: String,
        #[arg(long, default_value = "")]
        comment: String,
        /// PUBLIC or PRIVATE
        #[arg(long = "type", default_value = "PUBLIC")]
        kind: String,
        #[arg(long)]
        json: bool,
    },
    /// Show a transfer
    Show {
        /// Transfer id or reference
        id: String,
        /// Embed both movements
        #[arg(long)]
        expand: bool,
        #[arg(long)]
        json: bool,
    },
}

impl TransferCommands {
    pub fn name(&self) -> &'static str {
        match self {
            TransferCommands::Send { .. } => "send",
            TransferCommands::Link { .. } => "link",
            TransferCommands::Show { .. } => "show",
        }
    }
}

fn leg_summary(leg: &Expandable<MovementView>) -> String {
    match leg {
        Expandable::Reference(uri) => uri.clone(),
        Expandable::Expanded(m) => format!(
            "{} {} ({})",
            m.user.reference().unwrap_or_default(),
            output::format_amount(m.amount),
            m.kind
        ),
    }
}

pub fn print_transfers(transfers: &[TransferView]) {
    if transfers.is_empty() {
        println!("No transfers found.");
        return;
    }

    let mut table = output::create_table();
    table.set_header(vec!["Id", "Withdrawal", "Deposit", "Type", "Comment", "Created"]);
    for t in transfers {
        table.add_row(vec![
            t.id.to_string(),
            leg_summary(&t.withdrawal),
            leg_summary(&t.deposit),
            t.kind.to_string(),
            t.comment.clone(),
            output::format_time(&t.created_at),
        ]);
    }
    println!("{}", table);
}

pub fn run(command: TransferCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        TransferCommands::Send {
            sender,
            receiver,
            amount,
            comment,
            kind,
            json,
        } => {
            let sender = ctx.references.parse_user(&sender)?;
            let receiver = ctx.references.parse_user(&receiver)?;
            let kind: TransferType = kind.parse()?;
            let result = ctx
                .transfers
                .transfer(&sender, &receiver, amount, &comment, kind)
                .map(|id| ctx.transfers.reference(id));
            emit(json, result, |uri| {
                output::success(&format!("Sent {} from {} to {}", amount, sender, receiver));
                println!("  {}", uri.dimmed());
            })
        }
        TransferCommands::Link {
            withdrawal,
            deposit,
            comment,
            kind,
            json,
        } => {
            let withdrawal = ctx.references.parse_movement(&withdrawal)?;
            let deposit = ctx.references.parse_movement(&deposit)?;
            let kind: TransferType = kind.parse()?;
            let result = ctx
                .transfers
                .link(withdrawal, deposit, &comment, kind)
                .map(|id| ctx.transfers.reference(id));
            emit(json, result, |uri| {
                output::success(&format!("Linked movements {} and {}", withdrawal, deposit));
                println!("  {}", uri.dimmed());
            })
        }
        TransferCommands::Show { id, expand, json } => {
            let id = ctx.references.parse_transfer(&id)?;
            emit(json, ctx.transfers.get(id, expand), |t| {
                print_transfers(std::slice::from_ref(t))
            })
        }
    }
}
