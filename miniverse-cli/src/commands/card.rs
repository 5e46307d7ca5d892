//! Card commands - issue, activate, cancel and charge payment cards

use anyhow::Result;
use clap::Subcommand;
use rust_decimal::Decimal;

use super::{emit, get_context};
use crate::output;
use miniverse_core::{CardNumber, CreditCard};

#[derive(Subcommand)]
pub enum CardCommands {
    /// Issue a new (inactive) card
    Issue {
        /// Owner id or reference
        user: String,
        /// Card number; a random one is drawn when omitted
        #[arg(long)]
        number: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Activate an inactive card
    Activate {
        number: String,
        #[arg(long)]
        json: bool,
    },
    /// Cancel a card
    Cancel {
        number: String,
        #[arg(long)]
        json: bool,
    },
    /// Charge a purchase to a card
    Charge {
        number: String,
        /// Purchase amount (positive)
        amount: Decimal,
        #[arg(long)]
        json: bool,
    },
    /// List a user's cards
    List {
        /// Owner id or reference
        user: String,
        #[arg(long)]
        json: bool,
    },
}

impl CardCommands {
    pub fn name(&self) -> &'static str {
        match self {
            CardCommands::Issue { .. } => "issue",
            CardCommands::Activate { .. } => "activate",
            CardCommands::Cancel { .. } => "cancel",
            CardCommands::Charge { .. } => "charge",
            CardCommands::List { .. } => "list",
        }
    }
}

fn print_cards(cards: &[CreditCard]) {
    if cards.is_empty() {
        println!("No cards found.");
        return;
    }

    let mut table = output::create_table();
    table.set_header(vec!["Number", "Status", "Issued", "Active since", "Expires"]);
    for card in cards {
        table.add_row(vec![
            card.number.masked(),
            card.status.to_string(),
            output::format_time(&card.issued_at),
            card.active_since
                .as_ref()
                .map(output::format_time)
                .unwrap_or_else(|| "-".to_string()),
            card.expires_at.date_naive().to_string(),
        ]);
    }
    println!("{}", table);
}

pub fn run(command: CardCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        CardCommands::Issue { user, number, json } => {
            let owner = ctx.references.parse_user(&user)?;
            let number = number.map(CardNumber::new).transpose()?;
            emit(json, ctx.card_service.issue(&owner, number), |card| {
                output::success(&format!("Issued card {}", card.number));
                output::info("The card is inactive until activated.");
            })
        }
        CardCommands::Activate { number, json } => {
            let number = CardNumber::new(number)?;
            emit(json, ctx.card_service.activate(&number), |card| {
                output::success(&format!("Card {} is {}", card.number.masked(), card.status));
            })
        }
        CardCommands::Cancel { number, json } => {
            let number = CardNumber::new(number)?;
            emit(json, ctx.card_service.cancel(&number), |card| {
                output::warning(&format!("Card {} is {}", card.number.masked(), card.status));
            })
        }
        CardCommands::Charge {
            number,
            amount,
            json,
        } => {
            let number = CardNumber::new(number)?;
            let result = ctx
                .card_service
                .charge(&number, amount)
                .map(|id| ctx.journal.reference(id));
            emit(json, result, |uri| {
                output::success(&format!("Charged {} to {}", amount, number.masked()));
                println!("  {}", uri);
            })
        }
        CardCommands::List { user, json } => {
            let owner = ctx.references.parse_user(&user)?;
            emit(json, ctx.card_service.list_for_user(&owner), |cards| {
                print_cards(cards)
            })
        }
    }
}
