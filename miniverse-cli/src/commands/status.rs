//! Status command - show ledger status and summary

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.get_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Ledger Status".bold());
    println!();

    let mut table = output::create_table();
    table.add_row(vec!["Users", &status.counts.users.to_string()]);
    table.add_row(vec!["Movements", &status.counts.movements.to_string()]);
    table.add_row(vec!["Transfers", &status.counts.transfers.to_string()]);
    table.add_row(vec!["Cards", &status.counts.cards.to_string()]);
    table.add_row(vec!["Money in wallets", &status.total_balance.normalize().to_string()]);
    println!("{}", table);
    println!();

    if let Some(path) = &status.db_path {
        println!("Database: {} ({})", path, output::format_size(status.db_size_bytes));
    }

    Ok(())
}
