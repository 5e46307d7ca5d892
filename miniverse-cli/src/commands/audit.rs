//! Audit command - recompute balances from movement history

use anyhow::{anyhow, Result};
use colored::Colorize;

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let report = ctx.status_service.audit()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.is_consistent() {
        output::success(&format!(
            "All {} balances match their movements",
            report.users_checked
        ));
    } else {
        println!("{}", "Balance divergences".red().bold());
        let mut table = output::create_table();
        table.set_header(vec!["User", "Stored", "Recomputed"]);
        for d in &report.divergences {
            table.add_row(vec![
                d.user.to_string(),
                d.stored.normalize().to_string(),
                d.recomputed.normalize().to_string(),
            ]);
        }
        println!("{}", table);
    }

    if report.is_consistent() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} user(s) have balances that do not match their movements",
            report.divergences.len()
        ))
    }
}
