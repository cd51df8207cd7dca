//! Output formatting utilities

use anyhow::{bail, Result};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use serde::Serialize;

use onboarding_core::{Error, OperationResult, Receipt};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Print every field error of a domain failure, one per line
pub fn print_core_error(err: &Error) {
    match err.aggregate() {
        Some(agg) => {
            error("Request rejected:");
            for e in agg.errors() {
                eprintln!("  {} {}", e.field.bold(), e.code.as_str().red());
            }
        }
        None => error(&err.to_string()),
    }
}

/// Emit a core result either as an `OperationResult` JSON document or
/// through `human`
pub fn emit<T: Serialize>(
    result: onboarding_core::domain::result::Result<T>,
    json: bool,
    human: impl FnOnce(&T),
) -> Result<()> {
    if json {
        let failed = result.is_err();
        let op: OperationResult<T> = result.into();
        println!("{}", serde_json::to_string_pretty(&op)?);
        if failed {
            bail!("operation failed");
        }
        return Ok(());
    }
    match result {
        Ok(value) => {
            human(&value);
            Ok(())
        }
        Err(e) => {
            print_core_error(&e);
            bail!("operation failed");
        }
    }
}

/// Human rendering of a write receipt
pub fn print_receipt(title: &str, receipt: &Receipt) {
    success(title);
    let mut table = create_table();
    table.add_row(vec!["Usuario".to_string(), receipt.usuario_id.to_string()]);
    table.add_row(vec!["Guid".to_string(), receipt.usuario_guid.to_string()]);
    table.add_row(vec!["Estatus".to_string(), receipt.estatus.to_string()]);
    table.add_row(vec![
        "Activo".to_string(),
        if receipt.is_active { "si" } else { "no" }.to_string(),
    ]);
    table.add_row(vec!["Token".to_string(), receipt.concurrency_token.clone()]);
    println!("{}", table);
    info("Present the token above on the next step (--token).");
}
