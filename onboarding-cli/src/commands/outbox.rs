//! Outbox command - read the codes that were "sent"

use anyhow::Result;
use colored::Colorize;

use onboarding_core::adapters::outbox::OutboxNotifier;

use super::get_onboarding_dir;
use crate::output;

pub fn run(destino: Option<String>, limit: usize, json: bool) -> Result<()> {
    let outbox = OutboxNotifier::new(&get_onboarding_dir()?);
    let mut entries = outbox.read_all()?;
    if let Some(destino) = &destino {
        entries.retain(|e| e.mensaje.destino == *destino);
    }
    // Newest first
    entries.reverse();
    entries.truncate(limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        output::warning("Outbox is empty.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Sent", "Channel", "Destination", "Code", "Reference"]);
    for entry in entries {
        table.add_row(vec![
            entry.enviado_en.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.mensaje.tipo.to_string(),
            entry.mensaje.destino,
            entry.mensaje.codigo.bold().to_string(),
            entry.mensaje.proveedor_referencia,
        ]);
    }
    println!("{}", table);
    println!("{}", outbox.path().display().to_string().dimmed());
    Ok(())
}
