//! Cuenta command - inspect and manage registered accounts

use anyhow::{bail, Result};
use chrono::Duration;
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Password;

use onboarding_core::domain::{Entity, SYSTEM_ACTOR};
use onboarding_core::ports::{LogEvent, UsuarioRepository};
use onboarding_core::Usuario;

use super::{get_context, get_logger, log_event};
use crate::output;

#[derive(Subcommand)]
pub enum CuentaCommands {
    /// Show one account
    Ver {
        #[arg(long, conflicts_with = "telefono")]
        id: Option<i64>,
        #[arg(long, default_value = "52")]
        codigo_pais: String,
        #[arg(long)]
        telefono: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List accounts, most recently touched first
    Listar {
        #[arg(short, long, default_value = "20")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Deactivate (soft delete) an account
    Desactivar {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        token: String,
        #[arg(long)]
        json: bool,
    },
    /// Reactivate an account
    Reactivar {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        token: String,
        #[arg(long)]
        json: bool,
    },
    /// Store a session refresh token
    RefreshToken {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        token: String,
        #[arg(long)]
        refresh_token: String,
        /// Validity in days
        #[arg(long, default_value = "30")]
        dias: i64,
        #[arg(long)]
        json: bool,
    },
    /// Change the password of a completed account
    Password {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        token: String,
        #[arg(long)]
        json: bool,
    },
}

impl CuentaCommands {
    fn name(&self) -> &'static str {
        match self {
            CuentaCommands::Ver { .. } => "cuenta ver",
            CuentaCommands::Listar { .. } => "cuenta listar",
            CuentaCommands::Desactivar { .. } => "cuenta desactivar",
            CuentaCommands::Reactivar { .. } => "cuenta reactivar",
            CuentaCommands::RefreshToken { .. } => "cuenta refresh-token",
            CuentaCommands::Password { .. } => "cuenta password",
        }
    }
}

fn print_usuario(usuario: &Usuario) {
    let base = usuario.base();
    let mut table = output::create_table();
    table.add_row(vec!["Id".to_string(), base.id().map(|i| i.to_string()).unwrap_or_default()]);
    table.add_row(vec!["Guid".to_string(), base.guid().to_string()]);
    table.add_row(vec!["Telefono".to_string(), usuario.telefono_completo()]);
    table.add_row(vec![
        "Correo".to_string(),
        usuario.correo().unwrap_or("-").to_string(),
    ]);
    table.add_row(vec!["Estatus".to_string(), usuario.estatus().to_string()]);
    table.add_row(vec![
        "Activo".to_string(),
        if base.is_active() { "si" } else { "no" }.to_string(),
    ]);
    table.add_row(vec![
        "Verificaciones".to_string(),
        usuario.verificaciones().len().to_string(),
    ]);
    table.add_row(vec![
        "Consentimientos".to_string(),
        usuario.consentimientos().len().to_string(),
    ]);
    table.add_row(vec![
        "Token".to_string(),
        base.concurrency_token()
            .map(|t| t.to_wire())
            .unwrap_or_default(),
    ]);
    println!("{}", table);
}

pub fn run(command: CuentaCommands) -> Result<()> {
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_executed").with_command(command.name()));
    let ctx = get_context(&logger)?;
    let cuentas = &ctx.cuenta_service;

    match command {
        CuentaCommands::Ver {
            id,
            codigo_pais,
            telefono,
            json,
        } => {
            let result = match (id, telefono) {
                (Some(id), _) => cuentas.obtener(id),
                (None, Some(telefono)) => cuentas
                    .obtener_por_telefono(&codigo_pais, &telefono)
                    .and_then(|u| {
                        u.ok_or_else(|| onboarding_core::Error::not_found(format!("telefono {}", telefono)))
                    }),
                (None, None) => bail!("Pass --id or --telefono"),
            };
            output::emit(result, json, print_usuario)
        }
        CuentaCommands::Listar { limit, json } => {
            let usuarios = ctx.repository.list_usuarios(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&usuarios)?);
                return Ok(());
            }
            if usuarios.is_empty() {
                output::warning("No accounts yet.");
                return Ok(());
            }
            let mut table = output::create_table();
            table.set_header(vec!["Id", "Telefono", "Estatus", "Activo", "Actualizado"]);
            for u in usuarios {
                table.add_row(vec![
                    u.id.to_string(),
                    format!("+{} {}", u.codigo_pais, u.telefono),
                    u.estatus,
                    if u.is_active { "si".to_string() } else { "no".red().to_string() },
                    u.updated_at.unwrap_or_default(),
                ]);
            }
            println!("{}", table);
            println!("{} account(s) in total", ctx.repository.count_usuarios()?);
            Ok(())
        }
        CuentaCommands::Desactivar { id, token, json } => output::emit(
            cuentas.desactivar(id, SYSTEM_ACTOR, &token),
            json,
            |r| output::print_receipt("Account deactivated", r),
        ),
        CuentaCommands::Reactivar { id, token, json } => output::emit(
            cuentas.reactivar(id, SYSTEM_ACTOR, &token),
            json,
            |r| output::print_receipt("Account reactivated", r),
        ),
        CuentaCommands::RefreshToken {
            id,
            token,
            refresh_token,
            dias,
            json,
        } => output::emit(
            cuentas.actualizar_refresh_token(
                id,
                &refresh_token,
                Duration::days(dias),
                SYSTEM_ACTOR,
                &token,
            ),
            json,
            |r| output::print_receipt("Refresh token stored", r),
        ),
        CuentaCommands::Password { id, token, json } => {
            let actual = Password::new().with_prompt("Current password").interact()?;
            let nueva = Password::new().with_prompt("New password").interact()?;
            let confirmacion = Password::new().with_prompt("Confirm new password").interact()?;
            output::emit(
                cuentas.cambiar_password(id, &actual, &nueva, &confirmacion, SYSTEM_ACTOR, &token),
                json,
                |r| output::print_receipt("Password changed", r),
            )
        }
    }
}
