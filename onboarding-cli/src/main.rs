//! Onboarding CLI - drive wallet registrations from the terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{cuenta, logs, outbox, perfil, registro};

/// onb - wallet onboarding from the terminal
#[derive(Parser)]
#[command(name = "onb", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Registration steps
    Registro {
        #[command(subcommand)]
        command: registro::RegistroCommands,
    },

    /// Account lookup and lifecycle
    Cuenta {
        #[command(subcommand)]
        command: cuenta::CuentaCommands,
    },

    /// Customer profile records
    Perfil {
        #[command(subcommand)]
        command: perfil::PerfilCommands,
    },

    /// Show delivered verification codes
    Outbox {
        /// Only codes sent to this destination (`+52 5512345678` or an email)
        #[arg(long)]
        destino: Option<String>,
        #[arg(short, long, default_value = "10")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn main() -> ExitCode {
    // Diagnostics go to stderr; stdout stays clean for --json
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("ONB_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = format!("{:#}", e);
            if let Some(logger) = commands::get_logger() {
                let _ = logger.log_error("command_failed", &message);
            }
            output::error(&message);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Registro { command } => registro::run(command),
        Commands::Cuenta { command } => cuenta::run(command),
        Commands::Perfil { command } => perfil::run(command),
        Commands::Outbox {
            destino,
            limit,
            json,
        } => outbox::run(destino, limit, json),
        Commands::Logs { command } => logs::run(command),
    }
}
