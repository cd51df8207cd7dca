//! Perfil command - edit the customer profile of an account

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Subcommand, ValueEnum};
use rust_decimal::Decimal;
use uuid::Uuid;

use onboarding_core::domain::{
    DatosDireccion, NuevaActividad, NuevaTarjeta, NuevaValidacion, ResultadoCheckton,
    TipoDocumentoCliente, SYSTEM_ACTOR,
};
use onboarding_core::ports::LogEvent;
use onboarding_core::Receipt;

use super::{get_context, get_logger, log_event};
use crate::output;

#[derive(Clone, Copy, ValueEnum)]
pub enum ResultadoArg {
    Aprobado,
    Rechazado,
    Revision,
}

impl From<ResultadoArg> for ResultadoCheckton {
    fn from(r: ResultadoArg) -> Self {
        match r {
            ResultadoArg::Aprobado => ResultadoCheckton::Aprobado,
            ResultadoArg::Rechazado => ResultadoCheckton::Rechazado,
            ResultadoArg::Revision => ResultadoCheckton::EnRevision,
        }
    }
}

#[derive(Subcommand)]
pub enum PerfilCommands {
    /// Create or replace the address
    Direccion {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        token: String,
        #[arg(long)]
        calle: Option<String>,
        #[arg(long)]
        numero_exterior: Option<String>,
        #[arg(long)]
        numero_interior: Option<String>,
        #[arg(long)]
        colonia: Option<String>,
        #[arg(long)]
        municipio: Option<String>,
        #[arg(long)]
        estado: Option<String>,
        #[arg(long)]
        codigo_postal: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Link a tokenized card
    VincularTarjeta {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        token: String,
        #[arg(long)]
        alias: Option<String>,
        #[arg(long)]
        ultimos_digitos: Option<String>,
        #[arg(long)]
        token_procesador: Option<String>,
        #[arg(long)]
        marca: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Unlink a card by guid
    DesvincularTarjeta {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        token: String,
        #[arg(long)]
        tarjeta: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// Attach an identity document (only its hash is stored)
    Documento {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        token: String,
        /// IdentificacionFrente, IdentificacionReverso, ComprobanteDomicilio or Selfie
        #[arg(long)]
        tipo: String,
        #[arg(long)]
        archivo: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Add an economic activity
    Actividad {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        token: String,
        #[arg(long)]
        ocupacion: Option<String>,
        #[arg(long)]
        giro: Option<String>,
        #[arg(long)]
        ingreso_mensual: Option<Decimal>,
        #[arg(long)]
        origen_recursos: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Record an identity-check result
    Checkton {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        token: String,
        #[arg(long)]
        folio: Option<String>,
        #[arg(long, value_enum)]
        resultado: ResultadoArg,
        #[arg(long)]
        puntaje: Option<Decimal>,
        #[arg(long)]
        observaciones: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

impl PerfilCommands {
    fn name(&self) -> &'static str {
        match self {
            PerfilCommands::Direccion { .. } => "perfil direccion",
            PerfilCommands::VincularTarjeta { .. } => "perfil vincular-tarjeta",
            PerfilCommands::DesvincularTarjeta { .. } => "perfil desvincular-tarjeta",
            PerfilCommands::Documento { .. } => "perfil documento",
            PerfilCommands::Actividad { .. } => "perfil actividad",
            PerfilCommands::Checkton { .. } => "perfil checkton",
        }
    }
}

fn print_created(title: &str, (receipt, guid): &(Receipt, Uuid)) {
    output::print_receipt(title, receipt);
    output::info(&format!("Created record {}", guid));
}

pub fn run(command: PerfilCommands) -> Result<()> {
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_executed").with_command(command.name()));
    let ctx = get_context(&logger)?;
    let perfil = &ctx.cliente_service;

    match command {
        PerfilCommands::Direccion {
            id,
            token,
            calle,
            numero_exterior,
            numero_interior,
            colonia,
            municipio,
            estado,
            codigo_postal,
            json,
        } => {
            let datos = DatosDireccion {
                calle,
                numero_exterior,
                numero_interior,
                colonia,
                municipio,
                estado,
                codigo_postal,
            };
            output::emit(
                perfil.asignar_direccion(id, &datos, SYSTEM_ACTOR, &token),
                json,
                |r| output::print_receipt("Address stored", r),
            )
        }
        PerfilCommands::VincularTarjeta {
            id,
            token,
            alias,
            ultimos_digitos,
            token_procesador,
            marca,
            json,
        } => {
            let tarjeta = NuevaTarjeta {
                alias,
                ultimos_digitos,
                token_procesador,
                marca,
            };
            output::emit(
                perfil.vincular_tarjeta(id, &tarjeta, SYSTEM_ACTOR, &token),
                json,
                |r| print_created("Card linked", r),
            )
        }
        PerfilCommands::DesvincularTarjeta {
            id,
            token,
            tarjeta,
            json,
        } => output::emit(
            perfil.desvincular_tarjeta(id, tarjeta, SYSTEM_ACTOR, &token),
            json,
            |r| output::print_receipt("Card unlinked", r),
        ),
        PerfilCommands::Documento {
            id,
            token,
            tipo,
            archivo,
            json,
        } => {
            let tipo: TipoDocumentoCliente = tipo.parse().map_err(|e: String| anyhow!(e))?;
            let contenido = std::fs::read(&archivo)
                .with_context(|| format!("Failed to read {}", archivo.display()))?;
            let nombre = archivo
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            output::emit(
                perfil.adjuntar_documento(id, tipo, &nombre, &contenido, SYSTEM_ACTOR, &token),
                json,
                |r| print_created("Document attached", r),
            )
        }
        PerfilCommands::Actividad {
            id,
            token,
            ocupacion,
            giro,
            ingreso_mensual,
            origen_recursos,
            json,
        } => {
            let actividad = NuevaActividad {
                ocupacion,
                giro,
                ingreso_mensual,
                origen_recursos,
            };
            output::emit(
                perfil.agregar_actividad_economica(id, &actividad, SYSTEM_ACTOR, &token),
                json,
                |r| print_created("Economic activity added", r),
            )
        }
        PerfilCommands::Checkton {
            id,
            token,
            folio,
            resultado,
            puntaje,
            observaciones,
            json,
        } => {
            let validacion = NuevaValidacion {
                folio,
                resultado: resultado.into(),
                puntaje,
                observaciones,
            };
            output::emit(
                perfil.registrar_validacion_checkton(id, &validacion, SYSTEM_ACTOR, &token),
                json,
                |r| print_created("Identity check recorded", r),
            )
        }
    }
}
