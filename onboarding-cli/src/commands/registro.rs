//! Registro command - walk an account through the onboarding steps

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;
use clap::{Subcommand, ValueEnum};
use dialoguer::{Confirm, Password};

use onboarding_core::domain::{DatosPersonales, DocumentoVersion, Genero, SYSTEM_ACTOR};
use onboarding_core::ports::LogEvent;
use onboarding_core::TipoVerificacion;

use super::{get_context, get_logger, log_event};
use crate::output;

#[derive(Clone, Copy, ValueEnum)]
pub enum Canal {
    Sms,
    Email,
}

impl From<Canal> for TipoVerificacion {
    fn from(canal: Canal) -> Self {
        match canal {
            Canal::Sms => TipoVerificacion::Sms,
            Canal::Email => TipoVerificacion::Email,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum GeneroArg {
    Masculino,
    Femenino,
}

impl From<GeneroArg> for Genero {
    fn from(g: GeneroArg) -> Self {
        match g {
            GeneroArg::Masculino => Genero::Masculino,
            GeneroArg::Femenino => Genero::Femenino,
        }
    }
}

#[derive(Subcommand)]
pub enum RegistroCommands {
    /// Start (or restart) registration for a phone number
    Iniciar {
        /// Country calling code, e.g. 52
        #[arg(long, default_value = "52")]
        codigo_pais: String,
        /// 10-digit phone number
        #[arg(long)]
        telefono: String,
        #[arg(long)]
        json: bool,
    },
    /// Confirm a 2FA code
    Confirmar {
        #[arg(long)]
        id: i64,
        /// Concurrency token from the previous step
        #[arg(long)]
        token: String,
        #[arg(long, value_enum, default_value = "sms")]
        canal: Canal,
        #[arg(long)]
        codigo: String,
        #[arg(long)]
        json: bool,
    },
    /// Send a new code on a channel still awaiting confirmation
    Reenviar {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        token: String,
        #[arg(long, value_enum, default_value = "sms")]
        canal: Canal,
        #[arg(long)]
        json: bool,
    },
    /// Submit personal data
    Datos {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        token: String,
        #[arg(long)]
        nombre: Option<String>,
        #[arg(long)]
        apellido_paterno: Option<String>,
        #[arg(long)]
        apellido_materno: Option<String>,
        /// YYYY-MM-DD
        #[arg(long)]
        fecha_nacimiento: Option<NaiveDate>,
        #[arg(long, value_enum)]
        genero: Option<GeneroArg>,
        #[arg(long)]
        curp: Option<String>,
        #[arg(long)]
        rfc: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Register the email address (sends a code)
    Correo {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        token: String,
        #[arg(long)]
        correo: String,
        #[arg(long)]
        json: bool,
    },
    /// Register the device and its public key
    Biometricos {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        token: String,
        #[arg(long)]
        dispositivo: String,
        #[arg(long)]
        llave_publica: String,
        #[arg(long)]
        json: bool,
    },
    /// Accept legal documents (TYPE@VERSION, repeatable or comma separated)
    Terminos {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        token: String,
        #[arg(long = "acepto", value_delimiter = ',')]
        aceptados: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Set the password and finish registration
    Password {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        token: String,
        /// Read from ONB_PASSWORD or prompt when omitted
        #[arg(long, env = "ONB_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

impl RegistroCommands {
    fn name(&self) -> &'static str {
        match self {
            RegistroCommands::Iniciar { .. } => "registro iniciar",
            RegistroCommands::Confirmar { .. } => "registro confirmar",
            RegistroCommands::Reenviar { .. } => "registro reenviar",
            RegistroCommands::Datos { .. } => "registro datos",
            RegistroCommands::Correo { .. } => "registro correo",
            RegistroCommands::Biometricos { .. } => "registro biometricos",
            RegistroCommands::Terminos { .. } => "registro terminos",
            RegistroCommands::Password { .. } => "registro password",
        }
    }
}

/// Prompt twice unless the password was given
fn read_password(given: Option<String>) -> Result<(String, String)> {
    if let Some(password) = given {
        return Ok((password.clone(), password));
    }
    let password = Password::new().with_prompt("Password").interact()?;
    let confirmacion = Password::new().with_prompt("Confirm password").interact()?;
    Ok((password, confirmacion))
}

pub fn run(command: RegistroCommands) -> Result<()> {
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_executed").with_command(command.name()));
    let ctx = get_context(&logger)?;
    let registro = &ctx.registro_service;

    match command {
        RegistroCommands::Iniciar {
            codigo_pais,
            telefono,
            json,
        } => output::emit(
            registro.pre_registro(&codigo_pais, &telefono, SYSTEM_ACTOR),
            json,
            |r| {
                output::print_receipt("Registration started, SMS code sent", r);
            },
        ),
        RegistroCommands::Confirmar {
            id,
            token,
            canal,
            codigo,
            json,
        } => output::emit(
            registro.confirmar_codigo(id, canal.into(), &codigo, SYSTEM_ACTOR, &token),
            json,
            |r| output::print_receipt("Code confirmed", r),
        ),
        RegistroCommands::Reenviar {
            id,
            token,
            canal,
            json,
        } => output::emit(
            registro.reenviar_codigo(id, canal.into(), SYSTEM_ACTOR, &token),
            json,
            |r| output::print_receipt("New code sent", r),
        ),
        RegistroCommands::Datos {
            id,
            token,
            nombre,
            apellido_paterno,
            apellido_materno,
            fecha_nacimiento,
            genero,
            curp,
            rfc,
            json,
        } => {
            let datos = DatosPersonales {
                nombre,
                apellido_paterno,
                apellido_materno,
                fecha_nacimiento,
                genero: genero.map(Genero::from),
                curp,
                rfc,
            };
            output::emit(
                registro.completar_datos_cliente(id, &datos, SYSTEM_ACTOR, &token),
                json,
                |r| output::print_receipt("Personal data stored", r),
            )
        }
        RegistroCommands::Correo {
            id,
            token,
            correo,
            json,
        } => output::emit(
            registro.registrar_correo(id, &correo, SYSTEM_ACTOR, &token),
            json,
            |r| output::print_receipt("Email registered, code sent", r),
        ),
        RegistroCommands::Biometricos {
            id,
            token,
            dispositivo,
            llave_publica,
            json,
        } => output::emit(
            registro.registrar_biometricos(id, &dispositivo, &llave_publica, SYSTEM_ACTOR, &token),
            json,
            |r| output::print_receipt("Device registered", r),
        ),
        RegistroCommands::Terminos {
            id,
            token,
            aceptados,
            json,
        } => {
            let aceptados = if aceptados.is_empty() {
                let requeridos = ctx.config.documentos_requeridos.clone();
                let listado = requeridos
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                if json
                    || !Confirm::new()
                        .with_prompt(format!("Accept {}?", listado))
                        .default(false)
                        .interact()?
                {
                    bail!("No documents accepted (use --acepto TYPE@VERSION)");
                }
                requeridos
            } else {
                aceptados
                    .iter()
                    .map(|s| s.parse::<DocumentoVersion>().map_err(|e| anyhow!(e)))
                    .collect::<Result<Vec<_>>>()?
            };
            output::emit(
                registro.aceptar_terminos(id, &aceptados, SYSTEM_ACTOR, &token),
                json,
                |r| output::print_receipt("Terms accepted", r),
            )
        }
        RegistroCommands::Password {
            id,
            token,
            password,
            json,
        } => {
            let (password, confirmacion) = read_password(password)?;
            output::emit(
                registro.completar_registro(id, &password, &confirmacion, SYSTEM_ACTOR, &token),
                json,
                |r| output::print_receipt("Registration completed", r),
            )
        }
    }
}
