//! Account aggregate and the registration state machine
//!
//! A [`Usuario`] moves through [`Estatus`] one step at a time. Each transition
//! method checks, in order: the account is active, the payload is valid (all
//! field errors together), then the business rules (status, codes, consents).
//! A failing call leaves the aggregate untouched.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::cliente::{Cliente, DatosPersonales};
use super::consentimiento::{ConsentimientoUsuario, DocumentoVersion};
use super::entity::{impl_entity, ActorId, Entity, EntityBase};
use super::providers::Providers;
use super::result::{ErrorAggregate, ErrorCode};
use super::validation::{patterns, Rule, Validator};
use super::verificacion::{TipoVerificacion, Verificacion2Fa};

/// Maximum accepted password length
pub const PASSWORD_MAX: usize = 128;

/// Registration progress, in the only order it can advance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Estatus {
    PreRegistro,
    NumeroConfirmado,
    DatosClienteCompletado,
    CorreoRegistrado,
    CorreoConfirmado,
    DatosBiometricosRegistrado,
    TerminosCondicionesAceptado,
    RegistroCompletado,
}

impl Estatus {
    pub const TODOS: [Estatus; 8] = [
        Estatus::PreRegistro,
        Estatus::NumeroConfirmado,
        Estatus::DatosClienteCompletado,
        Estatus::CorreoRegistrado,
        Estatus::CorreoConfirmado,
        Estatus::DatosBiometricosRegistrado,
        Estatus::TerminosCondicionesAceptado,
        Estatus::RegistroCompletado,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Estatus::PreRegistro => "PreRegistro",
            Estatus::NumeroConfirmado => "NumeroConfirmado",
            Estatus::DatosClienteCompletado => "DatosClienteCompletado",
            Estatus::CorreoRegistrado => "CorreoRegistrado",
            Estatus::CorreoConfirmado => "CorreoConfirmado",
            Estatus::DatosBiometricosRegistrado => "DatosBiometricosRegistrado",
            Estatus::TerminosCondicionesAceptado => "TerminosCondicionesAceptado",
            Estatus::RegistroCompletado => "RegistroCompletado",
        }
    }

    /// The step that follows this one, `None` once completed
    pub fn siguiente(&self) -> Option<Estatus> {
        let pos = Self::TODOS.iter().position(|e| e == self)?;
        Self::TODOS.get(pos + 1).copied()
    }

    /// Advance from `esperado` to its successor, or fail with STATUS-INVALID
    fn avanzar_desde(&mut self, esperado: Estatus) -> Result<(), ErrorAggregate> {
        match (*self == esperado).then(|| esperado.siguiente()).flatten() {
            Some(siguiente) => {
                *self = siguiente;
                Ok(())
            }
            None => Err(estatus_invalido()),
        }
    }
}

impl fmt::Display for Estatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Estatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::TODOS
            .iter()
            .find(|e| e.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown registration status: {}", s))
    }
}

fn estatus_invalido() -> ErrorAggregate {
    ErrorAggregate::single("Estatus", ErrorCode::StatusInvalid)
}

/// Status a code on channel `tipo` can be confirmed (or resent) in
fn estatus_para_codigo(tipo: TipoVerificacion) -> Estatus {
    match tipo {
        TipoVerificacion::Sms => Estatus::PreRegistro,
        TipoVerificacion::Email => Estatus::CorreoRegistrado,
    }
}

/// Account aggregate: the registration state plus its verifications,
/// consents and customer profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usuario {
    pub(crate) base: EntityBase,
    pub(crate) codigo_pais: String,
    pub(crate) telefono: String,
    pub(crate) correo: Option<String>,
    pub(crate) password_hash: Option<String>,
    pub(crate) estatus: Estatus,
    pub(crate) refresh_token: Option<String>,
    pub(crate) refresh_token_expira: Option<DateTime<Utc>>,
    pub(crate) dispositivo_id: Option<String>,
    pub(crate) llave_publica: Option<String>,
    pub(crate) verificaciones: Vec<Verificacion2Fa>,
    pub(crate) consentimientos: Vec<ConsentimientoUsuario>,
    pub(crate) cliente: Option<Cliente>,
}

impl_entity!(Usuario, "Usuario");

impl Usuario {
    // ========================================================================
    // Registration steps
    // ========================================================================

    /// New account in `PreRegistro` with a pending SMS code
    pub fn pre_registrar(
        codigo_pais: &str,
        telefono: &str,
        ttl: Duration,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<Self, ErrorAggregate> {
        let (codigo_pais, telefono) = validar_telefono(codigo_pais, telefono)?;
        let mut usuario = Self {
            base: EntityBase::create(actor, providers),
            codigo_pais,
            telefono,
            correo: None,
            password_hash: None,
            estatus: Estatus::PreRegistro,
            refresh_token: None,
            refresh_token_expira: None,
            dispositivo_id: None,
            llave_publica: None,
            verificaciones: Vec::new(),
            consentimientos: Vec::new(),
            cliente: None,
        };
        usuario
            .verificaciones
            .push(Verificacion2Fa::nueva(TipoVerificacion::Sms, ttl, actor, providers));
        Ok(usuario)
    }

    /// Restart an unfinished registration for the same phone
    ///
    /// Keeps the id and every earlier verification, resets the status and
    /// appends a new SMS code. A deactivated account is reactivated.
    pub fn reiniciar_registro(
        &mut self,
        ttl: Duration,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<(), ErrorAggregate> {
        if self.estatus == Estatus::RegistroCompletado {
            return Err(ErrorAggregate::single(
                "Usuario",
                ErrorCode::ClienteYaRegistrado,
            ));
        }
        if !self.base.is_active() {
            self.reactivate(actor, providers);
        }
        self.estatus = Estatus::PreRegistro;
        self.verificaciones
            .push(Verificacion2Fa::nueva(TipoVerificacion::Sms, ttl, actor, providers));
        self.touch(actor, providers);
        Ok(())
    }

    /// Confirm the most recent code sent over `tipo`
    pub fn confirmar_codigo(
        &mut self,
        tipo: TipoVerificacion,
        codigo: &str,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<(), ErrorAggregate> {
        self.ensure_active()?;
        Validator::new()
            .field(
                "codigo",
                codigo.trim(),
                &[Rule::Required, Rule::length(4, 4), Rule::Regex(&patterns::CODIGO_2FA)],
            )
            .finish()?;

        let esperado = estatus_para_codigo(tipo);
        if self.estatus != esperado {
            return Err(estatus_invalido());
        }
        let verificacion = self
            .verificaciones
            .iter_mut()
            .rev()
            .find(|v| v.tipo() == tipo && v.base.is_active())
            .ok_or_else(|| {
                ErrorAggregate::single("Verificacion2FA", ErrorCode::VerificationNotFound)
            })?;
        verificacion.marcar_como_verificado(tipo, codigo, actor, providers)?;

        self.estatus.avanzar_desde(esperado)?;
        self.touch(actor, providers);
        Ok(())
    }

    /// Issue a fresh code on `tipo` while that channel is awaiting confirmation
    pub fn reenviar_codigo(
        &mut self,
        tipo: TipoVerificacion,
        ttl: Duration,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<(), ErrorAggregate> {
        self.ensure_active()?;
        if self.estatus != estatus_para_codigo(tipo) {
            return Err(estatus_invalido());
        }
        self.verificaciones
            .push(Verificacion2Fa::nueva(tipo, ttl, actor, providers));
        self.touch(actor, providers);
        Ok(())
    }

    pub fn completar_datos_cliente(
        &mut self,
        datos: &DatosPersonales,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<(), ErrorAggregate> {
        self.ensure_active()?;
        // Validate against a scratch profile so a rejected payload leaves no trace
        let mut cliente = match &self.cliente {
            Some(actual) => actual.clone(),
            None => Cliente::nuevo(actor, providers),
        };
        cliente.agregar_datos_personales(datos, actor, providers)?;

        self.estatus.avanzar_desde(Estatus::NumeroConfirmado)?;
        self.cliente = Some(cliente);
        self.touch(actor, providers);
        Ok(())
    }

    pub fn registrar_correo(
        &mut self,
        correo: &str,
        ttl: Duration,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<(), ErrorAggregate> {
        self.ensure_active()?;
        let correo = correo.trim().to_lowercase();
        Validator::new()
            .field(
                "correo",
                &correo,
                &[Rule::Required, Rule::length(5, 150), Rule::Regex(&patterns::CORREO)],
            )
            .finish()?;

        self.estatus.avanzar_desde(Estatus::DatosClienteCompletado)?;
        self.correo = Some(correo);
        self.verificaciones
            .push(Verificacion2Fa::nueva(TipoVerificacion::Email, ttl, actor, providers));
        self.touch(actor, providers);
        Ok(())
    }

    pub fn registrar_biometricos(
        &mut self,
        dispositivo_id: &str,
        llave_publica: &str,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<(), ErrorAggregate> {
        self.ensure_active()?;
        let dispositivo_id = dispositivo_id.trim();
        let llave_publica = llave_publica.trim();
        Validator::new()
            .field("dispositivo_id", dispositivo_id, &[Rule::Required, Rule::length(1, 100)])
            .field("llave_publica", llave_publica, &[Rule::Required, Rule::length(32, 4096)])
            .finish()?;

        self.estatus.avanzar_desde(Estatus::CorreoConfirmado)?;
        self.dispositivo_id = Some(dispositivo_id.to_string());
        self.llave_publica = Some(llave_publica.to_string());
        self.touch(actor, providers);
        Ok(())
    }

    /// Record acceptance of `aceptados`; every document in `requeridos` must
    /// be among them at the required version
    pub fn aceptar_terminos(
        &mut self,
        aceptados: &[DocumentoVersion],
        requeridos: &[DocumentoVersion],
        actor: ActorId,
        providers: &Providers,
    ) -> Result<(), ErrorAggregate> {
        self.ensure_active()?;
        let mut validator = Validator::new();
        for documento in aceptados {
            validator.field(
                documento.tipo.as_str(),
                &documento.version,
                &[Rule::Required, Rule::length(1, 20)],
            );
        }
        validator.finish()?;

        if self.estatus != Estatus::DatosBiometricosRegistrado {
            return Err(estatus_invalido());
        }
        if let Some(faltante) = requeridos.iter().find(|r| {
            !aceptados
                .iter()
                .any(|a| a.tipo == r.tipo && a.version.trim() == r.version)
        }) {
            return Err(ErrorAggregate::single(
                faltante.tipo.as_str(),
                ErrorCode::ConsentRequired,
            ));
        }

        self.estatus.avanzar_desde(Estatus::DatosBiometricosRegistrado)?;
        self.consentimientos.extend(
            aceptados
                .iter()
                .map(|d| ConsentimientoUsuario::nuevo(d, actor, providers)),
        );
        self.touch(actor, providers);
        Ok(())
    }

    /// Check a password/confirmation pair before it is hashed
    pub fn validar_password(
        password: &str,
        confirmacion: &str,
        longitud_minima: usize,
    ) -> Result<(), ErrorAggregate> {
        let mut validator = Validator::new();
        validator.field(
            "password",
            password,
            &[Rule::Required, Rule::length(longitud_minima, PASSWORD_MAX)],
        );
        if validator.is_valid() {
            validator.check(
                "password",
                patterns::password_fuerte(password),
                ErrorCode::RegexInvalid,
            );
        }
        validator
            .field("confirmacion", confirmacion, &[Rule::Required])
            .finish()?;
        if password != confirmacion {
            return Err(ErrorAggregate::single(
                "confirmacion",
                ErrorCode::PasswordMismatch,
            ));
        }
        Ok(())
    }

    /// Terminal step: store the password hash and close registration
    pub fn completar_registro(
        &mut self,
        password_hash: String,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<(), ErrorAggregate> {
        self.ensure_active()?;
        self.estatus
            .avanzar_desde(Estatus::TerminosCondicionesAceptado)?;
        self.password_hash = Some(password_hash);
        self.touch(actor, providers);
        Ok(())
    }

    /// Gate for the registration flow; call before any CPU-heavy work
    pub fn requiere_estatus(&self, estatus: Estatus) -> Result<(), ErrorAggregate> {
        self.ensure_active()?;
        if self.estatus == estatus {
            Ok(())
        } else {
            Err(estatus_invalido())
        }
    }

    // ========================================================================
    // Account management (after registration)
    // ========================================================================

    pub fn cambiar_password_hash(
        &mut self,
        password_hash: String,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<(), ErrorAggregate> {
        self.requiere_estatus(Estatus::RegistroCompletado)?;
        self.password_hash = Some(password_hash);
        self.touch(actor, providers);
        Ok(())
    }

    pub fn actualizar_refresh_token(
        &mut self,
        token: &str,
        vigencia: Duration,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<(), ErrorAggregate> {
        self.ensure_active()?;
        Validator::new()
            .field("refresh_token", token, &[Rule::Required, Rule::length(16, 512)])
            .finish()?;
        self.requiere_estatus(Estatus::RegistroCompletado)?;
        self.refresh_token = Some(token.to_string());
        self.refresh_token_expira = Some(providers.now() + vigencia);
        self.touch(actor, providers);
        Ok(())
    }

    /// Mutable profile for post-registration edits
    pub fn cliente_mut(&mut self) -> Result<&mut Cliente, ErrorAggregate> {
        self.ensure_active()?;
        self.cliente
            .as_mut()
            .ok_or_else(estatus_invalido)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn codigo_pais(&self) -> &str {
        &self.codigo_pais
    }

    pub fn telefono(&self) -> &str {
        &self.telefono
    }

    pub fn correo(&self) -> Option<&str> {
        self.correo.as_deref()
    }

    pub fn password_hash(&self) -> Option<&str> {
        self.password_hash.as_deref()
    }

    pub fn estatus(&self) -> Estatus {
        self.estatus
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn refresh_token_expira(&self) -> Option<DateTime<Utc>> {
        self.refresh_token_expira
    }

    pub fn dispositivo_id(&self) -> Option<&str> {
        self.dispositivo_id.as_deref()
    }

    pub fn llave_publica(&self) -> Option<&str> {
        self.llave_publica.as_deref()
    }

    pub fn verificaciones(&self) -> &[Verificacion2Fa] {
        &self.verificaciones
    }

    pub fn consentimientos(&self) -> &[ConsentimientoUsuario] {
        &self.consentimientos
    }

    pub fn cliente(&self) -> Option<&Cliente> {
        self.cliente.as_ref()
    }

    /// Latest code issued on `tipo`, verified or not
    pub fn ultima_verificacion(&self, tipo: TipoVerificacion) -> Option<&Verificacion2Fa> {
        self.verificaciones.iter().rev().find(|v| v.tipo() == tipo)
    }

    /// `+52 5512345678`
    pub fn telefono_completo(&self) -> String {
        format!("+{} {}", self.codigo_pais, self.telefono)
    }

    // ========================================================================
    // Persistence support
    // ========================================================================

    /// Visit every entity base in the aggregate, root first
    pub(crate) fn visit_bases_mut(&mut self, f: &mut dyn FnMut(&mut EntityBase)) {
        f(&mut self.base);
        self.verificaciones.iter_mut().for_each(|v| f(&mut v.base));
        self.consentimientos.iter_mut().for_each(|c| f(&mut c.base));
        if let Some(cliente) = self.cliente.as_mut() {
            cliente.visit_bases_mut(f);
        }
    }

    /// Give every never-persisted entity in the aggregate its first token
    pub fn emitir_tokens_iniciales(&mut self, providers: &Providers) {
        self.visit_bases_mut(&mut |base| base.issue_initial_token(providers));
    }
}

/// Normalise and validate a phone number pair
pub fn validar_telefono(
    codigo_pais: &str,
    telefono: &str,
) -> Result<(String, String), ErrorAggregate> {
    let codigo_pais = codigo_pais.trim().trim_start_matches('+').to_string();
    let telefono: String = telefono.chars().filter(|c| !c.is_whitespace()).collect();
    Validator::new()
        .field(
            "codigo_pais",
            &codigo_pais,
            &[Rule::Required, Rule::length(1, 3), Rule::Regex(&patterns::CODIGO_PAIS)],
        )
        .field(
            "telefono",
            &telefono,
            &[Rule::Required, Rule::length(10, 10), Rule::Regex(&patterns::TELEFONO)],
        )
        .finish()?;
    Ok((codigo_pais, telefono))
}
