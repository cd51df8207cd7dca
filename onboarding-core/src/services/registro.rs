//! Registration service - drives a Usuario through the onboarding steps
//!
//! Every step after the first presents the usuario id and the token from the
//! previous receipt. Code deliveries are fire-and-forget: a failing notifier
//! is logged and never undoes the step.

use std::sync::Arc;

use crate::config::Config;
use crate::domain::result::{Error, ErrorAggregate, ErrorCode, Result};
use crate::domain::usuario::validar_telefono;
use crate::domain::{
    ActorId, DatosPersonales, DocumentoVersion, Entity, Estatus, Providers, TipoVerificacion,
    Usuario,
};
use crate::ports::{
    CodeMessage, CodeNotifier, EventSink, LogEvent, PasswordHasher, UsuarioRepository,
};

use super::support::{modificar, registrar_resultado, Receipt};

pub struct RegistroService {
    repository: Arc<dyn UsuarioRepository>,
    notifier: Arc<dyn CodeNotifier>,
    hasher: Arc<dyn PasswordHasher>,
    events: Arc<dyn EventSink>,
    providers: Providers,
    config: Config,
}

impl RegistroService {
    pub fn new(
        repository: Arc<dyn UsuarioRepository>,
        notifier: Arc<dyn CodeNotifier>,
        hasher: Arc<dyn PasswordHasher>,
        events: Arc<dyn EventSink>,
        providers: Providers,
        config: Config,
    ) -> Self {
        Self {
            repository,
            notifier,
            hasher,
            events,
            providers,
            config,
        }
    }

    /// Start (or restart) registration for a phone number and send an SMS code
    ///
    /// An unfinished registration for the same phone is resumed: the account
    /// keeps its id, goes back to `PreRegistro` and gets a new code.
    pub fn pre_registro(
        &self,
        codigo_pais: &str,
        telefono: &str,
        actor: ActorId,
    ) -> Result<Receipt> {
        let result = self.pre_registro_inner(codigo_pais, telefono, actor);
        match &result {
            Ok(usuario) => {
                tracing::debug!(usuario_id = ?usuario.base().id(), "pre-registration stored");
                self.events.record(
                    LogEvent::new("paso_completado")
                        .with_paso("pre_registro")
                        .with_usuario(usuario.base().guid())
                        .with_telefono(usuario.codigo_pais(), usuario.telefono()),
                );
                self.notificar(usuario, TipoVerificacion::Sms, "pre_registro");
            }
            Err(e) => {
                let mut event = LogEvent::new("paso_fallido").with_paso("pre_registro");
                if let Ok((cp, tel)) = validar_telefono(codigo_pais, telefono) {
                    event = event.with_telefono(&cp, &tel);
                }
                self.events.record(event.with_error(e));
            }
        }
        Receipt::of(&result?)
    }

    fn pre_registro_inner(
        &self,
        codigo_pais: &str,
        telefono: &str,
        actor: ActorId,
    ) -> Result<Usuario> {
        let (codigo_pais, telefono) = validar_telefono(codigo_pais, telefono)?;
        let ttl = self.config.codigo_ttl();

        match self
            .repository
            .get_usuario_por_telefono(&codigo_pais, &telefono)?
        {
            Some(mut usuario) => {
                let expected = *usuario
                    .base()
                    .concurrency_token()
                    .ok_or_else(|| Error::database("stored usuario has no concurrency token"))?;
                usuario.reiniciar_registro(ttl, actor, &self.providers)?;
                usuario.emitir_tokens_iniciales(&self.providers);
                self.repository.update_usuario(&mut usuario, &expected)?;
                Ok(usuario)
            }
            None => {
                let mut usuario =
                    Usuario::pre_registrar(&codigo_pais, &telefono, ttl, actor, &self.providers)?;
                usuario.emitir_tokens_iniciales(&self.providers);
                match self.repository.insert_usuario(&mut usuario) {
                    Ok(()) => Ok(usuario),
                    Err(e) if e.has_code(ErrorCode::ClienteYaRegistrado) => {
                        Err(self.insercion_duplicada(&codigo_pais, &telefono, e))
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Another caller inserted the same phone between lookup and insert
    ///
    /// Only a finished registration is reported as already registered; an
    /// account still in progress means this caller lost the race.
    fn insercion_duplicada(&self, codigo_pais: &str, telefono: &str, original: Error) -> Error {
        match self.repository.get_usuario_por_telefono(codigo_pais, telefono) {
            Ok(Some(existente)) if existente.estatus() == Estatus::RegistroCompletado => original,
            Ok(Some(_)) => ErrorAggregate::concurrency("Usuario").into(),
            Ok(None) => original,
            Err(e) => e,
        }
    }

    /// Confirm the latest code sent over `tipo`
    pub fn confirmar_codigo(
        &self,
        usuario_id: i64,
        tipo: TipoVerificacion,
        codigo: &str,
        actor: ActorId,
        token: &str,
    ) -> Result<Receipt> {
        let paso = match tipo {
            TipoVerificacion::Sms => "confirmar_sms",
            TipoVerificacion::Email => "confirmar_correo",
        };
        let result = modificar(
            self.repository.as_ref(),
            &self.providers,
            usuario_id,
            token,
            |u| Ok(u.confirmar_codigo(tipo, codigo, actor, &self.providers)?),
        );
        registrar_resultado(self.events.as_ref(), paso, usuario_id, &result);
        Receipt::of(&result?.0)
    }

    /// Issue a fresh code on a channel that is still awaiting confirmation
    pub fn reenviar_codigo(
        &self,
        usuario_id: i64,
        tipo: TipoVerificacion,
        actor: ActorId,
        token: &str,
    ) -> Result<Receipt> {
        let ttl = self.config.codigo_ttl();
        let result = modificar(
            self.repository.as_ref(),
            &self.providers,
            usuario_id,
            token,
            |u| Ok(u.reenviar_codigo(tipo, ttl, actor, &self.providers)?),
        );
        registrar_resultado(self.events.as_ref(), "reenviar_codigo", usuario_id, &result);
        let (usuario, _) = result?;
        self.notificar(&usuario, tipo, "reenviar_codigo");
        Receipt::of(&usuario)
    }

    pub fn completar_datos_cliente(
        &self,
        usuario_id: i64,
        datos: &DatosPersonales,
        actor: ActorId,
        token: &str,
    ) -> Result<Receipt> {
        let result = modificar(
            self.repository.as_ref(),
            &self.providers,
            usuario_id,
            token,
            |u| Ok(u.completar_datos_cliente(datos, actor, &self.providers)?),
        );
        registrar_resultado(self.events.as_ref(), "datos_cliente", usuario_id, &result);
        Receipt::of(&result?.0)
    }

    /// Register the email address and send a code to it
    pub fn registrar_correo(
        &self,
        usuario_id: i64,
        correo: &str,
        actor: ActorId,
        token: &str,
    ) -> Result<Receipt> {
        let ttl = self.config.codigo_ttl();
        let result = modificar(
            self.repository.as_ref(),
            &self.providers,
            usuario_id,
            token,
            |u| Ok(u.registrar_correo(correo, ttl, actor, &self.providers)?),
        );
        registrar_resultado(self.events.as_ref(), "registrar_correo", usuario_id, &result);
        let (usuario, _) = result?;
        self.notificar(&usuario, TipoVerificacion::Email, "registrar_correo");
        Receipt::of(&usuario)
    }

    pub fn registrar_biometricos(
        &self,
        usuario_id: i64,
        dispositivo_id: &str,
        llave_publica: &str,
        actor: ActorId,
        token: &str,
    ) -> Result<Receipt> {
        let result = modificar(
            self.repository.as_ref(),
            &self.providers,
            usuario_id,
            token,
            |u| {
                Ok(u.registrar_biometricos(dispositivo_id, llave_publica, actor, &self.providers)?)
            },
        );
        registrar_resultado(self.events.as_ref(), "biometricos", usuario_id, &result);
        Receipt::of(&result?.0)
    }

    /// Accept legal documents; the configured required set must be covered
    pub fn aceptar_terminos(
        &self,
        usuario_id: i64,
        aceptados: &[DocumentoVersion],
        actor: ActorId,
        token: &str,
    ) -> Result<Receipt> {
        let requeridos = &self.config.documentos_requeridos;
        let result = modificar(
            self.repository.as_ref(),
            &self.providers,
            usuario_id,
            token,
            |u| Ok(u.aceptar_terminos(aceptados, requeridos, actor, &self.providers)?),
        );
        registrar_resultado(self.events.as_ref(), "aceptar_terminos", usuario_id, &result);
        Receipt::of(&result?.0)
    }

    /// Terminal step: set the password
    ///
    /// The password is validated and the status checked before anything is
    /// hashed.
    pub fn completar_registro(
        &self,
        usuario_id: i64,
        password: &str,
        confirmacion: &str,
        actor: ActorId,
        token: &str,
    ) -> Result<Receipt> {
        let longitud_minima = self.config.password_longitud_minima;
        let result = modificar(
            self.repository.as_ref(),
            &self.providers,
            usuario_id,
            token,
            |u| {
                u.ensure_active()?;
                Usuario::validar_password(password, confirmacion, longitud_minima)?;
                u.requiere_estatus(Estatus::TerminosCondicionesAceptado)?;
                let hash = self.hasher.hash(password)?;
                Ok(u.completar_registro(hash, actor, &self.providers)?)
            },
        );
        registrar_resultado(self.events.as_ref(), "completar_registro", usuario_id, &result);
        Receipt::of(&result?.0)
    }

    /// Hand the latest code of `tipo` to the notifier; failures are logged only
    fn notificar(&self, usuario: &Usuario, tipo: TipoVerificacion, paso: &str) {
        let Some(verificacion) = usuario.ultima_verificacion(tipo) else {
            return;
        };
        let destino = match tipo {
            TipoVerificacion::Sms => usuario.telefono_completo(),
            TipoVerificacion::Email => usuario.correo().unwrap_or_default().to_string(),
        };
        let mensaje = CodeMessage {
            tipo,
            destino,
            codigo: verificacion.codigo().to_string(),
            proveedor_referencia: verificacion.proveedor_referencia().to_string(),
        };
        if let Err(e) = self.notifier.send(&mensaje) {
            tracing::warn!(paso, tipo = %tipo, "code delivery failed: {}", e);
            self.events.record(
                LogEvent::new("notificacion_fallida")
                    .with_paso(paso)
                    .with_usuario(usuario.base().guid())
                    .with_error(&e),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryRepository, MemoryNotifier};
    use crate::adapters::system::{ManualClock, StdRandom};
    use crate::domain::result::ErrorCode;
    use crate::domain::SYSTEM_ACTOR;
    use crate::ports::NoopSink;
    use chrono::{TimeZone, Utc};

    /// Stores the password reversed; enough to tell hashed from plain
    struct ReverseHasher;

    impl PasswordHasher for ReverseHasher {
        fn hash(&self, password: &str) -> Result<String> {
            Ok(password.chars().rev().collect())
        }

        fn verify(&self, password: &str, hash: &str) -> Result<bool> {
            Ok(password.chars().rev().collect::<String>() == hash)
        }
    }

    struct Fixture {
        service: RegistroService,
        notifier: Arc<MemoryNotifier>,
        repository: Arc<InMemoryRepository>,
    }

    fn fixture() -> Fixture {
        let repository = Arc::new(InMemoryRepository::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 4, 2, 15, 0, 0).unwrap());
        let providers = Providers::new(Arc::new(clock), Arc::new(StdRandom::seeded(11)));
        let service = RegistroService::new(
            repository.clone(),
            notifier.clone(),
            Arc::new(ReverseHasher),
            Arc::new(NoopSink),
            providers,
            Config::default(),
        );
        Fixture {
            service,
            notifier,
            repository,
        }
    }

    #[test]
    fn test_pre_registro_sends_sms() {
        let f = fixture();
        let receipt = f.service.pre_registro("+52", "55 1234 5678", SYSTEM_ACTOR).unwrap();
        assert_eq!(receipt.estatus, Estatus::PreRegistro);

        let codigo = f.notifier.last_code("+52 5512345678").unwrap();
        assert_eq!(codigo.len(), 4);
        assert_eq!(f.repository.count_usuarios().unwrap(), 1);
    }

    #[test]
    fn test_confirm_with_stale_token_is_concurrency_error() {
        let f = fixture();
        let first = f.service.pre_registro("52", "5512345678", SYSTEM_ACTOR).unwrap();
        let codigo = f.notifier.last_code("+52 5512345678").unwrap();

        let second = f
            .service
            .confirmar_codigo(first.usuario_id, TipoVerificacion::Sms, &codigo, SYSTEM_ACTOR, &first.concurrency_token)
            .unwrap();
        assert_eq!(second.estatus, Estatus::NumeroConfirmado);
        assert_ne!(second.concurrency_token, first.concurrency_token);

        let err = f
            .service
            .completar_datos_cliente(first.usuario_id, &DatosPersonales::default(), SYSTEM_ACTOR, &first.concurrency_token)
            .unwrap_err();
        assert_eq!(err.codes(), vec![ErrorCode::ConcurrencyError]);
    }

    #[test]
    fn test_notifier_outage_does_not_fail_step() {
        let f = fixture();
        f.notifier.set_failing(true);
        let receipt = f.service.pre_registro("52", "5512345678", SYSTEM_ACTOR).unwrap();
        assert_eq!(receipt.estatus, Estatus::PreRegistro);
        assert!(f.notifier.sent().is_empty());
    }

    #[test]
    fn test_weak_password_is_rejected_before_hashing() {
        let f = fixture();
        let receipt = f.service.pre_registro("52", "5512345678", SYSTEM_ACTOR).unwrap();
        let err = f
            .service
            .completar_registro(receipt.usuario_id, "corta", "corta", SYSTEM_ACTOR, &receipt.concurrency_token)
            .unwrap_err();
        assert!(err.has_code(ErrorCode::LengthInvalid));

        // A valid password still fails on status, not on hashing
        let err = f
            .service
            .completar_registro(receipt.usuario_id, "Segura#2025", "Segura#2025", SYSTEM_ACTOR, &receipt.concurrency_token)
            .unwrap_err();
        assert_eq!(err.codes(), vec![ErrorCode::StatusInvalid]);
    }

    #[test]
    fn test_unknown_usuario_is_not_found() {
        let f = fixture();
        let err = f
            .service
            .reenviar_codigo(99, TipoVerificacion::Sms, SYSTEM_ACTOR, "AAAAAAAAAAA=")
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
