//! Account service - lifecycle and credentials of a registered Usuario

use std::sync::Arc;

use chrono::Duration;

use crate::config::Config;
use crate::domain::result::{ErrorAggregate, ErrorCode, Result};
use crate::domain::{ActorId, Entity, Estatus, Providers, Usuario};
use crate::ports::{EventSink, PasswordHasher, UsuarioRepository};

use super::support::{cargar, modificar, registrar_resultado, Receipt};

pub struct CuentaService {
    repository: Arc<dyn UsuarioRepository>,
    hasher: Arc<dyn PasswordHasher>,
    events: Arc<dyn EventSink>,
    providers: Providers,
    config: Config,
}

impl CuentaService {
    pub fn new(
        repository: Arc<dyn UsuarioRepository>,
        hasher: Arc<dyn PasswordHasher>,
        events: Arc<dyn EventSink>,
        providers: Providers,
        config: Config,
    ) -> Self {
        Self {
            repository,
            hasher,
            events,
            providers,
            config,
        }
    }

    /// Fresh copy of the aggregate
    pub fn obtener(&self, usuario_id: i64) -> Result<Usuario> {
        cargar(self.repository.as_ref(), usuario_id)
    }

    pub fn obtener_por_telefono(&self, codigo_pais: &str, telefono: &str) -> Result<Option<Usuario>> {
        let (codigo_pais, telefono) =
            crate::domain::usuario::validar_telefono(codigo_pais, telefono)?;
        self.repository
            .get_usuario_por_telefono(&codigo_pais, &telefono)
    }

    /// Soft delete; a deactivated account rejects every step until reactivated
    pub fn desactivar(&self, usuario_id: i64, actor: ActorId, token: &str) -> Result<Receipt> {
        let result = modificar(
            self.repository.as_ref(),
            &self.providers,
            usuario_id,
            token,
            |u| Ok(u.deactivate(actor, &self.providers)?),
        );
        registrar_resultado(self.events.as_ref(), "desactivar", usuario_id, &result);
        Receipt::of(&result?.0)
    }

    pub fn reactivar(&self, usuario_id: i64, actor: ActorId, token: &str) -> Result<Receipt> {
        let result = modificar(
            self.repository.as_ref(),
            &self.providers,
            usuario_id,
            token,
            |u| {
                u.reactivate(actor, &self.providers);
                Ok(())
            },
        );
        registrar_resultado(self.events.as_ref(), "reactivar", usuario_id, &result);
        Receipt::of(&result?.0)
    }

    /// Store the session refresh token issued by the auth layer
    pub fn actualizar_refresh_token(
        &self,
        usuario_id: i64,
        refresh_token: &str,
        vigencia: Duration,
        actor: ActorId,
        token: &str,
    ) -> Result<Receipt> {
        let result = modificar(
            self.repository.as_ref(),
            &self.providers,
            usuario_id,
            token,
            |u| Ok(u.actualizar_refresh_token(refresh_token, vigencia, actor, &self.providers)?),
        );
        registrar_resultado(self.events.as_ref(), "refresh_token", usuario_id, &result);
        Receipt::of(&result?.0)
    }

    /// Replace the password after checking the current one
    pub fn cambiar_password(
        &self,
        usuario_id: i64,
        actual: &str,
        nueva: &str,
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
                Usuario::validar_password(nueva, confirmacion, longitud_minima)?;
                u.requiere_estatus(Estatus::RegistroCompletado)?;
                let vigente = u.password_hash().unwrap_or_default();
                if !self.hasher.verify(actual, vigente)? {
                    return Err(ErrorAggregate::single(
                        "password_actual",
                        ErrorCode::PasswordIncorrect,
                    )
                    .into());
                }
                let hash = self.hasher.hash(nueva)?;
                Ok(u.cambiar_password_hash(hash, actor, &self.providers)?)
            },
        );
        registrar_resultado(self.events.as_ref(), "cambiar_password", usuario_id, &result);
        Receipt::of(&result?.0)
    }

    /// Check a phone/password pair of a completed, active account
    pub fn verificar_credenciales(
        &self,
        codigo_pais: &str,
        telefono: &str,
        password: &str,
    ) -> Result<bool> {
        let Some(usuario) = self.obtener_por_telefono(codigo_pais, telefono)? else {
            return Ok(false);
        };
        if usuario.requiere_estatus(Estatus::RegistroCompletado).is_err() {
            return Ok(false);
        }
        match usuario.password_hash() {
            Some(hash) => self.hasher.verify(password, hash),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRepository;
    use crate::adapters::system::{ManualClock, StdRandom};
    use crate::domain::result::Error;
    use crate::domain::{TipoVerificacion, SYSTEM_ACTOR};
    use crate::ports::NoopSink;
    use chrono::{TimeZone, Utc};

    struct PlainHasher;

    impl PasswordHasher for PlainHasher {
        fn hash(&self, password: &str) -> Result<String> {
            Ok(format!("plain${}", password))
        }

        fn verify(&self, password: &str, hash: &str) -> Result<bool> {
            Ok(hash == format!("plain${}", password))
        }
    }

    fn setup() -> (CuentaService, Arc<InMemoryRepository>, Providers) {
        let repository = Arc::new(InMemoryRepository::new());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 4, 2, 15, 0, 0).unwrap());
        let providers = Providers::new(Arc::new(clock), Arc::new(StdRandom::seeded(5)));
        let service = CuentaService::new(
            repository.clone(),
            Arc::new(PlainHasher),
            Arc::new(NoopSink),
            providers.clone(),
            Config::default(),
        );
        (service, repository, providers)
    }

    fn pre_registrado(repository: &InMemoryRepository, p: &Providers) -> Receipt {
        let mut u = Usuario::pre_registrar("52", "5512345678", Duration::minutes(10), SYSTEM_ACTOR, p)
            .unwrap();
        u.emitir_tokens_iniciales(p);
        repository.insert_usuario(&mut u).unwrap();
        Receipt::of(&u).unwrap()
    }

    #[test]
    fn test_deactivate_then_reactivate() {
        let (service, repository, p) = setup();
        let receipt = pre_registrado(&repository, &p);

        let off = service.desactivar(receipt.usuario_id, SYSTEM_ACTOR, &receipt.concurrency_token).unwrap();
        assert!(!off.is_active);

        // Inactive accounts reject a second deactivation
        let err = service
            .desactivar(receipt.usuario_id, SYSTEM_ACTOR, &off.concurrency_token)
            .unwrap_err();
        assert_eq!(err.codes(), vec![ErrorCode::EntityInactive]);

        let on = service.reactivar(receipt.usuario_id, SYSTEM_ACTOR, &off.concurrency_token).unwrap();
        assert!(on.is_active);
        assert_ne!(on.concurrency_token, off.concurrency_token);
    }

    #[test]
    fn test_refresh_token_requires_completed_registration() {
        let (service, repository, p) = setup();
        let receipt = pre_registrado(&repository, &p);
        let err = service
            .actualizar_refresh_token(
                receipt.usuario_id,
                "rt_0123456789abcdef",
                Duration::days(30),
                SYSTEM_ACTOR,
                &receipt.concurrency_token,
            )
            .unwrap_err();
        assert_eq!(err.codes(), vec![ErrorCode::StatusInvalid]);
    }

    #[test]
    fn test_credentials_of_unfinished_account() {
        let (service, repository, p) = setup();
        pre_registrado(&repository, &p);
        assert!(!service.verificar_credenciales("52", "5512345678", "Clave2025").unwrap());
        assert!(!service.verificar_credenciales("52", "5500000000", "Clave2025").unwrap());
        let usuario = service.obtener_por_telefono("+52", "55 1234 5678").unwrap().unwrap();
        assert!(usuario.ultima_verificacion(TipoVerificacion::Sms).is_some());
    }

    #[test]
    fn test_obtener_unknown() {
        let (service, _, _) = setup();
        assert!(matches!(service.obtener(7), Err(Error::NotFound(_))));
    }
}
