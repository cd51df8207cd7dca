//! Plumbing shared by the account services: the optimistic write cycle and
//! the event trail

use serde::Serialize;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Entity, Estatus, Providers, Usuario};
use crate::ports::{EventSink, LogEvent, UsuarioRepository};

/// What a caller needs after a successful write
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    pub usuario_id: i64,
    pub usuario_guid: Uuid,
    pub estatus: Estatus,
    pub is_active: bool,
    /// Token to present on the next write
    pub concurrency_token: String,
}

impl Receipt {
    pub fn of(usuario: &Usuario) -> Result<Self> {
        let base = usuario.base();
        Ok(Self {
            usuario_id: base
                .id()
                .ok_or_else(|| Error::database("usuario has not been persisted"))?,
            usuario_guid: base.guid(),
            estatus: usuario.estatus(),
            is_active: base.is_active(),
            concurrency_token: base
                .concurrency_token()
                .map(|t| t.to_wire())
                .ok_or_else(|| Error::database("usuario has no concurrency token"))?,
        })
    }
}

pub(crate) fn cargar(repository: &dyn UsuarioRepository, usuario_id: i64) -> Result<Usuario> {
    repository
        .get_usuario(usuario_id)?
        .ok_or_else(|| Error::not_found(format!("usuario {}", usuario_id)))
}

/// Load, check the presented token, mutate, then compare-and-set
///
/// The token check runs before `mutate`, so a stale caller gets
/// `CONCURRENCY-ERROR` ahead of any lifecycle or validation error. New
/// children created by `mutate` get their first token here.
pub(crate) fn modificar<T>(
    repository: &dyn UsuarioRepository,
    providers: &Providers,
    usuario_id: i64,
    token: &str,
    mutate: impl FnOnce(&mut Usuario) -> Result<T>,
) -> Result<(Usuario, T)> {
    let mut usuario = cargar(repository, usuario_id)?;
    let expected = usuario.check_token(token)?;
    let value = mutate(&mut usuario)?;
    usuario.emitir_tokens_iniciales(providers);
    repository.update_usuario(&mut usuario, &expected)?;
    Ok((usuario, value))
}

/// Record the outcome of one step
pub(crate) fn registrar_resultado<T>(
    events: &dyn EventSink,
    paso: &str,
    usuario_id: i64,
    result: &Result<(Usuario, T)>,
) {
    match result {
        Ok((usuario, _)) => {
            tracing::debug!(paso, usuario_id, estatus = %usuario.estatus(), "step completed");
            events.record(
                LogEvent::new("paso_completado")
                    .with_paso(paso)
                    .with_usuario(usuario.base().guid()),
            );
        }
        Err(e) => {
            tracing::debug!(paso, usuario_id, "step rejected: {}", e);
            events.record(LogEvent::new("paso_fallido").with_paso(paso).with_error(e));
        }
    }
}
