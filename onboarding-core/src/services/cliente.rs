//! Customer profile service
//!
//! Profile records hang off the Usuario aggregate, so every change is
//! guarded by the Usuario token and rotates it.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    ActorId, DatosDireccion, Entity, NuevaActividad, NuevaTarjeta, NuevaValidacion, Providers,
    TipoDocumentoCliente, Usuario,
};
use crate::ports::{EventSink, UsuarioRepository};

use super::support::{modificar, registrar_resultado, Receipt};

pub struct ClienteService {
    repository: Arc<dyn UsuarioRepository>,
    events: Arc<dyn EventSink>,
    providers: Providers,
}

impl ClienteService {
    pub fn new(
        repository: Arc<dyn UsuarioRepository>,
        events: Arc<dyn EventSink>,
        providers: Providers,
    ) -> Self {
        Self {
            repository,
            events,
            providers,
        }
    }

    /// Apply `cambio` to the profile and touch the root
    fn editar<T>(
        &self,
        paso: &str,
        usuario_id: i64,
        actor: ActorId,
        token: &str,
        cambio: impl FnOnce(&mut crate::domain::Cliente, &Providers) -> Result<T>,
    ) -> Result<(Receipt, T)> {
        let result = modificar(
            self.repository.as_ref(),
            &self.providers,
            usuario_id,
            token,
            |u: &mut Usuario| {
                let value = cambio(u.cliente_mut()?, &self.providers)?;
                u.touch(actor, &self.providers);
                Ok(value)
            },
        );
        registrar_resultado(self.events.as_ref(), paso, usuario_id, &result);
        let (usuario, value) = result?;
        Ok((Receipt::of(&usuario)?, value))
    }

    pub fn asignar_direccion(
        &self,
        usuario_id: i64,
        datos: &DatosDireccion,
        actor: ActorId,
        token: &str,
    ) -> Result<Receipt> {
        self.editar("asignar_direccion", usuario_id, actor, token, |c, p| {
            Ok(c.asignar_direccion(datos, actor, p)?)
        })
        .map(|(receipt, ())| receipt)
    }

    /// Returns the new card's guid
    pub fn vincular_tarjeta(
        &self,
        usuario_id: i64,
        tarjeta: &NuevaTarjeta,
        actor: ActorId,
        token: &str,
    ) -> Result<(Receipt, Uuid)> {
        self.editar("vincular_tarjeta", usuario_id, actor, token, |c, p| {
            Ok(c.vincular_tarjeta(tarjeta, actor, p)?)
        })
    }

    pub fn desvincular_tarjeta(
        &self,
        usuario_id: i64,
        tarjeta_guid: Uuid,
        actor: ActorId,
        token: &str,
    ) -> Result<Receipt> {
        self.editar("desvincular_tarjeta", usuario_id, actor, token, |c, p| {
            if c.desvincular_tarjeta(tarjeta_guid, actor, p)? {
                Ok(())
            } else {
                Err(Error::not_found(format!("tarjeta {}", tarjeta_guid)))
            }
        })
        .map(|(receipt, ())| receipt)
    }

    /// Attach a document; only its hash and size are kept
    pub fn adjuntar_documento(
        &self,
        usuario_id: i64,
        tipo: TipoDocumentoCliente,
        nombre_archivo: &str,
        contenido: &[u8],
        actor: ActorId,
        token: &str,
    ) -> Result<(Receipt, Uuid)> {
        self.editar("adjuntar_documento", usuario_id, actor, token, |c, p| {
            Ok(c.adjuntar_documento(tipo, nombre_archivo, contenido, actor, p)?)
        })
    }

    pub fn agregar_actividad_economica(
        &self,
        usuario_id: i64,
        actividad: &NuevaActividad,
        actor: ActorId,
        token: &str,
    ) -> Result<(Receipt, Uuid)> {
        self.editar("actividad_economica", usuario_id, actor, token, |c, p| {
            Ok(c.agregar_actividad_economica(actividad, actor, p)?)
        })
    }

    pub fn registrar_validacion_checkton(
        &self,
        usuario_id: i64,
        validacion: &NuevaValidacion,
        actor: ActorId,
        token: &str,
    ) -> Result<(Receipt, Uuid)> {
        self.editar("validacion_checkton", usuario_id, actor, token, |c, p| {
            Ok(c.registrar_validacion_checkton(validacion, actor, p)?)
        })
    }
}
