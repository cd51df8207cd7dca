//! Two-factor verification codes

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{impl_entity, ActorId, Entity, EntityBase};
use super::providers::{Providers, RandomSource};
use super::result::{ErrorAggregate, ErrorCode};

/// Number of digits in a code
pub const LONGITUD_CODIGO: usize = 4;

const ENTIDAD: &str = "Verificacion2FA";

/// Delivery channel of a code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TipoVerificacion {
    Sms,
    Email,
}

impl TipoVerificacion {
    pub fn as_str(&self) -> &'static str {
        match self {
            TipoVerificacion::Sms => "sms",
            TipoVerificacion::Email => "email",
        }
    }
}

impl fmt::Display for TipoVerificacion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TipoVerificacion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sms" => Ok(TipoVerificacion::Sms),
            "email" | "correo" => Ok(TipoVerificacion::Email),
            other => Err(format!("Unknown verification channel: {}", other)),
        }
    }
}

/// Draw a code of [`LONGITUD_CODIGO`] digits, each in `1..=9`
pub fn generar_codigo(random: &dyn RandomSource) -> String {
    (0..LONGITUD_CODIGO)
        .map(|_| char::from(b'0' + random.range_inclusive(1, 9)))
        .collect()
}

/// A short-lived code sent over one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verificacion2Fa {
    pub(crate) base: EntityBase,
    pub(crate) proveedor_referencia: String,
    pub(crate) codigo: String,
    pub(crate) expira: DateTime<Utc>,
    pub(crate) tipo: TipoVerificacion,
    pub(crate) verificado: bool,
}

impl_entity!(Verificacion2Fa, "Verificacion2FA");

impl Verificacion2Fa {
    /// Fresh pending verification expiring `ttl` from now
    pub fn nueva(
        tipo: TipoVerificacion,
        ttl: Duration,
        actor: ActorId,
        providers: &Providers,
    ) -> Self {
        let base = EntityBase::create(actor, providers);
        Self {
            proveedor_referencia: providers.new_guid().simple().to_string(),
            codigo: generar_codigo(providers.random()),
            expira: base.created_at() + ttl,
            tipo,
            verificado: false,
            base,
        }
    }

    pub fn proveedor_referencia(&self) -> &str {
        &self.proveedor_referencia
    }

    pub fn codigo(&self) -> &str {
        &self.codigo
    }

    pub fn expira(&self) -> DateTime<Utc> {
        self.expira
    }

    pub fn tipo(&self) -> TipoVerificacion {
        self.tipo
    }

    pub fn verificado(&self) -> bool {
        self.verificado
    }

    pub fn expirada(&self, now: DateTime<Utc>) -> bool {
        now >= self.expira
    }

    /// Accept `codigo` if the channel matches, the code is still live and
    /// equal, and it was not used before
    pub fn marcar_como_verificado(
        &mut self,
        tipo: TipoVerificacion,
        codigo: &str,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<(), ErrorAggregate> {
        self.ensure_active()?;
        if self.verificado {
            return Err(ErrorAggregate::single(
                ENTIDAD,
                ErrorCode::VerificationAlreadyVerified,
            ));
        }
        if self.tipo != tipo {
            return Err(ErrorAggregate::single(ENTIDAD, ErrorCode::VerificationNotFound));
        }
        if self.expirada(providers.now()) {
            return Err(ErrorAggregate::single(ENTIDAD, ErrorCode::VerificationExpired));
        }
        if self.codigo != codigo.trim() {
            return Err(ErrorAggregate::single(
                ENTIDAD,
                ErrorCode::VerificationCodeMismatch,
            ));
        }
        self.verificado = true;
        self.touch(actor, providers);
        Ok(())
    }
}
