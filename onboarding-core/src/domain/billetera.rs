//! Wallet balance and movements

use std::collections::BTreeSet;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::entity::{impl_entity, ActorId, Entity, EntityBase};
use super::providers::Providers;
use super::result::{ErrorAggregate, ErrorCode};
use super::validation::{truncar_moneda, Rule, Validator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TipoMovimiento {
    Deposito,
    Retiro,
    Transferencia,
    PagoServicio,
}

impl TipoMovimiento {
    /// True when the movement takes money out of the wallet
    pub fn es_cargo(&self) -> bool {
        !matches!(self, TipoMovimiento::Deposito)
    }

    /// Commission as a fraction of the amount
    pub fn tasa_comision(&self) -> Decimal {
        match self {
            TipoMovimiento::Deposito => Decimal::ZERO,
            // 0.35%
            TipoMovimiento::Retiro => Decimal::new(35, 4),
            TipoMovimiento::Transferencia => Decimal::new(25, 4),
            TipoMovimiento::PagoServicio => Decimal::new(1, 2),
        }
    }
}

impl FromStr for TipoMovimiento {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deposito" => Ok(TipoMovimiento::Deposito),
            "retiro" => Ok(TipoMovimiento::Retiro),
            "transferencia" => Ok(TipoMovimiento::Transferencia),
            "pagoservicio" | "pago-servicio" => Ok(TipoMovimiento::PagoServicio),
            other => Err(format!("Unknown movement type: {}", other)),
        }
    }
}

/// Movement payload as submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NuevoMovimiento {
    pub tipo: TipoMovimiento,
    pub concepto: Option<String>,
    pub monto: Option<Decimal>,
    pub origen: Option<String>,
    /// Receipt file name
    pub comprobante: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovimientoBilletera {
    pub(crate) base: EntityBase,
    pub(crate) tipo: TipoMovimiento,
    pub(crate) concepto: String,
    pub(crate) monto: Decimal,
    pub(crate) comision: Decimal,
    pub(crate) origen: String,
    pub(crate) comprobante: String,
    pub(crate) saldo_resultante: Decimal,
}

impl_entity!(MovimientoBilletera, "MovimientoBilletera");

impl MovimientoBilletera {
    pub fn tipo(&self) -> TipoMovimiento {
        self.tipo
    }

    pub fn concepto(&self) -> &str {
        &self.concepto
    }

    pub fn monto(&self) -> Decimal {
        self.monto
    }

    pub fn comision(&self) -> Decimal {
        self.comision
    }

    pub fn saldo_resultante(&self) -> Decimal {
        self.saldo_resultante
    }
}

/// Per-user balance with its movement log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Billetera {
    pub(crate) base: EntityBase,
    pub(crate) usuario_guid: uuid::Uuid,
    pub(crate) saldo: Decimal,
    pub(crate) tipos_habilitados: BTreeSet<TipoMovimiento>,
    pub(crate) movimientos: Vec<MovimientoBilletera>,
}

impl_entity!(Billetera, "Billetera");

impl Billetera {
    /// Empty wallet that only accepts `tipos_habilitados`
    pub fn abrir(
        usuario_guid: uuid::Uuid,
        tipos_habilitados: impl IntoIterator<Item = TipoMovimiento>,
        actor: ActorId,
        providers: &Providers,
    ) -> Self {
        Self {
            base: EntityBase::create(actor, providers),
            usuario_guid,
            saldo: Decimal::ZERO,
            tipos_habilitados: tipos_habilitados.into_iter().collect(),
            movimientos: Vec::new(),
        }
    }

    pub fn usuario_guid(&self) -> uuid::Uuid {
        self.usuario_guid
    }

    pub fn saldo(&self) -> Decimal {
        self.saldo
    }

    pub fn movimientos(&self) -> &[MovimientoBilletera] {
        &self.movimientos
    }

    pub fn habilitar(
        &mut self,
        tipo: TipoMovimiento,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<(), ErrorAggregate> {
        self.ensure_active()?;
        if self.tipos_habilitados.insert(tipo) {
            self.touch(actor, providers);
        }
        Ok(())
    }

    /// Apply a movement and return it
    ///
    /// Charges pay a commission truncated to cents; the charge plus its
    /// commission must be covered by the balance. Amounts that would leave
    /// the decimal range are rejected and the wallet is left untouched.
    pub fn registrar_movimiento(
        &mut self,
        nuevo: &NuevoMovimiento,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<MovimientoBilletera, ErrorAggregate> {
        self.ensure_active()?;
        Validator::new()
            .field("concepto", &nuevo.concepto, &[Rule::Required, Rule::length(1, 200)])
            .field(
                "monto",
                nuevo.monto,
                &[Rule::Required, Rule::positive(), Rule::decimals(2)],
            )
            .field("origen", &nuevo.origen, &[Rule::Required, Rule::length(1, 100)])
            .field("comprobante", &nuevo.comprobante, &[Rule::Required, Rule::length(1, 255)])
            .finish()?;

        if !self.tipos_habilitados.contains(&nuevo.tipo) {
            return Err(ErrorAggregate::single(
                "tipo",
                ErrorCode::TransactionTypeUnavailable,
            ));
        }

        let monto = nuevo.monto.unwrap_or_default();
        let comision = monto
            .checked_mul(nuevo.tipo.tasa_comision())
            .map(truncar_moneda)
            .ok_or_else(fuera_de_rango)?;
        let saldo = if nuevo.tipo.es_cargo() {
            let cargo = monto.checked_add(comision).ok_or_else(fuera_de_rango)?;
            if cargo > self.saldo {
                return Err(ErrorAggregate::single("saldo", ErrorCode::InsufficientFunds));
            }
            self.saldo.checked_sub(cargo).ok_or_else(fuera_de_rango)?
        } else {
            self.saldo.checked_add(monto).ok_or_else(fuera_de_rango)?
        };

        let movimiento = MovimientoBilletera {
            base: EntityBase::create(actor, providers),
            tipo: nuevo.tipo,
            concepto: nuevo.concepto.as_deref().unwrap_or_default().trim().to_string(),
            monto,
            comision,
            origen: nuevo.origen.as_deref().unwrap_or_default().trim().to_string(),
            comprobante: nuevo
                .comprobante
                .as_deref()
                .unwrap_or_default()
                .trim()
                .to_string(),
            saldo_resultante: saldo,
        };
        self.saldo = saldo;
        self.movimientos.push(movimiento.clone());
        self.touch(actor, providers);
        Ok(movimiento)
    }
}

fn fuera_de_rango() -> ErrorAggregate {
    ErrorAggregate::single("monto", ErrorCode::AmountOutOfRange)
}
