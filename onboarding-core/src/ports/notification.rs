//! Notification port - delivery of verification codes

use serde::{Deserialize, Serialize};

use crate::domain::result::Result;
use crate::domain::TipoVerificacion;

/// A code ready to be delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeMessage {
    pub tipo: TipoVerificacion,
    /// Phone (`+52 5512345678`) or email address
    pub destino: String,
    pub codigo: String,
    pub proveedor_referencia: String,
}

/// Fire-and-forget delivery
///
/// Callers log a failed delivery and carry on; the transition that produced
/// the code is never rolled back because of it.
pub trait CodeNotifier: Send + Sync {
    fn send(&self, message: &CodeMessage) -> Result<()>;
}
