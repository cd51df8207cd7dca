//! Repository port - persistence of the Usuario aggregate

use crate::domain::result::Result;
use crate::domain::{ConcurrencyToken, Usuario};

/// Storage for [`Usuario`] aggregates (verifications, consents and profile
/// travel with the root)
///
/// Implementations assign surrogate ids to every entity in the graph that
/// does not have one yet.
pub trait UsuarioRepository: Send + Sync {
    /// Persist a brand-new aggregate
    ///
    /// Fails with `CLIENTE-YA-REGISTRADO` when the phone is already taken.
    fn insert_usuario(&self, usuario: &mut Usuario) -> Result<()>;

    /// Load by surrogate id
    fn get_usuario(&self, id: i64) -> Result<Option<Usuario>>;

    /// Load by the unique `(codigo_pais, telefono)` key
    fn get_usuario_por_telefono(&self, codigo_pais: &str, telefono: &str)
        -> Result<Option<Usuario>>;

    /// Atomic compare-and-set: write `usuario` only if the stored token still
    /// equals `expected`, otherwise fail with `CONCURRENCY-ERROR`
    fn update_usuario(&self, usuario: &mut Usuario, expected: &ConcurrencyToken) -> Result<()>;

    /// Number of stored accounts
    fn count_usuarios(&self) -> Result<u64>;
}
