//! In-memory adapters for tests and embedding

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::domain::result::{Error, ErrorAggregate, ErrorCode, Result};
use crate::domain::{ConcurrencyToken, Entity, Usuario};
use crate::ports::{CodeMessage, CodeNotifier, UsuarioRepository};

#[derive(Debug, Default)]
struct MemoryState {
    usuarios: HashMap<i64, Usuario>,
    next_id: i64,
}

impl MemoryState {
    fn assign_ids(&mut self, usuario: &mut Usuario) {
        let next_id = &mut self.next_id;
        usuario.visit_bases_mut(&mut |base| {
            if base.id().is_none() {
                *next_id += 1;
                base.assign_id(*next_id);
            }
        });
    }
}

/// Repository backed by a `HashMap` behind a mutex
///
/// The compare-and-set happens under the lock, so it is as atomic as the
/// storage-level one.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: Mutex<MemoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }
}

impl UsuarioRepository for InMemoryRepository {
    fn insert_usuario(&self, usuario: &mut Usuario) -> Result<()> {
        let mut state = self.lock()?;
        let taken = state.usuarios.values().any(|u| {
            u.codigo_pais() == usuario.codigo_pais() && u.telefono() == usuario.telefono()
        });
        if taken {
            return Err(ErrorAggregate::single("Usuario", ErrorCode::ClienteYaRegistrado).into());
        }
        state.assign_ids(usuario);
        let id = usuario
            .base()
            .id()
            .ok_or_else(|| Error::database("usuario without id after insert"))?;
        state.usuarios.insert(id, usuario.clone());
        Ok(())
    }

    fn get_usuario(&self, id: i64) -> Result<Option<Usuario>> {
        Ok(self.lock()?.usuarios.get(&id).cloned())
    }

    fn get_usuario_por_telefono(
        &self,
        codigo_pais: &str,
        telefono: &str,
    ) -> Result<Option<Usuario>> {
        Ok(self
            .lock()?
            .usuarios
            .values()
            .find(|u| u.codigo_pais() == codigo_pais && u.telefono() == telefono)
            .cloned())
    }

    fn update_usuario(&self, usuario: &mut Usuario, expected: &ConcurrencyToken) -> Result<()> {
        let id = usuario
            .base()
            .id()
            .ok_or_else(|| Error::not_found("usuario has not been persisted"))?;
        let mut state = self.lock()?;
        let stored = state
            .usuarios
            .get(&id)
            .ok_or_else(|| Error::not_found(format!("usuario {}", id)))?;
        if stored.base().concurrency_token() != Some(expected) {
            return Err(ErrorAggregate::concurrency("Usuario").into());
        }
        state.assign_ids(usuario);
        state.usuarios.insert(id, usuario.clone());
        Ok(())
    }

    fn count_usuarios(&self) -> Result<u64> {
        Ok(self.lock()?.usuarios.len() as u64)
    }
}

/// Notifier that keeps every message in memory
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<CodeMessage>>,
    failing: AtomicBool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `send` fail (delivery outage)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<CodeMessage> {
        self.sent
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Last code delivered to `destino`
    pub fn last_code(&self, destino: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.destino == destino)
            .map(|m| m.codigo)
    }
}

impl CodeNotifier for MemoryNotifier {
    fn send(&self, message: &CodeMessage) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "delivery gateway unavailable",
            )));
        }
        self.sent
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))?
            .push(message.clone());
        Ok(())
    }
}
