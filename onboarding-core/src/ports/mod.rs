//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod events;
mod notification;
mod password;
mod repository;

pub use events::{huella_telefono, EventSink, LogEvent, NoopSink};
pub use notification::{CodeMessage, CodeNotifier};
pub use password::PasswordHasher;
pub use repository::UsuarioRepository;
