//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod cliente;
mod cuenta;
pub mod logging;
pub mod migration;
mod registro;
mod support;

pub use cliente::ClienteService;
pub use cuenta::CuentaService;
pub use logging::{EntryPoint, LogEntry, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use registro::RegistroService;
pub use support::Receipt;
