//! Onboarding Core - wallet onboarding domain
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Validated entities (Usuario, Cliente, Verificacion2Fa, ...),
//!   the registration state machine and the concurrency token
//! - **ports**: Trait definitions for external dependencies (repository,
//!   notifier, password hasher, event sink)
//! - **services**: Registration, account and profile use cases
//! - **adapters**: Concrete implementations (DuckDB, outbox file, Argon2, ...)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbRepository;
use adapters::hasher::Argon2Hasher;
use adapters::outbox::OutboxNotifier;
use adapters::system::{StdRandom, SystemClock};
use config::Config;
use ports::EventSink;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, ErrorAggregate, ErrorCode, FieldError, OperationResult};
pub use domain::{Estatus, Providers, TipoVerificacion, Usuario};
pub use services::Receipt;

/// Main context for onboarding operations
///
/// Wires the DuckDB repository, the outbox notifier, the Argon2 hasher and
/// the given event sink into the services.
pub struct OnboardingContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub outbox: Arc<OutboxNotifier>,
    pub registro_service: RegistroService,
    pub cuenta_service: CuentaService,
    pub cliente_service: ClienteService,
}

impl OnboardingContext {
    /// Open (or create) `onboarding.duckdb` in `dir`
    pub fn new(dir: &Path, events: Arc<dyn EventSink>) -> Result<Self> {
        let config = Config::load(dir)?;

        let repository = Arc::new(DuckDbRepository::open(&dir.join("onboarding.duckdb"))?);
        repository.ensure_schema()?;

        let random = Arc::new(StdRandom::from_entropy());
        let providers = Providers::new(Arc::new(SystemClock), random.clone());
        let hasher = Arc::new(Argon2Hasher::new(&config.argon2, random)?);
        let outbox = Arc::new(OutboxNotifier::new(dir));

        let registro_service = RegistroService::new(
            repository.clone(),
            outbox.clone(),
            hasher.clone(),
            Arc::clone(&events),
            providers.clone(),
            config.clone(),
        );
        let cuenta_service = CuentaService::new(
            repository.clone(),
            hasher,
            Arc::clone(&events),
            providers.clone(),
            config.clone(),
        );
        let cliente_service = ClienteService::new(repository.clone(), events, providers);

        Ok(Self {
            config,
            repository,
            outbox,
            registro_service,
            cuenta_service,
            cliente_service,
        })
    }
}
