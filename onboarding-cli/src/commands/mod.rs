//! CLI command implementations

pub mod cuenta;
pub mod logs;
pub mod outbox;
pub mod perfil;
pub mod registro;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use onboarding_core::ports::{EventSink, LogEvent, NoopSink};
use onboarding_core::services::{EntryPoint, LoggingService};
use onboarding_core::OnboardingContext;

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<Arc<LoggingService>> {
    let dir = get_onboarding_dir().ok()?;
    std::fs::create_dir_all(&dir).ok()?;
    match LoggingService::new(&dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")) {
        Ok(service) => Some(Arc::new(service)),
        Err(e) => {
            tracing::warn!("event log unavailable: {}", e);
            None
        }
    }
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<Arc<LoggingService>>, event: LogEvent) {
    if let Some(l) = logger {
        l.record(event);
    }
}

/// Data directory from `ONB_DIR`, or `~/.onboarding`
pub fn get_onboarding_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("ONB_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".onboarding"))
}

/// Open the context, recording service events in the event log when available
pub fn get_context(logger: &Option<Arc<LoggingService>>) -> Result<OnboardingContext> {
    let dir = get_onboarding_dir()?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory: {:?}", dir))?;

    let events: Arc<dyn EventSink> = match logger {
        Some(l) => l.clone(),
        None => Arc::new(NoopSink),
    };

    OnboardingContext::new(&dir, events).context("Failed to initialize onboarding context")
}
