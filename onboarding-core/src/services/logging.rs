//! Logging service - structured event logging to DuckDB
//!
//! Stores registration activity in logs.duckdb. No personal data is ever
//! logged: accounts are referenced by guid, phone numbers by fingerprint,
//! codes and passwords never.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use chrono::Utc;
use duckdb::{Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::log_migrations::LOG_MIGRATIONS;
use crate::ports::{EventSink, LogEvent};
use crate::services::MigrationService;

/// Counter for generating unique IDs within the same millisecond
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique ID based on timestamp + counter
fn generate_id() -> u64 {
    let timestamp = now_ms() as u64;

    // Lower 16 bits: counter (65536 unique IDs per millisecond)
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    (timestamp << 16) | counter
}

/// Current unix timestamp in milliseconds
fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn detect_platform() -> &'static str {
    if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unknown"
    }
}

/// Entry point for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPoint {
    Cli,
    /// Embedded in another host process
    Library,
}

impl EntryPoint {
    fn as_str(&self) -> &'static str {
        match self {
            EntryPoint::Cli => "cli",
            EntryPoint::Library => "library",
        }
    }
}

/// A log entry as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: i64,
    pub entry_point: String,
    pub app_version: String,
    pub platform: String,
    pub event: String,
    pub paso: Option<String>,
    pub usuario_guid: Option<String>,
    pub telefono_huella: Option<String>,
    pub command: Option<String>,
    pub error_codes: Option<String>,
    pub error_message: Option<String>,
}

impl LogEntry {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            entry_point: row.get(2)?,
            app_version: row.get(3)?,
            platform: row.get(4)?,
            event: row.get(5)?,
            paso: row.get(6)?,
            usuario_guid: row.get(7)?,
            telefono_huella: row.get(8)?,
            command: row.get(9)?,
            error_codes: row.get(10)?,
            error_message: row.get(11)?,
        })
    }
}

const ENTRY_COLUMNS: &str = "id, timestamp, entry_point, app_version, platform, event, \
     paso, usuario_guid, telefono_huella, command, error_codes, error_message";

/// Service for structured event logging
pub struct LoggingService {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    entry_point: EntryPoint,
    app_version: String,
    platform: &'static str,
}

impl LoggingService {
    /// Open or create logs.duckdb in `dir` and run pending log migrations
    pub fn new(dir: &Path, entry_point: EntryPoint, app_version: impl Into<String>) -> Result<Self> {
        let db_path = dir.join("logs.duckdb");
        let conn = Connection::open(&db_path)?;

        let service = Self {
            conn: Mutex::new(conn),
            db_path,
            entry_point,
            app_version: app_version.into(),
            platform: detect_platform(),
        };

        service.run_migrations()?;

        Ok(service)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        MigrationService::with_migrations(&conn, LOG_MIGRATIONS).run_pending()?;
        Ok(())
    }

    /// Log an event
    ///
    /// The entry_point, app_version, and platform are added from the service
    /// configuration.
    pub fn log(&self, event: LogEvent) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            &format!(
                "INSERT INTO sys_logs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                ENTRY_COLUMNS
            ),
            duckdb::params![
                generate_id(),
                now_ms(),
                self.entry_point.as_str(),
                &self.app_version,
                self.platform,
                &event.event,
                &event.paso,
                event.usuario_guid.map(|g| g.to_string()),
                &event.telefono_huella,
                &event.command,
                &event.error_codes,
                &event.error_message,
            ],
        )?;

        Ok(())
    }

    pub fn log_event(&self, event: &str) -> Result<()> {
        self.log(LogEvent::new(event))
    }

    /// Log a CLI command execution
    pub fn log_command(&self, command: &str) -> Result<()> {
        self.log(LogEvent::new("command_executed").with_command(command))
    }

    pub fn log_error(&self, event: &str, message: &str) -> Result<()> {
        self.log(LogEvent::new(event).with_error_message(message))
    }

    fn query(&self, filter: &str, args: &[&dyn duckdb::ToSql]) -> Result<Vec<LogEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_logs {} ORDER BY timestamp DESC, id DESC LIMIT ?",
            ENTRY_COLUMNS, filter
        ))?;
        let entries = stmt
            .query_map(args, LogEntry::from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Most recent entries first
    pub fn get_recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query("", &[&(limit as i64)])
    }

    /// Entries that carry error codes or an error message
    pub fn get_errors(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query(
            "WHERE error_codes IS NOT NULL OR error_message IS NOT NULL",
            &[&(limit as i64)],
        )
    }

    /// Trail of one account
    pub fn get_for_usuario(&self, guid: Uuid, limit: usize) -> Result<Vec<LogEntry>> {
        self.query(
            "WHERE usuario_guid = ?",
            &[&guid.to_string(), &(limit as i64)],
        )
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM sys_logs", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete logs older than the specified timestamp (unix ms)
    pub fn delete_before(&self, timestamp_ms: i64) -> Result<u64> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM sys_logs WHERE timestamp < ?", [timestamp_ms])?;
        Ok(deleted as u64)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl EventSink for LoggingService {
    fn record(&self, event: LogEvent) {
        let name = event.event.clone();
        if let Err(e) = self.log(event) {
            tracing::warn!(event = %name, "failed to record event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::{Error, ErrorAggregate, ErrorCode};
    use tempfile::tempdir;

    fn service(dir: &Path) -> LoggingService {
        LoggingService::new(dir, EntryPoint::Cli, "1.0.0").unwrap()
    }

    #[test]
    fn test_logging_service_creation() {
        let dir = tempdir().unwrap();
        assert!(service(dir.path()).db_path().exists());
    }

    #[test]
    fn test_log_event() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());

        service.log_event("test_event").unwrap();

        let entries = service.get_recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, "test_event");
        assert_eq!(entries[0].entry_point, "cli");
        assert_eq!(entries[0].app_version, "1.0.0");
    }

    #[test]
    fn test_registration_event_has_no_phone() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());
        let guid = Uuid::new_v4();

        service.record(
            LogEvent::new("paso_completado")
                .with_paso("pre_registro")
                .with_usuario(guid)
                .with_telefono("52", "5512345678"),
        );

        let entries = service.get_for_usuario(guid, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].paso.as_deref(), Some("pre_registro"));
        let huella = entries[0].telefono_huella.clone().unwrap();
        assert_eq!(huella.len(), 16);
        assert!(!huella.contains("5512345678"));
    }

    #[test]
    fn test_errors_keep_codes() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());

        let err: Error = ErrorAggregate::single("Verificacion2FA", ErrorCode::VerificationExpired).into();
        service.record(LogEvent::new("paso_fallido").with_error(&err));
        service.log_error("comando_fallido", "disk full").unwrap();
        service.log_event("ok").unwrap();

        let errors = service.get_errors(10).unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .any(|e| e.error_codes.as_deref() == Some("VERIFICATION-EXPIRED")));
        assert!(errors
            .iter()
            .any(|e| e.error_message.as_deref() == Some("disk full")));
    }

    #[test]
    fn test_count_and_delete() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());

        service.log_event("event1").unwrap();
        service.log_command("registro").unwrap();
        service.log_event("event3").unwrap();
        assert_eq!(service.count().unwrap(), 3);

        let deleted = service.delete_before(now_ms() + 1000).unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(service.count().unwrap(), 0);
    }

    #[test]
    fn test_export() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());
        service.log_event("test_event").unwrap();

        let export_path = dir.path().join("export.duckdb");
        service.export(&export_path).unwrap();
        assert!(export_path.exists());
    }
}
