//! Event sink port - privacy-safe audit trail of registration activity

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::result::{Error, ErrorCode};

/// An event to be recorded
///
/// Never carries personal data: accounts are referenced by guid and phone
/// numbers only through [`huella_telefono`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paso: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usuario_guid: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telefono_huella: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_codes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl LogEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Default::default()
        }
    }

    /// Registration step or service operation that produced the event
    pub fn with_paso(mut self, paso: impl Into<String>) -> Self {
        self.paso = Some(paso.into());
        self
    }

    pub fn with_usuario(mut self, guid: Uuid) -> Self {
        self.usuario_guid = Some(guid);
        self
    }

    pub fn with_telefono(mut self, codigo_pais: &str, telefono: &str) -> Self {
        self.telefono_huella = Some(huella_telefono(codigo_pais, telefono));
        self
    }

    /// Set the command context (for CLI events)
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Attach the codes of a domain error, or the message of any other error
    pub fn with_error(mut self, error: &Error) -> Self {
        match error.aggregate() {
            Some(agg) => {
                let codes: Vec<&str> = agg.codes().iter().map(ErrorCode::as_str).collect();
                self.error_codes = Some(codes.join(","));
            }
            None => self.error_message = Some(error.to_string()),
        }
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error_codes.is_some() || self.error_message.is_some()
    }
}

/// 16-hex SHA-256 fingerprint of a phone number
pub fn huella_telefono(codigo_pais: &str, telefono: &str) -> String {
    let digest = Sha256::digest(format!("+{}{}", codigo_pais, telefono).as_bytes());
    hex::encode(&digest[..8])
}

/// Destination for [`LogEvent`]s
///
/// Recording is best-effort: implementations swallow their own failures.
pub trait EventSink: Send + Sync {
    fn record(&self, event: LogEvent);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn record(&self, _event: LogEvent) {}
}
