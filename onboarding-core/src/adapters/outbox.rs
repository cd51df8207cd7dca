//! JSON-lines outbox standing in for an SMS / email gateway
//!
//! Every delivered code is appended as one line to `outbox.jsonl`, so a
//! local user (or a test) can read the code that "was sent".

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};
use crate::ports::{CodeMessage, CodeNotifier};

pub const OUTBOX_FILE: &str = "outbox.jsonl";

/// One line of the outbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub enviado_en: DateTime<Utc>,
    #[serde(flatten)]
    pub mensaje: CodeMessage,
}

pub struct OutboxNotifier {
    path: PathBuf,
    // Serializes appends from this process
    write_lock: Mutex<()>,
}

impl OutboxNotifier {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(OUTBOX_FILE),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every entry, oldest first; a missing file is an empty outbox
    pub fn read_all(&self) -> Result<Vec<OutboxEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }

    /// Latest code sent to `destino`
    pub fn last_code(&self, destino: &str) -> Result<Option<String>> {
        Ok(self
            .read_all()?
            .into_iter()
            .rev()
            .find(|e| e.mensaje.destino == destino)
            .map(|e| e.mensaje.codigo))
    }
}

impl CodeNotifier for OutboxNotifier {
    fn send(&self, message: &CodeMessage) -> Result<()> {
        let entry = OutboxEntry {
            enviado_en: Utc::now(),
            mensaje: message.clone(),
        };
        let line = serde_json::to_string(&entry)?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        tracing::debug!(tipo = %message.tipo, "code written to outbox");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TipoVerificacion;
    use tempfile::tempdir;

    fn mensaje(destino: &str, codigo: &str) -> CodeMessage {
        CodeMessage {
            tipo: TipoVerificacion::Sms,
            destino: destino.to_string(),
            codigo: codigo.to_string(),
            proveedor_referencia: "ref".to_string(),
        }
    }

    #[test]
    fn test_empty_outbox() {
        let dir = tempdir().unwrap();
        let outbox = OutboxNotifier::new(dir.path());
        assert!(outbox.read_all().unwrap().is_empty());
        assert_eq!(outbox.last_code("+52 5512345678").unwrap(), None);
    }

    #[test]
    fn test_append_and_find_latest() {
        let dir = tempdir().unwrap();
        let outbox = OutboxNotifier::new(dir.path());
        outbox.send(&mensaje("+52 5512345678", "1234")).unwrap();
        outbox.send(&mensaje("+52 5599999999", "9999")).unwrap();
        outbox.send(&mensaje("+52 5512345678", "5678")).unwrap();

        assert_eq!(outbox.read_all().unwrap().len(), 3);
        assert_eq!(
            outbox.last_code("+52 5512345678").unwrap().as_deref(),
            Some("5678")
        );
        // A second handle sees the same file
        let reopened = OutboxNotifier::new(dir.path());
        assert_eq!(reopened.read_all().unwrap()[1].mensaje.codigo, "9999");
    }
}
