//! Configuration management
//!
//! Settings live in `settings.json` inside the data directory:
//! ```json
//! {
//!   "registro": { "codigoTtlMinutos": 10, "documentosRequeridos": ["TerminosCondiciones@1.0"] },
//!   "password": { "longitudMinima": 8, "argon2": { "timeCost": 3, ... } }
//! }
//! ```
//! Keys this crate does not manage are kept as-is when saving.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::usuario::PASSWORD_MAX;
use crate::domain::{DocumentoVersion, TipoDocumento};

pub const DEFAULT_CODE_TTL_MINUTES: i64 = 10;
pub const DEFAULT_PASSWORD_MIN_LEN: usize = 8;

/// Default Argon2 parameters (64 MiB, 3 passes)
pub const DEFAULT_TIME_COST: u32 = 3;
pub const DEFAULT_MEMORY_COST: u32 = 65536;
pub const DEFAULT_PARALLELISM: u32 = 4;
pub const DEFAULT_HASH_LEN: u32 = 32;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Argon2Params {
    pub time_cost: u32,
    pub memory_cost: u32,
    pub parallelism: u32,
    pub hash_len: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            time_cost: DEFAULT_TIME_COST,
            memory_cost: DEFAULT_MEMORY_COST,
            parallelism: DEFAULT_PARALLELISM,
            hash_len: DEFAULT_HASH_LEN,
        }
    }
}

impl Argon2Params {
    /// Minimal cost, for tests only
    pub fn light() -> Self {
        Self {
            time_cost: 1,
            memory_cost: 1024,
            parallelism: 1,
            hash_len: DEFAULT_HASH_LEN,
        }
    }
}

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    registro: RegistroSettings,
    #[serde(default)]
    password: PasswordSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistroSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    codigo_ttl_minutos: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    documentos_requeridos: Option<Vec<String>>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    longitud_minima: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    argon2: Option<Argon2Params>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Onboarding configuration (resolved view of settings)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Lifetime of a 2FA code
    pub codigo_ttl_minutos: i64,
    /// Documents that must be accepted before the password step
    pub documentos_requeridos: Vec<DocumentoVersion>,
    pub password_longitud_minima: usize,
    pub argon2: Argon2Params,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            codigo_ttl_minutos: DEFAULT_CODE_TTL_MINUTES,
            documentos_requeridos: vec![
                DocumentoVersion::new(TipoDocumento::TerminosCondiciones, "1.0"),
                DocumentoVersion::new(TipoDocumento::AvisoPrivacidad, "1.0"),
            ],
            password_longitud_minima: DEFAULT_PASSWORD_MIN_LEN,
            argon2: Argon2Params::default(),
        }
    }
}

impl Config {
    /// Load config from the data directory
    ///
    /// The code TTL can be overridden with `ONB_CODE_TTL_MINUTES`.
    pub fn load(dir: &Path) -> Result<Self> {
        let raw = read_settings(dir)?;
        let defaults = Config::default();

        let documentos_requeridos = match raw.registro.documentos_requeridos {
            Some(docs) => docs
                .iter()
                .map(|d| d.parse::<DocumentoVersion>().map_err(anyhow::Error::msg))
                .collect::<Result<Vec<_>>>()
                .context("Invalid registro.documentosRequeridos")?,
            None => defaults.documentos_requeridos,
        };

        let codigo_ttl_minutos = match std::env::var("ONB_CODE_TTL_MINUTES").ok() {
            Some(value) => value
                .trim()
                .parse::<i64>()
                .with_context(|| format!("Invalid ONB_CODE_TTL_MINUTES: {}", value))?,
            None => raw
                .registro
                .codigo_ttl_minutos
                .unwrap_or(defaults.codigo_ttl_minutos),
        };
        if codigo_ttl_minutos <= 0 {
            bail!("Code TTL must be positive, got {} minutes", codigo_ttl_minutos);
        }

        let password_longitud_minima = raw
            .password
            .longitud_minima
            .unwrap_or(defaults.password_longitud_minima);
        if password_longitud_minima == 0 || password_longitud_minima > PASSWORD_MAX {
            bail!(
                "password.longitudMinima must be between 1 and {}, got {}",
                PASSWORD_MAX,
                password_longitud_minima
            );
        }

        Ok(Self {
            codigo_ttl_minutos,
            documentos_requeridos,
            password_longitud_minima,
            argon2: raw.password.argon2.unwrap_or(defaults.argon2),
        })
    }

    /// Save config to the data directory
    /// Preserves other settings that this crate doesn't manage
    pub fn save(&self, dir: &Path) -> Result<()> {
        let mut settings = read_settings(dir)?;

        settings.registro.codigo_ttl_minutos = Some(self.codigo_ttl_minutos);
        settings.registro.documentos_requeridos = Some(
            self.documentos_requeridos
                .iter()
                .map(ToString::to_string)
                .collect(),
        );
        settings.password.longitud_minima = Some(self.password_longitud_minima);
        settings.password.argon2 = Some(self.argon2);

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(dir.join("settings.json"), content)?;
        Ok(())
    }

    pub fn codigo_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.codigo_ttl_minutos)
    }
}

fn read_settings(dir: &Path) -> Result<SettingsFile> {
    let settings_path = dir.join("settings.json");
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)
        .with_context(|| format!("Failed to read {}", settings_path.display()))?;
    match serde_json::from_str(&content) {
        Ok(settings) => Ok(settings),
        Err(e) => {
            tracing::warn!(path = %settings_path.display(), "ignoring malformed settings: {}", e);
            Ok(SettingsFile::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.codigo_ttl(), chrono::Duration::minutes(10));
        assert_eq!(config.documentos_requeridos.len(), 2);
    }

    #[test]
    fn test_reads_camel_case_keys() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{
                "registro": { "codigoTtlMinutos": 5, "documentosRequeridos": ["ContratoBilletera@2.1"] },
                "password": { "longitudMinima": 12 }
            }"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.codigo_ttl_minutos, 5);
        assert_eq!(
            config.documentos_requeridos,
            vec![DocumentoVersion::new(TipoDocumento::ContratoBilletera, "2.1")]
        );
        assert_eq!(config.password_longitud_minima, 12);
        assert_eq!(config.argon2, Argon2Params::default());
    }

    #[test]
    fn test_rejects_unknown_document() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{ "registro": { "documentosRequeridos": ["Pagare@1.0"] } }"#,
        )
        .unwrap();
        assert!(Config::load(dir.path()).is_err());
    }

    #[test]
    fn test_rejects_unusable_password_length() {
        let dir = tempdir().unwrap();
        for longitud in ["0", "129"] {
            std::fs::write(
                dir.path().join("settings.json"),
                format!(r#"{{ "password": {{ "longitudMinima": {} }} }}"#, longitud),
            )
            .unwrap();
            let err = Config::load(dir.path()).unwrap_err();
            assert!(err.to_string().contains("longitudMinima"), "{}", err);
        }

        std::fs::write(
            dir.path().join("settings.json"),
            r#"{ "password": { "longitudMinima": 128 } }"#,
        )
        .unwrap();
        assert_eq!(Config::load(dir.path()).unwrap().password_longitud_minima, 128);
    }

    #[test]
    fn test_save_preserves_unknown_keys() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{ "app": { "theme": "dark" }, "registro": { "canal": "sms" } }"#,
        )
        .unwrap();

        let mut config = Config::load(dir.path()).unwrap();
        config.password_longitud_minima = 10;
        config.save(dir.path()).unwrap();

        let saved: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("settings.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(saved["app"]["theme"], "dark");
        assert_eq!(saved["registro"]["canal"], "sms");
        assert_eq!(saved["password"]["longitudMinima"], 10);
        assert_eq!(saved["registro"]["documentosRequeridos"][0], "TerminosCondiciones@1.0");

        let reloaded = Config::load(dir.path()).unwrap();
        assert_eq!(reloaded, config);
    }
}
