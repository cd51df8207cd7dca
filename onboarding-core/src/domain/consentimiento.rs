//! Accepted legal documents

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{impl_entity, ActorId, EntityBase};
use super::providers::Providers;

/// Legal documents a user can accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TipoDocumento {
    TerminosCondiciones,
    AvisoPrivacidad,
    ContratoBilletera,
}

impl TipoDocumento {
    pub fn as_str(&self) -> &'static str {
        match self {
            TipoDocumento::TerminosCondiciones => "TerminosCondiciones",
            TipoDocumento::AvisoPrivacidad => "AvisoPrivacidad",
            TipoDocumento::ContratoBilletera => "ContratoBilletera",
        }
    }
}

impl fmt::Display for TipoDocumento {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TipoDocumento {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TerminosCondiciones" | "terminos" => Ok(TipoDocumento::TerminosCondiciones),
            "AvisoPrivacidad" | "privacidad" => Ok(TipoDocumento::AvisoPrivacidad),
            "ContratoBilletera" | "contrato" => Ok(TipoDocumento::ContratoBilletera),
            other => Err(format!("Unknown document type: {}", other)),
        }
    }
}

/// A document/version pair, either required by policy or presented by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentoVersion {
    pub tipo: TipoDocumento,
    pub version: String,
}

impl DocumentoVersion {
    pub fn new(tipo: TipoDocumento, version: impl Into<String>) -> Self {
        Self {
            tipo,
            version: version.into(),
        }
    }
}

impl fmt::Display for DocumentoVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.tipo, self.version)
    }
}

impl FromStr for DocumentoVersion {
    type Err = String;

    /// `Tipo@version`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tipo, version) = s
            .split_once('@')
            .ok_or_else(|| format!("Expected TYPE@VERSION, got: {}", s))?;
        Ok(Self::new(tipo.trim().parse()?, version.trim()))
    }
}

/// Record of a user accepting one version of a document; never edited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentimientoUsuario {
    pub(crate) base: EntityBase,
    pub(crate) tipo: TipoDocumento,
    pub(crate) version: String,
    pub(crate) aceptado_en: DateTime<Utc>,
}

impl_entity!(ConsentimientoUsuario, "ConsentimientoUsuario");

impl ConsentimientoUsuario {
    pub(crate) fn nuevo(documento: &DocumentoVersion, actor: ActorId, providers: &Providers) -> Self {
        let base = EntityBase::create(actor, providers);
        Self {
            tipo: documento.tipo,
            version: documento.version.trim().to_string(),
            aceptado_en: base.created_at(),
            base,
        }
    }

    pub fn tipo(&self) -> TipoDocumento {
        self.tipo
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn aceptado_en(&self) -> DateTime<Utc> {
        self.aceptado_en
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_documento_version() {
        let doc: DocumentoVersion = "TerminosCondiciones@1.0".parse().unwrap();
        assert_eq!(doc, DocumentoVersion::new(TipoDocumento::TerminosCondiciones, "1.0"));

        let doc: DocumentoVersion = "privacidad @ 2.1".parse().unwrap();
        assert_eq!(doc.tipo, TipoDocumento::AvisoPrivacidad);
        assert_eq!(doc.version, "2.1");

        assert!("TerminosCondiciones".parse::<DocumentoVersion>().is_err());
        assert!("Otro@1".parse::<DocumentoVersion>().is_err());
    }
}
