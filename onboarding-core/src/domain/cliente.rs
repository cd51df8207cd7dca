//! Customer profile and its owned records

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::entity::{impl_entity, ActorId, Entity, EntityBase};
use super::providers::Providers;
use super::result::{ErrorAggregate, ErrorCode};
use super::validation::{patterns, FieldValue, Rule, Validator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Genero {
    Masculino,
    Femenino,
}

/// Personal data as submitted; every field may be missing until validated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatosPersonales {
    pub nombre: Option<String>,
    pub apellido_paterno: Option<String>,
    pub apellido_materno: Option<String>,
    pub fecha_nacimiento: Option<NaiveDate>,
    pub genero: Option<Genero>,
    pub curp: Option<String>,
    pub rfc: Option<String>,
}

fn limpio(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn mayusculas(value: &Option<String>) -> Option<String> {
    limpio(value).map(|s| s.to_uppercase())
}

/// Customer profile, one per Usuario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cliente {
    pub(crate) base: EntityBase,
    pub(crate) nombre: Option<String>,
    pub(crate) apellido_paterno: Option<String>,
    pub(crate) apellido_materno: Option<String>,
    pub(crate) fecha_nacimiento: Option<NaiveDate>,
    pub(crate) genero: Option<Genero>,
    pub(crate) curp: Option<String>,
    pub(crate) rfc: Option<String>,
    pub(crate) direccion: Option<Direccion>,
    #[serde(default)]
    pub(crate) actividades: Vec<ActividadEconomica>,
    #[serde(default)]
    pub(crate) documentos: Vec<DocumentacionAdjunta>,
    #[serde(default)]
    pub(crate) validaciones: Vec<ValidacionCheckton>,
    #[serde(default)]
    pub(crate) tarjetas: Vec<TarjetaVinculada>,
}

impl_entity!(Cliente, "Cliente");

impl Cliente {
    pub(crate) fn nuevo(actor: ActorId, providers: &Providers) -> Self {
        Self {
            base: EntityBase::create(actor, providers),
            nombre: None,
            apellido_paterno: None,
            apellido_materno: None,
            fecha_nacimiento: None,
            genero: None,
            curp: None,
            rfc: None,
            direccion: None,
            actividades: Vec::new(),
            documentos: Vec::new(),
            validaciones: Vec::new(),
            tarjetas: Vec::new(),
        }
    }

    /// Validate and write every personal field at once
    ///
    /// On failure nothing is written and all field errors are reported.
    pub fn agregar_datos_personales(
        &mut self,
        datos: &DatosPersonales,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<(), ErrorAggregate> {
        self.ensure_active()?;

        let nombre = limpio(&datos.nombre);
        let paterno = limpio(&datos.apellido_paterno);
        let materno = limpio(&datos.apellido_materno);
        let curp = mayusculas(&datos.curp);
        let rfc = mayusculas(&datos.rfc);
        let genero = match datos.genero {
            Some(_) => FieldValue::Present,
            None => FieldValue::Absent,
        };

        Validator::new()
            .field("nombre", &nombre, &[Rule::Required, Rule::length(1, 100)])
            .field("apellido_paterno", &paterno, &[Rule::Required, Rule::length(1, 100)])
            .field("apellido_materno", &materno, &[Rule::length(1, 100)])
            .field("fecha_nacimiento", datos.fecha_nacimiento, &[Rule::Required])
            .field("genero", genero, &[Rule::Required])
            .field(
                "curp",
                &curp,
                &[Rule::Required, Rule::length(18, 18), Rule::Regex(&patterns::CURP)],
            )
            .field("rfc", &rfc, &[Rule::length(12, 13), Rule::Regex(&patterns::RFC)])
            .finish()?;

        self.nombre = nombre;
        self.apellido_paterno = paterno;
        self.apellido_materno = materno;
        self.fecha_nacimiento = datos.fecha_nacimiento;
        self.genero = datos.genero;
        self.curp = curp;
        self.rfc = rfc;
        self.touch(actor, providers);
        Ok(())
    }

    pub fn nombre(&self) -> Option<&str> {
        self.nombre.as_deref()
    }

    pub fn apellido_paterno(&self) -> Option<&str> {
        self.apellido_paterno.as_deref()
    }

    pub fn apellido_materno(&self) -> Option<&str> {
        self.apellido_materno.as_deref()
    }

    pub fn fecha_nacimiento(&self) -> Option<NaiveDate> {
        self.fecha_nacimiento
    }

    pub fn genero(&self) -> Option<Genero> {
        self.genero
    }

    pub fn curp(&self) -> Option<&str> {
        self.curp.as_deref()
    }

    pub fn rfc(&self) -> Option<&str> {
        self.rfc.as_deref()
    }

    pub fn direccion(&self) -> Option<&Direccion> {
        self.direccion.as_ref()
    }

    pub fn actividades(&self) -> &[ActividadEconomica] {
        &self.actividades
    }

    pub fn documentos(&self) -> &[DocumentacionAdjunta] {
        &self.documentos
    }

    pub fn validaciones(&self) -> &[ValidacionCheckton] {
        &self.validaciones
    }

    pub fn tarjetas(&self) -> &[TarjetaVinculada] {
        &self.tarjetas
    }

    /// Personal data has been accepted at least once
    pub fn datos_completos(&self) -> bool {
        self.nombre.is_some() && self.curp.is_some()
    }

    /// Create or replace the address
    pub fn asignar_direccion(
        &mut self,
        datos: &DatosDireccion,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<(), ErrorAggregate> {
        self.ensure_active()?;
        let datos = datos.validar()?;
        match self.direccion.as_mut() {
            Some(direccion) => {
                direccion.ensure_active()?;
                direccion.aplicar(datos);
                direccion.touch(actor, providers);
            }
            None => {
                self.direccion = Some(Direccion {
                    base: EntityBase::create(actor, providers),
                    datos,
                });
            }
        }
        self.touch(actor, providers);
        Ok(())
    }

    pub fn vincular_tarjeta(
        &mut self,
        nueva: &NuevaTarjeta,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<Uuid, ErrorAggregate> {
        self.ensure_active()?;
        let alias = limpio(&nueva.alias);
        let ultimos = limpio(&nueva.ultimos_digitos);
        let token = limpio(&nueva.token_procesador);
        let marca = limpio(&nueva.marca);
        Validator::new()
            .field("alias", &alias, &[Rule::Required, Rule::length(1, 50)])
            .field(
                "ultimos_digitos",
                &ultimos,
                &[Rule::Required, Rule::Regex(&patterns::ULTIMOS_DIGITOS)],
            )
            .field("token_procesador", &token, &[Rule::Required, Rule::length(8, 128)])
            .field("marca", &marca, &[Rule::Required, Rule::length(1, 30)])
            .finish()?;

        let token = token.unwrap_or_default();
        if self
            .tarjetas
            .iter()
            .any(|t| t.base.is_active() && t.token_procesador == token)
        {
            return Err(ErrorAggregate::single(
                "TarjetaVinculada",
                ErrorCode::CardAlreadyLinked,
            ));
        }

        let tarjeta = TarjetaVinculada {
            base: EntityBase::create(actor, providers),
            alias: alias.unwrap_or_default(),
            ultimos_digitos: ultimos.unwrap_or_default(),
            token_procesador: token,
            marca: marca.unwrap_or_default(),
        };
        let guid = tarjeta.base.guid();
        self.tarjetas.push(tarjeta);
        self.touch(actor, providers);
        Ok(guid)
    }

    /// Soft-delete a linked card; `Ok(false)` when no card has that guid
    pub fn desvincular_tarjeta(
        &mut self,
        guid: Uuid,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<bool, ErrorAggregate> {
        self.ensure_active()?;
        let Some(tarjeta) = self.tarjetas.iter_mut().find(|t| t.base.guid() == guid) else {
            return Ok(false);
        };
        tarjeta.deactivate(actor, providers)?;
        self.touch(actor, providers);
        Ok(true)
    }

    pub fn adjuntar_documento(
        &mut self,
        tipo: TipoDocumentoCliente,
        nombre_archivo: &str,
        contenido: &[u8],
        actor: ActorId,
        providers: &Providers,
    ) -> Result<Uuid, ErrorAggregate> {
        self.ensure_active()?;
        let archivo = if contenido.is_empty() {
            FieldValue::Absent
        } else {
            FieldValue::Present
        };
        Validator::new()
            .field("nombre_archivo", nombre_archivo, &[Rule::Required, Rule::length(1, 255)])
            .field("contenido", archivo, &[Rule::Required])
            .finish()?;

        if self
            .documentos
            .iter()
            .any(|d| d.base.is_active() && d.tipo == tipo)
        {
            return Err(ErrorAggregate::single(
                "DocumentacionAdjunta",
                ErrorCode::DocumentAlreadyExists,
            ));
        }

        let documento = DocumentacionAdjunta {
            base: EntityBase::create(actor, providers),
            tipo,
            nombre_archivo: nombre_archivo.trim().to_string(),
            sha256: hex::encode(Sha256::digest(contenido)),
            tamano_bytes: contenido.len() as u64,
        };
        let guid = documento.base.guid();
        self.documentos.push(documento);
        self.touch(actor, providers);
        Ok(guid)
    }

    pub fn agregar_actividad_economica(
        &mut self,
        nueva: &NuevaActividad,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<Uuid, ErrorAggregate> {
        self.ensure_active()?;
        let ocupacion = limpio(&nueva.ocupacion);
        let giro = limpio(&nueva.giro);
        let origen = limpio(&nueva.origen_recursos);
        Validator::new()
            .field("ocupacion", &ocupacion, &[Rule::Required, Rule::length(1, 100)])
            .field("giro", &giro, &[Rule::Required, Rule::length(1, 100)])
            .field(
                "ingreso_mensual",
                nueva.ingreso_mensual,
                &[Rule::Required, Rule::non_negative(), Rule::decimals(2)],
            )
            .field("origen_recursos", &origen, &[Rule::Required, Rule::length(1, 100)])
            .finish()?;

        let actividad = ActividadEconomica {
            base: EntityBase::create(actor, providers),
            ocupacion: ocupacion.unwrap_or_default(),
            giro: giro.unwrap_or_default(),
            ingreso_mensual: nueva.ingreso_mensual.unwrap_or_default(),
            origen_recursos: origen.unwrap_or_default(),
        };
        let guid = actividad.base.guid();
        self.actividades.push(actividad);
        self.touch(actor, providers);
        Ok(guid)
    }

    pub fn registrar_validacion_checkton(
        &mut self,
        nueva: &NuevaValidacion,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<Uuid, ErrorAggregate> {
        self.ensure_active()?;
        let folio = limpio(&nueva.folio);
        let observaciones = limpio(&nueva.observaciones);
        Validator::new()
            .field("folio", &folio, &[Rule::Required, Rule::length(1, 50)])
            .field(
                "puntaje",
                nueva.puntaje,
                &[Rule::Required, Rule::non_negative(), Rule::decimals(2)],
            )
            .field("observaciones", &observaciones, &[Rule::length(1, 500)])
            .finish()?;

        let validacion = ValidacionCheckton {
            base: EntityBase::create(actor, providers),
            folio: folio.unwrap_or_default(),
            resultado: nueva.resultado,
            puntaje: nueva.puntaje.unwrap_or_default(),
            observaciones,
        };
        let guid = validacion.base.guid();
        self.validaciones.push(validacion);
        self.touch(actor, providers);
        Ok(guid)
    }

    pub(crate) fn visit_bases_mut(&mut self, f: &mut dyn FnMut(&mut EntityBase)) {
        f(&mut self.base);
        if let Some(direccion) = self.direccion.as_mut() {
            f(&mut direccion.base);
        }
        self.actividades.iter_mut().for_each(|a| f(&mut a.base));
        self.documentos.iter_mut().for_each(|d| f(&mut d.base));
        self.validaciones.iter_mut().for_each(|v| f(&mut v.base));
        self.tarjetas.iter_mut().for_each(|t| f(&mut t.base));
    }
}

// ============================================================================
// Owned records
// ============================================================================

/// Address payload as submitted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatosDireccion {
    pub calle: Option<String>,
    pub numero_exterior: Option<String>,
    pub numero_interior: Option<String>,
    pub colonia: Option<String>,
    pub municipio: Option<String>,
    pub estado: Option<String>,
    pub codigo_postal: Option<String>,
}

impl DatosDireccion {
    fn validar(&self) -> Result<DatosDireccion, ErrorAggregate> {
        let limpios = DatosDireccion {
            calle: limpio(&self.calle),
            numero_exterior: limpio(&self.numero_exterior),
            numero_interior: limpio(&self.numero_interior),
            colonia: limpio(&self.colonia),
            municipio: limpio(&self.municipio),
            estado: limpio(&self.estado),
            codigo_postal: limpio(&self.codigo_postal),
        };
        Validator::new()
            .field("calle", &limpios.calle, &[Rule::Required, Rule::length(1, 150)])
            .field(
                "numero_exterior",
                &limpios.numero_exterior,
                &[Rule::Required, Rule::length(1, 20)],
            )
            .field("numero_interior", &limpios.numero_interior, &[Rule::length(1, 20)])
            .field("colonia", &limpios.colonia, &[Rule::Required, Rule::length(1, 100)])
            .field("municipio", &limpios.municipio, &[Rule::Required, Rule::length(1, 100)])
            .field("estado", &limpios.estado, &[Rule::Required, Rule::length(1, 50)])
            .field(
                "codigo_postal",
                &limpios.codigo_postal,
                &[Rule::Required, Rule::Regex(&patterns::CODIGO_POSTAL)],
            )
            .finish()?;
        Ok(limpios)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Direccion {
    pub(crate) base: EntityBase,
    pub(crate) datos: DatosDireccion,
}

impl_entity!(Direccion, "Direccion");

impl Direccion {
    pub fn datos(&self) -> &DatosDireccion {
        &self.datos
    }

    fn aplicar(&mut self, datos: DatosDireccion) {
        self.datos = datos;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NuevaTarjeta {
    pub alias: Option<String>,
    pub ultimos_digitos: Option<String>,
    /// Processor-issued card token; the PAN never reaches this system
    pub token_procesador: Option<String>,
    pub marca: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TarjetaVinculada {
    pub(crate) base: EntityBase,
    pub(crate) alias: String,
    pub(crate) ultimos_digitos: String,
    pub(crate) token_procesador: String,
    pub(crate) marca: String,
}

impl_entity!(TarjetaVinculada, "TarjetaVinculada");

impl TarjetaVinculada {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn ultimos_digitos(&self) -> &str {
        &self.ultimos_digitos
    }

    pub fn marca(&self) -> &str {
        &self.marca
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TipoDocumentoCliente {
    IdentificacionFrente,
    IdentificacionReverso,
    ComprobanteDomicilio,
    Selfie,
}

impl std::str::FromStr for TipoDocumentoCliente {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IdentificacionFrente" | "ine-frente" => Ok(Self::IdentificacionFrente),
            "IdentificacionReverso" | "ine-reverso" => Ok(Self::IdentificacionReverso),
            "ComprobanteDomicilio" | "comprobante" => Ok(Self::ComprobanteDomicilio),
            "Selfie" | "selfie" => Ok(Self::Selfie),
            other => Err(format!("Unknown customer document type: {}", other)),
        }
    }
}

/// Metadata of an uploaded file; contents stay with the file store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentacionAdjunta {
    pub(crate) base: EntityBase,
    pub(crate) tipo: TipoDocumentoCliente,
    pub(crate) nombre_archivo: String,
    pub(crate) sha256: String,
    pub(crate) tamano_bytes: u64,
}

impl_entity!(DocumentacionAdjunta, "DocumentacionAdjunta");

impl DocumentacionAdjunta {
    pub fn tipo(&self) -> TipoDocumentoCliente {
        self.tipo
    }

    pub fn nombre_archivo(&self) -> &str {
        &self.nombre_archivo
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn tamano_bytes(&self) -> u64 {
        self.tamano_bytes
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NuevaActividad {
    pub ocupacion: Option<String>,
    pub giro: Option<String>,
    pub ingreso_mensual: Option<Decimal>,
    pub origen_recursos: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActividadEconomica {
    pub(crate) base: EntityBase,
    pub(crate) ocupacion: String,
    pub(crate) giro: String,
    pub(crate) ingreso_mensual: Decimal,
    pub(crate) origen_recursos: String,
}

impl_entity!(ActividadEconomica, "ActividadEconomica");

impl ActividadEconomica {
    pub fn ocupacion(&self) -> &str {
        &self.ocupacion
    }

    pub fn ingreso_mensual(&self) -> Decimal {
        self.ingreso_mensual
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultadoCheckton {
    Aprobado,
    Rechazado,
    EnRevision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NuevaValidacion {
    pub folio: Option<String>,
    pub resultado: ResultadoCheckton,
    pub puntaje: Option<Decimal>,
    pub observaciones: Option<String>,
}

/// Outcome of an identity check run by the Checkton provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidacionCheckton {
    pub(crate) base: EntityBase,
    pub(crate) folio: String,
    pub(crate) resultado: ResultadoCheckton,
    pub(crate) puntaje: Decimal,
    pub(crate) observaciones: Option<String>,
}

impl_entity!(ValidacionCheckton, "ValidacionCheckton");

impl ValidacionCheckton {
    pub fn folio(&self) -> &str {
        &self.folio
    }

    pub fn resultado(&self) -> ResultadoCheckton {
        self.resultado
    }

    pub fn puntaje(&self) -> Decimal {
        self.puntaje
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::system::{ManualClock, StdRandom};
    use crate::domain::entity::SYSTEM_ACTOR;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn providers() -> Providers {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap());
        Providers::new(Arc::new(clock), Arc::new(StdRandom::seeded(11)))
    }

    fn datos_validos() -> DatosPersonales {
        DatosPersonales {
            nombre: Some("Ana".into()),
            apellido_paterno: Some("López".into()),
            apellido_materno: None,
            fecha_nacimiento: NaiveDate::from_ymd_opt(1990, 4, 12),
            genero: Some(Genero::Femenino),
            curp: Some("lopa900412mdfpnn08".into()),
            rfc: None,
        }
    }

    fn tarjeta(token: &str) -> NuevaTarjeta {
        NuevaTarjeta {
            alias: Some("Nómina".into()),
            ultimos_digitos: Some("4242".into()),
            token_procesador: Some(token.into()),
            marca: Some("VISA".into()),
        }
    }

    #[test]
    fn test_datos_personales_normalised() {
        let p = providers();
        let mut cliente = Cliente::nuevo(SYSTEM_ACTOR, &p);
        cliente
            .agregar_datos_personales(&datos_validos(), SYSTEM_ACTOR, &p)
            .unwrap();
        assert_eq!(cliente.curp(), Some("LOPA900412MDFPNN08"));
        assert!(cliente.datos_completos());
    }

    #[test]
    fn test_datos_personales_all_or_nothing() {
        let p = providers();
        let mut cliente = Cliente::nuevo(SYSTEM_ACTOR, &p);
        let datos = DatosPersonales {
            nombre: None,
            curp: Some("XX".into()),
            genero: None,
            ..datos_validos()
        };
        let err = cliente
            .agregar_datos_personales(&datos, SYSTEM_ACTOR, &p)
            .unwrap_err();
        assert_eq!(
            err.codes(),
            vec![ErrorCode::Required, ErrorCode::Required, ErrorCode::LengthInvalid]
        );
        assert!(err.has("nombre", ErrorCode::Required));
        assert!(err.has("genero", ErrorCode::Required));
        assert!(err.has("curp", ErrorCode::LengthInvalid));
        assert!(cliente.apellido_paterno().is_none());
        assert!(!cliente.datos_completos());
    }

    #[test]
    fn test_card_linked_twice_rejected() {
        let p = providers();
        let mut cliente = Cliente::nuevo(SYSTEM_ACTOR, &p);
        let guid = cliente
            .vincular_tarjeta(&tarjeta("tok_12345678"), SYSTEM_ACTOR, &p)
            .unwrap();
        let err = cliente
            .vincular_tarjeta(&tarjeta("tok_12345678"), SYSTEM_ACTOR, &p)
            .unwrap_err();
        assert_eq!(err.codes(), vec![ErrorCode::CardAlreadyLinked]);

        // unlinking frees the token
        assert!(cliente.desvincular_tarjeta(guid, SYSTEM_ACTOR, &p).unwrap());
        cliente
            .vincular_tarjeta(&tarjeta("tok_12345678"), SYSTEM_ACTOR, &p)
            .unwrap();
        assert_eq!(cliente.tarjetas().len(), 2);

        let err = cliente
            .desvincular_tarjeta(guid, SYSTEM_ACTOR, &p)
            .unwrap_err();
        assert_eq!(err.codes(), vec![ErrorCode::EntityInactive]);
        assert!(!cliente
            .desvincular_tarjeta(Uuid::nil(), SYSTEM_ACTOR, &p)
            .unwrap());
    }

    #[test]
    fn test_document_per_type() {
        let p = providers();
        let mut cliente = Cliente::nuevo(SYSTEM_ACTOR, &p);
        cliente
            .adjuntar_documento(TipoDocumentoCliente::Selfie, "yo.jpg", b"jpeg", SYSTEM_ACTOR, &p)
            .unwrap();
        assert_eq!(cliente.documentos()[0].sha256().len(), 64);

        let err = cliente
            .adjuntar_documento(TipoDocumentoCliente::Selfie, "otra.jpg", b"x", SYSTEM_ACTOR, &p)
            .unwrap_err();
        assert_eq!(err.codes(), vec![ErrorCode::DocumentAlreadyExists]);

        let err = cliente
            .adjuntar_documento(TipoDocumentoCliente::ComprobanteDomicilio, "", b"", SYSTEM_ACTOR, &p)
            .unwrap_err();
        assert_eq!(err.codes(), vec![ErrorCode::Required, ErrorCode::Required]);
    }

    #[test]
    fn test_direccion_create_then_replace() {
        let p = providers();
        let mut cliente = Cliente::nuevo(SYSTEM_ACTOR, &p);
        let mut datos = DatosDireccion {
            calle: Some("Insurgentes Sur".into()),
            numero_exterior: Some("1602".into()),
            numero_interior: None,
            colonia: Some("Crédito Constructor".into()),
            municipio: Some("Benito Juárez".into()),
            estado: Some("CDMX".into()),
            codigo_postal: Some("03940".into()),
        };
        cliente.asignar_direccion(&datos, SYSTEM_ACTOR, &p).unwrap();
        let guid = cliente.direccion().unwrap().base().guid();

        datos.codigo_postal = Some("0394".into());
        let err = cliente.asignar_direccion(&datos, SYSTEM_ACTOR, &p).unwrap_err();
        assert!(err.has("codigo_postal", ErrorCode::RegexInvalid));

        datos.codigo_postal = Some("03100".into());
        cliente.asignar_direccion(&datos, SYSTEM_ACTOR, &p).unwrap();
        let direccion = cliente.direccion().unwrap();
        assert_eq!(direccion.base().guid(), guid);
        assert_eq!(direccion.datos().codigo_postal.as_deref(), Some("03100"));
    }

    #[test]
    fn test_actividad_rejects_extra_decimals() {
        let p = providers();
        let mut cliente = Cliente::nuevo(SYSTEM_ACTOR, &p);
        let nueva = NuevaActividad {
            ocupacion: Some("Ingeniera".into()),
            giro: Some("Software".into()),
            ingreso_mensual: Some(Decimal::new(1_500_0125, 4)),
            origen_recursos: Some("Salario".into()),
        };
        let err = cliente
            .agregar_actividad_economica(&nueva, SYSTEM_ACTOR, &p)
            .unwrap_err();
        assert_eq!(err.codes(), vec![ErrorCode::DecimalsInvalid]);
    }

    #[test]
    fn test_inactive_cliente_rejects_mutation() {
        let p = providers();
        let mut cliente = Cliente::nuevo(SYSTEM_ACTOR, &p);
        cliente.deactivate(SYSTEM_ACTOR, &p).unwrap();
        let err = cliente
            .vincular_tarjeta(&tarjeta("tok_abcdefgh"), SYSTEM_ACTOR, &p)
            .unwrap_err();
        assert_eq!(err.codes(), vec![ErrorCode::EntityInactive]);
    }
}
