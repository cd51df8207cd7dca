//! End-to-end registration tests
//!
//! Each flow runs against both repositories so the DuckDB mapping and the
//! in-memory reference behave the same.
//!
//! Run with: cargo test --test registration_flow

use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use tempfile::TempDir;

use onboarding_core::adapters::duckdb::DuckDbRepository;
use onboarding_core::adapters::hasher::Argon2Hasher;
use onboarding_core::adapters::memory::{InMemoryRepository, MemoryNotifier};
use onboarding_core::adapters::system::{ManualClock, StdRandom};
use onboarding_core::config::{Argon2Params, Config};
use onboarding_core::domain::{
    DatosDireccion, DatosPersonales, DocumentoVersion, Entity, Genero, NuevaActividad, NuevaTarjeta,
    NuevaValidacion, ResultadoCheckton, TipoDocumento, TipoDocumentoCliente, SYSTEM_ACTOR,
};
use onboarding_core::ports::{EventSink, LogEvent, UsuarioRepository};
use onboarding_core::services::{ClienteService, CuentaService, RegistroService};
use onboarding_core::{Error, ErrorCode, Estatus, Providers, Receipt, TipoVerificacion};

const CODIGO_PAIS: &str = "52";
const TELEFONO: &str = "5512345678";
const DESTINO_SMS: &str = "+52 5512345678";
const CORREO: &str = "ana.lopez@example.com";
const PASSWORD: &str = "Cartera2025";

/// Keeps every recorded event for later inspection
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingSink {
    fn eventos(&self, nombre: &str) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event == nombre)
            .cloned()
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: LogEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct Harness {
    registro: RegistroService,
    cuenta: CuentaService,
    perfil: ClienteService,
    notifier: Arc<MemoryNotifier>,
    clock: Arc<ManualClock>,
    events: Arc<RecordingSink>,
    repository: Arc<dyn UsuarioRepository>,
}

fn harness(repository: Arc<dyn UsuarioRepository>) -> Harness {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 4, 2, 15, 0, 0).unwrap(),
    ));
    let random = Arc::new(StdRandom::seeded(2025));
    let providers = Providers::new(clock.clone(), random.clone());
    let config = Config {
        argon2: Argon2Params::light(),
        ..Config::default()
    };
    let hasher = Arc::new(Argon2Hasher::new(&config.argon2, random).unwrap());
    let notifier = Arc::new(MemoryNotifier::new());
    let events = Arc::new(RecordingSink::default());

    Harness {
        registro: RegistroService::new(
            repository.clone(),
            notifier.clone(),
            hasher.clone(),
            events.clone(),
            providers.clone(),
            config.clone(),
        ),
        cuenta: CuentaService::new(
            repository.clone(),
            hasher,
            events.clone(),
            providers.clone(),
            config,
        ),
        perfil: ClienteService::new(repository.clone(), events.clone(), providers),
        notifier,
        clock,
        events,
        repository,
    }
}

fn duckdb_repository(dir: &TempDir) -> Arc<dyn UsuarioRepository> {
    let repo = DuckDbRepository::open(&dir.path().join("onboarding.duckdb")).unwrap();
    repo.ensure_schema().unwrap();
    Arc::new(repo)
}

fn datos_personales() -> DatosPersonales {
    DatosPersonales {
        nombre: Some("Ana".to_string()),
        apellido_paterno: Some("Lopez".to_string()),
        apellido_materno: Some("Garcia".to_string()),
        fecha_nacimiento: NaiveDate::from_ymd_opt(1990, 1, 1),
        genero: Some(Genero::Femenino),
        curp: Some("loga900101mdfpnn09".to_string()),
        rfc: None,
    }
}

const LLAVE_PUBLICA: &str = "MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAEq3xZ";

/// Drive one account from the first SMS up to the legal documents step
fn hasta_terminos(h: &Harness) -> Receipt {
    let r = h.registro.pre_registro(CODIGO_PAIS, TELEFONO, SYSTEM_ACTOR).unwrap();
    assert_eq!(r.estatus, Estatus::PreRegistro);

    let codigo = h.notifier.last_code(DESTINO_SMS).unwrap();
    let r = h
        .registro
        .confirmar_codigo(r.usuario_id, TipoVerificacion::Sms, &codigo, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();
    assert_eq!(r.estatus, Estatus::NumeroConfirmado);

    let r = h
        .registro
        .completar_datos_cliente(r.usuario_id, &datos_personales(), SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();
    assert_eq!(r.estatus, Estatus::DatosClienteCompletado);

    let r = h
        .registro
        .registrar_correo(r.usuario_id, CORREO, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();
    assert_eq!(r.estatus, Estatus::CorreoRegistrado);

    let codigo = h.notifier.last_code(CORREO).unwrap();
    let r = h
        .registro
        .confirmar_codigo(r.usuario_id, TipoVerificacion::Email, &codigo, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();
    assert_eq!(r.estatus, Estatus::CorreoConfirmado);

    let r = h
        .registro
        .registrar_biometricos(r.usuario_id, "pixel-8", LLAVE_PUBLICA, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();
    assert_eq!(r.estatus, Estatus::DatosBiometricosRegistrado);
    r
}

/// Drive one account from the first SMS to a completed registration
fn registrar(h: &Harness) -> Receipt {
    let r = hasta_terminos(h);
    let requeridos = Config::default().documentos_requeridos;
    let r = h
        .registro
        .aceptar_terminos(r.usuario_id, &requeridos, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();
    assert_eq!(r.estatus, Estatus::TerminosCondicionesAceptado);

    let r = h
        .registro
        .completar_registro(r.usuario_id, PASSWORD, PASSWORD, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();
    assert_eq!(r.estatus, Estatus::RegistroCompletado);
    r
}

fn full_flow(h: Harness) {
    let receipt = registrar(&h);

    let usuario = h.cuenta.obtener(receipt.usuario_id).unwrap();
    assert_eq!(usuario.correo(), Some(CORREO));
    assert_eq!(usuario.verificaciones().len(), 2);
    assert!(usuario.verificaciones().iter().all(|v| v.verificado()));
    assert_eq!(usuario.consentimientos().len(), 2);
    assert_eq!(usuario.cliente().unwrap().curp(), Some("LOGA900101MDFPNN09"));
    // Hashes never equal the password
    assert_ne!(usuario.password_hash(), Some(PASSWORD));
    assert_eq!(
        usuario.base().concurrency_token().unwrap().to_wire(),
        receipt.concurrency_token
    );

    assert!(h.cuenta.verificar_credenciales("+52", "55 1234 5678", PASSWORD).unwrap());
    assert!(!h.cuenta.verificar_credenciales(CODIGO_PAIS, TELEFONO, "Otra2025x").unwrap());

    // One event per step, no failures
    assert_eq!(h.events.eventos("paso_completado").len(), 8);
    assert!(h.events.eventos("paso_fallido").is_empty());

    // A finished account cannot start over
    let err = h.registro.pre_registro(CODIGO_PAIS, TELEFONO, SYSTEM_ACTOR).unwrap_err();
    assert_eq!(err.codes(), vec![ErrorCode::ClienteYaRegistrado]);
    assert_eq!(h.repository.count_usuarios().unwrap(), 1);
}

#[test]
fn test_full_flow_in_memory() {
    full_flow(harness(Arc::new(InMemoryRepository::new())));
}

#[test]
fn test_full_flow_duckdb() {
    let dir = TempDir::new().unwrap();
    full_flow(harness(duckdb_repository(&dir)));
}

#[test]
fn test_account_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let receipt = registrar(&harness(duckdb_repository(&dir)));

    let h = harness(duckdb_repository(&dir));
    let usuario = h.cuenta.obtener(receipt.usuario_id).unwrap();
    assert_eq!(usuario.estatus(), Estatus::RegistroCompletado);
    assert!(h.cuenta.verificar_credenciales(CODIGO_PAIS, TELEFONO, PASSWORD).unwrap());
}

#[test]
fn test_missing_nombre_reports_required_and_keeps_state() {
    let h = harness(Arc::new(InMemoryRepository::new()));
    let r = h.registro.pre_registro(CODIGO_PAIS, TELEFONO, SYSTEM_ACTOR).unwrap();
    let codigo = h.notifier.last_code(DESTINO_SMS).unwrap();
    let r = h
        .registro
        .confirmar_codigo(r.usuario_id, TipoVerificacion::Sms, &codigo, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();

    let datos = DatosPersonales {
        nombre: None,
        curp: Some("no-es-curp".to_string()),
        ..datos_personales()
    };
    let err = h
        .registro
        .completar_datos_cliente(r.usuario_id, &datos, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap_err();
    let agregado = err.aggregate().unwrap();
    assert!(agregado.has("nombre", ErrorCode::Required));
    assert!(agregado.has("curp", ErrorCode::LengthInvalid));
    assert_eq!(agregado.len(), 2);

    // Nothing was written: same status, same token, no profile
    let usuario = h.cuenta.obtener(r.usuario_id).unwrap();
    assert_eq!(usuario.estatus(), Estatus::NumeroConfirmado);
    assert!(usuario.cliente().is_none());
    assert_eq!(
        usuario.base().concurrency_token().unwrap().to_wire(),
        r.concurrency_token
    );

    let fallidos = h.events.eventos("paso_fallido");
    assert_eq!(fallidos.len(), 1);
    assert_eq!(fallidos[0].paso.as_deref(), Some("datos_cliente"));
    assert_eq!(fallidos[0].error_codes.as_deref(), Some("REQUIRED,LENGTH-INVALID"));

    // The same token still works with a good payload
    let r = h
        .registro
        .completar_datos_cliente(r.usuario_id, &datos_personales(), SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();
    assert_eq!(r.estatus, Estatus::DatosClienteCompletado);
}

#[test]
fn test_pre_registro_resumes_unfinished_account() {
    let h = harness(Arc::new(InMemoryRepository::new()));
    let first = h.registro.pre_registro(CODIGO_PAIS, TELEFONO, SYSTEM_ACTOR).unwrap();
    let codigo = h.notifier.last_code(DESTINO_SMS).unwrap();
    h.registro
        .confirmar_codigo(first.usuario_id, TipoVerificacion::Sms, &codigo, SYSTEM_ACTOR, &first.concurrency_token)
        .unwrap();

    let again = h.registro.pre_registro(CODIGO_PAIS, "55-1234-5678", SYSTEM_ACTOR).unwrap();
    assert_eq!(again.usuario_id, first.usuario_id);
    assert_eq!(again.usuario_guid, first.usuario_guid);
    assert_eq!(again.estatus, Estatus::PreRegistro);
    assert_eq!(h.notifier.sent().len(), 2);
    assert_eq!(h.repository.count_usuarios().unwrap(), 1);

    let usuario = h.cuenta.obtener(first.usuario_id).unwrap();
    assert_eq!(usuario.verificaciones().len(), 2);
}

#[test]
fn test_code_errors() {
    let h = harness(Arc::new(InMemoryRepository::new()));
    let r = h.registro.pre_registro(CODIGO_PAIS, TELEFONO, SYSTEM_ACTOR).unwrap();
    let codigo = h.notifier.last_code(DESTINO_SMS).unwrap();

    // Digits outside 1-9 never pass validation
    let err = h
        .registro
        .confirmar_codigo(r.usuario_id, TipoVerificacion::Sms, "1230", SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap_err();
    assert!(err.aggregate().unwrap().has("codigo", ErrorCode::RegexInvalid));

    let otro = if codigo == "1111" { "2222" } else { "1111" };
    let err = h
        .registro
        .confirmar_codigo(r.usuario_id, TipoVerificacion::Sms, otro, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap_err();
    assert_eq!(err.codes(), vec![ErrorCode::VerificationCodeMismatch]);

    // Email is not the channel awaiting confirmation
    let err = h
        .registro
        .confirmar_codigo(r.usuario_id, TipoVerificacion::Email, &codigo, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap_err();
    assert_eq!(err.codes(), vec![ErrorCode::StatusInvalid]);

    h.clock.advance(Duration::minutes(11));
    let err = h
        .registro
        .confirmar_codigo(r.usuario_id, TipoVerificacion::Sms, &codigo, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap_err();
    assert_eq!(err.codes(), vec![ErrorCode::VerificationExpired]);

    // A resent code replaces the expired one
    let r = h
        .registro
        .reenviar_codigo(r.usuario_id, TipoVerificacion::Sms, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();
    let nuevo = h.notifier.last_code(DESTINO_SMS).unwrap();
    let r = h
        .registro
        .confirmar_codigo(r.usuario_id, TipoVerificacion::Sms, &nuevo, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();
    assert_eq!(r.estatus, Estatus::NumeroConfirmado);
}

#[test]
fn test_steps_out_of_order_are_rejected() {
    let h = harness(Arc::new(InMemoryRepository::new()));
    let r = h.registro.pre_registro(CODIGO_PAIS, TELEFONO, SYSTEM_ACTOR).unwrap();

    let err = h
        .registro
        .registrar_correo(r.usuario_id, CORREO, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap_err();
    assert_eq!(err.codes(), vec![ErrorCode::StatusInvalid]);

    // Field errors come before the status check
    let err = h
        .registro
        .registrar_correo(r.usuario_id, "no-es-correo", SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap_err();
    assert_eq!(err.codes(), vec![ErrorCode::RegexInvalid]);

    // Nothing requested a notification besides the first SMS
    assert_eq!(h.notifier.sent().len(), 1);
}

#[test]
fn test_terms_require_configured_documents() {
    let h = harness(Arc::new(InMemoryRepository::new()));
    let r = hasta_terminos(&h);

    let solo_terminos = vec![DocumentoVersion::new(TipoDocumento::TerminosCondiciones, "1.0")];
    let err = h
        .registro
        .aceptar_terminos(r.usuario_id, &solo_terminos, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap_err();
    assert!(err
        .aggregate()
        .unwrap()
        .has(TipoDocumento::AvisoPrivacidad.as_str(), ErrorCode::ConsentRequired));

    // An outdated version does not count
    let viejos = vec![
        DocumentoVersion::new(TipoDocumento::TerminosCondiciones, "1.0"),
        DocumentoVersion::new(TipoDocumento::AvisoPrivacidad, "0.9"),
    ];
    let err = h
        .registro
        .aceptar_terminos(r.usuario_id, &viejos, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap_err();
    assert_eq!(err.codes(), vec![ErrorCode::ConsentRequired]);

    let usuario = h.cuenta.obtener(r.usuario_id).unwrap();
    assert!(usuario.consentimientos().is_empty());
    assert_eq!(usuario.estatus(), Estatus::DatosBiometricosRegistrado);
}

#[test]
fn test_deactivated_account_rejects_steps() {
    let h = harness(Arc::new(InMemoryRepository::new()));
    let r = h.registro.pre_registro(CODIGO_PAIS, TELEFONO, SYSTEM_ACTOR).unwrap();
    let r = h.cuenta.desactivar(r.usuario_id, SYSTEM_ACTOR, &r.concurrency_token).unwrap();
    assert!(!r.is_active);

    let codigo = h.notifier.last_code(DESTINO_SMS).unwrap();
    let err = h
        .registro
        .confirmar_codigo(r.usuario_id, TipoVerificacion::Sms, &codigo, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap_err();
    assert_eq!(err.codes(), vec![ErrorCode::EntityInactive]);

    let r = h.cuenta.reactivar(r.usuario_id, SYSTEM_ACTOR, &r.concurrency_token).unwrap();
    assert!(r.is_active);
    let r = h
        .registro
        .confirmar_codigo(r.usuario_id, TipoVerificacion::Sms, &codigo, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();
    assert_eq!(r.estatus, Estatus::NumeroConfirmado);
}

#[test]
fn test_password_change_and_refresh_token() {
    let h = harness(Arc::new(InMemoryRepository::new()));
    let r = registrar(&h);

    let err = h
        .cuenta
        .cambiar_password(r.usuario_id, "Equivocada1", "Nueva2026x", "Nueva2026x", SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap_err();
    assert!(err.aggregate().unwrap().has("password_actual", ErrorCode::PasswordIncorrect));

    let r = h
        .cuenta
        .cambiar_password(r.usuario_id, PASSWORD, "Nueva2026x", "Nueva2026x", SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();
    assert!(h.cuenta.verificar_credenciales(CODIGO_PAIS, TELEFONO, "Nueva2026x").unwrap());
    assert!(!h.cuenta.verificar_credenciales(CODIGO_PAIS, TELEFONO, PASSWORD).unwrap());

    let r = h
        .cuenta
        .actualizar_refresh_token(
            r.usuario_id,
            "rt-0123456789abcdef",
            Duration::days(30),
            SYSTEM_ACTOR,
            &r.concurrency_token,
        )
        .unwrap();
    let usuario = h.cuenta.obtener(r.usuario_id).unwrap();
    assert_eq!(usuario.refresh_token(), Some("rt-0123456789abcdef"));
    assert_eq!(
        usuario.refresh_token_expira(),
        Some(Utc.with_ymd_and_hms(2025, 5, 2, 15, 0, 0).unwrap())
    );
}

fn profile_flow(h: Harness) {
    let r = registrar(&h);

    let direccion = DatosDireccion {
        calle: Some("Av. Reforma".to_string()),
        numero_exterior: Some("222".to_string()),
        numero_interior: None,
        colonia: Some("Juarez".to_string()),
        municipio: Some("Cuauhtemoc".to_string()),
        estado: Some("CDMX".to_string()),
        codigo_postal: Some("06600".to_string()),
    };
    let r = h
        .perfil
        .asignar_direccion(r.usuario_id, &direccion, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();

    let tarjeta = NuevaTarjeta {
        alias: Some("Nomina".to_string()),
        ultimos_digitos: Some("4242".to_string()),
        token_procesador: Some("tok_visa_4242".to_string()),
        marca: Some("VISA".to_string()),
    };
    let (r, tarjeta_guid) = h
        .perfil
        .vincular_tarjeta(r.usuario_id, &tarjeta, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();
    let err = h
        .perfil
        .vincular_tarjeta(r.usuario_id, &tarjeta, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap_err();
    assert_eq!(err.codes(), vec![ErrorCode::CardAlreadyLinked]);

    let (r, _) = h
        .perfil
        .adjuntar_documento(
            r.usuario_id,
            TipoDocumentoCliente::IdentificacionFrente,
            "ine-frente.jpg",
            b"not really a jpeg",
            SYSTEM_ACTOR,
            &r.concurrency_token,
        )
        .unwrap();

    let actividad = NuevaActividad {
        ocupacion: Some("Ingeniera".to_string()),
        giro: Some("Software".to_string()),
        ingreso_mensual: Some(Decimal::new(4500050, 2)),
        origen_recursos: Some("Salario".to_string()),
    };
    let (r, _) = h
        .perfil
        .agregar_actividad_economica(r.usuario_id, &actividad, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();

    let validacion = NuevaValidacion {
        folio: Some("CHK-0001".to_string()),
        resultado: ResultadoCheckton::Aprobado,
        puntaje: Some(Decimal::new(9850, 2)),
        observaciones: None,
    };
    let (r, _) = h
        .perfil
        .registrar_validacion_checkton(r.usuario_id, &validacion, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();

    let r = h
        .perfil
        .desvincular_tarjeta(r.usuario_id, tarjeta_guid, SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap();
    let err = h
        .perfil
        .desvincular_tarjeta(r.usuario_id, uuid::Uuid::nil(), SYSTEM_ACTOR, &r.concurrency_token)
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let usuario = h.cuenta.obtener(r.usuario_id).unwrap();
    assert_eq!(
        usuario.base().concurrency_token().unwrap().to_wire(),
        r.concurrency_token
    );
    let cliente = usuario.cliente().unwrap();
    assert_eq!(cliente.direccion().unwrap().datos().codigo_postal.as_deref(), Some("06600"));
    assert_eq!(cliente.documentos()[0].tamano_bytes(), 17);
    assert_eq!(cliente.documentos()[0].sha256().len(), 64);
    assert_eq!(cliente.actividades()[0].ingreso_mensual(), Decimal::new(4500050, 2));
    assert_eq!(cliente.validaciones()[0].resultado(), ResultadoCheckton::Aprobado);
    assert_eq!(cliente.tarjetas().len(), 1);
    assert!(!cliente.tarjetas()[0].base().is_active());
}

#[test]
fn test_profile_records_in_memory() {
    profile_flow(harness(Arc::new(InMemoryRepository::new())));
}

#[test]
fn test_profile_records_duckdb() {
    let dir = TempDir::new().unwrap();
    profile_flow(harness(duckdb_repository(&dir)));
}
