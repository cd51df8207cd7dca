//! DuckDB adapter for the Usuario repository
//!
//! The aggregate root lives in `usuarios`; verifications and consents get
//! their own tables, the customer profile is stored as one JSON document.
//! Every write runs in a single transaction, and updates are a
//! compare-and-set on `concurrency_token`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use duckdb::{params, Connection, Row};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::result::{Error, ErrorAggregate, ErrorCode, Result};
use crate::domain::{
    Cliente, ConcurrencyToken, ConsentimientoUsuario, EntityBase, Estatus, Usuario,
    Verificacion2Fa,
};
use crate::ports::UsuarioRepository;
use crate::services::{MigrationResult, MigrationService};

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Error::Database(e.to_string())
    }
}

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

const BASE_COLUMNS: &str =
    "id, guid, created_at, created_by, updated_at, updated_by, concurrency_token, is_active";

const USUARIO_COLUMNS: &str = "codigo_pais, telefono, correo, password_hash, estatus, \
     refresh_token, refresh_token_expira, dispositivo_id, llave_publica";

/// Compact listing row for the CLI
#[derive(Debug, Clone, Serialize)]
pub struct UsuarioResumen {
    pub id: i64,
    pub guid: String,
    pub codigo_pais: String,
    pub telefono: String,
    pub estatus: String,
    pub is_active: bool,
    pub updated_at: Option<String>,
}

/// DuckDB repository implementation
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) the database file
    ///
    /// Retries with exponential backoff while another process holds the file.
    pub fn open(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            "database busy, retrying: {}",
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::database(format!("Failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// Throwaway in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory_with_flags(config)?),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading off: cached extensions may fail code-signing checks
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        let result = self.run_migrations()?;
        if !result.applied.is_empty() {
            tracing::debug!(applied = ?result.applied, "migrations applied");
        }
        Ok(())
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Most recently touched accounts first
    pub fn list_usuarios(&self, limit: usize) -> Result<Vec<UsuarioResumen>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, guid, codigo_pais, telefono, estatus, is_active, updated_at
             FROM usuarios
             ORDER BY COALESCE(updated_at, created_at) DESC
             LIMIT ?",
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok(UsuarioResumen {
                    id: row.get(0)?,
                    guid: row.get(1)?,
                    codigo_pais: row.get(2)?,
                    telefono: row.get(3)?,
                    estatus: row.get(4)?,
                    is_active: row.get(5)?,
                    updated_at: row.get(6)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn find_usuario(&self, filter: &str, args: &[&dyn duckdb::ToSql]) -> Result<Option<Usuario>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {}, {} FROM usuarios WHERE {}",
            USUARIO_COLUMNS, BASE_COLUMNS, filter
        );
        let row = optional(conn.query_row(&sql, args, UsuarioRow::read))?;
        match row {
            Some(row) => Ok(Some(load_graph(&conn, row)?)),
            None => Ok(None),
        }
    }
}

impl UsuarioRepository for DuckDbRepository {
    fn insert_usuario(&self, usuario: &mut Usuario) -> Result<()> {
        let base = BaseParams::from_base(&usuario.base)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let taken: i64 = tx.query_row(
            "SELECT COUNT(*) FROM usuarios WHERE codigo_pais = ? AND telefono = ?",
            params![usuario.codigo_pais, usuario.telefono],
            |row| row.get(0),
        )?;
        if taken > 0 {
            return Err(ErrorAggregate::single("Usuario", ErrorCode::ClienteYaRegistrado).into());
        }

        let id: i64 = tx.query_row("SELECT nextval('seq_usuarios')", [], |row| row.get(0))?;
        tx.execute(
            &format!(
                "INSERT INTO usuarios ({}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                USUARIO_COLUMNS, BASE_COLUMNS
            ),
            params![
                usuario.codigo_pais,
                usuario.telefono,
                usuario.correo,
                usuario.password_hash,
                usuario.estatus.as_str(),
                usuario.refresh_token,
                usuario.refresh_token_expira.map(|t| t.to_rfc3339()),
                usuario.dispositivo_id,
                usuario.llave_publica,
                id,
                base.guid,
                base.created_at,
                base.created_by,
                base.updated_at,
                base.updated_by,
                base.token,
                base.is_active,
            ],
        )?;
        usuario.base.assign_id(id);
        write_children(&tx, usuario)?;
        tx.commit()?;
        tracing::debug!(usuario_id = id, "usuario inserted");
        Ok(())
    }

    fn get_usuario(&self, id: i64) -> Result<Option<Usuario>> {
        self.find_usuario("id = ?", &[&id])
    }

    fn get_usuario_por_telefono(
        &self,
        codigo_pais: &str,
        telefono: &str,
    ) -> Result<Option<Usuario>> {
        self.find_usuario("codigo_pais = ? AND telefono = ?", &[&codigo_pais, &telefono])
    }

    fn update_usuario(&self, usuario: &mut Usuario, expected: &ConcurrencyToken) -> Result<()> {
        let id = usuario
            .base
            .id()
            .ok_or_else(|| Error::not_found("usuario has not been persisted"))?;
        let base = BaseParams::from_base(&usuario.base)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE usuarios SET
                correo = ?, password_hash = ?, estatus = ?, refresh_token = ?,
                refresh_token_expira = ?, dispositivo_id = ?, llave_publica = ?,
                updated_at = ?, updated_by = ?, concurrency_token = ?, is_active = ?
             WHERE id = ? AND concurrency_token = ?",
            params![
                usuario.correo,
                usuario.password_hash,
                usuario.estatus.as_str(),
                usuario.refresh_token,
                usuario.refresh_token_expira.map(|t| t.to_rfc3339()),
                usuario.dispositivo_id,
                usuario.llave_publica,
                base.updated_at,
                base.updated_by,
                base.token,
                base.is_active,
                id,
                expected.to_wire(),
            ],
        )?;

        if updated == 0 {
            let exists: i64 =
                tx.query_row("SELECT COUNT(*) FROM usuarios WHERE id = ?", [id], |row| row.get(0))?;
            return Err(if exists == 0 {
                Error::not_found(format!("usuario {}", id))
            } else {
                ErrorAggregate::concurrency("Usuario").into()
            });
        }

        write_children(&tx, usuario)?;
        tx.commit()?;
        Ok(())
    }

    fn count_usuarios(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM usuarios", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

// ============================================================================
// Writes
// ============================================================================

/// Column values shared by every entity table
struct BaseParams {
    guid: String,
    created_at: String,
    created_by: String,
    updated_at: Option<String>,
    updated_by: Option<String>,
    token: String,
    is_active: bool,
}

impl BaseParams {
    fn from_base(base: &EntityBase) -> Result<Self> {
        let token = base
            .concurrency_token()
            .ok_or_else(|| Error::database("entity has no concurrency token"))?;
        Ok(Self {
            guid: base.guid().to_string(),
            created_at: base.created_at().to_rfc3339(),
            created_by: base.created_by().to_string(),
            updated_at: base.updated_at().map(|t| t.to_rfc3339()),
            updated_by: base.updated_by().map(|a| a.to_string()),
            token: token.to_wire(),
            is_active: base.is_active(),
        })
    }
}

/// Give ids to new children, then upsert them
fn write_children(conn: &Connection, usuario: &mut Usuario) -> Result<()> {
    let usuario_id = usuario
        .base
        .id()
        .ok_or_else(|| Error::database("usuario without id"))?;
    assign_entity_ids(conn, usuario)?;

    for verificacion in &usuario.verificaciones {
        upsert_verificacion(conn, usuario_id, verificacion)?;
    }
    for consentimiento in &usuario.consentimientos {
        insert_consentimiento(conn, usuario_id, consentimiento)?;
    }
    if let Some(cliente) = &usuario.cliente {
        conn.execute(
            "INSERT INTO clientes (usuario_id, documento) VALUES (?, ?)
             ON CONFLICT (usuario_id) DO UPDATE SET documento = EXCLUDED.documento",
            params![usuario_id, serde_json::to_string(cliente)?],
        )?;
    }
    Ok(())
}

fn assign_entity_ids(conn: &Connection, usuario: &mut Usuario) -> Result<()> {
    let mut failure = None;
    usuario.visit_bases_mut(&mut |base| {
        if base.id().is_some() || failure.is_some() {
            return;
        }
        match conn.query_row("SELECT nextval('seq_entidades')", [], |row| row.get::<_, i64>(0)) {
            Ok(id) => base.assign_id(id),
            Err(e) => failure = Some(e),
        }
    });
    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn upsert_verificacion(conn: &Connection, usuario_id: i64, v: &Verificacion2Fa) -> Result<()> {
    let id = v
        .base
        .id()
        .ok_or_else(|| Error::database("verificacion without id"))?;
    let base = BaseParams::from_base(&v.base)?;
    conn.execute(
        &format!(
            "INSERT INTO verificaciones_2fa (usuario_id, proveedor_referencia, codigo, expira, tipo, verificado, {})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                verificado = EXCLUDED.verificado,
                updated_at = EXCLUDED.updated_at,
                updated_by = EXCLUDED.updated_by,
                concurrency_token = EXCLUDED.concurrency_token,
                is_active = EXCLUDED.is_active",
            BASE_COLUMNS
        ),
        params![
            usuario_id,
            v.proveedor_referencia,
            v.codigo,
            v.expira.to_rfc3339(),
            v.tipo.as_str(),
            v.verificado,
            id,
            base.guid,
            base.created_at,
            base.created_by,
            base.updated_at,
            base.updated_by,
            base.token,
            base.is_active,
        ],
    )?;
    Ok(())
}

/// Consents are append-only; an existing row is never rewritten
fn insert_consentimiento(
    conn: &Connection,
    usuario_id: i64,
    c: &ConsentimientoUsuario,
) -> Result<()> {
    let id = c
        .base
        .id()
        .ok_or_else(|| Error::database("consentimiento without id"))?;
    let base = BaseParams::from_base(&c.base)?;
    conn.execute(
        &format!(
            "INSERT INTO consentimientos (usuario_id, tipo, version, aceptado_en, {})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO NOTHING",
            BASE_COLUMNS
        ),
        params![
            usuario_id,
            c.tipo.as_str(),
            c.version,
            c.aceptado_en.to_rfc3339(),
            id,
            base.guid,
            base.created_at,
            base.created_by,
            base.updated_at,
            base.updated_by,
            base.token,
            base.is_active,
        ],
    )?;
    Ok(())
}

// ============================================================================
// Reads
// ============================================================================

/// Raw base columns, read at `at..at + 8`
struct BaseRow {
    id: i64,
    guid: String,
    created_at: String,
    created_by: String,
    updated_at: Option<String>,
    updated_by: Option<String>,
    token: String,
    is_active: bool,
}

impl BaseRow {
    fn read(row: &Row<'_>, at: usize) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(at)?,
            guid: row.get(at + 1)?,
            created_at: row.get(at + 2)?,
            created_by: row.get(at + 3)?,
            updated_at: row.get(at + 4)?,
            updated_by: row.get(at + 5)?,
            token: row.get(at + 6)?,
            is_active: row.get(at + 7)?,
        })
    }

    fn into_base(self) -> Result<EntityBase> {
        let token = ConcurrencyToken::from_wire(&self.token)
            .ok_or_else(|| Error::database(format!("corrupt concurrency token on entity {}", self.id)))?;
        Ok(EntityBase {
            id: Some(self.id),
            guid: parse_uuid(&self.guid)?,
            created_at: parse_timestamp(&self.created_at)?,
            created_by: parse_uuid(&self.created_by)?,
            updated_at: self.updated_at.as_deref().map(parse_timestamp).transpose()?,
            updated_by: self.updated_by.as_deref().map(parse_uuid).transpose()?,
            concurrency_token: Some(token),
            is_active: self.is_active,
        })
    }
}

struct UsuarioRow {
    codigo_pais: String,
    telefono: String,
    correo: Option<String>,
    password_hash: Option<String>,
    estatus: String,
    refresh_token: Option<String>,
    refresh_token_expira: Option<String>,
    dispositivo_id: Option<String>,
    llave_publica: Option<String>,
    base: BaseRow,
}

impl UsuarioRow {
    fn read(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            codigo_pais: row.get(0)?,
            telefono: row.get(1)?,
            correo: row.get(2)?,
            password_hash: row.get(3)?,
            estatus: row.get(4)?,
            refresh_token: row.get(5)?,
            refresh_token_expira: row.get(6)?,
            dispositivo_id: row.get(7)?,
            llave_publica: row.get(8)?,
            base: BaseRow::read(row, 9)?,
        })
    }
}

fn load_graph(conn: &Connection, row: UsuarioRow) -> Result<Usuario> {
    let base = row.base.into_base()?;
    let usuario_id = base.id().unwrap_or_default();

    let mut stmt = conn.prepare(&format!(
        "SELECT proveedor_referencia, codigo, expira, tipo, verificado, {}
         FROM verificaciones_2fa WHERE usuario_id = ? ORDER BY id",
        BASE_COLUMNS
    ))?;
    let verificaciones = stmt
        .query_map([usuario_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, bool>(4)?,
                BaseRow::read(r, 5)?,
            ))
        })?
        .collect::<duckdb::Result<Vec<_>>>()?
        .into_iter()
        .map(|(proveedor_referencia, codigo, expira, tipo, verificado, base)| {
            Ok(Verificacion2Fa {
                base: base.into_base()?,
                proveedor_referencia,
                codigo,
                expira: parse_timestamp(&expira)?,
                tipo: tipo.parse().map_err(Error::Database)?,
                verificado,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(&format!(
        "SELECT tipo, version, aceptado_en, {}
         FROM consentimientos WHERE usuario_id = ? ORDER BY id",
        BASE_COLUMNS
    ))?;
    let consentimientos = stmt
        .query_map([usuario_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                BaseRow::read(r, 3)?,
            ))
        })?
        .collect::<duckdb::Result<Vec<_>>>()?
        .into_iter()
        .map(|(tipo, version, aceptado_en, base)| {
            Ok(ConsentimientoUsuario {
                base: base.into_base()?,
                tipo: tipo.parse().map_err(Error::Database)?,
                version,
                aceptado_en: parse_timestamp(&aceptado_en)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let cliente = optional(conn.query_row(
        "SELECT documento FROM clientes WHERE usuario_id = ?",
        [usuario_id],
        |r| r.get::<_, String>(0),
    ))?
    .map(|doc| serde_json::from_str::<Cliente>(&doc))
    .transpose()?;

    Ok(Usuario {
        base,
        codigo_pais: row.codigo_pais,
        telefono: row.telefono,
        correo: row.correo,
        password_hash: row.password_hash,
        estatus: row.estatus.parse::<Estatus>().map_err(Error::Database)?,
        refresh_token: row.refresh_token,
        refresh_token_expira: row
            .refresh_token_expira
            .as_deref()
            .map(parse_timestamp)
            .transpose()?,
        dispositivo_id: row.dispositivo_id,
        llave_publica: row.llave_publica,
        verificaciones,
        consentimientos,
        cliente,
    })
}

/// `QueryReturnedNoRows` becomes `None`
fn optional<T>(result: duckdb::Result<T>) -> duckdb::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::database(format!("invalid timestamp '{}': {}", s, e)))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::database(format!("invalid uuid '{}': {}", s, e)))
}
