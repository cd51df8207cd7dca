//! Event log migrations - embedded SQL files for logs.duckdb
//!
//! Same layout as [`crate::migrations`]: `(name, sql_content)` tuples applied
//! in order and tracked in the log database's own `sys_migrations`.

pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
