//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB and an in-memory map for the UsuarioRepository port
//! - Argon2id for PasswordHasher
//! - A JSON-lines outbox and an in-memory recorder for CodeNotifier
//! - System / manual clocks and seeded randomness for the providers

pub mod duckdb;
pub mod hasher;
pub mod memory;
pub mod outbox;
pub mod system;
