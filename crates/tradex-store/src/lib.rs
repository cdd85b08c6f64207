//! tradex-store — local SQLite storage for Tradex
//!
//! # Scope
//! A thin operational layer around a single SQLite database file:
//! - path and flags are resolved from the environment exactly once
//!   into a [`Config`] and passed by reference from then on,
//! - the database file and its WAL/SHM sidecars always carry
//!   owner-only (600) permissions,
//! - demo data is seeded outside production,
//! - encryption-at-rest is delegated to SQLCipher via `PRAGMA key`
//!   (enable the `sqlcipher` cargo feature to link against it),
//! - [`BackupTool`] produces consistent snapshots of the live database
//!   and restores them with atomic-replace semantics.
//!
//! # Migration
//! SQLx migrations in `migrations/` are run on first open.

pub mod audit;
pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod permissions;
pub mod users;

mod seed;

pub use backup::BackupTool;
pub use config::{Config, DbKey, Encryption, RuntimeEnv};
pub use db::Store;
pub use error::StoreError;
