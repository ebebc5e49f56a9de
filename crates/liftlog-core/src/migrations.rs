// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database migrations for liftlog-core.
//!
//! The workout schema (users, workouts, exercises, exercise blocks, sets,
//! plus the uniqueness and check constraints the ingestion engine relies
//! on) is embedded here for both backends. A transport embedding this
//! crate runs the matching migrator before serving requests;
//! [`SqliteStore::from_path`](crate::persistence::SqliteStore::from_path)
//! does so on its own.
//!
//! # Example
//!
//! ```ignore
//! use sqlx::PgPool;
//! use liftlog_core::migrations;
//!
//! let pool = PgPool::connect(&database_url).await?;
//! migrations::run_postgres(&pool).await?;
//! ```

use sqlx::migrate::MigrateError;

/// PostgreSQL migrator with all core migrations embedded.
pub static POSTGRES: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/postgresql");

/// SQLite migrator with all core migrations embedded.
pub static SQLITE: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Bring a PostgreSQL database up to the current workout schema.
///
/// Applies pending migrations only; calling it against an up-to-date
/// database is a no-op.
pub async fn run_postgres(pool: &sqlx::PgPool) -> Result<(), MigrateError> {
    POSTGRES.run(pool).await
}

/// Bring a SQLite database up to the current workout schema.
///
/// Applies pending migrations only; calling it against an up-to-date
/// database is a no-op.
pub async fn run_sqlite(pool: &sqlx::SqlitePool) -> Result<(), MigrateError> {
    SQLITE.run(pool).await
}
