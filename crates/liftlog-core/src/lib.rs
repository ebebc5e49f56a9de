// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Liftlog Core - Workout Ingestion Engine
//!
//! This crate provides the ingestion and retrieval engine for strength-training
//! workout logs. Clients submit a whole workout as one payload; the engine
//! persists it durably, merges same-day submissions into a single logical
//! workout, and never double-writes when a client retries.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Transport Layer                                   │
//! │          (HTTP / tool-invocation framing, authentication)                │
//! │                      (external collaborator)                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          handlers                                        │
//! │          validate payload → delegate to WorkoutStore                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │                                              │
//!           │ ingest (one write transaction)               │ day lookup
//!           ▼                                              ▼
//! ┌───────────────────────┐                    ┌─────────────────────────────┐
//! │   Upsert Engine       │                    │        Day Reader           │
//! │ ensure user           │                    │  workout → exercises →      │
//! │ idempotency replay    │                    │  sets, nested snapshot      │
//! │ day insert-or-fetch   │                    └─────────────────────────────┘
//! │ resolve exercises     │                                 │
//! │ write blocks + sets   │                                 │
//! └───────────────────────┘                                 │
//!           │                                               │
//!           ▼                                               ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   PostgreSQL / SQLite (sqlx)                             │
//! │     unique constraints enforce the dedup invariants under races          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Operations
//!
//! | Operation | Description |
//! |-----------|-------------|
//! | `handle_add_workout` | Validate and persist one workout submission; returns a write summary |
//! | `handle_workout_by_date` | Reconstruct one user's workout for a UTC calendar date |
//!
//! ## Ingestion Semantics
//!
//! A submission lands in exactly one of three ways:
//!
//! 1. **Idempotent replay**: the (`user_id`, `idempotency_key`) pair already
//!    committed. The existing workout id is returned and nothing is written.
//! 2. **Append**: a workout already exists for the (`user_id`, UTC date of
//!    `started_at`). The submission's exercise blocks are appended after the
//!    existing ones, and a null `idempotency_key` is backfilled if this
//!    submission supplies one.
//! 3. **Create**: no same-day workout exists. A new row is inserted with a
//!    conflict-aware insert, so two concurrent first submissions for the same
//!    day resolve to one workout (the loser appends).
//!
//! Ordinals and set indexes are always engine-assigned from position, never
//! client-supplied. The whole submission commits atomically or not at all.
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `LIFTLOG_DATABASE_URL` | Yes | - | PostgreSQL or SQLite connection string |
//! | `LIFTLOG_MAX_CONNECTIONS` | No | `10` | Maximum pooled connections |
//!
//! # Modules
//!
//! - [`config`]: Engine configuration from environment variables
//! - [`error`]: Error types with error code mapping
//! - [`handlers`]: Request handlers (ingestion, day lookup)
//! - [`migrations`]: Embedded schema migrations for both backends
//! - [`normalize`]: Canonical-name and weight-unit normalization
//! - [`payload`]: Typed request payloads and validation
//! - [`persistence`]: Workout store trait and PostgreSQL/SQLite backends

#![deny(missing_docs)]

/// Engine configuration loaded from environment variables.
pub mod config;

/// Error types for core operations with error code mapping.
pub mod error;

/// Request handlers (workout ingestion, day lookup).
pub mod handlers;

/// Embedded schema migrations for PostgreSQL and SQLite.
pub mod migrations;

/// Canonical-name and weight-unit normalization.
pub mod normalize;

/// Typed request payloads and validation.
pub mod payload;

/// Workout store trait and backend implementations.
pub mod persistence;
