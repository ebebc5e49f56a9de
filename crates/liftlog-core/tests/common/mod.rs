// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for liftlog-core integration tests.
//!
//! Provides TestContext for setting up a file-backed SQLite store and
//! building ingestion payloads.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

use liftlog_core::handlers::HandlerState;
use liftlog_core::persistence::SqliteStore;

/// Test context that manages a temporary database and handler state.
pub struct TestContext {
    pub store: SqliteStore,
    pub state: HandlerState,
    // Held so the database file outlives the test body.
    _tempdir: TempDir,
}

impl TestContext {
    /// Create a new test context backed by a fresh SQLite database.
    ///
    /// This sets up:
    /// 1. A temporary directory for the database file
    /// 2. A migrated SQLite store
    /// 3. A handler state wrapping the store
    pub async fn new() -> Self {
        let tempdir = tempfile::tempdir().expect("failed to create temp dir");
        let store = SqliteStore::from_path(tempdir.path().join("liftlog-test.db"))
            .await
            .expect("failed to initialize sqlite store");
        let state = HandlerState::new(Arc::new(store.clone()));

        Self {
            store,
            state,
            _tempdir: tempdir,
        }
    }
}

/// A bench-press submission with two sets, one logged in pounds and one
/// in kilograms.
pub fn build_payload(user_id: Uuid, idempotency_key: Option<&str>) -> serde_json::Value {
    json!({
        "user_id": user_id.to_string(),
        "idempotency_key": idempotency_key,
        "workout": {
            "started_at": "2024-09-05T10:00:00Z",
            "ended_at": "2024-09-05T11:00:00Z",
            "title": "Session",
        },
        "exercises": [
            {
                "display_name": "Bench Press",
                "canonical_name": "bench press",
                "sets": [
                    {"reps": 8, "weight": {"value": 135, "unit": "lb"}, "rpe": 7.5},
                    {"reps": 8, "weight": {"value": 60, "unit": "kg"}},
                ],
            }
        ],
    })
}

/// A minimal single-exercise submission for a given day and exercise name.
pub fn single_exercise_payload(
    user_id: Uuid,
    idempotency_key: Option<&str>,
    started_at: &str,
    display_name: &str,
) -> serde_json::Value {
    json!({
        "user_id": user_id.to_string(),
        "idempotency_key": idempotency_key,
        "workout": {
            "started_at": started_at,
        },
        "exercises": [
            {
                "display_name": display_name,
                "sets": [{"reps": 5}],
            }
        ],
    })
}
