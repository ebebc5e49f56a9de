// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request handlers for liftlog-core.
//!
//! These handlers process untyped requests from the transport layer:
//! validation happens first, so a malformed payload never opens a
//! transaction, and a validated payload is delegated to the store as
//! one atomic operation.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::CoreError;
use crate::payload::{IngestRequest, WorkoutByDateRequest};
use crate::persistence::{IngestSummary, WorkoutSnapshot, WorkoutStore};

/// Shared state for request handlers.
///
/// Contains the store implementation shared across all handlers.
pub struct HandlerState {
    /// Workout store implementation.
    pub store: Arc<dyn WorkoutStore>,
}

impl HandlerState {
    /// Create a new handler state with the given store backend.
    pub fn new(store: Arc<dyn WorkoutStore>) -> Self {
        Self { store }
    }
}

/// Day-lookup response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct WorkoutByDateResponse {
    /// The day's workout, or null when the user logged nothing that day.
    pub workout: Option<WorkoutSnapshot>,
}

// ============================================================================
// Workout Ingestion
// ============================================================================

/// Handle a workout ingestion request.
///
/// Validates the untyped payload (closed schema, range rules), then runs
/// the ingestion transaction. An idempotent replay is a success with zero
/// written children, never an error.
///
/// # Errors
///
/// Returns [`CoreError::ValidationError`] for malformed payloads before
/// any side effect, and [`CoreError::DatabaseError`] when the transaction
/// failed and rolled back.
#[instrument(skip(state, payload))]
pub async fn handle_add_workout(
    state: &HandlerState,
    payload: serde_json::Value,
) -> Result<IngestSummary> {
    let request = IngestRequest::from_value(payload).map_err(anyhow::Error::from)?;

    debug!(
        user_id = %request.user_id,
        exercises = request.exercises.len(),
        has_idempotency_key = request.idempotency_key.is_some(),
        "Ingesting workout submission"
    );

    let summary = state
        .store
        .ingest(&request)
        .await
        .map_err(anyhow::Error::from)?;

    info!(
        workout_id = %summary.workout_id,
        written_sets = summary.written_sets,
        idempotent_replay = summary.idempotent_replay,
        appended = summary.appended_to_existing,
        "Workout submission persisted"
    );

    Ok(summary)
}

// ============================================================================
// Day Lookup
// ============================================================================

/// Handle a day-lookup request.
///
/// Reconstructs the user's workout for the requested calendar date. A
/// date with no workout yields `{ workout: null }`, not an error.
#[instrument(skip(state, payload))]
pub async fn handle_workout_by_date(
    state: &HandlerState,
    payload: serde_json::Value,
) -> Result<WorkoutByDateResponse> {
    let request = WorkoutByDateRequest::from_value(payload).map_err(anyhow::Error::from)?;

    let workout = state
        .store
        .workout_for_day(&request.user_id.to_string(), request.workout_date)
        .await
        .map_err(anyhow::Error::from)?;

    debug!(
        user_id = %request.user_id,
        workout_date = %request.workout_date,
        found = workout.is_some(),
        "Day lookup complete"
    );

    Ok(WorkoutByDateResponse { workout })
}

/// Map a handler error back to its core category, if it has one.
///
/// Transport layers use this to distinguish validation failures (caller
/// should fix and resubmit) from store failures (caller may retry).
pub fn error_category(err: &anyhow::Error) -> Option<&CoreError> {
    err.downcast_ref::<CoreError>()
}
