// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed request payloads and validation.
//!
//! Inbound requests arrive as untyped JSON from the transport layer. The
//! structs here are the closed schema for those requests: unknown fields
//! are rejected by serde, timestamps must carry an explicit UTC offset,
//! and a semantic [`IngestRequest::validate`] pass enforces the range
//! rules before any transaction is opened.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::normalize::{WeightUnit, normalize_canonical_name, weight_to_kg};

/// A client-supplied weight for one set.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightInput {
    /// Magnitude in the supplied unit.
    pub value: f64,
    /// Unit the value was logged in.
    pub unit: WeightUnit,
}

/// Scalar workout fields of an ingestion request.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkoutInfo {
    /// When the workout started. The offset is required; naive timestamps
    /// fail deserialization.
    pub started_at: DateTime<FixedOffset>,
    /// When the workout ended, if the client tracked it.
    pub ended_at: Option<DateTime<FixedOffset>>,
    /// Informational IANA timezone name supplied by the client.
    pub timezone: Option<String>,
    /// Free-form workout title.
    pub title: Option<String>,
    /// Originating app or device.
    pub source: Option<String>,
    /// Free-form workout notes.
    pub notes: Option<String>,
}

/// One logged set within an exercise block.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetInput {
    /// Repetitions performed. Must be positive.
    pub reps: i32,
    /// Weight moved, if any.
    pub weight: Option<WeightInput>,
    /// Rate of perceived exertion, 0-10.
    pub rpe: Option<f64>,
    /// Reps in reserve. Non-negative.
    pub rir: Option<i32>,
    /// Whether this was a warmup set.
    pub is_warmup: Option<bool>,
    /// Tempo notation (e.g. "3-1-1").
    pub tempo: Option<String>,
    /// Rest taken after the set, in seconds. Non-negative.
    pub rest_seconds: Option<i32>,
    /// Free-form set notes.
    pub notes: Option<String>,
}

impl SetInput {
    /// Derived and original weight columns for storage:
    /// `(weight_kg, weight_original_value, weight_original_unit)`.
    ///
    /// A weightless set stores null for all three.
    pub fn weight_values(&self) -> (Option<f64>, Option<f64>, Option<&'static str>) {
        match self.weight {
            Some(w) => (
                Some(weight_to_kg(w.value, w.unit)),
                Some(w.value),
                Some(w.unit.as_str()),
            ),
            None => (None, None, None),
        }
    }
}

/// One exercise block of an ingestion request.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExerciseInput {
    /// Name as the client displays it.
    pub display_name: String,
    /// Explicit exercise identity chosen by the client, if any.
    pub exercise_id: Option<Uuid>,
    /// Explicit canonical name. Defaults to the normalized display name.
    pub canonical_name: Option<String>,
    /// Free-form exercise notes.
    pub notes: Option<String>,
    /// Ordered sets. Must be non-empty.
    pub sets: Vec<SetInput>,
}

impl ExerciseInput {
    /// The normalized canonical name this block resolves under.
    pub fn normalized_canonical_name(&self) -> String {
        let base = self.canonical_name.as_deref().unwrap_or(&self.display_name);
        normalize_canonical_name(base)
    }
}

/// A full workout ingestion request.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestRequest {
    /// Owning user. Created lazily on first write.
    pub user_id: Uuid,
    /// Client token for duplicate-submission detection.
    pub idempotency_key: Option<String>,
    /// Workout scalar fields.
    pub workout: WorkoutInfo,
    /// Ordered exercise blocks. Must be non-empty.
    pub exercises: Vec<ExerciseInput>,
}

impl IngestRequest {
    /// Deserialize and validate an untyped ingestion request.
    ///
    /// Unknown fields anywhere in the payload are rejected by serde; the
    /// range rules are checked by [`IngestRequest::validate`]. Nothing is
    /// persisted on failure.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let request: IngestRequest = serde_json::from_value(value)?;
        request.validate()?;
        Ok(request)
    }

    /// Semantic validation of an already-deserialized request.
    pub fn validate(&self) -> Result<()> {
        if let Some(ended_at) = self.workout.ended_at {
            if ended_at < self.workout.started_at {
                return Err(CoreError::validation(
                    "workout.ended_at",
                    "must be greater than or equal to started_at",
                ));
            }
        }

        if self.exercises.is_empty() {
            return Err(CoreError::validation("exercises", "cannot be empty"));
        }

        for (i, exercise) in self.exercises.iter().enumerate() {
            if exercise.display_name.trim().is_empty() {
                return Err(CoreError::validation(
                    format!("exercises[{}].display_name", i),
                    "must not be blank",
                ));
            }
            if exercise.sets.is_empty() {
                return Err(CoreError::validation(
                    format!("exercises[{}].sets", i),
                    "each exercise must have at least one set",
                ));
            }
            for (j, set) in exercise.sets.iter().enumerate() {
                validate_set(set, i, j)?;
            }
        }

        Ok(())
    }

    /// Workout start instant normalized to UTC.
    pub fn started_at_utc(&self) -> DateTime<Utc> {
        self.workout.started_at.with_timezone(&Utc)
    }

    /// Workout end instant normalized to UTC, if present.
    pub fn ended_at_utc(&self) -> Option<DateTime<Utc>> {
        self.workout.ended_at.map(|t| t.with_timezone(&Utc))
    }

    /// UTC calendar date the workout buckets under.
    pub fn workout_date(&self) -> NaiveDate {
        self.started_at_utc().date_naive()
    }
}

fn validate_set(set: &SetInput, exercise_idx: usize, set_idx: usize) -> Result<()> {
    let field = |name: &str| format!("exercises[{}].sets[{}].{}", exercise_idx, set_idx, name);

    if set.reps <= 0 {
        return Err(CoreError::validation(
            field("reps"),
            "must be greater than 0",
        ));
    }
    if let Some(rpe) = set.rpe {
        if !(0.0..=10.0).contains(&rpe) {
            return Err(CoreError::validation(
                field("rpe"),
                "must be between 0 and 10",
            ));
        }
    }
    if let Some(rir) = set.rir {
        if rir < 0 {
            return Err(CoreError::validation(field("rir"), "must be non-negative"));
        }
    }
    if let Some(rest) = set.rest_seconds {
        if rest < 0 {
            return Err(CoreError::validation(
                field("rest_seconds"),
                "must be non-negative",
            ));
        }
    }
    if let Some(weight) = set.weight {
        if weight.value < 0.0 {
            return Err(CoreError::validation(
                field("weight.value"),
                "must be non-negative",
            ));
        }
    }

    Ok(())
}

/// A day-lookup request.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkoutByDateRequest {
    /// Owning user.
    pub user_id: Uuid,
    /// UTC calendar date to look up.
    pub workout_date: NaiveDate,
}

impl WorkoutByDateRequest {
    /// Deserialize an untyped day-lookup request.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let request: WorkoutByDateRequest = serde_json::from_value(value)?;
        Ok(request)
    }
}
