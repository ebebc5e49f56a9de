//! Persistence interfaces and backends for liftlog-core.
//!
//! This module defines the persistence abstraction and backend implementations.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresStore;
pub use self::sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::CoreError;
use crate::payload::IngestRequest;

/// Workout row from the persistence layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkoutRecord {
    /// Unique identifier for the workout.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// UTC calendar date the workout buckets under. At most one workout
    /// exists per (user, date).
    pub workout_date: NaiveDate,
    /// When the workout started.
    pub started_at: DateTime<Utc>,
    /// When the workout ended, if tracked.
    pub ended_at: Option<DateTime<Utc>>,
    /// Informational client timezone name.
    pub timezone: Option<String>,
    /// Workout title.
    pub title: Option<String>,
    /// Originating app or device.
    pub source: Option<String>,
    /// Workout notes.
    pub notes: Option<String>,
    /// Client token for duplicate-submission detection. At most one
    /// workout exists per (user, non-null key).
    pub idempotency_key: Option<String>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

/// Exercise row from the persistence layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExerciseRecord {
    /// Unique identifier for the exercise.
    pub id: String,
    /// Owning user; null denotes a shared/global exercise.
    pub owner_user_id: Option<String>,
    /// Normalized dedup key, unique per owner.
    pub canonical_name: String,
    /// Name as first supplied by the client.
    pub display_name: String,
    /// Optional muscle-group tag. Unused by ingestion.
    pub muscle_group: Option<String>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

/// Workout-exercise row joined with its resolved exercise, as read back
/// by the day reader.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkoutExerciseRow {
    /// Unique identifier for the workout-exercise link.
    pub id: String,
    /// The resolved exercise.
    pub exercise_id: String,
    /// Engine-assigned position within the workout.
    pub ordinal: i32,
    /// Exercise-block notes.
    pub notes: Option<String>,
    /// Display name of the resolved exercise.
    pub display_name: String,
    /// Canonical name of the resolved exercise.
    pub canonical_name: String,
}

/// Workout-set row from the persistence layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkoutSetRecord {
    /// Unique identifier for the set.
    pub id: String,
    /// Owning workout-exercise block.
    pub workout_exercise_id: String,
    /// Client-ordered position within the block.
    pub set_index: i32,
    /// Repetitions performed.
    pub reps: i32,
    /// Weight converted to kilograms, if a weight was supplied.
    pub weight_kg: Option<f64>,
    /// Weight magnitude as supplied.
    pub weight_original_value: Option<f64>,
    /// Weight unit as supplied ("lb" or "kg").
    pub weight_original_unit: Option<String>,
    /// Rate of perceived exertion.
    pub rpe: Option<f64>,
    /// Reps in reserve.
    pub rir: Option<i32>,
    /// Whether this was a warmup set.
    pub is_warmup: Option<bool>,
    /// Tempo notation.
    pub tempo: Option<String>,
    /// Rest after the set, in seconds.
    pub rest_seconds: Option<i32>,
    /// Set notes.
    pub notes: Option<String>,
    /// Write timestamp.
    pub logged_at: DateTime<Utc>,
}

/// Result summary of one ingestion call.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    /// The workout the submission landed in.
    pub workout_id: String,
    /// Exercise blocks written by this call.
    pub written_workout_exercises: usize,
    /// Sets written by this call.
    pub written_sets: usize,
    /// True when the submission matched an existing (user, idempotency
    /// key) workout and nothing was written.
    pub idempotent_replay: bool,
    /// True when the submission appended to an already-existing
    /// same-day workout instead of creating one.
    pub appended_to_existing: bool,
}

/// Nested snapshot of one day's workout, as returned by the day reader.
#[derive(Debug, Clone, Serialize)]
pub struct WorkoutSnapshot {
    /// The workout id.
    pub workout_id: String,
    /// Owning user.
    pub user_id: String,
    /// UTC calendar date of the workout.
    pub workout_date: NaiveDate,
    /// When the workout started.
    pub started_at: DateTime<Utc>,
    /// When the workout ended, if tracked.
    pub ended_at: Option<DateTime<Utc>>,
    /// Informational client timezone name.
    pub timezone: Option<String>,
    /// Workout title.
    pub title: Option<String>,
    /// Originating app or device.
    pub source: Option<String>,
    /// Workout notes.
    pub notes: Option<String>,
    /// Exercise blocks ordered by ordinal.
    pub exercises: Vec<ExerciseSnapshot>,
}

/// One exercise block within a [`WorkoutSnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct ExerciseSnapshot {
    /// The workout-exercise link id.
    pub workout_exercise_id: String,
    /// The resolved exercise id.
    pub exercise_id: String,
    /// Display name of the resolved exercise.
    pub display_name: String,
    /// Canonical name of the resolved exercise.
    pub canonical_name: String,
    /// Exercise-block notes.
    pub notes: Option<String>,
    /// Engine-assigned position within the workout.
    pub ordinal: i32,
    /// Sets ordered by set index.
    pub sets: Vec<SetSnapshot>,
}

/// One set within an [`ExerciseSnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct SetSnapshot {
    /// The set id.
    pub workout_set_id: String,
    /// Client-ordered position within the block.
    pub set_index: i32,
    /// Repetitions performed.
    pub reps: i32,
    /// Weight in kilograms, if supplied.
    pub weight_kg: Option<f64>,
    /// Weight magnitude as supplied.
    pub weight_original_value: Option<f64>,
    /// Weight unit as supplied.
    pub weight_original_unit: Option<String>,
    /// Rate of perceived exertion.
    pub rpe: Option<f64>,
    /// Reps in reserve.
    pub rir: Option<i32>,
    /// Whether this was a warmup set.
    pub is_warmup: Option<bool>,
    /// Tempo notation.
    pub tempo: Option<String>,
    /// Rest after the set, in seconds.
    pub rest_seconds: Option<i32>,
    /// Set notes.
    pub notes: Option<String>,
    /// Write timestamp (RFC 3339 in the serialized form).
    pub logged_at: DateTime<Utc>,
}

/// Persistence interface used by the request handlers.
///
/// Each call runs in its own transaction: `ingest` is a single atomic
/// write transaction, `workout_for_day` a single read transaction.
#[async_trait]
pub trait WorkoutStore: Send + Sync {
    /// Ingest a validated workout submission.
    async fn ingest(&self, request: &IngestRequest) -> Result<IngestSummary, CoreError>;

    /// Reconstruct one user's workout for a calendar date, or report
    /// absence as `None`.
    async fn workout_for_day(
        &self,
        user_id: &str,
        workout_date: NaiveDate,
    ) -> Result<Option<WorkoutSnapshot>, CoreError>;

    /// Check database connectivity.
    async fn health_check_db(&self) -> Result<bool, CoreError>;
}

/// Group flat workout/exercise/set rows into the nested snapshot.
///
/// Expects `exercise_rows` ordered by ordinal and `set_rows` ordered by
/// set index; sets attach to their block by `workout_exercise_id`.
pub(crate) fn build_snapshot(
    workout: WorkoutRecord,
    exercise_rows: Vec<WorkoutExerciseRow>,
    set_rows: Vec<WorkoutSetRecord>,
) -> WorkoutSnapshot {
    let mut exercises: Vec<ExerciseSnapshot> = exercise_rows
        .into_iter()
        .map(|row| ExerciseSnapshot {
            workout_exercise_id: row.id,
            exercise_id: row.exercise_id,
            display_name: row.display_name,
            canonical_name: row.canonical_name,
            notes: row.notes,
            ordinal: row.ordinal,
            sets: Vec::new(),
        })
        .collect();

    for set in set_rows {
        if let Some(exercise) = exercises
            .iter_mut()
            .find(|e| e.workout_exercise_id == set.workout_exercise_id)
        {
            exercise.sets.push(SetSnapshot {
                workout_set_id: set.id,
                set_index: set.set_index,
                reps: set.reps,
                weight_kg: set.weight_kg,
                weight_original_value: set.weight_original_value,
                weight_original_unit: set.weight_original_unit,
                rpe: set.rpe,
                rir: set.rir,
                is_warmup: set.is_warmup,
                tempo: set.tempo,
                rest_seconds: set.rest_seconds,
                notes: set.notes,
                logged_at: set.logged_at,
            });
        }
    }

    WorkoutSnapshot {
        workout_id: workout.id,
        user_id: workout.user_id,
        workout_date: workout.workout_date,
        started_at: workout.started_at,
        ended_at: workout.ended_at,
        timezone: workout.timezone,
        title: workout.title,
        source: workout.source,
        notes: workout.notes,
        exercises,
    }
}
