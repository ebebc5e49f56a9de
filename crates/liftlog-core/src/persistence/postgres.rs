// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL persistence operations for liftlog-core.
//!
//! Provides the ingestion transaction and the day read path. Mutual
//! exclusion for the per-day and per-idempotency-key uniqueness
//! invariants is delegated to the store's unique constraints combined
//! with conflict-aware inserts; no in-process locks are involved.

use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::error::CoreError;
use crate::payload::{ExerciseInput, IngestRequest, SetInput};

use super::{
    ExerciseRecord, IngestSummary, WorkoutExerciseRow, WorkoutRecord, WorkoutSetRecord,
    WorkoutSnapshot, WorkoutStore, build_snapshot,
};

/// PostgreSQL-backed workout store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new Postgres-backed workout store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// User Operations
// ============================================================================

/// Ensure the owning user row exists.
///
/// Safe to call repeatedly and under a concurrent insert race for the
/// same id: losing the race is indistinguishable from the row already
/// existing.
pub async fn ensure_user(conn: &mut PgConnection, user_id: &str) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO app_user (id, created_at)
        VALUES ($1, NOW())
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .execute(conn)
    .await?;

    Ok(())
}

// ============================================================================
// Workout Operations
// ============================================================================

/// Find the workout a (user, idempotency key) pair already committed, if any.
pub async fn find_workout_by_idempotency_key(
    conn: &mut PgConnection,
    user_id: &str,
    idempotency_key: &str,
) -> Result<Option<String>, CoreError> {
    let id = sqlx::query_scalar::<_, String>(
        r#"
        SELECT id
        FROM workout
        WHERE user_id = $1 AND idempotency_key = $2
        "#,
    )
    .bind(user_id)
    .bind(idempotency_key)
    .fetch_optional(conn)
    .await?;

    Ok(id)
}

/// Find the workout for a (user, day), if any.
pub async fn find_workout_for_day(
    conn: &mut PgConnection,
    user_id: &str,
    workout_date: NaiveDate,
) -> Result<Option<WorkoutRecord>, CoreError> {
    let record = sqlx::query_as::<_, WorkoutRecord>(
        r#"
        SELECT id, user_id, workout_date, started_at, ended_at,
               timezone, title, source, notes, idempotency_key, created_at
        FROM workout
        WHERE user_id = $1 AND workout_date = $2
        "#,
    )
    .bind(user_id)
    .bind(workout_date)
    .fetch_optional(conn)
    .await?;

    Ok(record)
}

/// Insert a workout for a (user, day), or fetch the row a concurrent
/// writer already created.
///
/// Returns the row id plus whether this call created it. The no-op
/// `DO UPDATE` makes the conflicting case return the pre-existing row,
/// and `xmax = 0` is the signal distinguishing a fresh insert from a
/// conflict-returned row.
pub async fn insert_or_fetch_day_workout(
    conn: &mut PgConnection,
    id: &str,
    user_id: &str,
    workout_date: NaiveDate,
    request: &IngestRequest,
) -> Result<(String, bool), CoreError> {
    let (workout_id, inserted) = sqlx::query_as::<_, (String, bool)>(
        r#"
        INSERT INTO workout (id, user_id, workout_date, started_at, ended_at,
                             timezone, title, source, notes, idempotency_key, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
        ON CONFLICT (user_id, workout_date) DO UPDATE
        SET user_id = EXCLUDED.user_id
        RETURNING id, (xmax = 0) AS inserted
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(workout_date)
    .bind(request.started_at_utc())
    .bind(request.ended_at_utc())
    .bind(&request.workout.timezone)
    .bind(&request.workout.title)
    .bind(&request.workout.source)
    .bind(&request.workout.notes)
    .bind(&request.idempotency_key)
    .fetch_one(conn)
    .await?;

    Ok((workout_id, inserted))
}

/// Backfill an idempotency key onto a workout that has none yet.
pub async fn backfill_idempotency_key(
    conn: &mut PgConnection,
    workout_id: &str,
    idempotency_key: &str,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        UPDATE workout
        SET idempotency_key = $2
        WHERE id = $1 AND idempotency_key IS NULL
        "#,
    )
    .bind(workout_id)
    .bind(idempotency_key)
    .execute(conn)
    .await?;

    Ok(())
}

/// Next free ordinal within a workout: one past the current maximum,
/// starting at 0 when the workout has no exercise blocks yet.
pub async fn next_ordinal(conn: &mut PgConnection, workout_id: &str) -> Result<i32, CoreError> {
    let ordinal = sqlx::query_scalar::<_, i32>(
        r#"
        SELECT COALESCE(MAX(ordinal) + 1, 0)
        FROM workout_exercise
        WHERE workout_id = $1
        "#,
    )
    .bind(workout_id)
    .fetch_one(conn)
    .await?;

    Ok(ordinal)
}

// ============================================================================
// Exercise Operations
// ============================================================================

/// Resolve an exercise block to a durable exercise id.
///
/// An explicit client-supplied id is trusted as-is when found, and
/// otherwise created under that exact id. Without one, exercise identity
/// is get-or-create keyed on (owner, canonical name), with normalization
/// applied before both lookup and storage.
pub async fn resolve_exercise_id(
    conn: &mut PgConnection,
    user_id: &str,
    exercise: &ExerciseInput,
) -> Result<String, CoreError> {
    let canonical_name = exercise.normalized_canonical_name();

    if let Some(exercise_id) = exercise.exercise_id {
        let exercise_id = exercise_id.to_string();
        let existing = sqlx::query_scalar::<_, String>(
            r#"
            SELECT id FROM exercise WHERE id = $1
            "#,
        )
        .bind(&exercise_id)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(id) = existing {
            return Ok(id);
        }

        sqlx::query(
            r#"
            INSERT INTO exercise (id, owner_user_id, canonical_name, display_name, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            "#,
        )
        .bind(&exercise_id)
        .bind(user_id)
        .bind(&canonical_name)
        .bind(&exercise.display_name)
        .execute(conn)
        .await?;

        return Ok(exercise_id);
    }

    let existing = sqlx::query_scalar::<_, String>(
        r#"
        SELECT id
        FROM exercise
        WHERE owner_user_id = $1 AND canonical_name = $2
        "#,
    )
    .bind(user_id)
    .bind(&canonical_name)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let new_id = Uuid::new_v4().to_string();
    let inserted = sqlx::query_scalar::<_, String>(
        r#"
        INSERT INTO exercise (id, owner_user_id, canonical_name, display_name, created_at)
        VALUES ($1, $2, $3, $4, NOW())
        ON CONFLICT (owner_user_id, canonical_name) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&new_id)
    .bind(user_id)
    .bind(&canonical_name)
    .bind(&exercise.display_name)
    .fetch_optional(&mut *conn)
    .await?;

    match inserted {
        Some(id) => Ok(id),
        None => {
            // Lost a concurrent insert race for the same canonical name.
            let id = sqlx::query_scalar::<_, String>(
                r#"
                SELECT id
                FROM exercise
                WHERE owner_user_id = $1 AND canonical_name = $2
                "#,
            )
            .bind(user_id)
            .bind(&canonical_name)
            .fetch_one(conn)
            .await?;
            Ok(id)
        }
    }
}

/// Get an exercise by id.
pub async fn get_exercise(
    conn: &mut PgConnection,
    exercise_id: &str,
) -> Result<Option<ExerciseRecord>, CoreError> {
    let record = sqlx::query_as::<_, ExerciseRecord>(
        r#"
        SELECT id, owner_user_id, canonical_name, display_name, muscle_group, created_at
        FROM exercise
        WHERE id = $1
        "#,
    )
    .bind(exercise_id)
    .fetch_optional(conn)
    .await?;

    Ok(record)
}

// ============================================================================
// Child Row Operations
// ============================================================================

/// Insert one workout-exercise link.
pub async fn insert_workout_exercise(
    conn: &mut PgConnection,
    id: &str,
    workout_id: &str,
    exercise_id: &str,
    ordinal: i32,
    notes: Option<&str>,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO workout_exercise (id, workout_id, exercise_id, ordinal, notes)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(workout_id)
    .bind(exercise_id)
    .bind(ordinal)
    .bind(notes)
    .execute(conn)
    .await?;

    Ok(())
}

/// Insert one workout set.
pub async fn insert_workout_set(
    conn: &mut PgConnection,
    id: &str,
    workout_exercise_id: &str,
    set_index: i32,
    set: &SetInput,
) -> Result<(), CoreError> {
    let (weight_kg, weight_original_value, weight_original_unit) = set.weight_values();

    sqlx::query(
        r#"
        INSERT INTO workout_set (id, workout_exercise_id, set_index, reps,
                                 weight_kg, weight_original_value, weight_original_unit,
                                 rpe, rir, is_warmup, tempo, rest_seconds, notes, logged_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW())
        "#,
    )
    .bind(id)
    .bind(workout_exercise_id)
    .bind(set_index)
    .bind(set.reps)
    .bind(weight_kg)
    .bind(weight_original_value)
    .bind(weight_original_unit)
    .bind(set.rpe)
    .bind(set.rir)
    .bind(set.is_warmup)
    .bind(&set.tempo)
    .bind(set.rest_seconds)
    .bind(&set.notes)
    .execute(conn)
    .await?;

    Ok(())
}

// ============================================================================
// Ingestion Transaction
// ============================================================================

/// Ingest a validated workout submission inside one transaction.
///
/// The transaction either commits every row of the submission or rolls
/// back entirely; no partial workout state is ever durable.
pub async fn ingest(pool: &PgPool, request: &IngestRequest) -> Result<IngestSummary, CoreError> {
    let user_id = request.user_id.to_string();
    let workout_date = request.workout_date();

    let mut tx = pool.begin().await?;

    ensure_user(&mut tx, &user_id).await?;

    // Idempotency short-circuit: a retry of an already-durable submission
    // is a pure no-op.
    if let Some(key) = &request.idempotency_key {
        if let Some(workout_id) =
            find_workout_by_idempotency_key(&mut tx, &user_id, key).await?
        {
            tx.commit().await?;
            debug!(workout_id = %workout_id, "Idempotent replay, skipping writes");
            return Ok(IngestSummary {
                workout_id,
                written_workout_exercises: 0,
                written_sets: 0,
                idempotent_replay: true,
                appended_to_existing: false,
            });
        }
    }

    // Resolve the workout row for (user, day).
    let existing = find_workout_for_day(&mut tx, &user_id, workout_date).await?;
    let (workout_id, appended_to_existing, ordinal_start) = match existing {
        Some(workout) => {
            if let Some(key) = &request.idempotency_key {
                if workout.idempotency_key.is_none() {
                    backfill_idempotency_key(&mut tx, &workout.id, key).await?;
                }
            }
            let start = next_ordinal(&mut tx, &workout.id).await?;
            (workout.id, true, start)
        }
        None => {
            let candidate_id = Uuid::new_v4().to_string();
            let (workout_id, inserted) =
                insert_or_fetch_day_workout(&mut tx, &candidate_id, &user_id, workout_date, request)
                    .await?;
            if inserted {
                (workout_id, false, 0)
            } else {
                // A concurrent insert for the same (user, day) committed
                // between our lookup and our insert; append to its row.
                debug!(workout_id = %workout_id, "Lost day-insert race, appending");
                if let Some(key) = &request.idempotency_key {
                    backfill_idempotency_key(&mut tx, &workout_id, key).await?;
                }
                let start = next_ordinal(&mut tx, &workout_id).await?;
                (workout_id, true, start)
            }
        }
    };

    let mut written_workout_exercises = 0;
    let mut written_sets = 0;

    for (offset, exercise) in request.exercises.iter().enumerate() {
        let ordinal = ordinal_start + offset as i32;
        let exercise_id = resolve_exercise_id(&mut tx, &user_id, exercise).await?;

        let workout_exercise_id = Uuid::new_v4().to_string();
        insert_workout_exercise(
            &mut tx,
            &workout_exercise_id,
            &workout_id,
            &exercise_id,
            ordinal,
            exercise.notes.as_deref(),
        )
        .await?;
        written_workout_exercises += 1;

        for (set_index, set) in exercise.sets.iter().enumerate() {
            let set_id = Uuid::new_v4().to_string();
            insert_workout_set(&mut tx, &set_id, &workout_exercise_id, set_index as i32, set)
                .await?;
            written_sets += 1;
        }
    }

    tx.commit().await?;

    Ok(IngestSummary {
        workout_id,
        written_workout_exercises,
        written_sets,
        idempotent_replay: false,
        appended_to_existing,
    })
}

// ============================================================================
// Day Read Path
// ============================================================================

/// Reconstruct one user's workout for a calendar date.
///
/// Runs as a single read transaction; absence is `None`, not an error.
pub async fn workout_for_day(
    pool: &PgPool,
    user_id: &str,
    workout_date: NaiveDate,
) -> Result<Option<WorkoutSnapshot>, CoreError> {
    let mut tx = pool.begin().await?;

    let Some(workout) = find_workout_for_day(&mut tx, user_id, workout_date).await? else {
        return Ok(None);
    };

    let exercise_rows = sqlx::query_as::<_, WorkoutExerciseRow>(
        r#"
        SELECT we.id, we.exercise_id, we.ordinal, we.notes,
               e.display_name, e.canonical_name
        FROM workout_exercise we
        JOIN exercise e ON e.id = we.exercise_id
        WHERE we.workout_id = $1
        ORDER BY we.ordinal ASC, we.id ASC
        "#,
    )
    .bind(&workout.id)
    .fetch_all(&mut *tx)
    .await?;

    let set_rows = sqlx::query_as::<_, WorkoutSetRecord>(
        r#"
        SELECT ws.id, ws.workout_exercise_id, ws.set_index, ws.reps,
               ws.weight_kg, ws.weight_original_value, ws.weight_original_unit,
               ws.rpe, ws.rir, ws.is_warmup, ws.tempo, ws.rest_seconds,
               ws.notes, ws.logged_at
        FROM workout_set ws
        JOIN workout_exercise we ON we.id = ws.workout_exercise_id
        WHERE we.workout_id = $1
        ORDER BY ws.set_index ASC
        "#,
    )
    .bind(&workout.id)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Some(build_snapshot(workout, exercise_rows, set_rows)))
}

// ============================================================================
// Health Operations
// ============================================================================

/// Check database health.
pub async fn health_check_db(pool: &PgPool) -> Result<bool, CoreError> {
    let result: Result<(i32,), _> = sqlx::query_as("SELECT 1").fetch_one(pool).await;
    Ok(result.is_ok())
}

#[async_trait::async_trait]
impl WorkoutStore for PostgresStore {
    async fn ingest(&self, request: &IngestRequest) -> Result<IngestSummary, CoreError> {
        ingest(&self.pool, request).await
    }

    async fn workout_for_day(
        &self,
        user_id: &str,
        workout_date: NaiveDate,
    ) -> Result<Option<WorkoutSnapshot>, CoreError> {
        workout_for_day(&self.pool, user_id, workout_date).await
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        health_check_db(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/postgresql");

    // Helper to get a test database pool
    async fn test_pool() -> Option<PgPool> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPool::connect(&url).await.ok()?;
        MIGRATOR.run(&pool).await.ok()?;
        Some(pool)
    }

    fn build_request(user_id: Uuid, idempotency_key: Option<&str>) -> IngestRequest {
        IngestRequest::from_value(json!({
            "user_id": user_id.to_string(),
            "idempotency_key": idempotency_key,
            "workout": {
                "started_at": "2024-09-05T10:00:00Z",
                "title": "Push day",
            },
            "exercises": [
                {
                    "display_name": "Bench Press",
                    "sets": [
                        {"reps": 8, "weight": {"value": 135, "unit": "lb"}, "rpe": 7.5},
                        {"reps": 8, "weight": {"value": 60, "unit": "kg"}},
                    ],
                }
            ],
        }))
        .expect("test payload should validate")
    }

    // Helper to clean up test data (cascades to workouts and exercises)
    async fn cleanup_test_user(pool: &PgPool, user_id: Uuid) {
        sqlx::query("DELETE FROM app_user WHERE id = $1")
            .bind(user_id.to_string())
            .execute(pool)
            .await
            .ok();
    }

    #[tokio::test]
    async fn test_ingest_happy_path() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };

        let user_id = Uuid::new_v4();
        let request = build_request(user_id, None);

        let summary = ingest(&pool, &request).await.unwrap();
        assert_eq!(summary.written_workout_exercises, 1);
        assert_eq!(summary.written_sets, 2);
        assert!(!summary.idempotent_replay);
        assert!(!summary.appended_to_existing);

        let weight_kg: f64 = sqlx::query_scalar(
            r#"
            SELECT ws.weight_kg
            FROM workout_set ws
            JOIN workout_exercise we ON we.id = ws.workout_exercise_id
            WHERE we.workout_id = $1 AND ws.set_index = 0
            "#,
        )
        .bind(&summary.workout_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!((weight_kg - 61.235).abs() / 61.235 < 0.001);

        cleanup_test_user(&pool, user_id).await;
    }

    #[tokio::test]
    async fn test_idempotent_replay_skips_children() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };

        let user_id = Uuid::new_v4();
        let request = build_request(user_id, Some("abc123"));

        let first = ingest(&pool, &request).await.unwrap();
        let second = ingest(&pool, &request).await.unwrap();

        assert_eq!(first.workout_id, second.workout_id);
        assert!(second.idempotent_replay);
        assert_eq!(second.written_sets, 0);

        let set_count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM workout_set ws
            JOIN workout_exercise we ON we.id = ws.workout_exercise_id
            WHERE we.workout_id = $1
            "#,
        )
        .bind(&first.workout_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(set_count as usize, first.written_sets);

        cleanup_test_user(&pool, user_id).await;
    }

    #[tokio::test]
    async fn test_same_day_append_produces_dense_ordinals() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };

        let user_id = Uuid::new_v4();
        let first = ingest(&pool, &build_request(user_id, Some("one")))
            .await
            .unwrap();
        let second = ingest(&pool, &build_request(user_id, Some("two")))
            .await
            .unwrap();

        assert_eq!(first.workout_id, second.workout_id);
        assert!(second.appended_to_existing);

        let ordinals: Vec<i32> = sqlx::query_scalar(
            "SELECT ordinal FROM workout_exercise WHERE workout_id = $1 ORDER BY ordinal",
        )
        .bind(&first.workout_id)
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(ordinals, vec![0, 1]);

        cleanup_test_user(&pool, user_id).await;
    }

    #[tokio::test]
    async fn test_insert_or_fetch_day_workout_signals_existing() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };

        let user_id = Uuid::new_v4();
        let request = build_request(user_id, None);
        let workout_date = request.workout_date();

        let mut tx = pool.begin().await.unwrap();
        ensure_user(&mut tx, &user_id.to_string()).await.unwrap();

        let first_id = Uuid::new_v4().to_string();
        let (id_a, inserted_a) = insert_or_fetch_day_workout(
            &mut tx,
            &first_id,
            &user_id.to_string(),
            workout_date,
            &request,
        )
        .await
        .unwrap();
        assert!(inserted_a);
        assert_eq!(id_a, first_id);

        // Second insert for the same (user, day) must return the existing
        // row and report that it was not created by this call.
        let second_id = Uuid::new_v4().to_string();
        let (id_b, inserted_b) = insert_or_fetch_day_workout(
            &mut tx,
            &second_id,
            &user_id.to_string(),
            workout_date,
            &request,
        )
        .await
        .unwrap();
        assert!(!inserted_b);
        assert_eq!(id_b, first_id);

        tx.commit().await.unwrap();
        cleanup_test_user(&pool, user_id).await;
    }

    #[tokio::test]
    async fn test_exercise_resolution_reuses_canonical_name() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };

        let user_id = Uuid::new_v4();
        let mut tx = pool.begin().await.unwrap();
        ensure_user(&mut tx, &user_id.to_string()).await.unwrap();

        let request = IngestRequest::from_value(json!({
            "user_id": user_id.to_string(),
            "workout": {"started_at": "2024-09-01T10:00:00Z"},
            "exercises": [
                {"display_name": "Deadlift", "sets": [{"reps": 5}]},
                {"display_name": "deadlift ", "sets": [{"reps": 3}]},
            ],
        }))
        .unwrap();

        let id_a = resolve_exercise_id(&mut tx, &user_id.to_string(), &request.exercises[0])
            .await
            .unwrap();
        let id_b = resolve_exercise_id(&mut tx, &user_id.to_string(), &request.exercises[1])
            .await
            .unwrap();
        assert_eq!(id_a, id_b);

        // The row keeps the display name from the first reference.
        let exercise = get_exercise(&mut tx, &id_a).await.unwrap().unwrap();
        assert_eq!(exercise.canonical_name, "deadlift");
        assert_eq!(exercise.display_name, "Deadlift");
        assert_eq!(exercise.owner_user_id.as_deref(), Some(user_id.to_string().as_str()));

        tx.commit().await.unwrap();
        cleanup_test_user(&pool, user_id).await;
    }

    #[tokio::test]
    async fn test_workout_for_day_absent() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };

        let user_id = Uuid::new_v4();
        let snapshot = workout_for_day(&pool, &user_id.to_string(), "2020-01-01".parse().unwrap())
            .await
            .unwrap();
        assert!(snapshot.is_none());
    }

    #[tokio::test]
    async fn test_health_check_db() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };

        let result = health_check_db(&pool).await;
        assert!(result.is_ok());
        assert!(result.unwrap());
    }
}
