//! SQLite-backed workout store implementation.

use std::path::Path;

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::CoreError;
use crate::payload::{ExerciseInput, IngestRequest};

use super::{
    IngestSummary, WorkoutExerciseRow, WorkoutRecord, WorkoutSetRecord, WorkoutSnapshot,
    WorkoutStore, build_snapshot,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// SQLite-backed workout store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite workout store from an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a ready-to-use SQLite store from a database file path.
    ///
    /// Creates parent directories and the database file as needed,
    /// connects, and brings the workout schema up to date, so the
    /// returned store can serve ingestion and day-lookup calls
    /// immediately.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = SqliteStore::from_path(".data/liftlog.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| CoreError::DatabaseError {
                    operation: "create_dir".to_string(),
                    details: format!("Failed to create directory {:?}: {}", parent, e),
                })?;
            }
        }

        // mode=rwc creates the database file on first connect
        let path_str = path.to_string_lossy();
        let url = format!("sqlite:{}?mode=rwc", path_str);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {:?}: {}", path, e),
            })?;

        // Run migrations
        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self { pool })
    }
}

async fn find_workout_for_day(
    conn: &mut SqliteConnection,
    user_id: &str,
    workout_date: NaiveDate,
) -> Result<Option<WorkoutRecord>, CoreError> {
    let record = sqlx::query_as::<_, WorkoutRecord>(
        r#"
        SELECT id, user_id, workout_date, started_at, ended_at,
               timezone, title, source, notes, idempotency_key, created_at
        FROM workout
        WHERE user_id = ? AND workout_date = ?
        "#,
    )
    .bind(user_id)
    .bind(workout_date)
    .fetch_optional(conn)
    .await?;

    Ok(record)
}

async fn backfill_idempotency_key(
    conn: &mut SqliteConnection,
    workout_id: &str,
    idempotency_key: &str,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        UPDATE workout
        SET idempotency_key = ?
        WHERE id = ? AND idempotency_key IS NULL
        "#,
    )
    .bind(idempotency_key)
    .bind(workout_id)
    .execute(conn)
    .await?;

    Ok(())
}

async fn next_ordinal(conn: &mut SqliteConnection, workout_id: &str) -> Result<i32, CoreError> {
    let ordinal = sqlx::query_scalar::<_, i32>(
        r#"
        SELECT COALESCE(MAX(ordinal) + 1, 0)
        FROM workout_exercise
        WHERE workout_id = ?
        "#,
    )
    .bind(workout_id)
    .fetch_one(conn)
    .await?;

    Ok(ordinal)
}

async fn resolve_exercise_id(
    conn: &mut SqliteConnection,
    user_id: &str,
    exercise: &ExerciseInput,
) -> Result<String, CoreError> {
    let canonical_name = exercise.normalized_canonical_name();

    if let Some(exercise_id) = exercise.exercise_id {
        let exercise_id = exercise_id.to_string();
        let existing = sqlx::query_scalar::<_, String>("SELECT id FROM exercise WHERE id = ?")
            .bind(&exercise_id)
            .fetch_optional(&mut *conn)
            .await?;

        if let Some(id) = existing {
            return Ok(id);
        }

        sqlx::query(
            r#"
            INSERT INTO exercise (id, owner_user_id, canonical_name, display_name, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&exercise_id)
        .bind(user_id)
        .bind(&canonical_name)
        .bind(&exercise.display_name)
        .bind(Utc::now())
        .execute(conn)
        .await?;

        return Ok(exercise_id);
    }

    let existing = sqlx::query_scalar::<_, String>(
        r#"
        SELECT id
        FROM exercise
        WHERE owner_user_id = ? AND canonical_name = ?
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
    let result = sqlx::query(
        r#"
        INSERT INTO exercise (id, owner_user_id, canonical_name, display_name, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (owner_user_id, canonical_name) DO NOTHING
        "#,
    )
    .bind(&new_id)
    .bind(user_id)
    .bind(&canonical_name)
    .bind(&exercise.display_name)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(new_id);
    }

    // Lost a concurrent insert race for the same canonical name.
    let id = sqlx::query_scalar::<_, String>(
        r#"
        SELECT id
        FROM exercise
        WHERE owner_user_id = ? AND canonical_name = ?
        "#,
    )
    .bind(user_id)
    .bind(&canonical_name)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

#[async_trait::async_trait]
impl WorkoutStore for SqliteStore {
    async fn ingest(&self, request: &IngestRequest) -> Result<IngestSummary, CoreError> {
        let user_id = request.user_id.to_string();
        let workout_date = request.workout_date();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO app_user (id, created_at)
            VALUES (?, ?)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&user_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        // Idempotency short-circuit: a retry of an already-durable
        // submission is a pure no-op.
        if let Some(key) = &request.idempotency_key {
            let replay = sqlx::query_scalar::<_, String>(
                r#"
                SELECT id
                FROM workout
                WHERE user_id = ? AND idempotency_key = ?
                "#,
            )
            .bind(&user_id)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(workout_id) = replay {
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
                // SQLite has no created-vs-existing signal on upsert, so
                // insert with DO NOTHING and re-select when the insert
                // lost a race for the (user, day) slot.
                let candidate_id = Uuid::new_v4().to_string();
                let result = sqlx::query(
                    r#"
                    INSERT INTO workout (id, user_id, workout_date, started_at, ended_at,
                                         timezone, title, source, notes, idempotency_key, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT (user_id, workout_date) DO NOTHING
                    "#,
                )
                .bind(&candidate_id)
                .bind(&user_id)
                .bind(workout_date)
                .bind(request.started_at_utc())
                .bind(request.ended_at_utc())
                .bind(&request.workout.timezone)
                .bind(&request.workout.title)
                .bind(&request.workout.source)
                .bind(&request.workout.notes)
                .bind(&request.idempotency_key)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 1 {
                    (candidate_id, false, 0)
                } else {
                    debug!("Lost day-insert race, appending");
                    let workout = find_workout_for_day(&mut tx, &user_id, workout_date)
                        .await?
                        .ok_or_else(|| CoreError::DatabaseError {
                            operation: "ingest".to_string(),
                            details: format!(
                                "workout for user '{}' on {} vanished after insert conflict",
                                user_id, workout_date
                            ),
                        })?;
                    if let Some(key) = &request.idempotency_key {
                        if workout.idempotency_key.is_none() {
                            backfill_idempotency_key(&mut tx, &workout.id, key).await?;
                        }
                    }
                    let start = next_ordinal(&mut tx, &workout.id).await?;
                    (workout.id, true, start)
                }
            }
        };

        let mut written_workout_exercises = 0;
        let mut written_sets = 0;

        for (offset, exercise) in request.exercises.iter().enumerate() {
            let ordinal = ordinal_start + offset as i32;
            let exercise_id = resolve_exercise_id(&mut tx, &user_id, exercise).await?;

            let workout_exercise_id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO workout_exercise (id, workout_id, exercise_id, ordinal, notes)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&workout_exercise_id)
            .bind(&workout_id)
            .bind(&exercise_id)
            .bind(ordinal)
            .bind(&exercise.notes)
            .execute(&mut *tx)
            .await?;
            written_workout_exercises += 1;

            for (set_index, set) in exercise.sets.iter().enumerate() {
                let (weight_kg, weight_original_value, weight_original_unit) = set.weight_values();
                sqlx::query(
                    r#"
                    INSERT INTO workout_set (id, workout_exercise_id, set_index, reps,
                                             weight_kg, weight_original_value, weight_original_unit,
                                             rpe, rir, is_warmup, tempo, rest_seconds, notes, logged_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(Uuid::new_v4().to_string())
                .bind(&workout_exercise_id)
                .bind(set_index as i32)
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
                .bind(Utc::now())
                .execute(&mut *tx)
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

    async fn workout_for_day(
        &self,
        user_id: &str,
        workout_date: NaiveDate,
    ) -> Result<Option<WorkoutSnapshot>, CoreError> {
        let mut tx = self.pool.begin().await?;

        let Some(workout) = find_workout_for_day(&mut tx, user_id, workout_date).await? else {
            return Ok(None);
        };

        let exercise_rows = sqlx::query_as::<_, WorkoutExerciseRow>(
            r#"
            SELECT we.id, we.exercise_id, we.ordinal, we.notes,
                   e.display_name, e.canonical_name
            FROM workout_exercise we
            JOIN exercise e ON e.id = we.exercise_id
            WHERE we.workout_id = ?
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
            WHERE we.workout_id = ?
            ORDER BY ws.set_index ASC
            "#,
        )
        .bind(&workout.id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(build_snapshot(workout, exercise_rows, set_rows)))
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        let result: Result<(i32,), _> = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await;
        Ok(result.is_ok())
    }
}
