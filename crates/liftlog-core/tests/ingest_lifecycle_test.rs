// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ingestion lifecycle tests: happy path, idempotent replay, same-day
//! appends, and exercise identity resolution.

mod common;

use common::{TestContext, build_payload, single_exercise_payload};
use liftlog_core::handlers::{error_category, handle_add_workout, handle_workout_by_date};
use liftlog_core::persistence::WorkoutStore;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_health_check_db() {
    let ctx = TestContext::new().await;
    assert!(ctx.store.health_check_db().await.unwrap());
}

#[tokio::test]
async fn test_ingest_happy_path() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    let summary = handle_add_workout(&ctx.state, build_payload(user_id, None))
        .await
        .unwrap();

    assert_eq!(summary.written_workout_exercises, 1);
    assert_eq!(summary.written_sets, 2);
    assert!(!summary.idempotent_replay);
    assert!(!summary.appended_to_existing);
}

#[tokio::test]
async fn test_weight_conversion_stored() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    handle_add_workout(&ctx.state, build_payload(user_id, None))
        .await
        .unwrap();

    let response = handle_workout_by_date(
        &ctx.state,
        json!({"user_id": user_id.to_string(), "workout_date": "2024-09-05"}),
    )
    .await
    .unwrap();

    let workout = response.workout.expect("workout should exist");
    let sets = &workout.exercises[0].sets;

    // 135 lb converts to ~61.235 kg; 60 kg passes through unchanged.
    let lb_set_kg = sets[0].weight_kg.unwrap();
    assert!((lb_set_kg - 61.235).abs() / 61.235 < 0.001, "got {}", lb_set_kg);
    assert_eq!(sets[0].weight_original_value, Some(135.0));
    assert_eq!(sets[0].weight_original_unit.as_deref(), Some("lb"));

    assert_eq!(sets[1].weight_kg, Some(60.0));
    assert_eq!(sets[1].weight_original_unit.as_deref(), Some("kg"));
}

#[tokio::test]
async fn test_idempotent_replay_skips_children() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();
    let payload = build_payload(user_id, Some("abc123"));

    let first = handle_add_workout(&ctx.state, payload.clone()).await.unwrap();
    let second = handle_add_workout(&ctx.state, payload).await.unwrap();

    assert_eq!(first.workout_id, second.workout_id);
    assert!(second.idempotent_replay);
    assert!(!second.appended_to_existing);
    assert_eq!(second.written_workout_exercises, 0);
    assert_eq!(second.written_sets, 0);

    // Row counts after both calls equal the counts after the first alone.
    let response = handle_workout_by_date(
        &ctx.state,
        json!({"user_id": user_id.to_string(), "workout_date": "2024-09-05"}),
    )
    .await
    .unwrap();
    let workout = response.workout.unwrap();
    assert_eq!(workout.exercises.len(), 1);
    assert_eq!(workout.exercises[0].sets.len(), first.written_sets);
}

#[tokio::test]
async fn test_same_day_append_produces_dense_ordinals() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    let first = handle_add_workout(
        &ctx.state,
        single_exercise_payload(user_id, Some("one"), "2024-09-05T10:00:00Z", "Squat"),
    )
    .await
    .unwrap();
    let second = handle_add_workout(
        &ctx.state,
        single_exercise_payload(user_id, Some("two"), "2024-09-05T12:00:00Z", "Deadlift"),
    )
    .await
    .unwrap();

    assert_eq!(first.workout_id, second.workout_id);
    assert!(second.appended_to_existing);

    let response = handle_workout_by_date(
        &ctx.state,
        json!({"user_id": user_id.to_string(), "workout_date": "2024-09-05"}),
    )
    .await
    .unwrap();
    let workout = response.workout.unwrap();
    let ordinals: Vec<i32> = workout.exercises.iter().map(|e| e.ordinal).collect();
    assert_eq!(ordinals, vec![0, 1]);
    assert_eq!(workout.exercises[0].display_name, "Squat");
    assert_eq!(workout.exercises[1].display_name, "Deadlift");
}

#[tokio::test]
async fn test_different_days_stay_separate() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    let first = handle_add_workout(
        &ctx.state,
        single_exercise_payload(user_id, None, "2024-09-05T10:00:00Z", "Squat"),
    )
    .await
    .unwrap();
    let second = handle_add_workout(
        &ctx.state,
        single_exercise_payload(user_id, None, "2024-09-06T10:00:00Z", "Squat"),
    )
    .await
    .unwrap();

    assert_ne!(first.workout_id, second.workout_id);
    assert!(!second.appended_to_existing);
}

#[tokio::test]
async fn test_exercise_dedup_across_days() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    // Same exercise under whitespace/case variations on different days.
    handle_add_workout(
        &ctx.state,
        single_exercise_payload(user_id, Some("one"), "2024-09-01T10:00:00Z", "Deadlift"),
    )
    .await
    .unwrap();
    handle_add_workout(
        &ctx.state,
        single_exercise_payload(user_id, Some("two"), "2024-09-02T10:00:00Z", "deadlift "),
    )
    .await
    .unwrap();

    let day_one = handle_workout_by_date(
        &ctx.state,
        json!({"user_id": user_id.to_string(), "workout_date": "2024-09-01"}),
    )
    .await
    .unwrap()
    .workout
    .unwrap();
    let day_two = handle_workout_by_date(
        &ctx.state,
        json!({"user_id": user_id.to_string(), "workout_date": "2024-09-02"}),
    )
    .await
    .unwrap()
    .workout
    .unwrap();

    // Two workout-exercise rows referencing one exercise row.
    assert_eq!(
        day_one.exercises[0].exercise_id,
        day_two.exercises[0].exercise_id
    );
    assert_eq!(day_one.exercises[0].canonical_name, "deadlift");
    assert_eq!(day_two.exercises[0].canonical_name, "deadlift");
}

#[tokio::test]
async fn test_client_supplied_exercise_identity() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();
    let exercise_id = Uuid::new_v4();

    let payload = json!({
        "user_id": user_id.to_string(),
        "workout": {"started_at": "2024-09-05T10:00:00Z"},
        "exercises": [
            {
                "display_name": "Paused Bench",
                "exercise_id": exercise_id.to_string(),
                "sets": [{"reps": 3}],
            }
        ],
    });
    handle_add_workout(&ctx.state, payload).await.unwrap();

    let workout = handle_workout_by_date(
        &ctx.state,
        json!({"user_id": user_id.to_string(), "workout_date": "2024-09-05"}),
    )
    .await
    .unwrap()
    .workout
    .unwrap();

    // The exercise row was created under the client-chosen id.
    assert_eq!(workout.exercises[0].exercise_id, exercise_id.to_string());
}

#[tokio::test]
async fn test_idempotency_key_backfill_on_append() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    // First submission carries no key; the same-day follow-up does.
    handle_add_workout(
        &ctx.state,
        single_exercise_payload(user_id, None, "2024-09-05T10:00:00Z", "Squat"),
    )
    .await
    .unwrap();
    let second = handle_add_workout(
        &ctx.state,
        single_exercise_payload(user_id, Some("late-key"), "2024-09-05T12:00:00Z", "Deadlift"),
    )
    .await
    .unwrap();
    assert!(second.appended_to_existing);

    // The backfilled key now short-circuits replays of the second payload.
    let replay = handle_add_workout(
        &ctx.state,
        single_exercise_payload(user_id, Some("late-key"), "2024-09-05T12:00:00Z", "Deadlift"),
    )
    .await
    .unwrap();
    assert!(replay.idempotent_replay);
    assert_eq!(replay.workout_id, second.workout_id);
    assert_eq!(replay.written_sets, 0);
}

#[tokio::test]
async fn test_validation_failure_writes_nothing() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();

    let mut payload = build_payload(user_id, None);
    payload["exercises"][0]["sets"][0]["reps"] = json!(0);

    let err = handle_add_workout(&ctx.state, payload).await.unwrap_err();
    let category = error_category(&err).expect("should be a core error");
    assert_eq!(category.error_code(), "VALIDATION_ERROR");

    // Nothing reached the store.
    let response = handle_workout_by_date(
        &ctx.state,
        json!({"user_id": user_id.to_string(), "workout_date": "2024-09-05"}),
    )
    .await
    .unwrap();
    assert!(response.workout.is_none());
}
