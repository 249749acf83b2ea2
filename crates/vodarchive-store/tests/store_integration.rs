//! End-to-end exercise of `JobStore` against a real SQLite file, including migrations.

use chrono::Duration;
use tempfile::TempDir;
use vodarchive_models::{Job, Stage};
use vodarchive_store::{JobStore, StoreError};

async fn open_store(dir: &TempDir) -> JobStore {
    let db_path = dir.path().join("jobs.db");
    JobStore::connect(&format!("sqlite://{}", db_path.display()))
        .await
        .unwrap()
}

#[tokio::test]
async fn migrations_create_usable_schema() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    store.insert(&Job::new("vod-1")).await.unwrap();
    assert!(store.get(&"vod-1".to_string().into()).await.unwrap().is_some());
}

#[tokio::test]
async fn rollback_scenario_persists_through_restart() {
    // S3: store = {(v1, PendingRenderingChat, VodFilePath="", ChatTextFilePath="/chat.json")}.
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let mut job = Job::new("v1");
    job.stage = Stage::PendingRenderingChat;
    job.chat_text_file_path = "/chat.json".to_string();
    store.insert(&job).await.unwrap();

    // Simulate the dispatcher observing the row after a crash: it would compute a
    // rollback target and persist it through a fresh store connection.
    let reopened = open_store(&dir).await;
    let observed = reopened.get(&job.vod_id).await.unwrap().unwrap();
    let target = observed.rollback_target().expect("rollback expected");
    assert_eq!(target, Stage::Pending);

    let mut rolled_back = observed;
    rolled_back.stage = target;
    reopened.save(&rolled_back).await.unwrap();

    let final_state = reopened.get(&job.vod_id).await.unwrap().unwrap();
    assert_eq!(final_state.stage, Stage::Pending);
}

#[tokio::test]
async fn failure_policy_scenario_s4() {
    // S4: (v1, Pending) with a worker that always throws a retryable error. After 3
    // ticks: Failed=true, FailCount=3, FailReason contains "DownloadingVod".
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let job = Job::new("v1").begin_active_stage();
    store.insert(&job).await.unwrap();

    let mut current = job;
    for _ in 0..3 {
        current = current.record_failure("network hiccup", false);
        store.save(&current).await.unwrap();
    }

    let final_state = store.get(&current.vod_id).await.unwrap().unwrap();
    assert!(final_state.failed);
    assert_eq!(final_state.fail_count, 3);
    assert!(final_state.fail_reason.contains("DownloadingVod"));
}

#[tokio::test]
async fn save_against_unknown_vod_id_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let err = store.save(&Job::new("unknown")).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn stale_lease_threshold_matches_ten_minutes() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let job = Job::new("v1");
    store.insert(&job).await.unwrap();

    let nine_minutes_ago = chrono::Utc::now() - Duration::minutes(9);
    store
        .refresh_lease(&job.vod_id, "dispatcher-1", nine_minutes_ago)
        .await
        .unwrap();
    assert!(store.stale_leases(chrono::Utc::now()).await.unwrap().is_empty());

    let eleven_minutes_ago = chrono::Utc::now() - Duration::minutes(11);
    store
        .refresh_lease(&job.vod_id, "dispatcher-1", eleven_minutes_ago)
        .await
        .unwrap();
    assert_eq!(store.stale_leases(chrono::Utc::now()).await.unwrap().len(), 1);
}
