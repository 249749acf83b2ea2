//! Durable job persistence.

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::debug;
use vodarchive_models::{Job, VodId, VodMetadata};

use crate::error::{StoreError, StoreResult};
use crate::row::{JobRow, VodMetadataRow};

/// The diagnostic staleness threshold for `LeasedAtUtc`, named in §4.4: a lease older
/// than this is suspicious but never consulted by the Dispatcher's selection logic.
pub const LEASE_STALE_THRESHOLD: Duration = Duration::minutes(10);

/// A relational store for job rows, backed by SQLite. Every method borrows its own
/// connection from the pool (`sqlx` checks one out per query), matching the requirement
/// that the Dispatcher and the Lease Keeper never share a session.
#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    /// Open (creating if necessary) a SQLite database at `path` and run migrations.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url.trim_start_matches("sqlite://"))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectFailed(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Construct directly from an already-connected pool (used by tests with an
    /// in-memory database).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a brand-new job row, as the ingestor does. Fails if `vod_id` already exists
    /// (invariant 1).
    pub async fn insert(&self, job: &Job) -> StoreResult<()> {
        let row = JobRow::from_job(job);
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                vod_id, stage, stage_priority, description, vod_file_path,
                chat_text_file_path, chat_video_file_path, final_video_file_path,
                uploaded_video_id, leased_by, leased_at_utc, failed, fail_reason, fail_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.vod_id)
        .bind(&row.stage)
        .bind(job.stage.priority() as i64)
        .bind(&row.description)
        .bind(&row.vod_file_path)
        .bind(&row.chat_text_file_path)
        .bind(&row.chat_video_file_path)
        .bind(&row.final_video_file_path)
        .bind(&row.uploaded_video_id)
        .bind(&row.leased_by)
        .bind(row.leased_at_utc)
        .bind(row.failed)
        .bind(&row.fail_reason)
        .bind(row.fail_count)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::AlreadyExists(row.vod_id))
            }
            Err(e) => Err(StoreError::from(e)),
        }
    }

    /// Point lookup by `VodId`.
    pub async fn get(&self, vod_id: &VodId) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE vod_id = ?")
            .bind(vod_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(JobRow::into_job).transpose()
    }

    /// Persist the full row, as the Dispatcher does after each stage transition.
    pub async fn save(&self, job: &Job) -> StoreResult<()> {
        let row = JobRow::from_job(job);
        let affected = sqlx::query(
            r#"
            UPDATE jobs SET
                stage = ?, stage_priority = ?, description = ?, vod_file_path = ?,
                chat_text_file_path = ?, chat_video_file_path = ?, final_video_file_path = ?,
                uploaded_video_id = ?, leased_by = ?, leased_at_utc = ?, failed = ?,
                fail_reason = ?, fail_count = ?
            WHERE vod_id = ?
            "#,
        )
        .bind(&row.stage)
        .bind(job.stage.priority() as i64)
        .bind(&row.description)
        .bind(&row.vod_file_path)
        .bind(&row.chat_text_file_path)
        .bind(&row.chat_video_file_path)
        .bind(&row.final_video_file_path)
        .bind(&row.uploaded_video_id)
        .bind(&row.leased_by)
        .bind(row.leased_at_utc)
        .bind(row.failed)
        .bind(&row.fail_reason)
        .bind(row.fail_count)
        .bind(&row.vod_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(StoreError::NotFound(row.vod_id));
        }
        Ok(())
    }

    /// The Dispatcher's selection query (§4.2): highest-priority non-failed, non-terminal
    /// job, tied-broken by ascending `vod_id`.
    pub async fn select_next_eligible(&self) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM jobs
            WHERE failed = 0 AND stage != 'uploaded'
            ORDER BY stage_priority DESC, vod_id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRow::into_job).transpose()
    }

    /// Refresh `LeasedAtUtc`/`LeasedBy` only, on the Lease Keeper's own session, so it
    /// never contends with the Dispatcher's writes to the same row.
    pub async fn refresh_lease(
        &self,
        vod_id: &VodId,
        holder: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let affected =
            sqlx::query("UPDATE jobs SET leased_by = ?, leased_at_utc = ? WHERE vod_id = ?")
                .bind(holder)
                .bind(now)
                .bind(vod_id.as_str())
                .execute(&self.pool)
                .await?
                .rows_affected();

        if affected == 0 {
            return Err(StoreError::NotFound(vod_id.as_str().to_string()));
        }
        debug!(vod_id = %vod_id, "lease refreshed");
        Ok(())
    }

    /// Clear a lease when the Dispatcher stops driving a job.
    pub async fn release_lease(&self, vod_id: &VodId) -> StoreResult<()> {
        self.refresh_lease(vod_id, "", DateTime::UNIX_EPOCH).await
    }

    /// Record the uploaded video's remote id. Written directly by `VideoUploader` as a
    /// side effect outside its status stream (§4.3), on its own session, rather than
    /// going through the Dispatcher's usual "record artifact then advance" step.
    pub async fn record_upload(&self, vod_id: &VodId, uploaded_video_id: &str) -> StoreResult<()> {
        let affected = sqlx::query("UPDATE jobs SET uploaded_video_id = ? WHERE vod_id = ?")
            .bind(uploaded_video_id)
            .bind(vod_id.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(StoreError::NotFound(vod_id.as_str().to_string()));
        }
        Ok(())
    }

    /// Diagnostic-only: jobs whose lease has not been refreshed within
    /// [`LEASE_STALE_THRESHOLD`]. Never consulted by the Dispatcher's selection logic.
    pub async fn stale_leases(&self, now: DateTime<Utc>) -> StoreResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE leased_by != ''")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(JobRow::into_job)
            .collect::<StoreResult<Vec<_>>>()
            .map(|jobs| {
                jobs.into_iter()
                    .filter(|job| now - job.leased_at_utc > LEASE_STALE_THRESHOLD)
                    .collect()
            })
    }

    /// All jobs, for the operator `status` subcommand.
    pub async fn list_all(&self) -> StoreResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs ORDER BY vod_id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// Record the auxiliary, read-only metadata the ingestor captured for a VOD.
    /// Upserted rather than strictly inserted: the ingestor may re-scan and refresh a
    /// title or stream-moment list without disturbing the job row it accompanies.
    pub async fn upsert_metadata(&self, metadata: &VodMetadata) -> StoreResult<()> {
        let row = VodMetadataRow::from_metadata(metadata)?;

        sqlx::query(
            r#"
            INSERT INTO vod_metadata (
                vod_id, channel_id, channel_display_name, source_url, title,
                streamed_at, duration_seconds, moments_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(vod_id) DO UPDATE SET
                channel_id = excluded.channel_id,
                channel_display_name = excluded.channel_display_name,
                source_url = excluded.source_url,
                title = excluded.title,
                streamed_at = excluded.streamed_at,
                duration_seconds = excluded.duration_seconds,
                moments_json = excluded.moments_json
            "#,
        )
        .bind(&row.vod_id)
        .bind(&row.channel_id)
        .bind(&row.channel_display_name)
        .bind(&row.source_url)
        .bind(&row.title)
        .bind(row.streamed_at)
        .bind(row.duration_seconds)
        .bind(&row.moments_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Point lookup of a VOD's auxiliary metadata, consulted by the Dispatcher when it
    /// builds `VodDownloader` and `VideoUploader` (§4.3). Never written by the
    /// Dispatcher itself, only by the ingestor.
    pub async fn get_metadata(&self, vod_id: &VodId) -> StoreResult<Option<VodMetadata>> {
        let row = sqlx::query_as::<_, VodMetadataRow>("SELECT * FROM vod_metadata WHERE vod_id = ?")
            .bind(vod_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(VodMetadataRow::into_metadata).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use vodarchive_models::{Job, Stage};

    async fn in_memory_store() -> JobStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        JobStore::from_pool(pool)
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = in_memory_store().await;
        let job = Job::new("v1");
        store.insert(&job).await.unwrap();

        let fetched = store.get(&job.vod_id).await.unwrap().unwrap();
        assert_eq!(fetched.vod_id, job.vod_id);
        assert_eq!(fetched.stage, Stage::Pending);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = in_memory_store().await;
        store.insert(&Job::new("v1")).await.unwrap();

        let err = store.insert(&Job::new("v1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn selection_picks_highest_priority_job() {
        // S1: store = {(a, Pending), (b, PendingRenderingChat), (c, Uploading)}.
        let store = in_memory_store().await;

        let mut a = Job::new("a");
        a.stage = Stage::Pending;
        store.insert(&a).await.unwrap();

        let mut b = Job::new("b");
        b.stage = Stage::PendingRenderingChat;
        store.insert(&b).await.unwrap();

        let mut c = Job::new("c");
        c.stage = Stage::Uploading;
        store.insert(&c).await.unwrap();

        let selected = store.select_next_eligible().await.unwrap().unwrap();
        assert_eq!(selected.vod_id.as_str(), "c");
    }

    #[tokio::test]
    async fn failed_jobs_are_never_selected() {
        // S2: store = {(broken, Pending, Failed=true), (go, Pending)}.
        let store = in_memory_store().await;

        let broken = Job::new("broken").record_failure("bad credentials", true);
        store.insert(&broken).await.unwrap();
        store.insert(&Job::new("go")).await.unwrap();

        let selected = store.select_next_eligible().await.unwrap().unwrap();
        assert_eq!(selected.vod_id.as_str(), "go");
    }

    #[tokio::test]
    async fn uploaded_terminal_jobs_are_never_selected() {
        let store = in_memory_store().await;
        let mut uploaded = Job::new("done");
        uploaded.stage = Stage::Uploaded;
        store.insert(&uploaded).await.unwrap();

        assert!(store.select_next_eligible().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ties_broken_by_ascending_vod_id() {
        let store = in_memory_store().await;
        for id in ["z", "a", "m"] {
            let mut job = Job::new(id);
            job.stage = Stage::DownloadingVod;
            store.insert(&job).await.unwrap();
        }

        let selected = store.select_next_eligible().await.unwrap().unwrap();
        assert_eq!(selected.vod_id.as_str(), "a");
    }

    #[tokio::test]
    async fn save_updates_existing_row_in_place() {
        let store = in_memory_store().await;
        let job = Job::new("v1");
        store.insert(&job).await.unwrap();

        let updated = job.begin_active_stage().with_description("downloading");
        store.save(&updated).await.unwrap();

        let fetched = store.get(&updated.vod_id).await.unwrap().unwrap();
        assert_eq!(fetched.stage, Stage::DownloadingVod);
        assert_eq!(fetched.description, "downloading");
    }

    #[tokio::test]
    async fn save_on_missing_row_is_not_found() {
        let store = in_memory_store().await;
        let err = store.save(&Job::new("ghost")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn lease_refresh_is_independent_of_stage_save() {
        let store = in_memory_store().await;
        let job = Job::new("v1");
        store.insert(&job).await.unwrap();

        let now = Utc::now();
        store.refresh_lease(&job.vod_id, "dispatcher-1", now).await.unwrap();

        let fetched = store.get(&job.vod_id).await.unwrap().unwrap();
        assert_eq!(fetched.leased_by, "dispatcher-1");
        assert_eq!(fetched.stage, Stage::Pending);
    }

    #[tokio::test]
    async fn record_upload_sets_only_uploaded_video_id() {
        let store = in_memory_store().await;
        let mut job = Job::new("v1");
        job.stage = Stage::Uploading;
        store.insert(&job).await.unwrap();

        store.record_upload(&job.vod_id, "yt-123").await.unwrap();

        let fetched = store.get(&job.vod_id).await.unwrap().unwrap();
        assert_eq!(fetched.uploaded_video_id, "yt-123");
        assert_eq!(fetched.stage, Stage::Uploading);
    }

    #[tokio::test]
    async fn stale_leases_respects_threshold() {
        let store = in_memory_store().await;
        let job = Job::new("v1");
        store.insert(&job).await.unwrap();

        let long_ago = Utc::now() - Duration::minutes(20);
        store.refresh_lease(&job.vod_id, "dispatcher-1", long_ago).await.unwrap();

        let stale = store.stale_leases(Utc::now()).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].vod_id.as_str(), "v1");
    }

    fn sample_metadata(vod_id: &str) -> VodMetadata {
        use vodarchive_models::{Channel, StreamMoment};

        VodMetadata {
            vod_id: vod_id.to_string(),
            channel: Channel {
                channel_id: "some_streamer".to_string(),
                display_name: "Some Streamer".to_string(),
            },
            source_url: format!("https://twitch.tv/videos/{vod_id}"),
            title: "Ranked Grind".to_string(),
            streamed_at: Utc::now(),
            duration_seconds: 5400,
            moments: vec![StreamMoment::GameChange {
                at_seconds: 60,
                game: "Celeste".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn metadata_round_trips_through_upsert_and_get() {
        let store = in_memory_store().await;
        let metadata = sample_metadata("v1");
        store.upsert_metadata(&metadata).await.unwrap();

        let fetched = store.get_metadata(&VodId::new("v1")).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Ranked Grind");
        assert_eq!(fetched.channel.channel_id, "some_streamer");
        assert_eq!(fetched.moments.len(), 1);
    }

    #[tokio::test]
    async fn metadata_upsert_overwrites_existing_row() {
        let store = in_memory_store().await;
        store.upsert_metadata(&sample_metadata("v1")).await.unwrap();

        let mut updated = sample_metadata("v1");
        updated.title = "Updated Title".to_string();
        store.upsert_metadata(&updated).await.unwrap();

        let fetched = store.get_metadata(&VodId::new("v1")).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Updated Title");
    }

    #[tokio::test]
    async fn missing_metadata_returns_none() {
        let store = in_memory_store().await;
        assert!(store.get_metadata(&VodId::new("ghost")).await.unwrap().is_none());
    }
}
