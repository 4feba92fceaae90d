//! Import run state store
//!
//! One `import_runs` row per ingest attempt. The store is the single source
//! of truth for "is an import running": admission happens inside one
//! transaction that locks the latest run row, and a partial unique index on
//! `status = 'running'` backs the same invariant at the constraint level, so
//! it holds across processes and restarts without any in-memory lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

/// Capacity of the recent-keys buffer carried on every run
pub const RECENT_KEYS_CAP: usize = 20;

/// Lifecycle state of an import run
///
/// `Idle` is never persisted: it is the implicit state reported when no run
/// exists at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Interrupted,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Interrupted => "interrupted",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(RunStatus::Idle),
            "running" => Ok(RunStatus::Running),
            "interrupted" => Ok(RunStatus::Interrupted),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted import run
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ImportRun {
    pub id: Uuid,
    pub status: String,
    pub processed_rows: i64,
    pub skipped_rows: i64,
    /// Count of source rows consumed; resumption starts at this row index.
    pub last_processed_row: i64,
    pub total_rows: i64,
    pub recent_keys: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl ImportRun {
    pub fn run_status(&self) -> RunStatus {
        self.status.parse().unwrap_or(RunStatus::Failed)
    }
}

/// Read-only view of the latest run, safe to hand to clients
///
/// When no run has ever existed this is the IDLE default with zeroed
/// counters and null timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub status: RunStatus,
    pub processed_rows: i64,
    pub skipped_rows: i64,
    pub last_processed_row: i64,
    pub total_rows: i64,
    pub recent_keys: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl ProgressSnapshot {
    pub fn idle() -> Self {
        Self {
            id: None,
            status: RunStatus::Idle,
            processed_rows: 0,
            skipped_rows: 0,
            last_processed_row: 0,
            total_rows: 0,
            recent_keys: Vec::new(),
            started_at: None,
            updated_at: None,
            completed_at: None,
            error_message: None,
        }
    }
}

impl From<ImportRun> for ProgressSnapshot {
    fn from(run: ImportRun) -> Self {
        let status = run.run_status();
        Self {
            id: Some(run.id),
            status,
            processed_rows: run.processed_rows,
            skipped_rows: run.skipped_rows,
            last_processed_row: run.last_processed_row,
            total_rows: run.total_rows,
            recent_keys: run.recent_keys,
            started_at: Some(run.started_at),
            updated_at: Some(run.updated_at),
            completed_at: run.completed_at,
            error_message: run.error_message,
        }
    }
}

/// Counters persisted together at every checkpoint
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    pub processed_rows: i64,
    pub skipped_rows: i64,
    pub last_processed_row: i64,
    pub recent_keys: Vec<String>,
}

/// Outcome of a successful admission
#[derive(Debug)]
pub struct Admission {
    pub run: ImportRun,
    /// Source row index to resume from; 0 for a fresh run
    pub resume_from: i64,
    pub resumed: bool,
}

/// Errors from the transactional admission check
#[derive(Debug, Error)]
pub enum AdmitError {
    #[error("an import run is already in progress")]
    AlreadyRunning,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Append committed keys, keeping only the newest `RECENT_KEYS_CAP`
pub fn push_recent(recent: &mut Vec<String>, keys: impl IntoIterator<Item = String>) {
    recent.extend(keys);
    if recent.len() > RECENT_KEYS_CAP {
        let overflow = recent.len() - RECENT_KEYS_CAP;
        recent.drain(..overflow);
    }
}

/// Demote any RUNNING run to INTERRUPTED
///
/// Executed once at process startup. A RUNNING row surviving process death is
/// proof of an abrupt stop, never a live worker; the streaming loop itself
/// never writes INTERRUPTED.
pub async fn recover_interrupted(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE import_runs
        SET status = 'interrupted', updated_at = NOW()
        WHERE status = 'running'
        "#,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Fetch the most recently started run, if any
pub async fn latest(pool: &PgPool) -> Result<Option<ImportRun>, sqlx::Error> {
    sqlx::query_as::<_, ImportRun>(
        r#"
        SELECT id, status, processed_rows, skipped_rows, last_processed_row,
               total_rows, recent_keys, started_at, completed_at, updated_at,
               error_message
        FROM import_runs
        ORDER BY started_at DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await
}

/// Admit a new attempt: resume the latest INTERRUPTED run or create a fresh one
///
/// The whole check-and-write runs in one transaction with the latest run row
/// locked, so concurrent callers serialize and exactly one wins the RUNNING
/// slot. Losers observe [`AdmitError::AlreadyRunning`] and leave no trace.
pub async fn admit(pool: &PgPool, total_rows: i64) -> Result<Admission, AdmitError> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, ImportRun>(
        r#"
        SELECT id, status, processed_rows, skipped_rows, last_processed_row,
               total_rows, recent_keys, started_at, completed_at, updated_at,
               error_message
        FROM import_runs
        ORDER BY started_at DESC
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .fetch_optional(&mut *tx)
    .await?;

    let admission = match current {
        Some(run) if run.run_status() == RunStatus::Running => {
            return Err(AdmitError::AlreadyRunning);
        },
        Some(run) if run.run_status() == RunStatus::Interrupted => {
            let resumed = sqlx::query_as::<_, ImportRun>(
                r#"
                UPDATE import_runs
                SET status = 'running', error_message = NULL, updated_at = NOW()
                WHERE id = $1
                RETURNING id, status, processed_rows, skipped_rows,
                          last_processed_row, total_rows, recent_keys,
                          started_at, completed_at, updated_at, error_message
                "#,
            )
            .bind(run.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(admit_conflict)?;

            Admission {
                resume_from: resumed.last_processed_row,
                run: resumed,
                resumed: true,
            }
        },
        _ => {
            let created = sqlx::query_as::<_, ImportRun>(
                r#"
                INSERT INTO import_runs (id, status, total_rows)
                VALUES ($1, 'running', $2)
                RETURNING id, status, processed_rows, skipped_rows,
                          last_processed_row, total_rows, recent_keys,
                          started_at, completed_at, updated_at, error_message
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(total_rows)
            .fetch_one(&mut *tx)
            .await
            .map_err(admit_conflict)?;

            Admission {
                resume_from: 0,
                run: created,
                resumed: false,
            }
        },
    };

    tx.commit().await?;

    Ok(admission)
}

/// Map the partial unique index firing into a Conflict
///
/// Two fresh starts racing over an empty table both see "no latest run"; the
/// index on `status = 'running'` lets exactly one insert succeed.
fn admit_conflict(e: sqlx::Error) -> AdmitError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return AdmitError::AlreadyRunning;
        }
    }
    AdmitError::Database(e)
}

/// Persist a progress checkpoint for a running run
pub async fn persist_checkpoint(
    pool: &PgPool,
    run_id: Uuid,
    checkpoint: &Checkpoint,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE import_runs
        SET processed_rows = $2, skipped_rows = $3, last_processed_row = $4,
            recent_keys = $5, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(run_id)
    .bind(checkpoint.processed_rows)
    .bind(checkpoint.skipped_rows)
    .bind(checkpoint.last_processed_row)
    .bind(&checkpoint.recent_keys)
    .execute(pool)
    .await?;

    Ok(())
}

/// Transition a run to COMPLETED with its final counters
pub async fn complete(
    pool: &PgPool,
    run_id: Uuid,
    checkpoint: &Checkpoint,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE import_runs
        SET status = 'completed', processed_rows = $2, skipped_rows = $3,
            last_processed_row = $4, recent_keys = $5,
            completed_at = NOW(), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(run_id)
    .bind(checkpoint.processed_rows)
    .bind(checkpoint.skipped_rows)
    .bind(checkpoint.last_processed_row)
    .bind(&checkpoint.recent_keys)
    .execute(pool)
    .await?;

    Ok(())
}

/// Transition a run to FAILED, keeping the counters accumulated so far
pub async fn fail(
    pool: &PgPool,
    run_id: Uuid,
    checkpoint: &Checkpoint,
    message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE import_runs
        SET status = 'failed', processed_rows = $2, skipped_rows = $3,
            last_processed_row = $4, recent_keys = $5,
            error_message = $6, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(run_id)
    .bind(checkpoint.processed_rows)
    .bind(checkpoint.skipped_rows)
    .bind(checkpoint.last_processed_row)
    .bind(&checkpoint.recent_keys)
    .bind(message)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            RunStatus::Idle,
            RunStatus::Running,
            RunStatus::Interrupted,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("done".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_push_recent_keeps_newest_twenty() {
        let mut recent = Vec::new();
        push_recent(&mut recent, (0..25).map(|i| format!("k{i}")));

        assert_eq!(recent.len(), RECENT_KEYS_CAP);
        assert_eq!(recent.first().map(String::as_str), Some("k5"));
        assert_eq!(recent.last().map(String::as_str), Some("k24"));
    }

    #[test]
    fn test_idle_snapshot_shape() {
        let json = serde_json::to_value(ProgressSnapshot::idle()).unwrap();
        assert_eq!(json["status"], "idle");
        assert_eq!(json["processedRows"], 0);
        assert_eq!(json["skippedRows"], 0);
        assert_eq!(json["lastProcessedRow"], 0);
        assert_eq!(json["totalRows"], 0);
        assert_eq!(json["recentKeys"], serde_json::json!([]));
        assert!(json["startedAt"].is_null());
        assert!(json["updatedAt"].is_null());
        assert!(json["completedAt"].is_null());
        assert!(json["errorMessage"].is_null());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_admit_creates_fresh_run(pool: PgPool) {
        let admission = admit(&pool, 100).await.unwrap();

        assert!(!admission.resumed);
        assert_eq!(admission.resume_from, 0);
        assert_eq!(admission.run.run_status(), RunStatus::Running);
        assert_eq!(admission.run.total_rows, 100);
        assert_eq!(admission.run.processed_rows, 0);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_admit_rejects_while_running(pool: PgPool) {
        let first = admit(&pool, 100).await.unwrap();

        let second = admit(&pool, 100).await;
        assert!(matches!(second, Err(AdmitError::AlreadyRunning)));

        // The loser changed nothing.
        let current = latest(&pool).await.unwrap().unwrap();
        assert_eq!(current.id, first.run.id);
        assert_eq!(current.run_status(), RunStatus::Running);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_concurrent_admissions_single_winner(pool: PgPool) {
        let attempts =
            futures::future::join_all((0..5).map(|_| admit(&pool, 100))).await;

        let admitted = attempts.iter().filter(|r| r.is_ok()).count();
        let rejected = attempts
            .iter()
            .filter(|r| matches!(r, Err(AdmitError::AlreadyRunning)))
            .count();

        assert_eq!(admitted, 1);
        assert_eq!(rejected, 4);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_recover_demotes_running(pool: PgPool) {
        let admission = admit(&pool, 100).await.unwrap();

        let recovered = recover_interrupted(&pool).await.unwrap();
        assert_eq!(recovered, 1);

        let run = latest(&pool).await.unwrap().unwrap();
        assert_eq!(run.id, admission.run.id);
        assert_eq!(run.run_status(), RunStatus::Interrupted);

        // Recovery is idempotent.
        assert_eq!(recover_interrupted(&pool).await.unwrap(), 0);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_admit_resumes_interrupted_run(pool: PgPool) {
        let first = admit(&pool, 100).await.unwrap();
        let checkpoint = Checkpoint {
            processed_rows: 40,
            skipped_rows: 2,
            last_processed_row: 50,
            recent_keys: vec!["a@example.com".to_string()],
        };
        persist_checkpoint(&pool, first.run.id, &checkpoint)
            .await
            .unwrap();
        fail(&pool, first.run.id, &checkpoint, "boom").await.unwrap();

        // A failed run is terminal: the next admission creates a new run.
        let second = admit(&pool, 100).await.unwrap();
        assert!(!second.resumed);
        assert_ne!(second.run.id, first.run.id);
        recover_interrupted(&pool).await.unwrap();

        // An interrupted run is resumed in place with counters preserved.
        let third = admit(&pool, 100).await.unwrap();
        assert!(third.resumed);
        assert_eq!(third.run.id, second.run.id);
        assert_eq!(third.run.run_status(), RunStatus::Running);
        assert!(third.run.error_message.is_none());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_resume_starts_at_checkpoint(pool: PgPool) {
        let first = admit(&pool, 100).await.unwrap();
        let checkpoint = Checkpoint {
            processed_rows: 4800,
            skipped_rows: 200,
            last_processed_row: 5000,
            recent_keys: vec!["z@example.com".to_string()],
        };
        persist_checkpoint(&pool, first.run.id, &checkpoint)
            .await
            .unwrap();
        recover_interrupted(&pool).await.unwrap();

        let resumed = admit(&pool, 100).await.unwrap();
        assert!(resumed.resumed);
        assert_eq!(resumed.resume_from, 5000);
        assert_eq!(resumed.run.processed_rows, 4800);
        assert_eq!(resumed.run.skipped_rows, 200);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_complete_sets_terminal_state(pool: PgPool) {
        let admission = admit(&pool, 3).await.unwrap();
        let checkpoint = Checkpoint {
            processed_rows: 1,
            skipped_rows: 1,
            last_processed_row: 3,
            recent_keys: vec!["a@example.com".to_string()],
        };

        complete(&pool, admission.run.id, &checkpoint).await.unwrap();

        let run = latest(&pool).await.unwrap().unwrap();
        assert_eq!(run.run_status(), RunStatus::Completed);
        assert_eq!(run.processed_rows, 1);
        assert_eq!(run.skipped_rows, 1);
        assert_eq!(run.last_processed_row, 3);
        assert!(run.completed_at.is_some());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_fail_keeps_partial_counters(pool: PgPool) {
        let admission = admit(&pool, 100).await.unwrap();
        let checkpoint = Checkpoint {
            processed_rows: 7,
            skipped_rows: 1,
            last_processed_row: 8,
            recent_keys: vec!["a@example.com".to_string()],
        };

        fail(&pool, admission.run.id, &checkpoint, "sink unreachable")
            .await
            .unwrap();

        let run = latest(&pool).await.unwrap().unwrap();
        assert_eq!(run.run_status(), RunStatus::Failed);
        assert_eq!(run.processed_rows, 7);
        assert_eq!(run.error_message.as_deref(), Some("sink unreachable"));
    }
}
