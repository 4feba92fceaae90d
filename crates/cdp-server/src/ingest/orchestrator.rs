//! Import orchestrator
//!
//! Owns the run lifecycle: startup recovery, single-flight admission, and the
//! streaming loop that pulls reader -> normalizer -> inserter and checkpoints
//! progress into the run state store.
//!
//! `start()` does the synchronous part only (source check + admission) and
//! hands the multi-minute streaming work to a detached tokio task keyed by
//! the run id. The task always writes its terminal state back to the store;
//! nothing it does can take the host process down.

use futures::StreamExt;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use super::config::ImportConfig;
use super::inserter::BatchInserter;
use super::normalizer::normalize;
use super::reader::{CsvSource, SourceError};
use super::runs::{self, AdmitError, Checkpoint, ImportRun, ProgressSnapshot};

/// Log an info line roughly every this many processed rows
const PROGRESS_LOG_INTERVAL: i64 = 100_000;

/// Errors surfaced synchronously by [`ImportOrchestrator::start`]
#[derive(Debug, Error)]
pub enum StartImportError {
    /// The CSV source is missing or unreadable; no run was touched
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Another run currently holds the RUNNING slot
    #[error("an import is already running")]
    AlreadyRunning,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<AdmitError> for StartImportError {
    fn from(err: AdmitError) -> Self {
        match err {
            AdmitError::AlreadyRunning => StartImportError::AlreadyRunning,
            AdmitError::Database(e) => StartImportError::Database(e),
        }
    }
}

/// Orchestrates the customer CSV import pipeline
#[derive(Debug, Clone)]
pub struct ImportOrchestrator {
    pool: PgPool,
    config: ImportConfig,
}

impl ImportOrchestrator {
    pub fn new(pool: PgPool, config: ImportConfig) -> Self {
        Self { pool, config }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Startup recovery: demote any RUNNING run left by a dead process
    ///
    /// Must run once before the server starts admitting new imports.
    pub async fn recover(&self) -> Result<u64, sqlx::Error> {
        let recovered = runs::recover_interrupted(&self.pool).await?;

        if recovered > 0 {
            warn!(
                runs = recovered,
                "Recovered interrupted import run from a previous process"
            );
        }

        Ok(recovered)
    }

    /// Start (or resume) an import
    ///
    /// Verifies the source, then admits exactly one attempt through the
    /// transactional check in the run store. The streaming loop is scheduled
    /// on a detached task and the admitted run snapshot is returned
    /// immediately.
    pub async fn start(&self) -> Result<ImportRun, StartImportError> {
        let source = CsvSource::new(&self.config.csv_path);
        source.verify().await?;

        let admission = runs::admit(&self.pool, self.config.total_rows_estimate).await?;

        info!(
            run_id = %admission.run.id,
            resumed = admission.resumed,
            resume_from = admission.resume_from,
            "Import admitted"
        );

        let pool = self.pool.clone();
        let config = self.config.clone();
        let run = admission.run.clone();
        let resume_from = admission.resume_from;

        let span = tracing::info_span!("import_run", run_id = %run.id);
        tokio::spawn(
            async move {
                run_to_completion(pool, config, run, resume_from).await;
            }
            .instrument(span),
        );

        Ok(admission.run)
    }

    /// Snapshot of the most recently started run, or the IDLE default
    pub async fn progress(&self) -> Result<ProgressSnapshot, sqlx::Error> {
        let latest = runs::latest(&self.pool).await?;
        Ok(latest.map(ProgressSnapshot::from).unwrap_or_else(ProgressSnapshot::idle))
    }
}

/// Mutable loop state, initialized from the admitted run's counters
struct LoopState {
    processed_rows: i64,
    skipped_rows: i64,
    current_row: i64,
    resume_from: i64,
    recent_keys: Vec<String>,
    last_persisted: i64,
    last_logged: i64,
}

impl LoopState {
    fn for_run(run: &ImportRun, resume_from: i64) -> Self {
        Self {
            processed_rows: run.processed_rows,
            skipped_rows: run.skipped_rows,
            current_row: 0,
            resume_from,
            recent_keys: run.recent_keys.clone(),
            last_persisted: run.processed_rows,
            last_logged: run.processed_rows,
        }
    }

    fn record_commit(&mut self, inserted_keys: Vec<String>) {
        self.processed_rows += inserted_keys.len() as i64;
        runs::push_recent(&mut self.recent_keys, inserted_keys);
    }

    fn should_checkpoint(&self, interval: i64) -> bool {
        self.processed_rows - self.last_persisted >= interval
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            processed_rows: self.processed_rows,
            skipped_rows: self.skipped_rows,
            // The loop only checkpoints after a flush, so every consumed row
            // is either skipped or durably committed at this point.
            last_processed_row: self.current_row.max(self.resume_from),
            recent_keys: self.recent_keys.clone(),
        }
    }
}

/// Drive one run to its terminal state
///
/// Every failure mode ends here: the run is marked FAILED with whatever
/// counters accumulated, and the error never propagates past this function.
async fn run_to_completion(pool: PgPool, config: ImportConfig, run: ImportRun, resume_from: i64) {
    let run_id = run.id;
    let mut state = LoopState::for_run(&run, resume_from);

    match stream_source(&pool, &config, run_id, &mut state).await {
        Ok(()) => {
            info!(
                processed_rows = state.processed_rows,
                skipped_rows = state.skipped_rows,
                total_consumed = state.current_row,
                "Import completed"
            );
        },
        Err(e) => {
            error!(
                error = %e,
                rows_consumed = state.current_row,
                "Import failed"
            );

            // Never leave the run stuck in RUNNING; if even this write
            // fails there is nothing left to do but log it.
            if let Err(mark_err) =
                runs::fail(&pool, run_id, &state.checkpoint(), &e.to_string()).await
            {
                error!(error = %mark_err, "Failed to mark import run as failed");
            }
        },
    }
}

/// The streaming loop: read, normalize, batch, flush, checkpoint
async fn stream_source(
    pool: &PgPool,
    config: &ImportConfig,
    run_id: Uuid,
    state: &mut LoopState,
) -> anyhow::Result<()> {
    let source = CsvSource::new(&config.csv_path);
    let mut records = source.open().await?;
    let mut inserter = BatchInserter::new(pool.clone(), config.batch_size);

    if state.resume_from > 0 {
        info!(resume_from = state.resume_from, "Resuming from checkpoint");
    }

    while let Some(item) = records.next().await {
        let row_index = state.current_row;
        state.current_row += 1;

        // Resume skip: rows below the checkpoint were committed by a
        // previous attempt and are discarded without normalizing.
        if row_index < state.resume_from {
            continue;
        }

        let record = match item {
            Ok(record) => record,
            // A malformed line is a local problem; a broken read means the
            // whole source is gone and the run must fail.
            Err(e) if matches!(e.kind(), csv_async::ErrorKind::Io(_)) => return Err(e.into()),
            Err(e) => {
                debug!(row = row_index, error = %e, "Skipping malformed row");
                state.skipped_rows += 1;
                continue;
            },
        };

        match normalize(&record) {
            None => state.skipped_rows += 1,
            Some(row) => {
                inserter.push(row);

                if inserter.is_full() {
                    let outcome = inserter.flush().await?;
                    state.record_commit(outcome.inserted_keys);

                    if state.should_checkpoint(config.progress_interval) {
                        runs::persist_checkpoint(pool, run_id, &state.checkpoint()).await?;
                        state.last_persisted = state.processed_rows;
                        debug!(
                            processed_rows = state.processed_rows,
                            row = state.current_row,
                            "Checkpoint persisted"
                        );
                    }

                    if state.processed_rows - state.last_logged >= PROGRESS_LOG_INTERVAL {
                        info!(
                            processed_rows = state.processed_rows,
                            skipped_rows = state.skipped_rows,
                            "Import progress"
                        );
                        state.last_logged = state.processed_rows;
                    }
                }
            },
        }
    }

    // Trailing partial batch, then the terminal transition.
    let outcome = inserter.flush().await?;
    state.record_commit(outcome.inserted_keys);

    runs::complete(pool, run_id, &state.checkpoint()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::runs::RunStatus;

    #[test]
    fn test_loop_state_resumes_counters() {
        let run = ImportRun {
            id: Uuid::new_v4(),
            status: RunStatus::Running.as_str().to_string(),
            processed_rows: 4800,
            skipped_rows: 200,
            last_processed_row: 5000,
            total_rows: 10_000,
            recent_keys: vec!["a@example.com".to_string()],
            started_at: chrono::Utc::now(),
            completed_at: None,
            updated_at: chrono::Utc::now(),
            error_message: None,
        };

        let state = LoopState::for_run(&run, 5000);
        assert_eq!(state.processed_rows, 4800);
        assert_eq!(state.skipped_rows, 200);
        assert_eq!(state.current_row, 0);
        assert_eq!(state.resume_from, 5000);
        assert!(!state.should_checkpoint(1000));
    }

    #[test]
    fn test_checkpoint_never_regresses_below_resume_point() {
        let run = ImportRun {
            id: Uuid::new_v4(),
            status: RunStatus::Running.as_str().to_string(),
            processed_rows: 0,
            skipped_rows: 0,
            last_processed_row: 5000,
            total_rows: 10_000,
            recent_keys: Vec::new(),
            started_at: chrono::Utc::now(),
            completed_at: None,
            updated_at: chrono::Utc::now(),
            error_message: None,
        };

        // No rows consumed yet: the checkpoint must hold at the resume point.
        let state = LoopState::for_run(&run, 5000);
        assert_eq!(state.checkpoint().last_processed_row, 5000);
    }

    #[test]
    fn test_should_checkpoint_tracks_interval() {
        let run = ImportRun {
            id: Uuid::new_v4(),
            status: RunStatus::Running.as_str().to_string(),
            processed_rows: 0,
            skipped_rows: 0,
            last_processed_row: 0,
            total_rows: 0,
            recent_keys: Vec::new(),
            started_at: chrono::Utc::now(),
            completed_at: None,
            updated_at: chrono::Utc::now(),
            error_message: None,
        };

        let mut state = LoopState::for_run(&run, 0);
        state.record_commit((0..999).map(|i| format!("k{i}@x")).collect());
        assert!(!state.should_checkpoint(1000));

        state.record_commit(vec!["last@x".to_string()]);
        assert!(state.should_checkpoint(1000));
    }
}
