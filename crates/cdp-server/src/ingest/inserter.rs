//! Duplicate-safe batch inserter
//!
//! Accumulates normalized rows up to a configured capacity and commits them
//! with one bulk insert. When the bulk insert trips the sink's unique email
//! constraint, the batch is replayed row by row: fresh rows insert, colliding
//! rows are reconciled with a conditional update that leaves manually edited
//! records untouched.
//!
//! The inserter writes only to the customer store; run state bookkeeping is
//! the orchestrator's job.

use sqlx::PgPool;
use uuid::Uuid;

use super::normalizer::NewCustomer;

/// Result of one flush
#[derive(Debug, Default)]
pub struct FlushOutcome {
    /// Emails of rows that were newly inserted, in batch order.
    ///
    /// Rows reconciled against an existing record do not appear here: they
    /// were not newly committed, and the run's progress counters only track
    /// fresh inserts.
    pub inserted_keys: Vec<String>,
}

impl FlushOutcome {
    pub fn inserted(&self) -> usize {
        self.inserted_keys.len()
    }
}

/// Accumulates canonical rows and commits them in bulk
pub struct BatchInserter {
    pool: PgPool,
    capacity: usize,
    pending: Vec<NewCustomer>,
}

impl BatchInserter {
    pub fn new(pool: PgPool, capacity: usize) -> Self {
        Self {
            pool,
            capacity,
            pending: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, row: NewCustomer) {
        self.pending.push(row);
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Commit the pending batch
    ///
    /// Tries one bulk insert first. A unique violation anywhere in the batch
    /// falls back to sequential per-row writes; any other database error is
    /// fatal and propagates to the caller with the batch dropped.
    pub async fn flush(&mut self) -> Result<FlushOutcome, sqlx::Error> {
        if self.pending.is_empty() {
            return Ok(FlushOutcome::default());
        }

        let batch = std::mem::take(&mut self.pending);

        match self.bulk_insert(&batch).await {
            Ok(()) => Ok(FlushOutcome {
                inserted_keys: batch.into_iter().map(|row| row.email).collect(),
            }),
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!(
                    batch_len = batch.len(),
                    "Bulk insert hit a duplicate email, replaying row by row"
                );
                self.insert_rows_individually(&batch).await
            },
            Err(e) => Err(e),
        }
    }

    async fn bulk_insert(&self, batch: &[NewCustomer]) -> Result<(), sqlx::Error> {
        let ids: Vec<Uuid> = batch.iter().map(|_| Uuid::new_v4()).collect();
        let emails: Vec<String> = batch.iter().map(|row| row.email.clone()).collect();
        let names: Vec<Option<String>> = batch.iter().map(|row| row.name.clone()).collect();
        let phones: Vec<Option<String>> = batch.iter().map(|row| row.phone.clone()).collect();

        sqlx::query(
            r#"
            INSERT INTO customers (id, email, name, phone)
            SELECT * FROM UNNEST($1::uuid[], $2::text[], $3::text[], $4::text[])
            "#,
        )
        .bind(&ids)
        .bind(&emails)
        .bind(&names)
        .bind(&phones)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Per-row fallback for a batch containing at least one duplicate
    ///
    /// Sequential on purpose: the rows must land in batch order so the
    /// recent-keys buffer stays in commit order.
    async fn insert_rows_individually(
        &self,
        batch: &[NewCustomer],
    ) -> Result<FlushOutcome, sqlx::Error> {
        let mut outcome = FlushOutcome::default();

        for row in batch {
            let inserted = sqlx::query(
                r#"
                INSERT INTO customers (id, email, name, phone)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&row.email)
            .bind(&row.name)
            .bind(&row.phone)
            .execute(&self.pool)
            .await;

            match inserted {
                Ok(_) => outcome.inserted_keys.push(row.email.clone()),
                Err(e) if is_unique_violation(&e) => {
                    self.reconcile_existing(row).await?;
                },
                Err(e) => return Err(e),
            }
        }

        Ok(outcome)
    }

    /// Reconcile a colliding row against the existing sink record
    ///
    /// Applies only when the record has never been manually edited; zero rows
    /// affected means a manual edit wins and the CSV row is discarded.
    async fn reconcile_existing(&self, row: &NewCustomer) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE customers
            SET name = $2, phone = $3, updated_at = NOW()
            WHERE email = $1 AND updated_manually_at IS NULL
            "#,
        )
        .bind(&row.email)
        .bind(&row.name)
        .bind(&row.phone)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(email = %row.email, "Skipping manually edited customer");
        }

        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(email: &str, name: &str) -> NewCustomer {
        NewCustomer {
            email: email.to_string(),
            name: Some(name.to_string()),
            phone: None,
        }
    }

    async fn customer_count(pool: &PgPool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_flush_empty_batch_is_noop(pool: PgPool) {
        let mut inserter = BatchInserter::new(pool.clone(), 10);
        let outcome = inserter.flush().await.unwrap();
        assert_eq!(outcome.inserted(), 0);
        assert_eq!(customer_count(&pool).await, 0);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_flush_commits_fresh_batch(pool: PgPool) {
        let mut inserter = BatchInserter::new(pool.clone(), 10);
        inserter.push(row("a@example.com", "Ada"));
        inserter.push(row("b@example.com", "Brian"));

        let outcome = inserter.flush().await.unwrap();

        assert_eq!(outcome.inserted_keys, vec!["a@example.com", "b@example.com"]);
        assert_eq!(customer_count(&pool).await, 2);
        assert!(inserter.is_empty());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_duplicate_in_batch_falls_back(pool: PgPool) {
        let mut inserter = BatchInserter::new(pool.clone(), 10);
        inserter.push(row("a@example.com", "First"));
        inserter.push(row("a@example.com", "Second"));

        let outcome = inserter.flush().await.unwrap();

        // Only the first occurrence is a fresh insert; the second reconciles.
        assert_eq!(outcome.inserted_keys, vec!["a@example.com"]);
        assert_eq!(customer_count(&pool).await, 1);

        let name: Option<String> =
            sqlx::query_scalar("SELECT name FROM customers WHERE email = 'a@example.com'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(name.as_deref(), Some("Second"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_collision_updates_untouched_record(pool: PgPool) {
        sqlx::query(
            "INSERT INTO customers (email, name) VALUES ('a@example.com', 'Stale Name')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let mut inserter = BatchInserter::new(pool.clone(), 10);
        inserter.push(row("a@example.com", "Fresh Name"));

        let outcome = inserter.flush().await.unwrap();
        assert_eq!(outcome.inserted(), 0);

        let name: Option<String> =
            sqlx::query_scalar("SELECT name FROM customers WHERE email = 'a@example.com'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(name.as_deref(), Some("Fresh Name"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_collision_never_clobbers_manual_edit(pool: PgPool) {
        sqlx::query(
            r#"
            INSERT INTO customers (email, name, updated_manually_at)
            VALUES ('a@example.com', 'Hand Edited', NOW())
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let mut inserter = BatchInserter::new(pool.clone(), 10);
        inserter.push(row("a@example.com", "Import Name"));

        let outcome = inserter.flush().await.unwrap();
        assert_eq!(outcome.inserted(), 0);

        let name: Option<String> =
            sqlx::query_scalar("SELECT name FROM customers WHERE email = 'a@example.com'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(name.as_deref(), Some("Hand Edited"));
    }
}
