//! Feature modules implementing the CDP API
//!
//! Each feature is a vertical slice following the CQRS (Command Query
//! Responsibility Segregation) pattern, with its own commands, queries, and
//! routes:
//!
//! - **customers**: CRUD surface over the customer store. Manual edits stamp
//!   the marker the import pipeline must never overwrite.
//! - **imports**: start the CSV import pipeline and read its progress.
//!
//! Commands and queries implement the mediator pattern using the `mediator`
//! crate, enabling clean separation of concerns and easy testing.

pub mod customers;
pub mod imports;
pub mod shared;

use std::sync::Arc;

use axum::Router;

use crate::ingest::ImportOrchestrator;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// PostgreSQL connection pool for database operations
    pub db: sqlx::PgPool,
    /// Orchestrator owning the import pipeline lifecycle
    pub importer: Arc<ImportOrchestrator>,
}

/// Creates the main API router with all feature routes mounted
///
/// - `/customers` - customer CRUD
/// - `/import` - import start and progress
pub fn router(state: FeatureState) -> Router<()> {
    Router::new()
        .nest("/customers", customers::customers_routes().with_state(state.db.clone()))
        .nest("/import", imports::import_routes().with_state(state.importer.clone()))
}
