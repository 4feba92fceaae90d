//! Customer feature slice
//!
//! CRUD surface over the customer store. Records created or updated here are
//! the same rows the import pipeline writes; a manual update stamps
//! `updated_manually_at`, which the pipeline treats as "never overwrite".

pub mod commands;
pub mod queries;
pub mod routes;
pub mod types;

pub use routes::customers_routes;
pub use types::Customer;
