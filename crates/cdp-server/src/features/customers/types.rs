//! Customer domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A customer record as stored in the sink
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    /// Unique natural key
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when a human edited the record; the import pipeline never
    /// overwrites a row carrying this marker.
    pub updated_manually_at: Option<DateTime<Utc>>,
}

/// Columns selected for every customer read
pub(crate) const CUSTOMER_COLUMNS: &str =
    "id, email, name, phone, created_at, updated_at, updated_manually_at";
