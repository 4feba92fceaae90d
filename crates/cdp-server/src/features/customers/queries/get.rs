//! Get customer query

use mediator::Request;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::super::types::{Customer, CUSTOMER_COLUMNS};

/// Query to fetch a single customer by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetCustomerQuery {
    pub id: Uuid,
}

/// Errors that can occur when fetching a customer
#[derive(Debug, thiserror::Error)]
pub enum GetCustomerError {
    #[error("Customer '{0}' not found")]
    NotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Request<Result<Customer, GetCustomerError>> for GetCustomerQuery {}

/// Handles the get customer query
#[tracing::instrument(skip(pool), fields(id = %query.id))]
pub async fn handle(pool: PgPool, query: GetCustomerQuery) -> Result<Customer, GetCustomerError> {
    let customer = sqlx::query_as::<_, Customer>(&format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
    ))
    .bind(query.id)
    .fetch_optional(&pool)
    .await?
    .ok_or(GetCustomerError::NotFound(query.id))?;

    Ok(customer)
}
