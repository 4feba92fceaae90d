//! Update customer command
//!
//! Manual edit of a customer record. Besides applying the changed fields it
//! stamps `updated_manually_at`, which shields the record from being
//! overwritten by any later CSV import.

use mediator::Request;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::super::types::{Customer, CUSTOMER_COLUMNS};

/// Command to update an existing customer
///
/// The id comes from the route path; absent fields keep their stored value.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateCustomerCommand {
    #[serde(skip)]
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Errors that can occur when updating a customer
#[derive(Debug, thiserror::Error)]
pub enum UpdateCustomerError {
    #[error("No fields to update")]
    NoFieldsToUpdate,

    #[error("Customer '{0}' not found")]
    NotFound(Uuid),

    #[error("Customer with email '{0}' already exists")]
    DuplicateEmail(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Request<Result<Customer, UpdateCustomerError>> for UpdateCustomerCommand {}

impl UpdateCustomerCommand {
    /// Validates the command parameters
    pub fn validate(&self) -> Result<(), UpdateCustomerError> {
        if self.email.is_none() && self.name.is_none() && self.phone.is_none() {
            return Err(UpdateCustomerError::NoFieldsToUpdate);
        }
        Ok(())
    }
}

/// Handles the update customer command
///
/// The update is a single statement so the manual-edit stamp and the field
/// changes land atomically.
#[tracing::instrument(skip(pool, command), fields(id = %command.id))]
pub async fn handle(
    pool: PgPool,
    command: UpdateCustomerCommand,
) -> Result<Customer, UpdateCustomerError> {
    command.validate()?;

    let customer = sqlx::query_as::<_, Customer>(&format!(
        r#"
        UPDATE customers
        SET email = COALESCE($2, email),
            name = COALESCE($3, name),
            phone = COALESCE($4, phone),
            updated_at = NOW(),
            updated_manually_at = NOW()
        WHERE id = $1
        RETURNING {CUSTOMER_COLUMNS}
        "#
    ))
    .bind(command.id)
    .bind(&command.email)
    .bind(&command.name)
    .bind(&command.phone)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return UpdateCustomerError::DuplicateEmail(
                    command.email.clone().unwrap_or_default(),
                );
            }
        }
        UpdateCustomerError::Database(e)
    })?
    .ok_or(UpdateCustomerError::NotFound(command.id))?;

    Ok(customer)
}
