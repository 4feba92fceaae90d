//! Create customer command
//!
//! Creates a single customer record. The email is the unique natural key;
//! creating an existing email fails with a conflict rather than merging.

use mediator::Request;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::super::types::{Customer, CUSTOMER_COLUMNS};

/// Longest accepted email or name value
const MAX_FIELD_LEN: usize = 255;

/// Command to create a new customer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCustomerCommand {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Errors that can occur when creating a customer
#[derive(Debug, thiserror::Error)]
pub enum CreateCustomerError {
    #[error("Email is required")]
    EmailRequired,

    #[error("Email '{0}' is not a valid address")]
    EmailInvalid(String),

    #[error("Field '{0}' exceeds {MAX_FIELD_LEN} characters")]
    FieldTooLong(&'static str),

    #[error("Customer with email '{0}' already exists")]
    DuplicateEmail(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Request<Result<Customer, CreateCustomerError>> for CreateCustomerCommand {}

impl CreateCustomerCommand {
    /// Validates the command parameters
    pub fn validate(&self) -> Result<(), CreateCustomerError> {
        let email = self.email.trim();

        if email.is_empty() {
            return Err(CreateCustomerError::EmailRequired);
        }
        if !email.contains('@') || email.len() > MAX_FIELD_LEN {
            return Err(CreateCustomerError::EmailInvalid(email.to_string()));
        }
        if self.name.as_deref().is_some_and(|n| n.len() > MAX_FIELD_LEN) {
            return Err(CreateCustomerError::FieldTooLong("name"));
        }

        Ok(())
    }
}

/// Handles the create customer command
#[tracing::instrument(skip(pool, command), fields(email = %command.email))]
pub async fn handle(
    pool: PgPool,
    command: CreateCustomerCommand,
) -> Result<Customer, CreateCustomerError> {
    command.validate()?;

    let email = command.email.trim().to_string();

    let customer = sqlx::query_as::<_, Customer>(&format!(
        r#"
        INSERT INTO customers (id, email, name, phone)
        VALUES ($1, $2, $3, $4)
        RETURNING {CUSTOMER_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(&command.name)
    .bind(&command.phone)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return CreateCustomerError::DuplicateEmail(email.clone());
            }
        }
        CreateCustomerError::Database(e)
    })?;

    Ok(customer)
}
