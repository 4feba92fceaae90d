//! Customer HTTP routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::commands::{
    CreateCustomerCommand, CreateCustomerError, UpdateCustomerCommand, UpdateCustomerError,
};
use super::queries::{
    GetCustomerError, GetCustomerQuery, ListCustomersError, ListCustomersQuery,
};
use crate::api::response::{ApiResponse, ErrorResponse};

pub fn customers_routes() -> Router<PgPool> {
    Router::new()
        .route("/", post(create_customer))
        .route("/", get(list_customers))
        .route("/:id", get(get_customer))
        .route("/:id", patch(update_customer))
}

#[tracing::instrument(skip(pool, command), fields(email = %command.email))]
async fn create_customer(
    State(pool): State<PgPool>,
    Json(command): Json<CreateCustomerCommand>,
) -> Result<Response, CustomerApiError> {
    let customer = super::commands::create::handle(pool, command).await?;

    tracing::info!(customer_id = %customer.id, "Customer created via API");

    Ok((StatusCode::CREATED, Json(ApiResponse::success(customer))).into_response())
}

#[tracing::instrument(skip(pool))]
async fn list_customers(
    State(pool): State<PgPool>,
    Query(query): Query<ListCustomersQuery>,
) -> Result<Response, CustomerApiError> {
    let response = super::queries::list::handle(pool, query).await?;

    tracing::debug!(
        count = response.items.len(),
        total = response.pagination.total,
        "Customers listed via API"
    );

    let meta = json!({
        "pagination": response.pagination
    });

    Ok((StatusCode::OK, Json(ApiResponse::success_with_meta(response.items, meta)))
        .into_response())
}

#[tracing::instrument(skip(pool), fields(id = %id))]
async fn get_customer(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> Result<Response, CustomerApiError> {
    let customer = super::queries::get::handle(pool, GetCustomerQuery { id }).await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(customer))).into_response())
}

#[tracing::instrument(skip(pool, command), fields(id = %id))]
async fn update_customer(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(mut command): Json<UpdateCustomerCommand>,
) -> Result<Response, CustomerApiError> {
    command.id = id;

    let customer = super::commands::update::handle(pool, command).await?;

    tracing::info!(customer_id = %customer.id, "Customer updated manually via API");

    Ok((StatusCode::OK, Json(ApiResponse::success(customer))).into_response())
}

#[derive(Debug)]
enum CustomerApiError {
    Create(CreateCustomerError),
    Update(UpdateCustomerError),
    Get(GetCustomerError),
    List(ListCustomersError),
}

impl From<CreateCustomerError> for CustomerApiError {
    fn from(err: CreateCustomerError) -> Self {
        Self::Create(err)
    }
}

impl From<UpdateCustomerError> for CustomerApiError {
    fn from(err: UpdateCustomerError) -> Self {
        Self::Update(err)
    }
}

impl From<GetCustomerError> for CustomerApiError {
    fn from(err: GetCustomerError) -> Self {
        Self::Get(err)
    }
}

impl From<ListCustomersError> for CustomerApiError {
    fn from(err: ListCustomersError) -> Self {
        Self::List(err)
    }
}

impl IntoResponse for CustomerApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            CustomerApiError::Create(CreateCustomerError::EmailRequired)
            | CustomerApiError::Create(CreateCustomerError::EmailInvalid(_))
            | CustomerApiError::Create(CreateCustomerError::FieldTooLong(_))
            | CustomerApiError::Update(UpdateCustomerError::NoFieldsToUpdate) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", self.to_string())
            },

            CustomerApiError::Create(CreateCustomerError::DuplicateEmail(_))
            | CustomerApiError::Update(UpdateCustomerError::DuplicateEmail(_)) => {
                (StatusCode::CONFLICT, "CONFLICT", self.to_string())
            },

            CustomerApiError::Update(UpdateCustomerError::NotFound(_))
            | CustomerApiError::Get(GetCustomerError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string())
            },

            CustomerApiError::Create(CreateCustomerError::Database(_))
            | CustomerApiError::Update(UpdateCustomerError::Database(_))
            | CustomerApiError::Get(GetCustomerError::Database(_))
            | CustomerApiError::List(ListCustomersError::Database(_)) => {
                tracing::error!("Database error in customer API: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "A database error occurred".to_string(),
                )
            },
        };

        let error = ErrorResponse::new(code, message);
        (status, Json(error)).into_response()
    }
}

impl std::fmt::Display for CustomerApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create(e) => write!(f, "{}", e),
            Self::Update(e) => write!(f, "{}", e),
            Self::Get(e) => write!(f, "{}", e),
            Self::List(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CustomerApiError::Create(CreateCustomerError::EmailRequired);
        assert!(err.to_string().contains("Email"));
    }

    #[test]
    fn test_routes_structure() {
        let router = customers_routes();
        assert!(format!("{:?}", router).contains("Router"));
    }
}
