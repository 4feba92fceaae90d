//! List customers query
//!
//! Paginated listing, newest first, for the dashboard table.

use mediator::Request;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::super::types::{Customer, CUSTOMER_COLUMNS};
use crate::features::shared::pagination::{PaginationMetadata, PaginationParams};

/// Query to list customers with pagination
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListCustomersQuery {
    #[serde(flatten)]
    pub pagination: PaginationParams,
}

/// Response for the list customers query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListCustomersResponse {
    pub items: Vec<Customer>,
    pub pagination: PaginationMetadata,
}

/// Errors that can occur when listing customers
#[derive(Debug, thiserror::Error)]
pub enum ListCustomersError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Request<Result<ListCustomersResponse, ListCustomersError>> for ListCustomersQuery {}

/// Handles the list customers query
#[tracing::instrument(skip(pool, query), fields(page = query.pagination.page(), per_page = query.pagination.per_page()))]
pub async fn handle(
    pool: PgPool,
    query: ListCustomersQuery,
) -> Result<ListCustomersResponse, ListCustomersError> {
    let items = sqlx::query_as::<_, Customer>(&format!(
        r#"
        SELECT {CUSTOMER_COLUMNS}
        FROM customers
        ORDER BY created_at DESC
        LIMIT $1 OFFSET $2
        "#
    ))
    .bind(query.pagination.per_page())
    .bind(query.pagination.offset())
    .fetch_all(&pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
        .fetch_one(&pool)
        .await?;

    Ok(ListCustomersResponse {
        items,
        pagination: PaginationMetadata::new(
            query.pagination.page(),
            query.pagination.per_page(),
            total,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_handle_paginates_newest_first(pool: PgPool) {
        for i in 0..5 {
            sqlx::query("INSERT INTO customers (email, created_at) VALUES ($1, NOW() + ($2 || ' seconds')::interval)")
                .bind(format!("c{i}@example.com"))
                .bind(i.to_string())
                .execute(&pool)
                .await
                .unwrap();
        }

        let query = ListCustomersQuery {
            pagination: PaginationParams::new(Some(1), Some(2)),
        };

        let response = handle(pool.clone(), query).await.unwrap();
        assert_eq!(response.items.len(), 2);
        assert_eq!(response.items[0].email, "c4@example.com");
        assert_eq!(response.pagination.total, 5);
        assert_eq!(response.pagination.pages, 3);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_handle_empty_store(pool: PgPool) {
        let response = handle(pool.clone(), ListCustomersQuery::default())
            .await
            .unwrap();
        assert!(response.items.is_empty());
        assert_eq!(response.pagination.total, 0);
    }
}
