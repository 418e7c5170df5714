//! SQLite order repository implementation.

use chrono::{DateTime, Utc};
use flowline_core::repository::order::OrderRepository;
use flowline_types::error::RepositoryError;
use flowline_types::order::{Order, OrderStatus};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `OrderRepository`.
pub struct SqliteOrderRepository {
    pool: DatabasePool,
}

impl SqliteOrderRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

impl OrderRepository for SqliteOrderRepository {
    async fn create_order(&self, order: &Order) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO business_objects (id, status, amount, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(order.id.to_string())
        .bind(order.status.as_str())
        .bind(order.amount)
        .bind(order.created_at.to_rfc3339())
        .bind(order.updated_at.to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_order(&self, id: &Uuid) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM business_objects WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status_str: String = row
            .try_get("status")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let status = OrderStatus::parse(&status_str)
            .ok_or_else(|| RepositoryError::Query(format!("invalid order status: {status_str}")))?;

        Ok(Some(Order {
            id: *id,
            status,
            amount: row
                .try_get("amount")
                .map_err(|e| RepositoryError::Query(e.to_string()))?,
            created_at: parse_datetime(
                &row.try_get::<String, _>("created_at")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?,
            )?,
            updated_at: parse_datetime(
                &row.try_get::<String, _>("updated_at")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?,
            )?,
        }))
    }
}
