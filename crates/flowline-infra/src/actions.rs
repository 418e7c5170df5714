//! Order actions dispatched inside the step-completion transaction.
//!
//! Each action receives the live transaction connection and an order id,
//! checks its precondition, and mutates the order row without committing;
//! the caller owns the transaction boundary, so a returned error rolls
//! everything back, StepResult and step status included.
//!
//! Actions are statically compiled in: they run inside the atomic commit,
//! and dynamic dispatch of untrusted code would break that contract.

use std::collections::HashMap;

use chrono::Utc;
use flowline_types::order::OrderStatus;
use futures_util::future::BoxFuture;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

/// Errors an action can raise. Any of these aborts the caller's
/// transaction and becomes a failed step attempt.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("order {0} not found")]
    OrderNotFound(Uuid),

    #[error("cannot {action} order in '{actual}' status (expected '{expected}')")]
    WrongStatus {
        action: &'static str,
        expected: &'static str,
        actual: String,
    },

    #[error("order amount must be > 0, got {0}")]
    NonPositiveAmount(f64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// An action function: runs against the caller's transaction.
pub type ActionFn =
    for<'c> fn(&'c mut SqliteConnection, Uuid) -> BoxFuture<'c, Result<(), ActionError>>;

/// Static name -> function table. Unknown names are no-ops at dispatch
/// time (the caller skips them); a registered action that fails aborts
/// the transaction.
pub struct ActionRegistry {
    actions: HashMap<&'static str, ActionFn>,
}

impl ActionRegistry {
    /// The built-in demo actions for the order lifecycle.
    pub fn builtin() -> Self {
        let mut actions: HashMap<&'static str, ActionFn> = HashMap::new();
        actions.insert("validate_order", validate_order as ActionFn);
        actions.insert("charge_payment", charge_payment as ActionFn);
        actions.insert("ship_order", ship_order as ActionFn);
        actions.insert("send_notification", send_notification as ActionFn);
        Self { actions }
    }

    pub fn get(&self, name: &str) -> Option<ActionFn> {
        self.actions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }
}

// ---------------------------------------------------------------------------
// Action functions
// ---------------------------------------------------------------------------

/// pending -> validated. Requires `amount > 0`.
fn validate_order(
    conn: &mut SqliteConnection,
    order_id: Uuid,
) -> BoxFuture<'_, Result<(), ActionError>> {
    Box::pin(async move {
        let (status, amount) = fetch_order(&mut *conn, order_id).await?;
        if status != OrderStatus::Pending.as_str() {
            return Err(ActionError::WrongStatus {
                action: "validate",
                expected: "pending",
                actual: status,
            });
        }
        if amount <= 0.0 {
            return Err(ActionError::NonPositiveAmount(amount));
        }
        set_order_status(conn, order_id, OrderStatus::Validated).await
    })
}

/// validated -> charged.
fn charge_payment(
    conn: &mut SqliteConnection,
    order_id: Uuid,
) -> BoxFuture<'_, Result<(), ActionError>> {
    Box::pin(async move {
        let (status, _) = fetch_order(&mut *conn, order_id).await?;
        if status != OrderStatus::Validated.as_str() {
            return Err(ActionError::WrongStatus {
                action: "charge",
                expected: "validated",
                actual: status,
            });
        }
        set_order_status(conn, order_id, OrderStatus::Charged).await
    })
}

/// charged -> shipped (terminal).
fn ship_order(
    conn: &mut SqliteConnection,
    order_id: Uuid,
) -> BoxFuture<'_, Result<(), ActionError>> {
    Box::pin(async move {
        let (status, _) = fetch_order(&mut *conn, order_id).await?;
        if status != OrderStatus::Charged.as_str() {
            return Err(ActionError::WrongStatus {
                action: "ship",
                expected: "charged",
                actual: status,
            });
        }
        set_order_status(conn, order_id, OrderStatus::Shipped).await
    })
}

/// No status transition; delivery is a log line in the demo. Still
/// requires the order to exist.
fn send_notification(
    conn: &mut SqliteConnection,
    order_id: Uuid,
) -> BoxFuture<'_, Result<(), ActionError>> {
    Box::pin(async move {
        fetch_order(conn, order_id).await?;
        tracing::info!(order_id = %order_id, "notification sent");
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn fetch_order(
    conn: &mut SqliteConnection,
    order_id: Uuid,
) -> Result<(String, f64), ActionError> {
    let row = sqlx::query("SELECT status, amount FROM business_objects WHERE id = ?")
        .bind(order_id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ActionError::OrderNotFound(order_id))?;
    Ok((row.try_get("status")?, row.try_get("amount")?))
}

async fn set_order_status(
    conn: &mut SqliteConnection,
    order_id: Uuid,
    status: OrderStatus,
) -> Result<(), ActionError> {
    sqlx::query("UPDATE business_objects SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(order_id.to_string())
        .execute(conn)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
