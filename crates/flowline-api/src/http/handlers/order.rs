//! Order handlers for the demo business object.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use flowline_core::repository::OrderRepository;
use flowline_types::order::{Order, OrderStatus};

use crate::http::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub amount: f64,
}

/// POST /api/v1/orders - Create an order in PENDING status.
pub async fn create_order(
    State(state): State<AppState>,
    Json(body): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    if !body.amount.is_finite() || body.amount <= 0.0 {
        return Err(AppError::validation(format!(
            "order amount must be > 0, got {}",
            body.amount
        )));
    }

    let now = Utc::now();
    let order = Order {
        id: Uuid::now_v7(),
        status: OrderStatus::Pending,
        amount: body.amount,
        created_at: now,
        updated_at: now,
    };
    state
        .order_repo
        .create_order(&order)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/v1/orders/:id - Get an order by id.
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .order_repo
        .get_order(&id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    Ok(Json(order))
}
