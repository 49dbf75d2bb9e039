//! Saga lookup for support tooling.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::OrderId;
use saga::OrderCheckoutSaga;
use saga_store::ReliableStore;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct SagaResponse {
    pub order_id: String,
    pub basket_id: String,
    pub state: String,
    pub version: i64,
    pub total: String,
    pub customer_email: Option<String>,
    pub order_placed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub fault_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// GET /sagas/{order_id}: current state and version of one saga.
#[tracing::instrument(skip(state))]
pub async fn get<St>(
    State(state): State<Arc<AppState<St>>>,
    Path(order_id): Path<String>,
) -> Result<Json<SagaResponse>, ApiError>
where
    St: ReliableStore<OrderCheckoutSaga> + Clone + 'static,
{
    let order_id = OrderId::parse_str(&order_id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))?;

    let (saga, version) = state
        .store
        .load(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Saga {order_id} not found")))?;

    Ok(Json(SagaResponse {
        order_id: saga.correlation_id.to_string(),
        basket_id: saga.basket_id.to_string(),
        state: saga.current_state.to_string(),
        version: version.as_i64(),
        total: saga.total_money.to_string(),
        customer_email: saga.customer_email,
        order_placed_at: saga.order_placed_at,
        finished_at: saga.finished_at,
        fault_reason: saga.fault_reason,
        updated_at: saga.updated_at,
    }))
}
