//! Demo checkout through the in-process Ordering fake.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::{BasketId, Money};
use saga::OrderCheckoutSaga;
use saga_store::ReliableStore;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub basket_id: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub total_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: String,
    pub basket_id: String,
}

/// POST /demo/checkout: records an order and starts its saga.
#[tracing::instrument(skip(state, req))]
pub async fn checkout<St>(
    State(state): State<Arc<AppState<St>>>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError>
where
    St: ReliableStore<OrderCheckoutSaga> + Clone + 'static,
{
    let ordering = state
        .ordering
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Demo participants are disabled".to_string()))?;

    if req.total_cents < 0 {
        return Err(ApiError::BadRequest("total_cents must not be negative".to_string()));
    }
    let basket_id = match req.basket_id {
        Some(id) => BasketId::parse_str(&id)
            .map_err(|e| ApiError::BadRequest(format!("Invalid basket id: {e}")))?,
        None => BasketId::new(),
    };

    let order_id = ordering
        .checkout(
            basket_id,
            req.full_name,
            req.email,
            Money::from_cents(req.total_cents),
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CheckoutResponse {
            order_id: order_id.to_string(),
            basket_id: basket_id.to_string(),
        }),
    ))
}
