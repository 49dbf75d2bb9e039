//! Operator endpoints behind a bearer token.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use common::OrderId;
use saga::OrderCheckoutSaga;
use saga_store::{FaultRecord, ReliableStore};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

const DEFAULT_FAULT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct FaultQuery {
    pub limit: Option<usize>,
    pub order_id: Option<String>,
}

/// Checks the `Authorization: Bearer` header against the configured token.
///
/// Without a configured token the admin surface does not exist.
fn authorize(expected: Option<&str>, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Err(ApiError::NotFound("Not found".to_string()));
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if token == expected => Ok(()),
        _ => {
            tracing::warn!("rejected admin request");
            Err(ApiError::Unauthorized)
        }
    }
}

/// GET /admin/saga-graph: the transition table in Graphviz DOT.
pub async fn saga_graph<St>(
    State(state): State<Arc<AppState<St>>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError>
where
    St: ReliableStore<OrderCheckoutSaga> + Clone + 'static,
{
    authorize(state.admin_token.as_deref(), &headers)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/vnd.graphviz; charset=utf-8")],
        saga::graph::to_dot(),
    ))
}

/// GET /admin/faults: parked and dead-lettered messages, newest first.
#[tracing::instrument(skip(state, headers))]
pub async fn faults<St>(
    State(state): State<Arc<AppState<St>>>,
    headers: HeaderMap,
    Query(query): Query<FaultQuery>,
) -> Result<Json<Vec<FaultRecord>>, ApiError>
where
    St: ReliableStore<OrderCheckoutSaga> + Clone + 'static,
{
    authorize(state.admin_token.as_deref(), &headers)?;

    let faults = match query.order_id {
        Some(id) => {
            let order_id = OrderId::parse_str(&id)
                .map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))?;
            state.store.faults_for(order_id).await?
        }
        None => {
            state
                .store
                .faults(query.limit.unwrap_or(DEFAULT_FAULT_LIMIT))
                .await?
        }
    };
    Ok(Json(faults))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_authorize() {
        assert!(authorize(Some("s3cret"), &bearer("s3cret")).is_ok());
        assert!(matches!(
            authorize(Some("s3cret"), &bearer("guess")),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            authorize(Some("s3cret"), &HeaderMap::new()),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            authorize(None, &bearer("s3cret")),
            Err(ApiError::NotFound(_))
        ));
    }
}
