//! Purchase routes.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;
use uuid::Uuid;

use boxoffice_core::{Cart, Purchase};

use crate::auth::AuthOperator;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// `POST /purchases`
pub async fn create(
    State(state): State<AppState>,
    AuthOperator(operator): AuthOperator,
    payload: Result<Json<Cart>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Purchase>)> {
    let Json(cart) = payload.map_err(|e| ApiError::bad_request("INVALID_BODY", e.body_text()))?;

    let purchase = state.checkout.checkout(cart, &operator).await?;
    info!(
        purchase_id = %purchase.id,
        operator_id = %operator.id,
        status = %purchase.status,
        "Purchase created"
    );
    Ok((StatusCode::CREATED, Json(purchase)))
}

/// `GET /purchases/{id}`
pub async fn get(
    State(state): State<AppState>,
    AuthOperator(_): AuthOperator,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Purchase>> {
    let purchase = state.service.get_purchase(purchase_id(id)?).await?;
    Ok(Json(purchase))
}

/// `DELETE /purchases/{id}`
pub async fn delete(
    State(state): State<AppState>,
    AuthOperator(operator): AuthOperator,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<StatusCode> {
    state.service.delete_purchase(purchase_id(id)?, &operator).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /purchases/{id}/refund`
pub async fn refund(
    State(state): State<AppState>,
    AuthOperator(operator): AuthOperator,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Purchase>> {
    let purchase = state.service.refund_purchase(purchase_id(id)?, &operator).await?;
    Ok(Json(purchase))
}

pub(crate) fn purchase_id(id: Result<Path<Uuid>, PathRejection>) -> ApiResult<Uuid> {
    id.map(|Path(id)| id)
        .map_err(|e| ApiError::bad_request("INVALID_ID", e.body_text()))
}
