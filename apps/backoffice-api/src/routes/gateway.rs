//! Charge status events pushed by the payment gateway.
//!
//! An event is applied exactly like a polled answer, so it may race the
//! purchase's reconciliation loop freely.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::warn;

use boxoffice_core::Purchase;
use boxoffice_settlement::{ChargeSnapshot, ChargeStatus};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub const SECRET_HEADER: &str = "x-gateway-secret";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayEvent {
    pub charge_ref: String,
    pub status: ChargeStatus,
    #[serde(default)]
    pub transaction_ref: Option<String>,
}

/// `POST /gateway/events`
pub async fn event(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<GatewayEvent>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Purchase>)> {
    let Some(expected) = state.config.gateway.webhook_secret.as_deref() else {
        warn!("Gateway event refused, no webhook secret configured");
        return Err(ApiError::forbidden("EVENTS_DISABLED", "gateway events are not accepted"));
    };

    let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if !presented.is_some_and(|presented| secret_matches(presented, expected)) {
        warn!("Gateway event with bad secret");
        return Err(ApiError::unauthenticated("invalid gateway secret"));
    }

    let Json(event) = payload.map_err(|e| ApiError::bad_request("INVALID_BODY", e.body_text()))?;

    let mut snapshot = ChargeSnapshot::new(event.status);
    if let Some(transaction_ref) = event.transaction_ref {
        snapshot = snapshot.with_transaction_ref(transaction_ref);
    }

    let purchase = state
        .reconciler
        .apply_gateway_event(&event.charge_ref, snapshot)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(purchase)))
}

/// Compares in time independent of where the inputs first differ.
fn secret_matches(presented: &str, expected: &str) -> bool {
    let len = presented.len().max(expected.len());
    let mut a = vec![0u8; len];
    let mut b = vec![0xFFu8; len];
    a[..presented.len()].copy_from_slice(presented.as_bytes());
    b[..expected.len()].copy_from_slice(expected.as_bytes());

    (presented.len().ct_eq(&expected.len()) & a.ct_eq(&b)).into()
}
