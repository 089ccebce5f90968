//! Asynchronous confirmation path: the gateway's server-to-server webhook.
//!
//! Delivery is at-least-once and may race the client callback; both paths end
//! in the same idempotent lifecycle transitions.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::booking::lifecycle::PaymentConfirmation;
use crate::payments::verify_webhook_signature;
use crate::shared::errors::ApiError;
use crate::shared::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

pub const EVENT_PAYMENT_CAPTURED: &str = "payment.captured";
pub const EVENT_PAYMENT_FAILED: &str = "payment.failed";

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub order_ref: String,
    pub payment_ref: Option<String>,
    #[serde(default)]
    pub notes: HashMap<String, String>,
    pub error_description: Option<String>,
}

pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    // The signature covers the raw body, so verification happens before any
    // parsing. No secret configured means the check is skipped entirely.
    match &state.config.gateway.webhook_secret {
        Some(secret) => {
            let signature = headers
                .get(SIGNATURE_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    tracing::warn!("webhook rejected: missing signature header");
                    ApiError::Validation("missing webhook signature".to_string())
                })?;
            if !verify_webhook_signature(secret, &body, signature) {
                tracing::warn!("webhook rejected: signature mismatch");
                return Err(ApiError::Validation("invalid webhook signature".to_string()));
            }
        }
        None => {
            tracing::warn!("accepting webhook without signature verification");
        }
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Validation(format!("malformed webhook payload: {e}")))?;

    match event.event.as_str() {
        EVENT_PAYMENT_CAPTURED => {
            let payment_ref = event.payload.payment_ref.ok_or_else(|| {
                ApiError::Validation("captured event without payment reference".to_string())
            })?;
            let booking = state
                .lifecycle
                .confirm(PaymentConfirmation {
                    order_ref: event.payload.order_ref,
                    payment_ref,
                    signature: None,
                })
                .await?;
            Ok(Json(json!({ "status": "ok", "booking_id": booking.id })))
        }
        EVENT_PAYMENT_FAILED => {
            let booking = state
                .lifecycle
                .fail(
                    &event.payload.order_ref,
                    event.payload.error_description.as_deref(),
                )
                .await?;
            Ok(Json(json!({ "status": "ok", "booking_id": booking.id })))
        }
        other => {
            // Neutral ack so the gateway stops retrying events we do not
            // consume.
            tracing::debug!(event = other, "ignoring unhandled webhook event");
            Ok(Json(json!({ "status": "ignored" })))
        }
    }
}
