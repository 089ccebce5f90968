use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::booking::availability::is_available;
use crate::booking::lifecycle::{CreateBooking, PaymentConfirmation};
use crate::booking::Booking;
use crate::payments::Payment;
use crate::shared::errors::ApiError;
use crate::shared::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub equipment_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub order_ref: String,
    pub payment_ref: String,
    pub signature: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub equipment_id: Uuid,
    pub available: bool,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateBookingRequest>,
) -> Result<Json<Booking>, ApiError> {
    let booking = state
        .lifecycle
        .create(CreateBooking {
            equipment_id: req.equipment_id,
            renter_id: user.user_id,
            start_date: req.start_date,
            end_date: req.end_date,
        })
        .await?;
    Ok(Json(booking))
}

/// Synchronous confirmation path: the renter's client reports the gateway's
/// signed response fields right after checkout.
pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<Json<Booking>, ApiError> {
    let booking = state
        .store
        .booking_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("booking {id} not found")))?;
    if booking.renter_id != user.user_id && !user.is_admin {
        return Err(ApiError::Forbidden(
            "only the renter may verify this payment".to_string(),
        ));
    }
    if booking.payment_order_ref.as_deref() != Some(req.order_ref.as_str()) {
        return Err(ApiError::Validation(
            "order reference does not match this booking".to_string(),
        ));
    }

    let booking = state
        .lifecycle
        .confirm(PaymentConfirmation {
            order_ref: req.order_ref,
            payment_ref: req.payment_ref,
            signature: Some(req.signature),
        })
        .await?;
    Ok(Json(booking))
}

pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, ApiError> {
    let booking = state
        .store
        .booking_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("booking {id} not found")))?;

    let equipment = state.store.equipment_by_id(booking.equipment_id).await?;
    let is_owner = equipment.map(|e| e.owner_id == user.user_id).unwrap_or(false);
    if booking.renter_id != user.user_id && !is_owner && !user.is_admin {
        return Err(ApiError::Forbidden("not your booking".to_string()));
    }
    Ok(Json(booking))
}

/// The renter's own bookings, newest first.
pub async fn list_my_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<Booking>>, ApiError> {
    Ok(Json(state.store.bookings_for_renter(user.user_id).await?))
}

/// Bookings placed against equipment the caller owns, newest first.
pub async fn list_owned_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<Booking>>, ApiError> {
    Ok(Json(state.store.bookings_for_owner(user.user_id).await?))
}

pub async fn check_availability(
    State(state): State<Arc<AppState>>,
    Path(equipment_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    if query.start > query.end {
        return Err(ApiError::Validation(
            "start date must not be after end date".to_string(),
        ));
    }
    let available =
        is_available(state.store.as_ref(), equipment_id, query.start, query.end).await?;
    Ok(Json(AvailabilityResponse {
        equipment_id,
        available,
    }))
}

/// Gateway-side view of the captured payment for a booking.
pub async fn get_booking_payment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>, ApiError> {
    let booking = state
        .store
        .booking_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("booking {id} not found")))?;
    if booking.renter_id != user.user_id && !user.is_admin {
        return Err(ApiError::Forbidden("not your booking".to_string()));
    }
    let payment_ref = booking.payment_ref.ok_or_else(|| {
        ApiError::NotFound("no captured payment for this booking".to_string())
    })?;
    let payment = state.gateway.fetch_payment(&payment_ref).await?;
    Ok(Json(payment))
}

/// Out-of-band operator override (`approved`/`rejected` and friends). Does
/// not participate in payment reconciliation.
pub async fn update_booking_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Booking>, ApiError> {
    user.require_admin()?;
    let booking = state.lifecycle.override_status(id, &req.status).await?;
    Ok(Json(booking))
}

#[derive(Debug, Serialize)]
pub struct ReleaseExpiredResponse {
    pub released: Vec<Uuid>,
}

pub async fn release_expired_holds(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<ReleaseExpiredResponse>, ApiError> {
    user.require_admin()?;
    let timeout = Duration::minutes(state.config.hold_timeout_minutes);
    let released = state.lifecycle.release_expired(timeout).await?;
    Ok(Json(ReleaseExpiredResponse {
        released: released.into_iter().map(|b| b.id).collect(),
    }))
}
