//! Booking state machine.
//!
//! Owns every transition of a booking record and the paired writes to the
//! equipment availability flag. Both payment confirmation paths (client
//! callback and gateway webhook) funnel into [`BookingLifecycle::confirm`],
//! which is idempotent under at-least-once delivery.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::booking::availability::{is_available, normalize_range};
use crate::booking::{total_price, Booking, BookingStatus};
use crate::payments::{
    verify_payment_signature, GatewayError, OrderRequest, PaymentGateway, PaymentReceipt,
};
use crate::store::{RentalStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("equipment not found")]
    EquipmentNotFound,
    #[error("booking not found")]
    BookingNotFound,
    #[error("invalid dates: {0}")]
    InvalidDates(String),
    #[error("invalid status: {0}")]
    InvalidStatus(String),
    #[error("equipment is not available for the requested dates")]
    Unavailable,
    #[error("payment signature mismatch")]
    SignatureMismatch,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct CreateBooking {
    pub equipment_id: Uuid,
    pub renter_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub order_ref: String,
    pub payment_ref: String,
    /// Present on the synchronous client callback; `None` when the caller has
    /// already authenticated the delivery (signed webhook body).
    pub signature: Option<String>,
}

pub struct BookingLifecycle {
    store: Arc<dyn RentalStore>,
    gateway: Arc<dyn PaymentGateway>,
    key_secret: String,
    currency: String,
}

impl BookingLifecycle {
    pub fn new(
        store: Arc<dyn RentalStore>,
        gateway: Arc<dyn PaymentGateway>,
        key_secret: String,
        currency: String,
    ) -> Self {
        Self {
            store,
            gateway,
            key_secret,
            currency,
        }
    }

    /// Create transition: admission check, eager availability lock, booking
    /// row in `awaiting_payment`, then the external payment order. If order
    /// creation fails the lock is compensated and the row kept as a
    /// `payment_failed` record.
    pub async fn create(&self, req: CreateBooking) -> Result<Booking, LifecycleError> {
        if req.start_date > req.end_date {
            return Err(LifecycleError::InvalidDates(
                "start date must not be after end date".to_string(),
            ));
        }

        let equipment = self
            .store
            .equipment_by_id(req.equipment_id)
            .await?
            .ok_or(LifecycleError::EquipmentNotFound)?;

        if !is_available(self.store.as_ref(), equipment.id, req.start_date, req.end_date).await? {
            return Err(LifecycleError::Unavailable);
        }

        // Eager lock before the gateway round trip. The compare-and-set
        // closes the race against a concurrent create that passed the same
        // admission check.
        if !self.store.try_hold(equipment.id).await? {
            return Err(LifecycleError::Unavailable);
        }

        let (start_date, end_date) = normalize_range(req.start_date, req.end_date);
        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            equipment_id: equipment.id,
            renter_id: req.renter_id,
            start_date,
            end_date,
            total_price: total_price(equipment.daily_rate, start_date, end_date),
            status: BookingStatus::AwaitingPayment.as_str().to_string(),
            payment_order_ref: None,
            payment_ref: None,
            rated: false,
            created_at: now,
            updated_at: now,
        };
        let booking = self.store.insert_booking(booking).await?;

        let order_req = OrderRequest {
            amount: booking.total_price,
            currency: self.currency.clone(),
            receipt: booking.id.to_string(),
            notes: HashMap::from([("booking_id".to_string(), booking.id.to_string())]),
        };
        match self.gateway.create_order(order_req).await {
            Ok(order) => {
                let booking = self
                    .store
                    .set_booking_order_ref(booking.id, order.order_ref)
                    .await?
                    .ok_or(LifecycleError::BookingNotFound)?;
                tracing::info!(
                    booking_id = %booking.id,
                    equipment_id = %equipment.id,
                    total = booking.total_price,
                    "booking created, awaiting payment"
                );
                Ok(booking)
            }
            Err(err) => {
                // Compensating action, not a rollback: free the slot and keep
                // the booking as a failure record.
                tracing::warn!(booking_id = %booking.id, error = %err, "payment order creation failed");
                self.store.set_availability(equipment.id, true).await?;
                self.store
                    .set_booking_status(booking.id, BookingStatus::PaymentFailed, None)
                    .await?;
                Err(LifecycleError::Gateway(err))
            }
        }
    }

    /// Confirm transition. Duplicate confirmations for an already-paid
    /// booking short-circuit without re-applying side effects. An invalid
    /// per-payment signature leaves the status untouched and releases the
    /// availability hold.
    pub async fn confirm(&self, conf: PaymentConfirmation) -> Result<Booking, LifecycleError> {
        let booking = self
            .store
            .booking_by_order_ref(&conf.order_ref)
            .await?
            .ok_or(LifecycleError::BookingNotFound)?;

        if booking.has_status(BookingStatus::Paid) {
            tracing::debug!(booking_id = %booking.id, "duplicate payment confirmation ignored");
            return Ok(booking);
        }

        if let Some(signature) = &conf.signature {
            if !verify_payment_signature(
                &self.key_secret,
                &conf.order_ref,
                &conf.payment_ref,
                signature,
            ) {
                tracing::warn!(
                    booking_id = %booking.id,
                    order_ref = %conf.order_ref,
                    "payment signature mismatch; treating hold as abandoned"
                );
                self.store
                    .set_availability(booking.equipment_id, true)
                    .await?;
                return Err(LifecycleError::SignatureMismatch);
            }
        }

        let booking = self
            .store
            .set_booking_status(booking.id, BookingStatus::Paid, Some(conf.payment_ref.clone()))
            .await?
            .ok_or(LifecycleError::BookingNotFound)?;

        // Re-asserted rather than left alone, so a confirmation arriving
        // after an out-of-band flag change still converges.
        self.store
            .set_availability(booking.equipment_id, false)
            .await?;

        self.store
            .insert_receipt(PaymentReceipt {
                id: Uuid::new_v4(),
                booking_id: booking.id,
                payment_ref: conf.payment_ref,
                amount: booking.total_price,
                currency: self.currency.clone(),
                created_at: Utc::now(),
            })
            .await?;

        tracing::info!(booking_id = %booking.id, "payment captured, booking paid");
        Ok(booking)
    }

    /// Fail transition: release the slot and record the terminal failure.
    /// Only applies to a booking still awaiting payment; anything else is
    /// left unchanged.
    pub async fn fail(&self, order_ref: &str, reason: Option<&str>) -> Result<Booking, LifecycleError> {
        let booking = self
            .store
            .booking_by_order_ref(order_ref)
            .await?
            .ok_or(LifecycleError::BookingNotFound)?;

        if !booking.has_status(BookingStatus::AwaitingPayment) {
            tracing::debug!(
                booking_id = %booking.id,
                status = %booking.status,
                "payment failure signal for a settled booking ignored"
            );
            return Ok(booking);
        }

        let booking = self
            .store
            .set_booking_status(booking.id, BookingStatus::PaymentFailed, None)
            .await?
            .ok_or(LifecycleError::BookingNotFound)?;
        self.store
            .set_availability(booking.equipment_id, true)
            .await?;

        tracing::info!(
            booking_id = %booking.id,
            reason = reason.unwrap_or("unspecified"),
            "payment failed, equipment released"
        );
        Ok(booking)
    }

    /// Manual override channel for operators. Accepts any status value,
    /// notably `approved`/`rejected`; does not touch availability and does
    /// not participate in payment reconciliation.
    pub async fn override_status(
        &self,
        booking_id: Uuid,
        status: &str,
    ) -> Result<Booking, LifecycleError> {
        let status = BookingStatus::parse(status)
            .ok_or_else(|| LifecycleError::InvalidStatus(status.to_string()))?;
        let booking = self
            .store
            .set_booking_status(booking_id, status, None)
            .await?
            .ok_or(LifecycleError::BookingNotFound)?;
        tracing::info!(booking_id = %booking.id, status = %status, "booking status overridden");
        Ok(booking)
    }

    /// Operator sweep for abandoned checkouts: applies the Fail transition to
    /// every `awaiting_payment` booking idle longer than `timeout`. There is
    /// no background scheduler; this runs only when invoked.
    pub async fn release_expired(&self, timeout: Duration) -> Result<Vec<Booking>, LifecycleError> {
        let cutoff = Utc::now() - timeout;
        let stale = self.store.stale_awaiting_payment(cutoff).await?;
        let mut released = Vec::with_capacity(stale.len());
        for booking in stale {
            let booking = self
                .store
                .set_booking_status(booking.id, BookingStatus::PaymentFailed, None)
                .await?
                .ok_or(LifecycleError::BookingNotFound)?;
            self.store
                .set_availability(booking.equipment_id, true)
                .await?;
            tracing::info!(booking_id = %booking.id, "stale payment hold released");
            released.push(booking);
        }
        Ok(released)
    }
}
