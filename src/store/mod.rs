//! Narrow row-store interface.
//!
//! Everything the core consumes from persistence goes through this trait:
//! plain filtered CRUD plus the single compare-and-set (`try_hold`) that the
//! booking admission path relies on for correctness under concurrent creates.

pub mod mem;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus};
use crate::equipment::{Equipment, EquipmentChanges, EquipmentFilter};
use crate::payments::PaymentReceipt;
use crate::reviews::Review;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database pool error: {0}")]
    Pool(String),
    #[error("database error: {0}")]
    Query(String),
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Query(err.to_string())
    }
}

#[async_trait]
pub trait RentalStore: Send + Sync {
    // Equipment.
    async fn insert_equipment(&self, row: Equipment) -> Result<Equipment, StoreError>;
    async fn equipment_by_id(&self, id: Uuid) -> Result<Option<Equipment>, StoreError>;
    async fn list_equipment(&self, filter: EquipmentFilter) -> Result<Vec<Equipment>, StoreError>;
    async fn update_equipment(
        &self,
        id: Uuid,
        changes: EquipmentChanges,
    ) -> Result<Option<Equipment>, StoreError>;
    /// Deletes the equipment row and cascades its bookings.
    async fn delete_equipment(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn set_availability(&self, id: Uuid, available: bool) -> Result<(), StoreError>;
    /// Compare-and-set: flip `available` to false only if currently true.
    /// Returns whether the hold was acquired.
    async fn try_hold(&self, id: Uuid) -> Result<bool, StoreError>;

    // Bookings.
    async fn insert_booking(&self, row: Booking) -> Result<Booking, StoreError>;
    async fn booking_by_id(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;
    async fn booking_by_order_ref(&self, order_ref: &str) -> Result<Option<Booking>, StoreError>;
    /// Bookings whose `[start_date, end_date]` overlaps `[start, end]`.
    async fn bookings_overlapping(
        &self,
        equipment_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError>;
    async fn bookings_for_renter(&self, renter_id: Uuid) -> Result<Vec<Booking>, StoreError>;
    async fn bookings_for_owner(&self, owner_id: Uuid) -> Result<Vec<Booking>, StoreError>;
    /// Updates status (and payment ref when given), bumps `updated_at`, and
    /// returns the mutated row.
    async fn set_booking_status(
        &self,
        id: Uuid,
        status: BookingStatus,
        payment_ref: Option<String>,
    ) -> Result<Option<Booking>, StoreError>;
    async fn set_booking_order_ref(
        &self,
        id: Uuid,
        order_ref: String,
    ) -> Result<Option<Booking>, StoreError>;
    async fn mark_booking_rated(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;
    /// `awaiting_payment` bookings whose `updated_at` is before `cutoff`.
    async fn stale_awaiting_payment(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError>;

    // Reviews and receipts.
    async fn insert_review(&self, row: Review) -> Result<Review, StoreError>;
    async fn reviews_for_equipment(&self, equipment_id: Uuid) -> Result<Vec<Review>, StoreError>;
    /// The most recently created booking by this renter for this equipment
    /// that is `paid` and not yet rated.
    async fn rateable_booking(
        &self,
        renter_id: Uuid,
        equipment_id: Uuid,
    ) -> Result<Option<Booking>, StoreError>;
    async fn insert_receipt(&self, row: PaymentReceipt) -> Result<(), StoreError>;
    async fn receipt_count(&self, booking_id: Uuid) -> Result<i64, StoreError>;
}
