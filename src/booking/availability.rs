//! Availability ledger.
//!
//! Bookability for a date range is derived from the equipment's global
//! `available` flag plus any overlapping booking still holding the slot
//! (`awaiting_payment` or `paid`). The stored flag is a cache maintained by
//! the booking state machine; this derivation is the source of truth at
//! admission time.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::shared::utils::{day_ceil, day_floor};
use crate::store::{RentalStore, StoreError};

/// Whether `equipment_id` can be booked for the inclusive day range
/// `[start, end]`. Fails closed: unknown equipment or an unavailable flag
/// both report `false`.
pub async fn is_available(
    store: &dyn RentalStore,
    equipment_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let Some(equipment) = store.equipment_by_id(equipment_id).await? else {
        return Ok(false);
    };
    if !equipment.available {
        return Ok(false);
    }

    let (start, end) = normalize_range(start, end);
    let overlapping = store
        .bookings_overlapping(equipment_id, start, end)
        .await?;
    Ok(!overlapping.iter().any(|b| b.blocks_availability()))
}

/// Widen both bounds to day granularity: start of day and end of day, UTC.
pub fn normalize_range(start: DateTime<Utc>, end: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (day_floor(start), day_ceil(end))
}
