//! In-memory store, used by tests and local development. Mirrors the
//! semantics of the postgres store, including the compare-and-set hold.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus};
use crate::equipment::{Equipment, EquipmentChanges, EquipmentFilter};
use crate::payments::PaymentReceipt;
use crate::reviews::Review;
use crate::store::{RentalStore, StoreError};

#[derive(Default)]
pub struct MemStore {
    equipment: Arc<RwLock<HashMap<Uuid, Equipment>>>,
    bookings: Arc<RwLock<HashMap<Uuid, Booking>>>,
    reviews: Arc<RwLock<Vec<Review>>>,
    receipts: Arc<RwLock<Vec<PaymentReceipt>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RentalStore for MemStore {
    async fn insert_equipment(&self, row: Equipment) -> Result<Equipment, StoreError> {
        let mut equipment = self.equipment.write().await;
        equipment.insert(row.id, row.clone());
        Ok(row)
    }

    async fn equipment_by_id(&self, id: Uuid) -> Result<Option<Equipment>, StoreError> {
        let equipment = self.equipment.read().await;
        Ok(equipment.get(&id).cloned())
    }

    async fn list_equipment(&self, filter: EquipmentFilter) -> Result<Vec<Equipment>, StoreError> {
        let equipment = self.equipment.read().await;
        let mut rows: Vec<Equipment> = equipment
            .values()
            .filter(|e| filter.owner_id.map(|o| e.owner_id == o).unwrap_or(true))
            .filter(|e| {
                filter
                    .category
                    .as_deref()
                    .map(|c| e.category.as_deref() == Some(c))
                    .unwrap_or(true)
            })
            .filter(|e| !filter.available_only || e.available)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.created_at);
        Ok(rows)
    }

    async fn update_equipment(
        &self,
        id: Uuid,
        changes: EquipmentChanges,
    ) -> Result<Option<Equipment>, StoreError> {
        let mut equipment = self.equipment.write().await;
        let Some(row) = equipment.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            row.name = name;
        }
        if let Some(category) = changes.category {
            row.category = Some(category);
        }
        if let Some(description) = changes.description {
            row.description = Some(description);
        }
        if let Some(daily_rate) = changes.daily_rate {
            row.daily_rate = daily_rate;
        }
        if let Some(specs) = changes.specs {
            row.specs = specs;
        }
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn delete_equipment(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut equipment = self.equipment.write().await;
        let removed = equipment.remove(&id).is_some();
        drop(equipment);
        if removed {
            let mut bookings = self.bookings.write().await;
            bookings.retain(|_, b| b.equipment_id != id);
        }
        Ok(removed)
    }

    async fn set_availability(&self, id: Uuid, available: bool) -> Result<(), StoreError> {
        let mut equipment = self.equipment.write().await;
        if let Some(row) = equipment.get_mut(&id) {
            row.available = available;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn try_hold(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut equipment = self.equipment.write().await;
        match equipment.get_mut(&id) {
            Some(row) if row.available => {
                row.available = false;
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_booking(&self, row: Booking) -> Result<Booking, StoreError> {
        let mut bookings = self.bookings.write().await;
        bookings.insert(row.id, row.clone());
        Ok(row)
    }

    async fn booking_by_id(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let bookings = self.bookings.read().await;
        Ok(bookings.get(&id).cloned())
    }

    async fn booking_by_order_ref(&self, order_ref: &str) -> Result<Option<Booking>, StoreError> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .values()
            .find(|b| b.payment_order_ref.as_deref() == Some(order_ref))
            .cloned())
    }

    async fn bookings_overlapping(
        &self,
        equipment_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .values()
            .filter(|b| b.equipment_id == equipment_id)
            .filter(|b| {
                let starts_inside = b.start_date >= start && b.start_date <= end;
                let ends_inside = b.end_date >= start && b.end_date <= end;
                let spans = b.start_date <= start && b.end_date >= end;
                starts_inside || ends_inside || spans
            })
            .cloned()
            .collect())
    }

    async fn bookings_for_renter(&self, renter_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        let bookings = self.bookings.read().await;
        let mut rows: Vec<Booking> = bookings
            .values()
            .filter(|b| b.renter_id == renter_id)
            .cloned()
            .collect();
        rows.sort_by_key(|b| std::cmp::Reverse(b.created_at));
        Ok(rows)
    }

    async fn bookings_for_owner(&self, owner_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        let equipment = self.equipment.read().await;
        let owned: Vec<Uuid> = equipment
            .values()
            .filter(|e| e.owner_id == owner_id)
            .map(|e| e.id)
            .collect();
        drop(equipment);

        let bookings = self.bookings.read().await;
        let mut rows: Vec<Booking> = bookings
            .values()
            .filter(|b| owned.contains(&b.equipment_id))
            .cloned()
            .collect();
        rows.sort_by_key(|b| std::cmp::Reverse(b.created_at));
        Ok(rows)
    }

    async fn set_booking_status(
        &self,
        id: Uuid,
        status: BookingStatus,
        payment_ref: Option<String>,
    ) -> Result<Option<Booking>, StoreError> {
        let mut bookings = self.bookings.write().await;
        let Some(row) = bookings.get_mut(&id) else {
            return Ok(None);
        };
        row.status = status.as_str().to_string();
        if payment_ref.is_some() {
            row.payment_ref = payment_ref;
        }
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn set_booking_order_ref(
        &self,
        id: Uuid,
        order_ref: String,
    ) -> Result<Option<Booking>, StoreError> {
        let mut bookings = self.bookings.write().await;
        let Some(row) = bookings.get_mut(&id) else {
            return Ok(None);
        };
        row.payment_order_ref = Some(order_ref);
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn mark_booking_rated(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let mut bookings = self.bookings.write().await;
        let Some(row) = bookings.get_mut(&id) else {
            return Ok(None);
        };
        row.rated = true;
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn stale_awaiting_payment(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .values()
            .filter(|b| b.has_status(BookingStatus::AwaitingPayment) && b.updated_at < cutoff)
            .cloned()
            .collect())
    }

    async fn insert_review(&self, row: Review) -> Result<Review, StoreError> {
        let mut reviews = self.reviews.write().await;
        reviews.push(row.clone());
        Ok(row)
    }

    async fn reviews_for_equipment(&self, equipment_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let reviews = self.reviews.read().await;
        Ok(reviews
            .iter()
            .filter(|r| r.equipment_id == equipment_id)
            .cloned()
            .collect())
    }

    async fn rateable_booking(
        &self,
        renter_id: Uuid,
        equipment_id: Uuid,
    ) -> Result<Option<Booking>, StoreError> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .values()
            .filter(|b| {
                b.renter_id == renter_id
                    && b.equipment_id == equipment_id
                    && b.has_status(BookingStatus::Paid)
                    && !b.rated
            })
            .max_by_key(|b| b.created_at)
            .cloned())
    }

    async fn insert_receipt(&self, row: PaymentReceipt) -> Result<(), StoreError> {
        let mut receipts = self.receipts.write().await;
        receipts.push(row);
        Ok(())
    }

    async fn receipt_count(&self, booking_id: Uuid) -> Result<i64, StoreError> {
        let receipts = self.receipts.read().await;
        Ok(receipts.iter().filter(|r| r.booking_id == booking_id).count() as i64)
    }
}
