use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::PgConnection;
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus};
use crate::equipment::{Equipment, EquipmentChanges, EquipmentFilter};
use crate::payments::PaymentReceipt;
use crate::reviews::Review;
use crate::shared::schema::{bookings, equipment, payment_receipts, reviews};
use crate::shared::utils::DbPool;
use crate::store::{RentalStore, StoreError};

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(
        &self,
    ) -> Result<PooledConnection<ConnectionManager<PgConnection>>, StoreError> {
        self.pool.get().map_err(|e| StoreError::Pool(e.to_string()))
    }
}

#[async_trait]
impl RentalStore for PgStore {
    async fn insert_equipment(&self, row: Equipment) -> Result<Equipment, StoreError> {
        let mut conn = self.conn()?;
        let created = diesel::insert_into(equipment::table)
            .values(&row)
            .get_result(&mut conn)?;
        Ok(created)
    }

    async fn equipment_by_id(&self, id: Uuid) -> Result<Option<Equipment>, StoreError> {
        let mut conn = self.conn()?;
        let row = equipment::table
            .find(id)
            .first::<Equipment>(&mut conn)
            .optional()?;
        Ok(row)
    }

    async fn list_equipment(&self, filter: EquipmentFilter) -> Result<Vec<Equipment>, StoreError> {
        let mut conn = self.conn()?;
        let mut query = equipment::table.into_boxed();
        if let Some(owner_id) = filter.owner_id {
            query = query.filter(equipment::owner_id.eq(owner_id));
        }
        if let Some(category) = filter.category {
            query = query.filter(equipment::category.eq(category));
        }
        if filter.available_only {
            query = query.filter(equipment::available.eq(true));
        }
        let rows = query
            .order(equipment::created_at.asc())
            .load::<Equipment>(&mut conn)?;
        Ok(rows)
    }

    async fn update_equipment(
        &self,
        id: Uuid,
        changes: EquipmentChanges,
    ) -> Result<Option<Equipment>, StoreError> {
        let mut conn = self.conn()?;
        let row = diesel::update(equipment::table.find(id))
            .set((&changes, equipment::updated_at.eq(Utc::now())))
            .get_result::<Equipment>(&mut conn)
            .optional()?;
        Ok(row)
    }

    async fn delete_equipment(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let deleted = conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::delete(bookings::table.filter(bookings::equipment_id.eq(id))).execute(conn)?;
            diesel::delete(equipment::table.find(id)).execute(conn)
        })?;
        Ok(deleted > 0)
    }

    async fn set_availability(&self, id: Uuid, available: bool) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        diesel::update(equipment::table.find(id))
            .set((
                equipment::available.eq(available),
                equipment::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn try_hold(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        // Conditional update; the WHERE clause makes this a compare-and-set
        // so two concurrent creates cannot both acquire the hold.
        let updated = diesel::update(
            equipment::table
                .filter(equipment::id.eq(id))
                .filter(equipment::available.eq(true)),
        )
        .set((
            equipment::available.eq(false),
            equipment::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;
        Ok(updated == 1)
    }

    async fn insert_booking(&self, row: Booking) -> Result<Booking, StoreError> {
        let mut conn = self.conn()?;
        let created = diesel::insert_into(bookings::table)
            .values(&row)
            .get_result(&mut conn)?;
        Ok(created)
    }

    async fn booking_by_id(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let mut conn = self.conn()?;
        let row = bookings::table
            .find(id)
            .first::<Booking>(&mut conn)
            .optional()?;
        Ok(row)
    }

    async fn booking_by_order_ref(&self, order_ref: &str) -> Result<Option<Booking>, StoreError> {
        let mut conn = self.conn()?;
        let row = bookings::table
            .filter(bookings::payment_order_ref.eq(order_ref))
            .first::<Booking>(&mut conn)
            .optional()?;
        Ok(row)
    }

    async fn bookings_overlapping(
        &self,
        equipment_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError> {
        let mut conn = self.conn()?;
        let starts_inside = bookings::start_date.ge(start).and(bookings::start_date.le(end));
        let ends_inside = bookings::end_date.ge(start).and(bookings::end_date.le(end));
        let spans = bookings::start_date.le(start).and(bookings::end_date.ge(end));
        let rows = bookings::table
            .filter(bookings::equipment_id.eq(equipment_id))
            .filter(starts_inside.or(ends_inside).or(spans))
            .load::<Booking>(&mut conn)?;
        Ok(rows)
    }

    async fn bookings_for_renter(&self, renter_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        let mut conn = self.conn()?;
        let rows = bookings::table
            .filter(bookings::renter_id.eq(renter_id))
            .order(bookings::created_at.desc())
            .load::<Booking>(&mut conn)?;
        Ok(rows)
    }

    async fn bookings_for_owner(&self, owner_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        let mut conn = self.conn()?;
        let rows = bookings::table
            .inner_join(equipment::table)
            .filter(equipment::owner_id.eq(owner_id))
            .select(bookings::all_columns)
            .order(bookings::created_at.desc())
            .load::<Booking>(&mut conn)?;
        Ok(rows)
    }

    async fn set_booking_status(
        &self,
        id: Uuid,
        status: BookingStatus,
        payment_ref: Option<String>,
    ) -> Result<Option<Booking>, StoreError> {
        let mut conn = self.conn()?;
        let now = Utc::now();
        let row = match payment_ref {
            Some(payment_ref) => diesel::update(bookings::table.find(id))
                .set((
                    bookings::status.eq(status.as_str()),
                    bookings::payment_ref.eq(payment_ref),
                    bookings::updated_at.eq(now),
                ))
                .get_result::<Booking>(&mut conn)
                .optional()?,
            None => diesel::update(bookings::table.find(id))
                .set((
                    bookings::status.eq(status.as_str()),
                    bookings::updated_at.eq(now),
                ))
                .get_result::<Booking>(&mut conn)
                .optional()?,
        };
        Ok(row)
    }

    async fn set_booking_order_ref(
        &self,
        id: Uuid,
        order_ref: String,
    ) -> Result<Option<Booking>, StoreError> {
        let mut conn = self.conn()?;
        let row = diesel::update(bookings::table.find(id))
            .set((
                bookings::payment_order_ref.eq(order_ref),
                bookings::updated_at.eq(Utc::now()),
            ))
            .get_result::<Booking>(&mut conn)
            .optional()?;
        Ok(row)
    }

    async fn mark_booking_rated(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let mut conn = self.conn()?;
        let row = diesel::update(bookings::table.find(id))
            .set((bookings::rated.eq(true), bookings::updated_at.eq(Utc::now())))
            .get_result::<Booking>(&mut conn)
            .optional()?;
        Ok(row)
    }

    async fn stale_awaiting_payment(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError> {
        let mut conn = self.conn()?;
        let rows = bookings::table
            .filter(bookings::status.eq(BookingStatus::AwaitingPayment.as_str()))
            .filter(bookings::updated_at.lt(cutoff))
            .load::<Booking>(&mut conn)?;
        Ok(rows)
    }

    async fn insert_review(&self, row: Review) -> Result<Review, StoreError> {
        let mut conn = self.conn()?;
        let created = diesel::insert_into(reviews::table)
            .values(&row)
            .get_result(&mut conn)?;
        Ok(created)
    }

    async fn reviews_for_equipment(&self, equipment_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let mut conn = self.conn()?;
        let rows = reviews::table
            .filter(reviews::equipment_id.eq(equipment_id))
            .order(reviews::created_at.desc())
            .load::<Review>(&mut conn)?;
        Ok(rows)
    }

    async fn rateable_booking(
        &self,
        renter_id: Uuid,
        equipment_id: Uuid,
    ) -> Result<Option<Booking>, StoreError> {
        let mut conn = self.conn()?;
        let row = bookings::table
            .filter(bookings::renter_id.eq(renter_id))
            .filter(bookings::equipment_id.eq(equipment_id))
            .filter(bookings::status.eq(BookingStatus::Paid.as_str()))
            .filter(bookings::rated.eq(false))
            .order(bookings::created_at.desc())
            .first::<Booking>(&mut conn)
            .optional()?;
        Ok(row)
    }

    async fn insert_receipt(&self, row: PaymentReceipt) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        diesel::insert_into(payment_receipts::table)
            .values(&row)
            .execute(&mut conn)?;
        Ok(())
    }

    async fn receipt_count(&self, booking_id: Uuid) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        let count = payment_receipts::table
            .filter(payment_receipts::booking_id.eq(booking_id))
            .count()
            .get_result(&mut conn)?;
        Ok(count)
    }
}
