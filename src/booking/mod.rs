pub mod api;
pub mod availability;
pub mod lifecycle;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::schema::bookings;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = bookings)]
pub struct Booking {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub renter_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_price: i64,
    pub status: String,
    pub payment_order_ref: Option<String>,
    pub payment_ref: Option<String>,
    pub rated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    AwaitingPayment,
    Paid,
    PaymentFailed,
    Approved,
    Rejected,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AwaitingPayment => "awaiting_payment",
            Self::Paid => "paid",
            Self::PaymentFailed => "payment_failed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "awaiting_payment" => Some(Self::AwaitingPayment),
            "paid" => Some(Self::Paid),
            "payment_failed" => Some(Self::PaymentFailed),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Statuses that hold the equipment slot. A booking in any other status
    /// does not block overlapping bookings.
    pub fn blocks_availability(&self) -> bool {
        matches!(self, Self::AwaitingPayment | Self::Paid)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Booking {
    pub fn has_status(&self, status: BookingStatus) -> bool {
        self.status == status.as_str()
    }

    pub fn blocks_availability(&self) -> bool {
        BookingStatus::parse(&self.status)
            .map(|s| s.blocks_availability())
            .unwrap_or(false)
    }
}

/// Number of billable days for an inclusive day range.
pub fn rental_days(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end.date_naive() - start.date_naive()).num_days() + 1
}

pub fn total_price(daily_rate: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    daily_rate * rental_days(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn status_round_trips_through_wire_strings() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::AwaitingPayment,
            BookingStatus::Paid,
            BookingStatus::PaymentFailed,
            BookingStatus::Approved,
            BookingStatus::Rejected,
        ] {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BookingStatus::parse("refunded"), None);
    }

    #[test]
    fn only_active_payment_statuses_block_availability() {
        assert!(BookingStatus::AwaitingPayment.blocks_availability());
        assert!(BookingStatus::Paid.blocks_availability());
        assert!(!BookingStatus::PaymentFailed.blocks_availability());
        assert!(!BookingStatus::Approved.blocks_availability());
        assert!(!BookingStatus::Rejected.blocks_availability());
        assert!(!BookingStatus::Pending.blocks_availability());
    }

    #[test]
    fn pricing_counts_both_endpoints() {
        let start = date(2024, 1, 1);
        let end = date(2024, 1, 3);
        assert_eq!(rental_days(start, end), 3);
        assert_eq!(total_price(500, start, end), 1500);
    }

    #[test]
    fn single_day_rental_bills_one_day() {
        let day = date(2024, 6, 10);
        assert_eq!(rental_days(day, day), 1);
        assert_eq!(total_price(750, day, day), 750);
    }

    #[test]
    fn pricing_ignores_time_of_day() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 3, 0, 15, 0).unwrap();
        assert_eq!(rental_days(start, end), 3);
    }
}
