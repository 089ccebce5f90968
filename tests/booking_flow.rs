//! End-to-end coverage of the booking lifecycle, the payment reconciliation
//! paths, and the review gate, against the in-memory store and the scripted
//! gateway.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tower::ServiceExt;
use uuid::Uuid;

use agrirent::api_router::configure_api_routes;
use agrirent::auth::AuthUser;
use agrirent::booking::availability::is_available;
use agrirent::booking::lifecycle::{
    BookingLifecycle, CreateBooking, LifecycleError, PaymentConfirmation,
};
use agrirent::booking::{Booking, BookingStatus};
use agrirent::config::{AppConfig, DatabaseConfig, GatewayConfig, ServerConfig};
use agrirent::equipment::{Equipment, EquipmentChanges};
use agrirent::payments::testing::MockGateway;
use agrirent::payments::{sign, sign_payment, PaymentGateway};
use agrirent::reviews;
use agrirent::shared::state::AppState;
use agrirent::store::mem::MemStore;
use agrirent::store::RentalStore;

const KEY_SECRET: &str = "test_key_secret";
const WEBHOOK_SECRET: &str = "test_webhook_secret";

fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

struct Harness {
    store: Arc<MemStore>,
    gateway: Arc<MockGateway>,
    lifecycle: BookingLifecycle,
}

fn harness() -> Harness {
    let store = Arc::new(MemStore::new());
    let gateway = Arc::new(MockGateway::new());
    let lifecycle = BookingLifecycle::new(
        store.clone() as Arc<dyn RentalStore>,
        gateway.clone() as Arc<dyn PaymentGateway>,
        KEY_SECRET.to_string(),
        "INR".to_string(),
    );
    Harness {
        store,
        gateway,
        lifecycle,
    }
}

async fn seed_equipment(store: &MemStore, daily_rate: i64) -> Equipment {
    let now = Utc::now();
    store
        .insert_equipment(Equipment {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "John Deere 5310".to_string(),
            category: Some("tractor".to_string()),
            description: None,
            daily_rate,
            available: true,
            specs: serde_json::json!({ "horsepower": 55 }),
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap()
}

async fn booking_awaiting_payment(h: &Harness, equipment_id: Uuid) -> Booking {
    h.lifecycle
        .create(CreateBooking {
            equipment_id,
            renter_id: Uuid::new_v4(),
            start_date: date(2024, 1, 1),
            end_date: date(2024, 1, 3),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn create_booking_prices_inclusively_and_locks_equipment() {
    let h = harness();
    let equipment = seed_equipment(&h.store, 500).await;

    let booking = booking_awaiting_payment(&h, equipment.id).await;

    assert_eq!(booking.total_price, 1500);
    assert!(booking.has_status(BookingStatus::AwaitingPayment));
    assert!(booking.payment_order_ref.is_some());

    let equipment = h.store.equipment_by_id(equipment.id).await.unwrap().unwrap();
    assert!(!equipment.available);
    assert!(!is_available(h.store.as_ref(), equipment.id, date(2024, 1, 2), date(2024, 1, 4))
        .await
        .unwrap());
}

#[tokio::test]
async fn overlapping_booking_is_rejected_while_hold_is_active() {
    let h = harness();
    let equipment = seed_equipment(&h.store, 500).await;
    booking_awaiting_payment(&h, equipment.id).await;

    let err = h
        .lifecycle
        .create(CreateBooking {
            equipment_id: equipment.id,
            renter_id: Uuid::new_v4(),
            start_date: date(2024, 1, 2),
            end_date: date(2024, 1, 5),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Unavailable));
}

#[tokio::test]
async fn concurrent_creates_admit_at_most_one() {
    let h = harness();
    let equipment = seed_equipment(&h.store, 500).await;

    let first = h.lifecycle.create(CreateBooking {
        equipment_id: equipment.id,
        renter_id: Uuid::new_v4(),
        start_date: date(2024, 2, 1),
        end_date: date(2024, 2, 3),
    });
    let second = h.lifecycle.create(CreateBooking {
        equipment_id: equipment.id,
        renter_id: Uuid::new_v4(),
        start_date: date(2024, 2, 2),
        end_date: date(2024, 2, 4),
    });

    let (a, b) = tokio::join!(first, second);
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
}

#[tokio::test]
async fn reversed_dates_are_rejected_before_any_write() {
    let h = harness();
    let equipment = seed_equipment(&h.store, 500).await;

    let err = h
        .lifecycle
        .create(CreateBooking {
            equipment_id: equipment.id,
            renter_id: Uuid::new_v4(),
            start_date: date(2024, 1, 5),
            end_date: date(2024, 1, 1),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidDates(_)));

    let equipment = h.store.equipment_by_id(equipment.id).await.unwrap().unwrap();
    assert!(equipment.available);
}

#[tokio::test]
async fn order_failure_compensates_the_eager_lock() {
    let h = harness();
    let equipment = seed_equipment(&h.store, 500).await;
    h.gateway.fail_next_order();

    let err = h
        .lifecycle
        .create(CreateBooking {
            equipment_id: equipment.id,
            renter_id: Uuid::new_v4(),
            start_date: date(2024, 1, 1),
            end_date: date(2024, 1, 3),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Gateway(_)));

    // The slot is free again and the booking row survives as a failure record.
    let equipment_row = h.store.equipment_by_id(equipment.id).await.unwrap().unwrap();
    assert!(equipment_row.available);
    let bookings = h
        .store
        .bookings_overlapping(equipment.id, date(2024, 1, 1), date(2024, 1, 3))
        .await
        .unwrap();
    assert_eq!(bookings.len(), 1);
    assert!(bookings[0].has_status(BookingStatus::PaymentFailed));

    // And a fresh attempt succeeds.
    let retry = booking_awaiting_payment(&h, equipment.id).await;
    assert!(retry.has_status(BookingStatus::AwaitingPayment));
    assert_eq!(h.gateway.create_order_calls(), 2);
}

#[tokio::test]
async fn confirm_with_valid_signature_marks_paid_once() {
    let h = harness();
    let equipment = seed_equipment(&h.store, 500).await;
    let booking = booking_awaiting_payment(&h, equipment.id).await;
    let order_ref = booking.payment_order_ref.clone().unwrap();
    let signature = sign_payment(KEY_SECRET, &order_ref, "pay_1");

    let confirmed = h
        .lifecycle
        .confirm(PaymentConfirmation {
            order_ref: order_ref.clone(),
            payment_ref: "pay_1".to_string(),
            signature: Some(signature.clone()),
        })
        .await
        .unwrap();
    assert!(confirmed.has_status(BookingStatus::Paid));
    assert_eq!(confirmed.payment_ref.as_deref(), Some("pay_1"));
    assert_eq!(h.store.receipt_count(booking.id).await.unwrap(), 1);

    // At-least-once delivery: a duplicate confirmation is a no-op success.
    let again = h
        .lifecycle
        .confirm(PaymentConfirmation {
            order_ref,
            payment_ref: "pay_1".to_string(),
            signature: Some(signature),
        })
        .await
        .unwrap();
    assert!(again.has_status(BookingStatus::Paid));
    assert_eq!(h.store.receipt_count(booking.id).await.unwrap(), 1);

    let equipment = h.store.equipment_by_id(equipment.id).await.unwrap().unwrap();
    assert!(!equipment.available);
}

#[tokio::test]
async fn tampered_signature_keeps_status_and_frees_equipment() {
    let h = harness();
    let equipment = seed_equipment(&h.store, 500).await;
    let booking = booking_awaiting_payment(&h, equipment.id).await;
    let order_ref = booking.payment_order_ref.clone().unwrap();

    let err = h
        .lifecycle
        .confirm(PaymentConfirmation {
            order_ref,
            payment_ref: "pay_1".to_string(),
            signature: Some(sign_payment("wrong_secret", "x", "y")),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::SignatureMismatch));

    let booking = h.store.booking_by_id(booking.id).await.unwrap().unwrap();
    assert!(booking.has_status(BookingStatus::AwaitingPayment));
    let equipment = h.store.equipment_by_id(equipment.id).await.unwrap().unwrap();
    assert!(equipment.available);
    assert_eq!(h.store.receipt_count(booking.id).await.unwrap(), 0);
}

#[tokio::test]
async fn failed_payment_releases_the_slot() {
    let h = harness();
    let equipment = seed_equipment(&h.store, 500).await;
    let booking = booking_awaiting_payment(&h, equipment.id).await;
    let order_ref = booking.payment_order_ref.clone().unwrap();

    let failed = h.lifecycle.fail(&order_ref, Some("card declined")).await.unwrap();
    assert!(failed.has_status(BookingStatus::PaymentFailed));
    assert!(is_available(h.store.as_ref(), equipment.id, date(2024, 1, 1), date(2024, 1, 3))
        .await
        .unwrap());

    // Out-of-order failure signal after capture must not downgrade the booking.
    let booking2 = booking_awaiting_payment(&h, equipment.id).await;
    let order_ref2 = booking2.payment_order_ref.clone().unwrap();
    let sig = sign_payment(KEY_SECRET, &order_ref2, "pay_2");
    h.lifecycle
        .confirm(PaymentConfirmation {
            order_ref: order_ref2.clone(),
            payment_ref: "pay_2".to_string(),
            signature: Some(sig),
        })
        .await
        .unwrap();
    let still_paid = h.lifecycle.fail(&order_ref2, None).await.unwrap();
    assert!(still_paid.has_status(BookingStatus::Paid));
}

#[tokio::test]
async fn admin_override_does_not_touch_availability() {
    let h = harness();
    let equipment = seed_equipment(&h.store, 500).await;
    let booking = booking_awaiting_payment(&h, equipment.id).await;

    let overridden = h
        .lifecycle
        .override_status(booking.id, "approved")
        .await
        .unwrap();
    assert!(overridden.has_status(BookingStatus::Approved));

    // The availability flag stays where the state machine left it.
    let equipment = h.store.equipment_by_id(equipment.id).await.unwrap().unwrap();
    assert!(!equipment.available);

    let err = h
        .lifecycle
        .override_status(booking.id, "shipped")
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidStatus(_)));
}

#[tokio::test]
async fn owner_edits_never_clobber_the_availability_flag() {
    let h = harness();
    let equipment = seed_equipment(&h.store, 500).await;
    booking_awaiting_payment(&h, equipment.id).await;

    let updated = h
        .store
        .update_equipment(
            equipment.id,
            EquipmentChanges {
                name: Some("John Deere 5310 GearPro".to_string()),
                daily_rate: Some(650),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.daily_rate, 650);
    assert!(!updated.available);
}

#[tokio::test]
async fn stale_holds_are_released_by_the_operator_sweep() {
    let h = harness();
    let equipment = seed_equipment(&h.store, 500).await;

    // A checkout abandoned two hours ago.
    let now = Utc::now();
    let stale = h
        .store
        .insert_booking(Booking {
            id: Uuid::new_v4(),
            equipment_id: equipment.id,
            renter_id: Uuid::new_v4(),
            start_date: date(2024, 3, 1),
            end_date: date(2024, 3, 2),
            total_price: 1000,
            status: BookingStatus::AwaitingPayment.as_str().to_string(),
            payment_order_ref: Some("order_stale".to_string()),
            payment_ref: None,
            rated: false,
            created_at: now - Duration::hours(2),
            updated_at: now - Duration::hours(2),
        })
        .await
        .unwrap();
    h.store.set_availability(equipment.id, false).await.unwrap();

    // A fresh hold on other equipment must survive the sweep.
    let other = seed_equipment(&h.store, 300).await;
    let fresh = booking_awaiting_payment(&h, other.id).await;

    let released = h.lifecycle.release_expired(Duration::minutes(30)).await.unwrap();
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].id, stale.id);

    let stale = h.store.booking_by_id(stale.id).await.unwrap().unwrap();
    assert!(stale.has_status(BookingStatus::PaymentFailed));
    let equipment = h.store.equipment_by_id(equipment.id).await.unwrap().unwrap();
    assert!(equipment.available);

    let fresh = h.store.booking_by_id(fresh.id).await.unwrap().unwrap();
    assert!(fresh.has_status(BookingStatus::AwaitingPayment));
}

// ===== Review gate =====

async fn paid_booking(h: &Harness, equipment_id: Uuid, renter_id: Uuid) -> Booking {
    let booking = h
        .lifecycle
        .create(CreateBooking {
            equipment_id,
            renter_id,
            start_date: date(2024, 1, 1),
            end_date: date(2024, 1, 3),
        })
        .await
        .unwrap();
    let order_ref = booking.payment_order_ref.clone().unwrap();
    let sig = sign_payment(KEY_SECRET, &order_ref, "pay_r");
    h.lifecycle
        .confirm(PaymentConfirmation {
            order_ref,
            payment_ref: "pay_r".to_string(),
            signature: Some(sig),
        })
        .await
        .unwrap()
}

fn app_state(h: &Harness, webhook_secret: Option<String>) -> Arc<AppState> {
    let config = AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            username: String::new(),
            password: String::new(),
            server: String::new(),
            port: 5432,
            database: String::new(),
        },
        gateway: GatewayConfig {
            key_id: "key".to_string(),
            key_secret: KEY_SECRET.to_string(),
            webhook_secret,
            currency: "INR".to_string(),
        },
        hold_timeout_minutes: 30,
    };
    Arc::new(AppState::new(
        config,
        h.store.clone() as Arc<dyn RentalStore>,
        h.gateway.clone() as Arc<dyn PaymentGateway>,
    ))
}

#[tokio::test]
async fn review_gate_rejects_unpaid_and_double_reviews() {
    let h = harness();
    let equipment = seed_equipment(&h.store, 500).await;
    let renter = Uuid::new_v4();
    let state = app_state(&h, None);
    let user = AuthUser {
        user_id: renter,
        is_admin: false,
    };

    // Still awaiting payment: not eligible.
    let pending = h
        .lifecycle
        .create(CreateBooking {
            equipment_id: equipment.id,
            renter_id: renter,
            start_date: date(2024, 1, 1),
            end_date: date(2024, 1, 3),
        })
        .await
        .unwrap();
    let err = reviews::create_review(
        axum::extract::State(state.clone()),
        user,
        axum::Json(reviews::CreateReviewRequest {
            equipment_id: equipment.id,
            rating: 5,
            comment: "handled the tilling season without a hitch".to_string(),
        }),
    )
    .await
    .err()
    .expect("awaiting_payment booking must not be reviewable");
    let response = axum::response::IntoResponse::into_response(err);
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Resolve the abandoned hold, then complete a rental for this renter.
    let pending_order = pending.payment_order_ref.clone().unwrap();
    h.lifecycle.fail(&pending_order, None).await.unwrap();
    let booking = paid_booking(&h, equipment.id, renter).await;

    let review = reviews::create_review(
        axum::extract::State(state.clone()),
        user,
        axum::Json(reviews::CreateReviewRequest {
            equipment_id: equipment.id,
            rating: 4,
            comment: "handled the tilling season without a hitch".to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(review.0.rating, 4);

    let booking = h.store.booking_by_id(booking.id).await.unwrap().unwrap();
    assert!(booking.rated);

    // Second submission against the same booking fails.
    let err = reviews::create_review(
        axum::extract::State(state),
        user,
        axum::Json(reviews::CreateReviewRequest {
            equipment_id: equipment.id,
            rating: 2,
            comment: "changed my mind, writing another one".to_string(),
        }),
    )
    .await
    .err()
    .expect("a rated booking must not be reviewable twice");
    let response = axum::response::IntoResponse::into_response(err);
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ===== Webhook path =====

fn webhook_request(body: &serde_json::Value, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("x-webhook-signature", signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .nest("/api", configure_api_routes())
        .with_state(state)
}

#[tokio::test]
async fn webhook_captured_event_confirms_and_duplicates_are_harmless() {
    let h = harness();
    let equipment = seed_equipment(&h.store, 500).await;
    let booking = booking_awaiting_payment(&h, equipment.id).await;
    let order_ref = booking.payment_order_ref.clone().unwrap();
    let state = app_state(&h, Some(WEBHOOK_SECRET.to_string()));

    let body = serde_json::json!({
        "event": "payment.captured",
        "payload": {
            "order_ref": order_ref,
            "payment_ref": "pay_wh",
            "notes": { "booking_id": booking.id.to_string() }
        }
    });
    let signature = sign(WEBHOOK_SECRET, body.to_string().as_bytes());

    for _ in 0..2 {
        let response = router(state.clone())
            .oneshot(webhook_request(&body, Some(&signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let booking = h.store.booking_by_id(booking.id).await.unwrap().unwrap();
    assert!(booking.has_status(BookingStatus::Paid));
    assert_eq!(h.store.receipt_count(booking.id).await.unwrap(), 1);
    let equipment = h.store.equipment_by_id(equipment.id).await.unwrap().unwrap();
    assert!(!equipment.available);
}

#[tokio::test]
async fn webhook_failed_event_releases_the_hold() {
    let h = harness();
    let equipment = seed_equipment(&h.store, 500).await;
    let booking = booking_awaiting_payment(&h, equipment.id).await;
    let order_ref = booking.payment_order_ref.clone().unwrap();
    let state = app_state(&h, Some(WEBHOOK_SECRET.to_string()));

    let body = serde_json::json!({
        "event": "payment.failed",
        "payload": {
            "order_ref": order_ref,
            "payment_ref": "pay_wh",
            "error_description": "insufficient funds"
        }
    });
    let signature = sign(WEBHOOK_SECRET, body.to_string().as_bytes());
    let response = router(state)
        .oneshot(webhook_request(&body, Some(&signature)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let booking = h.store.booking_by_id(booking.id).await.unwrap().unwrap();
    assert!(booking.has_status(BookingStatus::PaymentFailed));
    let equipment = h.store.equipment_by_id(equipment.id).await.unwrap().unwrap();
    assert!(equipment.available);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected_without_mutation() {
    let h = harness();
    let equipment = seed_equipment(&h.store, 500).await;
    let booking = booking_awaiting_payment(&h, equipment.id).await;
    let order_ref = booking.payment_order_ref.clone().unwrap();
    let state = app_state(&h, Some(WEBHOOK_SECRET.to_string()));

    let body = serde_json::json!({
        "event": "payment.captured",
        "payload": { "order_ref": order_ref, "payment_ref": "pay_forged" }
    });

    // Wrong signature.
    let response = router(state.clone())
        .oneshot(webhook_request(&body, Some("deadbeef")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Missing signature header.
    let response = router(state)
        .oneshot(webhook_request(&body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let booking = h.store.booking_by_id(booking.id).await.unwrap().unwrap();
    assert!(booking.has_status(BookingStatus::AwaitingPayment));
}

#[tokio::test]
async fn unknown_webhook_events_are_acknowledged() {
    let h = harness();
    let state = app_state(&h, Some(WEBHOOK_SECRET.to_string()));

    let body = serde_json::json!({
        "event": "refund.processed",
        "payload": { "order_ref": "order_x" }
    });
    let signature = sign(WEBHOOK_SECRET, body.to_string().as_bytes());
    let response = router(state)
        .oneshot(webhook_request(&body, Some(&signature)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unsigned_webhooks_pass_in_degraded_mode() {
    let h = harness();
    let equipment = seed_equipment(&h.store, 500).await;
    let booking = booking_awaiting_payment(&h, equipment.id).await;
    let order_ref = booking.payment_order_ref.clone().unwrap();
    let state = app_state(&h, None);

    let body = serde_json::json!({
        "event": "payment.captured",
        "payload": { "order_ref": order_ref, "payment_ref": "pay_dev" }
    });
    let response = router(state)
        .oneshot(webhook_request(&body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let booking = h.store.booking_by_id(booking.id).await.unwrap().unwrap();
    assert!(booking.has_status(BookingStatus::Paid));
}
