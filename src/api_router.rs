//! API route configuration for all modules.

use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;

use crate::shared::state::AppState;

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // ===== Equipment =====
        .route("/equipment/create", post(crate::equipment::create_equipment))
        .route("/equipment/list", get(crate::equipment::list_equipment))
        .route("/equipment/:id", get(crate::equipment::get_equipment))
        .route("/equipment/:id/update", put(crate::equipment::update_equipment))
        .route(
            "/equipment/:id/delete",
            delete(crate::equipment::delete_equipment),
        )
        .route(
            "/equipment/:id/availability",
            get(crate::booking::api::check_availability),
        )
        .route(
            "/equipment/:id/reviews",
            get(crate::reviews::list_equipment_reviews),
        )
        // ===== Bookings =====
        .route("/bookings/create", post(crate::booking::api::create_booking))
        .route("/bookings/list", get(crate::booking::api::list_my_bookings))
        .route("/bookings/owned", get(crate::booking::api::list_owned_bookings))
        .route("/bookings/:id", get(crate::booking::api::get_booking))
        .route("/bookings/:id/verify", post(crate::booking::api::verify_payment))
        .route(
            "/bookings/:id/payment",
            get(crate::booking::api::get_booking_payment),
        )
        .route(
            "/bookings/:id/status",
            put(crate::booking::api::update_booking_status),
        )
        .route(
            "/bookings/release-expired",
            post(crate::booking::api::release_expired_holds),
        )
        // ===== Payments =====
        .route("/payments/webhook", post(crate::payments::webhook::handle_webhook))
        // ===== Reviews =====
        .route("/reviews/create", post(crate::reviews::create_review))
}
