use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::booking::BookingStatus;
use crate::shared::errors::ApiError;
use crate::shared::schema::reviews;
use crate::shared::state::AppState;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;
pub const MIN_COMMENT_LEN: usize = 10;
pub const MAX_COMMENT_LEN: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = reviews)]
pub struct Review {
    pub id: Uuid,
    pub renter_id: Uuid,
    pub equipment_id: Uuid,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub equipment_id: Uuid,
    pub rating: i32,
    pub comment: String,
}

#[derive(Debug, Serialize)]
pub struct EquipmentReviews {
    pub reviews: Vec<Review>,
    pub average_rating: f64,
    pub recommendation_score: f64,
}

/// Fixed weighted heuristic: rating quality dominates, review volume (capped
/// at 20) adds confidence. Scaled to 0-100; no reviews scores 0.
pub fn recommendation_score(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let avg = average_rating(reviews);
    let volume = (reviews.len().min(20)) as f64 / 20.0;
    (0.7 * (avg / MAX_RATING as f64) + 0.3 * volume) * 100.0
}

pub fn average_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    reviews.iter().map(|r| r.rating as f64).sum::<f64>() / reviews.len() as f64
}

fn validate(rating: i32, comment: &str) -> Result<(), ApiError> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(ApiError::Validation(format!(
            "rating must be between {MIN_RATING} and {MAX_RATING}"
        )));
    }
    let len = comment.chars().count();
    if !(MIN_COMMENT_LEN..=MAX_COMMENT_LEN).contains(&len) {
        return Err(ApiError::Validation(format!(
            "comment must be between {MIN_COMMENT_LEN} and {MAX_COMMENT_LEN} characters"
        )));
    }
    Ok(())
}

/// Review gate: a review is only admitted against a paid, not-yet-rated
/// booking by the same renter. When several qualify the most recently created
/// one is consumed.
pub async fn create_review(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateReviewRequest>,
) -> Result<Json<Review>, ApiError> {
    validate(req.rating, &req.comment)?;

    let equipment = state
        .store
        .equipment_by_id(req.equipment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("equipment {} not found", req.equipment_id)))?;

    let booking = state
        .store
        .rateable_booking(user.user_id, equipment.id)
        .await?
        .ok_or_else(|| {
            ApiError::Validation(
                "no completed, unrated rental of this equipment to review".to_string(),
            )
        })?;
    debug_assert!(booking.has_status(BookingStatus::Paid) && !booking.rated);

    let review = Review {
        id: Uuid::new_v4(),
        renter_id: user.user_id,
        equipment_id: equipment.id,
        rating: req.rating,
        comment: req.comment,
        created_at: Utc::now(),
    };
    let created = state.store.insert_review(review).await?;
    state.store.mark_booking_rated(booking.id).await?;
    tracing::info!(review_id = %created.id, booking_id = %booking.id, "review recorded");
    Ok(Json(created))
}

pub async fn list_equipment_reviews(
    State(state): State<Arc<AppState>>,
    Path(equipment_id): Path<Uuid>,
) -> Result<Json<EquipmentReviews>, ApiError> {
    if state.store.equipment_by_id(equipment_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("equipment {equipment_id} not found")));
    }
    let reviews = state.store.reviews_for_equipment(equipment_id).await?;
    let average_rating = average_rating(&reviews);
    let recommendation_score = recommendation_score(&reviews);
    Ok(Json(EquipmentReviews {
        reviews,
        average_rating,
        recommendation_score,
    }))
}
