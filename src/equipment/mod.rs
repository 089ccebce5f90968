use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::shared::errors::ApiError;
use crate::shared::schema::equipment;
use crate::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = equipment)]
pub struct Equipment {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub daily_rate: i64,
    pub available: bool,
    pub specs: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Owner-editable fields. `available` is deliberately absent: that flag is
/// owned by the booking state machine and an owner edit must never clobber it.
#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = equipment)]
pub struct EquipmentChanges {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub daily_rate: Option<i64>,
    pub specs: Option<serde_json::Value>,
}

impl EquipmentChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.description.is_none()
            && self.daily_rate.is_none()
            && self.specs.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EquipmentFilter {
    pub owner_id: Option<Uuid>,
    pub category: Option<String>,
    pub available_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateEquipmentRequest {
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub daily_rate: i64,
    pub specs: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub owner_id: Option<Uuid>,
    pub category: Option<String>,
    #[serde(default)]
    pub available_only: bool,
}

pub async fn create_equipment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateEquipmentRequest>,
) -> Result<Json<Equipment>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("equipment name is required".to_string()));
    }
    if req.daily_rate <= 0 {
        return Err(ApiError::Validation(
            "daily rate must be a positive whole amount".to_string(),
        ));
    }

    let now = Utc::now();
    let row = Equipment {
        id: Uuid::new_v4(),
        owner_id: user.user_id,
        name: req.name,
        category: req.category,
        description: req.description,
        daily_rate: req.daily_rate,
        available: true,
        specs: req.specs.unwrap_or_else(|| serde_json::json!({})),
        created_at: now,
        updated_at: now,
    };

    let created = state.store.insert_equipment(row).await?;
    tracing::info!(equipment_id = %created.id, owner_id = %created.owner_id, "equipment listed");
    Ok(Json(created))
}

pub async fn list_equipment(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Equipment>>, ApiError> {
    let filter = EquipmentFilter {
        owner_id: query.owner_id,
        category: query.category,
        available_only: query.available_only,
    };
    Ok(Json(state.store.list_equipment(filter).await?))
}

pub async fn get_equipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Equipment>, ApiError> {
    state
        .store
        .equipment_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("equipment {id} not found")))
}

pub async fn update_equipment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(changes): Json<EquipmentChanges>,
) -> Result<Json<Equipment>, ApiError> {
    let existing = state
        .store
        .equipment_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("equipment {id} not found")))?;

    if existing.owner_id != user.user_id && !user.is_admin {
        return Err(ApiError::Forbidden(
            "only the owner may edit this equipment".to_string(),
        ));
    }
    if changes.is_empty() {
        return Err(ApiError::Validation("no fields to update".to_string()));
    }
    if matches!(changes.daily_rate, Some(rate) if rate <= 0) {
        return Err(ApiError::Validation(
            "daily rate must be a positive whole amount".to_string(),
        ));
    }

    let updated = state
        .store
        .update_equipment(id, changes)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("equipment {id} not found")))?;
    Ok(Json(updated))
}

pub async fn delete_equipment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let existing = state
        .store
        .equipment_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("equipment {id} not found")))?;

    if existing.owner_id != user.user_id && !user.is_admin {
        return Err(ApiError::Forbidden(
            "only the owner may delete this equipment".to_string(),
        ));
    }

    // Bookings cascade with their equipment; reviews stay as history.
    state.store.delete_equipment(id).await?;
    tracing::info!(equipment_id = %id, "equipment deleted");
    Ok(Json(serde_json::json!({ "deleted": id })))
}
