use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::server::AppState;

use super::AppError;

// ─── Domain types ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,
    pub name: String,
    /// Price in cents (e.g. 12999 = $129.99)
    pub price: u64,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub name: String,
    #[serde(default)]
    pub price: u64,
}

// ─── GET /api/items ──────────────────────────────────────────────

pub async fn list_items(State(state): State<Arc<AppState>>) -> Json<Vec<Item>> {
    let mut items: Vec<Item> = state.items.read().values().cloned().collect();
    items.sort_by_key(|i| i.id);
    Json(items)
}

// ─── GET /api/items/:id ──────────────────────────────────────────

pub async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Item>, AppError> {
    state
        .items
        .read()
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("item '{id}' not found")))
}

// ─── POST /api/items ─────────────────────────────────────────────

pub async fn create_item(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<Item>), AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name must not be empty".into()));
    }

    let item = Item {
        id: state.next_id.fetch_add(1, Ordering::Relaxed),
        name: name.to_owned(),
        price: req.price,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    state.items.write().insert(item.id, item.clone());

    Ok((StatusCode::CREATED, Json(item)))
}
