use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::models::AdminStats;
use crate::updates::Update;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/webhook/{secret}", post(webhook_with_secret_handler))
        .route("/health", get(health_handler))
        .route("/admin/stats", get(admin_stats_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn webhook_handler(
    State(state): State<AppState>,
    Json(update): Json<Update>,
) -> AppResult<Json<Value>> {
    authorize(&state, None)?;
    Ok(process_update(&state, update).await)
}

async fn webhook_with_secret_handler(
    State(state): State<AppState>,
    Path(secret): Path<String>,
    Json(update): Json<Update>,
) -> AppResult<Json<Value>> {
    authorize(&state, Some(&secret))?;
    Ok(process_update(&state, update).await)
}

fn authorize(state: &AppState, provided: Option<&str>) -> AppResult<()> {
    match state.config.server.webhook_secret.as_deref() {
        Some(expected) if provided != Some(expected) => {
            Err(AppError::Unauthorized("Invalid webhook secret".to_string()))
        }
        _ => Ok(()),
    }
}

/// Failures are acknowledged anyway; redelivery would replay toggles.
async fn process_update(state: &AppState, update: Update) -> Json<Value> {
    let update_id = update.update_id;
    match state.handler.handle_update(update).await {
        Ok(()) => Json(json!({ "ok": true })),
        Err(e) if e.is_store_failure() => {
            error!("Store failure while handling update {}: {}", update_id, e);
            Json(json!({ "ok": false }))
        }
        Err(e) => {
            warn!("Failed to handle update {}: {}", update_id, e);
            Json(json!({ "ok": false }))
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> AppResult<Json<Value>> {
    state.store.health_check().await?;
    Ok(Json(json!({
        "status": "healthy",
        "pending_conversations": state.conversations.pending_count().await,
    })))
}

async fn admin_stats_handler(State(state): State<AppState>) -> AppResult<Json<AdminStats>> {
    Ok(Json(state.store.admin_stats().await?))
}
