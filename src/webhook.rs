use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer};

use crate::handlers::BotHandler;
use crate::services::analyzer::FoodAnalyzer;
use crate::services::store::NutritionStore;

pub mod api;

/// Telegram Bot API update (only the parts the bot reads)
#[derive(Debug, Deserialize, Serialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub file_size: Option<i64>,
}

/// Telegram sends several resolutions of the same photo.
pub fn largest_photo(photos: &[PhotoSize]) -> Option<&PhotoSize> {
    photos.iter().max_by_key(|p| (p.width * p.height, p.file_size.unwrap_or(0)))
}

pub async fn handle_telegram_update(handler: &BotHandler, update: Update) -> anyhow::Result<()> {
    let Some(message) = update.message else {
        log::debug!("Ignoring update {} without message", update.update_id);
        return Ok(());
    };

    let chat_id = message.chat.id;
    let user_id = message.from.as_ref().map_or(chat_id, |u| u.id);

    if let Some(photo) = message.photo.as_deref().and_then(largest_photo) {
        log::info!("📸 Photo message from {}: file_id={}", user_id, photo.file_id);
        return handler
            .handle_photo(chat_id, user_id, &photo.file_id, message.caption.as_deref())
            .await;
    }

    if let Some(text) = message.text.as_deref() {
        log::info!("💬 Text message from {}: {}", user_id, text);
        return handler.handle_text(chat_id, user_id, text).await;
    }

    log::warn!("⚠️ Unsupported message type in update {}", update.update_id);
    Ok(())
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn NutritionStore>,
    pub analyzer: Arc<FoodAnalyzer>,
    pub bot: Option<Arc<BotHandler>>,
    pub telegram_secret: Option<String>,
}

pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/webhook/telegram", post(telegram_webhook))
        .merge(api::routes())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn telegram_webhook(headers: HeaderMap, State(state): State<AppState>, body: String) -> StatusCode {
    let Some(bot) = state.bot.clone() else {
        return StatusCode::NOT_FOUND;
    };

    if let Some(secret) = state.telegram_secret.as_deref() {
        let provided = headers
            .get("x-telegram-bot-api-secret-token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != secret {
            log::error!("❌ Telegram webhook secret mismatch");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let update: Update = match serde_json::from_str(&body) {
        Ok(update) => update,
        Err(e) => {
            log::error!("❌ Failed to parse Telegram update: {}", e);
            log::debug!("📦 Raw payload: {}", body);
            return StatusCode::UNPROCESSABLE_ENTITY;
        }
    };

    match handle_telegram_update(&bot, update).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            // Telegram redelivers on non-2xx, so errors still answer OK
            log::error!("❌ Telegram update processing error: {}", e);
            StatusCode::OK
        }
    }
}
