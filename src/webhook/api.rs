use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        Multipart, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::models::{
    AnalysisMethod, AnalysisResult, CachedProduct, CorrectionEvent, FoodItemEstimate, MacroValues, MealEntry,
    MealType, NutritionGoals, VolumeMetadata,
};
use crate::services::errors::AnalysisError;
use crate::services::insights;
use crate::services::nutrition::{calculate_totals, confidence_hint, confidence_score};

const MAX_DESCRIPTION_CHARS: usize = 1000;
const MAX_INSIGHT_DAYS: i64 = 365;
const ACCURACY_TIP: &str = "For better results, ensure good lighting and clear view of all food items";
const TEXT_CONFIDENCE_NOTE: &str = "Text analysis is less accurate than image analysis";

/// Error body for every API route: `{"success": false, "error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    Analysis(AnalysisError),
    BadRequest(String),
    Storage(anyhow::Error),
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        ApiError::Analysis(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Storage(err)
    }
}

// Extractor rejections are caller mistakes and share the API error body.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Analysis(AnalysisError::Validation(message)) => (StatusCode::BAD_REQUEST, message),
            ApiError::Analysis(AnalysisError::NotFound(message)) => (StatusCode::NOT_FOUND, message),
            ApiError::Analysis(err) => {
                log::error!("❌ Provider failure: {}", err);
                (StatusCode::BAD_GATEWAY, err.to_string())
            }
            ApiError::Storage(err) => {
                log::error!("❌ Storage failure: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/analyze-image", post(analyze_image))
        .route("/api/analyze-barcode", post(analyze_barcode))
        .route("/api/analyze-text", post(analyze_text))
        .route("/api/save-meal", post(save_meal))
        .route("/api/nutrition-history", get(nutrition_history))
        .route("/api/nutrition-goals", get(get_goals).put(put_goals))
        .route("/api/nutrition-insights", get(nutrition_insights))
        .route("/api/corrections", post(record_correction))
}

/// Caller identity from the `x-user-id` header; `None` when absent.
fn user_id(headers: &HeaderMap) -> Result<Option<i64>, ApiError> {
    let Some(value) = headers.get("x-user-id") else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(Some)
        .ok_or_else(|| ApiError::BadRequest("x-user-id must be a numeric user id".to_string()))
}

fn require_user(headers: &HeaderMap) -> Result<i64, ApiError> {
    user_id(headers)?.ok_or_else(|| ApiError::BadRequest("x-user-id header is required".to_string()))
}

fn analysis_data(result: &AnalysisResult) -> Value {
    json!({
        "items": result.items,
        "total": result.total,
        "confidence": result.confidence,
    })
}

fn cached_result(product: &CachedProduct) -> AnalysisResult {
    let items = vec![product.to_item()];
    AnalysisResult {
        total: calculate_totals(&items),
        confidence: confidence_score(&items),
        items,
        provider: "cache".to_string(),
        volume_enhanced: false,
        ml_corrected: false,
    }
}

pub fn is_valid_barcode(barcode: &str) -> bool {
    (8..=13).contains(&barcode.len()) && barcode.chars().all(|c| c.is_ascii_digit())
}

async fn analyze_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult {
    let user_id = user_id(&headers)?;
    let mut multipart = multipart?;

    let mut image: Option<Vec<u8>> = None;
    let mut metadata: Option<VolumeMetadata> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("food_image") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?;
                image = Some(bytes.to_vec());
            }
            Some("metadata") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid metadata: {}", e)))?;
                if !text.trim().is_empty() {
                    let parsed = serde_json::from_str(&text)
                        .map_err(|e| ApiError::BadRequest(format!("Invalid metadata: {}", e)))?;
                    metadata = Some(parsed);
                }
            }
            other => log::debug!("Ignoring multipart field {:?}", other),
        }
    }

    let image = image.ok_or_else(|| ApiError::BadRequest("No image file provided".to_string()))?;

    let corrections = state
        .store
        .get_correction_history(user_id)
        .await
        .unwrap_or_else(|e| {
            log::warn!("⚠️ Could not load corrections: {}", e);
            Vec::new()
        });

    let result = state.analyzer.analyze_image(&image, metadata.as_ref(), &corrections).await;
    let analysis_id = uuid::Uuid::new_v4().to_string();

    if let Some(user_id) = user_id {
        let entries: Vec<MealEntry> = result
            .items
            .iter()
            .map(|item| {
                let mut entry = MealEntry::from_item(user_id, MealType::Unspecified, AnalysisMethod::AiVision, item);
                entry.image_ref = Some(analysis_id.clone());
                entry
            })
            .collect();
        if let Err(e) = state.store.save_meal_entries(&entries).await {
            log::error!("❌ Failed to save analysis {} for user {}: {}", analysis_id, user_id, e);
        }
    }

    Ok(Json(json!({
        "success": true,
        "data": analysis_data(&result),
        "provider": result.provider,
        "volume_enhanced": result.volume_enhanced,
        "ml_corrected": result.ml_corrected,
        "analysis_id": analysis_id,
        "tips": {
            "accuracy": ACCURACY_TIP,
            "confidence": confidence_hint(result.confidence),
        },
    })))
}

#[derive(Deserialize)]
struct BarcodeRequest {
    barcode: String,
}

async fn analyze_barcode(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<BarcodeRequest>, JsonRejection>,
) -> ApiResult {
    let user_id = user_id(&headers)?;
    let Json(body) = body?;
    let barcode = body.barcode.trim();
    if !is_valid_barcode(barcode) {
        return Err(ApiError::BadRequest("Invalid barcode format".to_string()));
    }

    let cached = match state.store.get_cached_barcode(barcode).await {
        Ok(cached) => cached,
        Err(e) => {
            log::warn!("⚠️ Barcode cache lookup failed: {}", e);
            None
        }
    };

    let (result, source) = match cached {
        Some(product) => {
            log::info!("📦 Barcode {} served from cache", barcode);
            (cached_result(&product), "cache")
        }
        None => {
            let result = state.analyzer.analyze_barcode(barcode).await?;
            if let Some(item) = result.items.first() {
                if let Err(e) = state.store.cache_barcode(&CachedProduct::from_item(barcode, item)).await {
                    log::warn!("⚠️ Failed to cache barcode {}: {}", barcode, e);
                }
            }
            (result, "api")
        }
    };

    if let Some(user_id) = user_id {
        let entries: Vec<MealEntry> = result
            .items
            .iter()
            .map(|item| {
                let mut entry = MealEntry::from_item(user_id, MealType::Unspecified, AnalysisMethod::Barcode, item);
                entry.barcode = Some(barcode.to_string());
                entry
            })
            .collect();
        if let Err(e) = state.store.save_meal_entries(&entries).await {
            log::error!("❌ Failed to save barcode {} for user {}: {}", barcode, user_id, e);
        }
    }

    Ok(Json(json!({
        "success": true,
        "data": analysis_data(&result),
        "provider": result.provider,
        "source": source,
    })))
}

#[derive(Deserialize)]
struct TextRequest {
    description: String,
}

async fn analyze_text(State(state): State<AppState>, body: Result<Json<TextRequest>, JsonRejection>) -> ApiResult {
    let Json(body) = body?;
    let description = body.description.trim();
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(ApiError::BadRequest(format!(
            "description must be at most {} characters",
            MAX_DESCRIPTION_CHARS
        )));
    }

    let result = state.analyzer.analyze_text(description).await?;

    Ok(Json(json!({
        "success": true,
        "data": analysis_data(&result),
        "provider": result.provider,
        "input": description,
        "confidence_note": TEXT_CONFIDENCE_NOTE,
    })))
}

#[derive(Deserialize)]
struct SaveMealRequest {
    meal_type: String,
    items: Vec<FoodItemEstimate>,
    #[serde(default)]
    meal_time: Option<String>,
}

async fn save_meal(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SaveMealRequest>, JsonRejection>,
) -> ApiResult {
    let user_id = require_user(&headers)?;
    let Json(body) = body?;

    let meal_type = MealType::from_string(&body.meal_type)
        .filter(|t| *t != MealType::Unspecified)
        .ok_or_else(|| ApiError::BadRequest("meal_type must be breakfast, lunch, dinner or snack".to_string()))?;
    if body.items.is_empty() {
        return Err(ApiError::BadRequest("items must contain at least one food".to_string()));
    }

    let entries: Vec<MealEntry> = body
        .items
        .iter()
        .map(|item| {
            let mut entry = MealEntry::from_item(user_id, meal_type, AnalysisMethod::Manual, item);
            entry.confidence = 1.0;
            entry.meal_time = body.meal_time.clone();
            entry
        })
        .collect();

    let entry_ids = state.store.save_meal_entries(&entries).await?;
    log::info!("🍽️ Saved {} for user {} ({} items)", meal_type, user_id, entry_ids.len());

    let label = meal_type.to_string();
    let mut chars = label.chars();
    let title = chars
        .next()
        .map(|first| first.to_uppercase().collect::<String>() + chars.as_str())
        .unwrap_or_default();

    Ok(Json(json!({
        "success": true,
        "meal_id": uuid::Uuid::new_v4().to_string(),
        "entry_ids": entry_ids,
        "message": format!("{} saved successfully! 🍽️", title),
    })))
}

#[derive(Deserialize)]
struct HistoryQuery {
    date: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
}

async fn nutrition_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult {
    let user_id = require_user(&headers)?;
    let Query(query) = query?;

    let date = match query.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(raw) => Some(
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| ApiError::BadRequest("date must be YYYY-MM-DD".to_string()))?,
        ),
        None => None,
    };
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let offset = (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| ApiError::BadRequest("page is out of range".to_string()))?;

    let entries = state.store.get_history(user_id, date, limit, offset).await?;

    let (from, to) = match date {
        Some(day) => (day, day),
        None => {
            let today = Utc::now().date_naive();
            (today - Duration::days(29), today)
        }
    };
    let daily_stats = state.store.get_daily_summaries(user_id, from, to).await?;

    Ok(Json(json!({
        "success": true,
        "has_more": entries.len() as i64 == limit,
        "data": entries,
        "daily_stats": daily_stats,
        "pagination": { "page": page, "limit": limit },
    })))
}

async fn get_goals(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let user_id = require_user(&headers)?;
    let goals = state.store.get_goals(user_id).await?;

    Ok(Json(json!({ "success": true, "goals": goals })))
}

#[derive(Deserialize)]
struct InsightsQuery {
    days: Option<i64>,
}

async fn nutrition_insights(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<InsightsQuery>, QueryRejection>,
) -> ApiResult {
    let user_id = require_user(&headers)?;
    let Query(query) = query?;

    let days = query.days.unwrap_or(7);
    if !(1..=MAX_INSIGHT_DAYS).contains(&days) {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {}",
            MAX_INSIGHT_DAYS
        )));
    }

    let today = Utc::now().date_naive();
    let daily = state
        .store
        .get_daily_summaries(user_id, today - Duration::days(days - 1), today)
        .await?;
    let goals = state.store.get_goals(user_id).await?;

    Ok(Json(json!({
        "success": true,
        "insights": insights::compute(&daily, &goals, days),
        "nutrition_data": daily,
        "period": format!("{} days", days),
    })))
}

async fn put_goals(
    State(state): State<AppState>,
    headers: HeaderMap,
    goals: Result<Json<NutritionGoals>, JsonRejection>,
) -> ApiResult {
    let user_id = require_user(&headers)?;
    let Json(goals) = goals?;

    let values = [
        goals.calories_goal,
        goals.protein_goal,
        goals.carbs_goal,
        goals.fat_goal,
        goals.fiber_goal,
    ];
    if values.iter().any(|v| !v.is_finite() || *v <= 0.0) {
        return Err(ApiError::BadRequest("goals must be positive numbers".to_string()));
    }

    state.store.upsert_goals(user_id, &goals).await?;
    log::info!("🎯 Updated goals for user {}", user_id);

    Ok(Json(json!({ "success": true, "goals": goals })))
}

#[derive(Deserialize)]
struct CorrectionRequest {
    food_name: String,
    original: MacroValues,
    corrected: MacroValues,
}

async fn record_correction(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CorrectionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user_id = require_user(&headers)?;
    let Json(body) = body?;

    let food_name = body.food_name.trim();
    if food_name.is_empty() {
        return Err(ApiError::BadRequest("food_name is required".to_string()));
    }

    state
        .store
        .record_correction(&CorrectionEvent {
            user_id,
            food_name: food_name.to_string(),
            original: body.original,
            corrected: body.corrected,
            created_at: Utc::now(),
        })
        .await?;
    log::info!("🧠 Recorded correction for '{}' from user {}", food_name, user_id);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": "Correction recorded" })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::analyzer::tests::{apple, banana_source, StubProvider};
    use crate::services::analyzer::{AnalyzerSettings, FoodAnalyzer};
    use crate::services::store::memory::MemoryStore;
    use crate::services::store::NutritionStore;
    use crate::webhook::create_router;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(store: Arc<MemoryStore>, vision: Arc<StubProvider>, text: Arc<StubProvider>) -> Router {
        let analyzer = FoodAnalyzer::new(vision, text, AnalyzerSettings::default()).with_barcode_source(banana_source());
        let state = AppState {
            store,
            analyzer: Arc::new(analyzer),
            bot: None,
            telegram_secret: None,
        };
        create_router(state, 1024 * 1024)
    }

    fn default_app(store: Arc<MemoryStore>) -> Router {
        app(
            store,
            StubProvider::ok("vision", vec![apple(95.0, 0.92)]),
            StubProvider::ok("text", vec![apple(95.0, 0.9)]),
        )
    }

    fn json_request(method: &str, uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn multipart_request(user: Option<&str>, image: &[u8], metadata: Option<&str>) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            b"--BOUNDARY\r\nContent-Disposition: form-data; name=\"food_image\"; filename=\"meal.jpg\"\r\n\
Content-Type: image/jpeg\r\n\r\n",
        );
        body.extend_from_slice(image);
        body.extend_from_slice(b"\r\n");
        if let Some(metadata) = metadata {
            body.extend_from_slice(b"--BOUNDARY\r\nContent-Disposition: form-data; name=\"metadata\"\r\n\r\n");
            body.extend_from_slice(metadata.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(b"--BOUNDARY--\r\n");

        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/analyze-image")
            .header("content-type", "multipart/form-data; boundary=BOUNDARY");
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn read_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = default_app(Arc::new(MemoryStore::default()))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_analyze_image_saves_for_user() {
        let store = Arc::new(MemoryStore::default());
        let metadata = r#"{"depth": 10, "dimensions": {"width": 10, "height": 10}}"#;

        let response = default_app(store.clone())
            .oneshot(multipart_request(Some("42"), b"\xff\xd8jpeg", Some(metadata)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["provider"], "vision");
        assert_eq!(body["volume_enhanced"], true);
        assert_eq!(body["data"]["items"][0]["calories"], 190.0);
        assert_eq!(body["tips"]["confidence"], "High confidence result");

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].analysis_method, "ai_vision");
        assert_eq!(entries[0].meal_type, MealType::Unspecified);
        assert_eq!(entries[0].image_ref.as_deref(), body["analysis_id"].as_str());
    }

    #[tokio::test]
    async fn test_analyze_image_applies_user_corrections() {
        let store = Arc::new(MemoryStore::default());
        store
            .record_correction(&CorrectionEvent {
                user_id: 42,
                food_name: "apple".to_string(),
                original: MacroValues {
                    calories: 100.0,
                    ..MacroValues::default()
                },
                corrected: MacroValues {
                    calories: 90.0,
                    ..MacroValues::default()
                },
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let response = default_app(store)
            .oneshot(multipart_request(Some("42"), b"jpeg", None))
            .await
            .unwrap();

        let body = read_json(response).await;
        assert_eq!(body["ml_corrected"], true);
        assert_eq!(body["data"]["items"][0]["calories"], (95.0f64 * 0.9).round());
    }

    #[tokio::test]
    async fn test_analyze_image_survives_storage_failure() {
        let store = Arc::new(MemoryStore::failing_writes());
        let response = default_app(store)
            .oneshot(multipart_request(Some("42"), b"jpeg", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_analyze_image_requires_file() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/analyze-image")
            .header("content-type", "multipart/form-data; boundary=BOUNDARY")
            .body(Body::from("--BOUNDARY--\r\n"))
            .unwrap();

        let response = default_app(Arc::new(MemoryStore::default())).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn test_barcode_is_cached_after_lookup() {
        let store = Arc::new(MemoryStore::default());
        let app = default_app(store.clone());

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/analyze-barcode", None, json!({"barcode": "123456789012"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["source"], "api");
        assert_eq!(body["data"]["items"][0]["name"], "Organic Banana");
        assert!(store.cached("123456789012").is_some());

        let response = app
            .oneshot(json_request("POST", "/api/analyze-barcode", Some("8"), json!({"barcode": "123456789012"})))
            .await
            .unwrap();
        let body = read_json(response).await;
        assert_eq!(body["source"], "cache");
        assert_eq!(body["data"]["items"][0]["confidence"], 0.98);

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].analysis_method, "barcode");
        assert_eq!(entries[0].barcode.as_deref(), Some("123456789012"));
    }

    #[tokio::test]
    async fn test_barcode_errors() {
        let app = default_app(Arc::new(MemoryStore::default()));

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/analyze-barcode", None, json!({"barcode": "999999999999"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(json_request("POST", "/api/analyze-barcode", None, json!({"barcode": "12ab"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_analyze_text() {
        let text = StubProvider::ok("text", vec![apple(95.0, 0.9)]);
        let app = app(
            Arc::new(MemoryStore::default()),
            StubProvider::failing("vision"),
            text.clone(),
        );

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/analyze-text", None, json!({"description": "ab"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(text.calls(), 0);

        let response = app
            .oneshot(json_request("POST", "/api/analyze-text", None, json!({"description": "one green apple"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["data"]["confidence"], 0.8);
        assert_eq!(body["confidence_note"], TEXT_CONFIDENCE_NOTE);
    }

    #[tokio::test]
    async fn test_text_provider_down_is_bad_gateway() {
        let app = app(
            Arc::new(MemoryStore::default()),
            StubProvider::failing("vision"),
            StubProvider::failing("text"),
        );

        let response = app
            .oneshot(json_request("POST", "/api/analyze-text", None, json!({"description": "pasta"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_save_meal_and_history() {
        let store = Arc::new(MemoryStore::default());
        let app = default_app(store.clone());

        let meal = json!({
            "meal_type": "lunch",
            "items": [
                {"name": "rice", "portion": "1 cup", "calories": 205, "protein": 4.3, "carbs": 44.5, "fat": 0.4},
                {"name": "chicken", "portion": "150g", "calories": 231, "protein": 43.5, "carbs": 0, "fat": 5}
            ]
        });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/save-meal", Some("7"), meal))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["message"], "Lunch saved successfully! 🍽️");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/nutrition-history?limit=1")
                    .header("x-user-id", "7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = read_json(response).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["has_more"], true);
        assert_eq!(body["daily_stats"][0]["total_calories"], 436.0);
        assert_eq!(body["daily_stats"][0]["items_count"], 2);
    }

    #[tokio::test]
    async fn test_save_meal_validation() {
        let app = default_app(Arc::new(MemoryStore::default()));

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/save-meal",
                None,
                json!({"meal_type": "lunch", "items": [{"name": "rice"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/save-meal",
                Some("7"),
                json!({"meal_type": "brunch", "items": [{"name": "rice"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_goals_roundtrip() {
        let app = default_app(Arc::new(MemoryStore::default()));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/nutrition-goals")
                    .header("x-user-id", "3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(read_json(response).await["goals"]["calories_goal"], 2000.0);

        let goals = json!({"calories_goal": 1800, "protein_goal": 120, "carbs_goal": 200, "fat_goal": 60});
        let response = app
            .clone()
            .oneshot(json_request("PUT", "/api/nutrition-goals", Some("3"), goals))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["goals"]["fiber_goal"], 25.0);

        let invalid = json!({"calories_goal": -1, "protein_goal": 120, "carbs_goal": 200, "fat_goal": 60});
        let response = app
            .oneshot(json_request("PUT", "/api/nutrition-goals", Some("3"), invalid))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_record_correction() {
        let store = Arc::new(MemoryStore::default());
        let app = default_app(store.clone());

        let body = json!({
            "food_name": "Apple",
            "original": {"calories": 100, "protein": 0.5, "carbs": 25, "fat": 0.3},
            "corrected": {"calories": 80, "protein": 0.5, "carbs": 20, "fat": 0.3}
        });
        let response = app
            .oneshot(json_request("POST", "/api/corrections", Some("5"), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let records = store.get_correction_history(Some(5)).await.unwrap();
        assert_eq!(records[0].food_name_lower, "apple");
        assert!((records[0].calorie_multiplier - 0.8).abs() < 1e-9);
    }

    fn get_request(uri: &str, user: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-user-id", user)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_history_rejects_huge_page() {
        let response = default_app(Arc::new(MemoryStore::default()))
            .oneshot(get_request("/api/nutrition-history?page=9223372036854775807", "7"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn test_malformed_bodies_use_error_envelope() {
        let app = default_app(Arc::new(MemoryStore::default()));

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/analyze-text", None, json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("description"));

        let request = Request::builder()
            .method("POST")
            .uri("/api/analyze-barcode")
            .header("content-type", "text/plain")
            .body(Body::from("123456789012"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["success"], false);

        let response = app
            .clone()
            .oneshot(get_request("/api/nutrition-history?page=abc", "7"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["success"], false);

        let request = Request::builder()
            .method("POST")
            .uri("/api/analyze-image")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn test_nutrition_insights() {
        let store = Arc::new(MemoryStore::default());
        let today = Utc::now();
        let entry = |calories: f64, protein: f64, days_ago: i64| {
            let item = FoodItemEstimate::new("meal", "1 plate", calories, protein, 0.0, 0.0);
            let mut entry = MealEntry::from_item(9, MealType::Dinner, AnalysisMethod::Manual, &item);
            entry.created_at = today - Duration::days(days_ago);
            entry
        };
        store
            .save_meal_entries(&[entry(1000.0, 40.0, 0), entry(1800.0, 100.0, 1), entry(3000.0, 200.0, 30)])
            .await
            .unwrap();
        let app = default_app(store);

        let response = app
            .clone()
            .oneshot(get_request("/api/nutrition-insights", "9"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        let insights = &body["insights"];
        assert_eq!(body["period"], "7 days");
        assert_eq!(body["nutrition_data"].as_array().unwrap().len(), 2);
        assert_eq!(insights["average_daily_calories"], 1400.0);
        assert_eq!(insights["goal_adherence"]["calories"], 0.7);
        assert_eq!(insights["goal_adherence"]["protein"], 0.47);
        assert_eq!(insights["trends"]["direction"], "decreasing");
        assert_eq!(insights["recommendations"].as_array().unwrap().len(), 2);

        let goals = json!({"calories_goal": 1500, "protein_goal": 70, "carbs_goal": 200, "fat_goal": 60});
        app.clone()
            .oneshot(json_request("PUT", "/api/nutrition-goals", Some("9"), goals))
            .await
            .unwrap();
        let response = app
            .clone()
            .oneshot(get_request("/api/nutrition-insights?days=2", "9"))
            .await
            .unwrap();
        let body = read_json(response).await;
        assert_eq!(body["insights"]["trends"]["consistency"], 1.0);
        assert!(body["insights"]["recommendations"].as_array().unwrap().is_empty());

        let response = app
            .oneshot(get_request("/api/nutrition-insights?days=0", "9"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_barcode_format() {
        assert!(is_valid_barcode("12345678"));
        assert!(is_valid_barcode("1234567890123"));
        assert!(!is_valid_barcode("1234567"));
        assert!(!is_valid_barcode("12345678901234"));
        assert!(!is_valid_barcode("12345abc"));
    }
}
