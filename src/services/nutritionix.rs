use serde::{Deserialize, Serialize};

use crate::models::FoodItemEstimate;
use crate::services::ai_service::{BarcodeLookup, ImageAnalyzer, ImageRequest, ProviderResponse};
use crate::services::errors::{AnalysisError, ProviderError};

pub const NUTRITIONIX_PROVIDER: &str = "nutritionix";

#[derive(Debug, Clone)]
pub struct NutritionixConfig {
    pub app_id: Option<String>,
    pub app_key: Option<String>,
    pub base_url: String,
}

impl Default for NutritionixConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            app_key: None,
            base_url: "https://trackapi.nutritionix.com/v2".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct NaturalQuery {
    query: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NutritionixResponse {
    #[serde(default)]
    pub foods: Vec<NutritionixFood>,
}

#[derive(Debug, Deserialize)]
pub struct NutritionixFood {
    pub food_name: String,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub serving_qty: Option<f64>,
    #[serde(default)]
    pub serving_unit: Option<String>,
    #[serde(default)]
    pub nf_calories: Option<f64>,
    #[serde(default)]
    pub nf_protein: Option<f64>,
    #[serde(default)]
    pub nf_total_carbohydrate: Option<f64>,
    #[serde(default)]
    pub nf_total_fat: Option<f64>,
    #[serde(default)]
    pub nf_dietary_fiber: Option<f64>,
}

impl NutritionixFood {
    fn to_item(&self) -> FoodItemEstimate {
        let portion = match (self.serving_qty, self.serving_unit.as_deref()) {
            (Some(qty), Some(unit)) => format!("{} {}", qty, unit),
            (Some(qty), None) => qty.to_string(),
            (None, Some(unit)) => unit.to_string(),
            (None, None) => "1 serving".to_string(),
        };

        let mut item = FoodItemEstimate::new(
            &self.food_name,
            &portion,
            self.nf_calories.unwrap_or(0.0),
            self.nf_protein.unwrap_or(0.0),
            self.nf_total_carbohydrate.unwrap_or(0.0),
            self.nf_total_fat.unwrap_or(0.0),
        )
        .with_brand(self.brand_name.clone())
        .with_confidence(0.9);
        item.fiber = self.nf_dietary_fiber.unwrap_or(0.0);
        item
    }
}

/// `None` when Nutritionix knows nothing about the query.
pub fn format_nutritionix_response(data: &NutritionixResponse) -> Option<ProviderResponse> {
    if data.foods.is_empty() {
        return None;
    }
    let items = data.foods.iter().map(NutritionixFood::to_item).collect();
    Some(ProviderResponse::new(NUTRITIONIX_PROVIDER, items))
}

/// Natural-language query built from another provider's recognized items.
pub fn hint_query(hint: &[FoodItemEstimate]) -> String {
    hint.iter()
        .map(|item| {
            if item.portion.is_empty() {
                item.name.clone()
            } else {
                format!("{} {}", item.portion, item.name)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Packaged-food database client.
pub struct NutritionixClient {
    config: NutritionixConfig,
    client: reqwest::Client,
}

impl NutritionixClient {
    pub fn new(config: NutritionixConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn credentials(&self) -> Result<(&str, &str), ProviderError> {
        match (self.config.app_id.as_deref(), self.config.app_key.as_deref()) {
            (Some(id), Some(key)) => Ok((id, key)),
            _ => Err(AnalysisError::unavailable(NUTRITIONIX_PROVIDER, "no credentials configured")),
        }
    }

    async fn read(&self, response: reqwest::Response) -> Result<NutritionixResponse, ProviderError> {
        let status = response.status();
        log::debug!("📥 Nutritionix response status: {}", status);

        // Nutritionix answers 404 for unknown natural queries and UPCs
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(NutritionixResponse::default());
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::unavailable(
                NUTRITIONIX_PROVIDER,
                format!("HTTP {}: {}", status, error_text),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| AnalysisError::malformed(NUTRITIONIX_PROVIDER, e.to_string()))
    }

    pub async fn natural_nutrients(&self, query: &str) -> Result<Option<ProviderResponse>, ProviderError> {
        let (app_id, app_key) = self.credentials()?;
        log::info!("🔎 Nutritionix natural lookup: {}", query);

        let response = self
            .client
            .post(format!("{}/natural/nutrients", self.config.base_url))
            .header("x-app-id", app_id)
            .header("x-app-key", app_key)
            .json(&NaturalQuery {
                query: query.to_string(),
            })
            .send()
            .await
            .map_err(|e| AnalysisError::from_http(NUTRITIONIX_PROVIDER, e))?;

        let data = self.read(response).await?;
        Ok(format_nutritionix_response(&data))
    }
}

#[async_trait::async_trait]
impl ImageAnalyzer for NutritionixClient {
    fn name(&self) -> &str {
        NUTRITIONIX_PROVIDER
    }

    async fn analyze_image(&self, request: ImageRequest<'_>) -> Result<ProviderResponse, ProviderError> {
        let Some(hint) = request.hint.filter(|h| !h.is_empty()) else {
            return Err(AnalysisError::unavailable(NUTRITIONIX_PROVIDER, "needs recognized food names"));
        };

        self.natural_nutrients(&hint_query(hint))
            .await?
            .ok_or_else(|| AnalysisError::NotFound("no Nutritionix match".to_string()))
    }
}

#[async_trait::async_trait]
impl BarcodeLookup for NutritionixClient {
    fn name(&self) -> &str {
        NUTRITIONIX_PROVIDER
    }

    async fn lookup_barcode(&self, barcode: &str) -> Result<Option<ProviderResponse>, ProviderError> {
        let (app_id, app_key) = self.credentials()?;

        let response = self
            .client
            .get(format!("{}/search/item", self.config.base_url))
            .query(&[("upc", barcode)])
            .header("x-app-id", app_id)
            .header("x-app-key", app_key)
            .send()
            .await
            .map_err(|e| AnalysisError::from_http(NUTRITIONIX_PROVIDER, e))?;

        let data = self.read(response).await?;
        Ok(format_nutritionix_response(&data))
    }
}
