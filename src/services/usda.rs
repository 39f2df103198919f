//! USDA FoodData Central client, the free last resort in both fallback chains.
//!
//! Search results report nutrients per 100 g, so items are emitted with a
//! `100 g` portion unless a gram-based serving size lets us rescale.

use serde::Deserialize;

use crate::models::FoodItemEstimate;
use crate::services::ai_service::{BarcodeLookup, ImageAnalyzer, ImageRequest, ProviderResponse};
use crate::services::errors::{AnalysisError, ProviderError};
use crate::services::nutrition::round_to;

pub const USDA_PROVIDER: &str = "usda";

const ENERGY_KCAL: u32 = 1008;
const PROTEIN: u32 = 1003;
const FAT: u32 = 1004;
const CARBOHYDRATE: u32 = 1005;
const FIBER: u32 = 1079;

#[derive(Debug, Clone)]
pub struct UsdaConfig {
    pub api_key: String,
    pub base_url: String,
}

impl Default for UsdaConfig {
    fn default() -> Self {
        Self {
            api_key: "DEMO_KEY".to_string(),
            base_url: "https://api.nal.usda.gov/fdc/v1".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub foods: Vec<SearchFood>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFood {
    pub description: String,
    #[serde(default)]
    pub brand_owner: Option<String>,
    #[serde(default)]
    pub gtin_upc: Option<String>,
    #[serde(default)]
    pub serving_size: Option<f64>,
    #[serde(default)]
    pub serving_size_unit: Option<String>,
    #[serde(default)]
    pub food_nutrients: Vec<SearchNutrient>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchNutrient {
    #[serde(default)]
    pub nutrient_id: u32,
    #[serde(default)]
    pub value: Option<f64>,
}

impl SearchFood {
    fn nutrient(&self, id: u32) -> f64 {
        self.food_nutrients
            .iter()
            .find(|n| n.nutrient_id == id)
            .and_then(|n| n.value)
            .unwrap_or(0.0)
    }

    /// Per-100 g values, rescaled to the labelled serving when it is given in grams.
    pub fn to_item(&self, confidence: f64) -> FoodItemEstimate {
        let gram_serving = match (self.serving_size, self.serving_size_unit.as_deref()) {
            (Some(size), Some(unit)) if size > 0.0 && unit.eq_ignore_ascii_case("g") => Some(size),
            _ => None,
        };
        let (portion, factor) = match gram_serving {
            Some(size) => (format!("{} g", size), size / 100.0),
            None => ("100 g".to_string(), 1.0),
        };

        let mut item = FoodItemEstimate::new(
            &self.description,
            &portion,
            (self.nutrient(ENERGY_KCAL) * factor).round(),
            round_to(self.nutrient(PROTEIN) * factor, 1),
            round_to(self.nutrient(CARBOHYDRATE) * factor, 1),
            round_to(self.nutrient(FAT) * factor, 1),
        )
        .with_brand(self.brand_owner.clone())
        .with_confidence(confidence);
        item.fiber = round_to(self.nutrient(FIBER) * factor, 1);
        item
    }

    fn matches_barcode(&self, barcode: &str) -> bool {
        self.gtin_upc
            .as_deref()
            .is_some_and(|gtin| gtin.trim_start_matches('0') == barcode.trim_start_matches('0'))
    }
}

pub struct UsdaClient {
    config: UsdaConfig,
    client: reqwest::Client,
}

impl UsdaClient {
    pub fn new(config: UsdaConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub async fn search_foods(
        &self,
        query: &str,
        page_size: u32,
        data_type: Option<&str>,
    ) -> Result<SearchResponse, ProviderError> {
        let page_size = page_size.to_string();
        let mut params = vec![
            ("query", query),
            ("pageSize", page_size.as_str()),
            ("api_key", self.config.api_key.as_str()),
        ];
        if let Some(data_type) = data_type {
            params.push(("dataType", data_type));
        }

        log::info!("🔎 USDA search: {}", query);
        let response = self
            .client
            .get(format!("{}/foods/search", self.config.base_url))
            .query(&params)
            .send()
            .await
            .map_err(|e| AnalysisError::from_http(USDA_PROVIDER, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::unavailable(USDA_PROVIDER, format!("HTTP {}: {}", status, error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| AnalysisError::malformed(USDA_PROVIDER, e.to_string()))
    }
}

#[async_trait::async_trait]
impl ImageAnalyzer for UsdaClient {
    fn name(&self) -> &str {
        USDA_PROVIDER
    }

    async fn analyze_image(&self, request: ImageRequest<'_>) -> Result<ProviderResponse, ProviderError> {
        let Some(hint) = request.hint.filter(|h| !h.is_empty()) else {
            return Err(AnalysisError::unavailable(USDA_PROVIDER, "needs recognized food names"));
        };

        let mut items = Vec::new();
        for recognized in hint {
            let found = match self.search_foods(&recognized.name, 1, None).await {
                Ok(found) => found,
                Err(e) => {
                    log::warn!("⚠️ USDA lookup for '{}' failed: {}", recognized.name, e);
                    continue;
                }
            };
            if let Some(food) = found.foods.first() {
                items.push(food.to_item(0.75));
            }
        }

        if items.is_empty() {
            return Err(AnalysisError::NotFound("no USDA match".to_string()));
        }
        Ok(ProviderResponse::new(USDA_PROVIDER, items))
    }
}

#[async_trait::async_trait]
impl BarcodeLookup for UsdaClient {
    fn name(&self) -> &str {
        USDA_PROVIDER
    }

    async fn lookup_barcode(&self, barcode: &str) -> Result<Option<ProviderResponse>, ProviderError> {
        let found = self.search_foods(barcode, 5, Some("Branded")).await?;

        Ok(found
            .foods
            .iter()
            .find(|food| food.matches_barcode(barcode))
            .map(|food| ProviderResponse::new(USDA_PROVIDER, vec![food.to_item(0.9)])))
    }
}
