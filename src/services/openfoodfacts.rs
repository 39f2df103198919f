use serde::Deserialize;
use std::collections::HashMap;

use crate::models::FoodItemEstimate;
use crate::services::ai_service::{BarcodeLookup, ProviderResponse};
use crate::services::errors::{AnalysisError, ProviderError};
use crate::services::nutrition::round_to;

pub const OPEN_FOOD_FACTS_PROVIDER: &str = "openfoodfacts";

#[derive(Debug, Default, Deserialize)]
pub struct ProductResponse {
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub product: Option<Product>,
}

#[derive(Debug, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub brands: Option<String>,
    #[serde(default)]
    pub serving_size: Option<String>,
    #[serde(default)]
    pub nutriments: HashMap<String, serde_json::Value>,
}

impl Product {
    fn nutriment(&self, key: &str) -> Option<f64> {
        match self.nutriments.get(key)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Serving values when the label has them, per 100 g otherwise.
    pub fn to_item(&self) -> Option<FoodItemEstimate> {
        let name = self.product_name.as_deref().map(str::trim).filter(|n| !n.is_empty())?;

        let per_serving = self.serving_size.is_some() && self.nutriment("energy-kcal_serving").is_some();
        let (suffix, portion) = if per_serving {
            ("_serving", self.serving_size.clone().unwrap_or_default())
        } else {
            ("_100g", "100 g".to_string())
        };
        let value = |base: &str| self.nutriment(&format!("{}{}", base, suffix)).unwrap_or(0.0);

        // The first listed brand is the product owner
        let brand = self
            .brands
            .as_deref()
            .and_then(|b| b.split(',').next())
            .map(|b| b.trim().to_string());

        let mut item = FoodItemEstimate::new(
            name,
            &portion,
            value("energy-kcal").round(),
            round_to(value("proteins"), 1),
            round_to(value("carbohydrates"), 1),
            round_to(value("fat"), 1),
        )
        .with_brand(brand)
        .with_confidence(0.95);
        item.fiber = round_to(value("fiber"), 1);
        Some(item)
    }
}

pub fn format_product_response(data: &ProductResponse) -> Option<ProviderResponse> {
    if data.status != 1 {
        return None;
    }
    let item = data.product.as_ref()?.to_item()?;
    Some(ProviderResponse::new(OPEN_FOOD_FACTS_PROVIDER, vec![item]))
}

/// Open Food Facts product database, queried first for barcodes (free, no key).
pub struct OpenFoodFactsClient {
    base_url: String,
    client: reqwest::Client,
}

impl OpenFoodFactsClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::builder()
                .user_agent(concat!("calai-nutrition-bot/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for OpenFoodFactsClient {
    fn default() -> Self {
        Self::new("https://world.openfoodfacts.org".to_string())
    }
}

#[async_trait::async_trait]
impl BarcodeLookup for OpenFoodFactsClient {
    fn name(&self) -> &str {
        OPEN_FOOD_FACTS_PROVIDER
    }

    async fn lookup_barcode(&self, barcode: &str) -> Result<Option<ProviderResponse>, ProviderError> {
        let url = format!("{}/api/v2/product/{}.json", self.base_url, barcode);
        log::info!("🔎 Open Food Facts lookup: {}", barcode);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AnalysisError::from_http(OPEN_FOOD_FACTS_PROVIDER, e))?;

        let status = response.status();
        log::debug!("📥 Open Food Facts response status: {}", status);
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AnalysisError::unavailable(OPEN_FOOD_FACTS_PROVIDER, format!("HTTP {}", status)));
        }

        let data: ProductResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::malformed(OPEN_FOOD_FACTS_PROVIDER, e.to_string()))?;
        Ok(format_product_response(&data))
    }
}
