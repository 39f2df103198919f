use crate::models::{FoodItemEstimate, NutritionTotals};
use crate::services::errors::ProviderError;
use crate::services::nutrition::{calculate_totals, confidence_score, sanitize_item};

/// Normalized `{items, total}` shape every provider client returns.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub provider: String,
    pub items: Vec<FoodItemEstimate>,
    pub total: NutritionTotals,
}

impl ProviderResponse {
    pub fn new(provider: &str, items: Vec<FoodItemEstimate>) -> Self {
        let items: Vec<FoodItemEstimate> = items.into_iter().map(sanitize_item).collect();
        Self {
            provider: provider.to_string(),
            total: calculate_totals(&items),
            items,
        }
    }

    pub fn confidence(&self) -> f64 {
        confidence_score(&self.items)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Input for one image-analysis attempt.
///
/// `hint` carries the items a previous provider recognized (if any); lookup-style
/// fallbacks need it because they cannot read pixels themselves.
#[derive(Debug, Clone, Copy)]
pub struct ImageRequest<'a> {
    pub image: &'a [u8],
    pub hint: Option<&'a [FoodItemEstimate]>,
}

/// A provider able to take part in the image fallback chain.
#[async_trait::async_trait]
pub trait ImageAnalyzer: Send + Sync {
    fn name(&self) -> &str;
    async fn analyze_image(&self, request: ImageRequest<'_>) -> Result<ProviderResponse, ProviderError>;
}

/// Packaged-food lookup by product code. `Ok(None)` means the code is not known.
#[async_trait::async_trait]
pub trait BarcodeLookup: Send + Sync {
    fn name(&self) -> &str;
    async fn lookup_barcode(&self, barcode: &str) -> Result<Option<ProviderResponse>, ProviderError>;
}

#[async_trait::async_trait]
pub trait TextAnalyzer: Send + Sync {
    fn name(&self) -> &str;
    async fn analyze_text(&self, description: &str) -> Result<ProviderResponse, ProviderError>;
}

/// Strip a Markdown code fence that chat models like to wrap JSON in.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
