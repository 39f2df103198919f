use std::sync::Arc;

use crate::models::{AnalysisResult, CorrectionRecord, FoodItemEstimate, VolumeMetadata};
use crate::services::ai_service::{BarcodeLookup, ImageAnalyzer, ImageRequest, ProviderResponse, TextAnalyzer};
use crate::services::corrections;
use crate::services::errors::AnalysisError;
use crate::services::nutrition::{calculate_totals, confidence_score, placeholder_result};
use crate::services::vision::TEXT_FALLBACK_PROVIDER;
use crate::services::volume::{self, VolumeConfig};

pub const MIN_DESCRIPTION_CHARS: usize = 3;

#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    /// Primary results below this confidence go through the fallback chain.
    pub confidence_threshold: f64,
    /// Text analysis is never reported as more reliable than this.
    pub text_confidence_cap: f64,
    pub volume_estimation: bool,
    pub volume: VolumeConfig,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            text_confidence_cap: 0.8,
            volume_estimation: true,
            volume: VolumeConfig::default(),
        }
    }
}

/// Sequences provider calls for one analysis request. Holds no per-request state.
pub struct FoodAnalyzer {
    primary: Arc<dyn ImageAnalyzer>,
    fallbacks: Vec<Arc<dyn ImageAnalyzer>>,
    barcode_sources: Vec<Arc<dyn BarcodeLookup>>,
    text: Arc<dyn TextAnalyzer>,
    settings: AnalyzerSettings,
}

impl FoodAnalyzer {
    pub fn new(primary: Arc<dyn ImageAnalyzer>, text: Arc<dyn TextAnalyzer>, settings: AnalyzerSettings) -> Self {
        Self {
            primary,
            fallbacks: Vec::new(),
            barcode_sources: Vec::new(),
            text,
            settings,
        }
    }

    /// Append an image fallback; fallbacks run in insertion order.
    pub fn with_fallback(mut self, provider: Arc<dyn ImageAnalyzer>) -> Self {
        self.fallbacks.push(provider);
        self
    }

    /// Append a barcode database; sources are queried in insertion order.
    pub fn with_barcode_source(mut self, source: Arc<dyn BarcodeLookup>) -> Self {
        self.barcode_sources.push(source);
        self
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    /// Never fails: degrades to the static placeholder when every provider does.
    pub async fn analyze_image(
        &self,
        image: &[u8],
        metadata: Option<&VolumeMetadata>,
        corrections: &[CorrectionRecord],
    ) -> AnalysisResult {
        log::info!("📸 Analyzing image ({} bytes)", image.len());

        let primary = match self.primary.analyze_image(ImageRequest { image, hint: None }).await {
            Ok(response) if !response.is_empty() => Some(response),
            Ok(_) => {
                log::warn!("⚠️ {} recognized no food", self.primary.name());
                None
            }
            Err(e) => {
                log::warn!("⚠️ Primary provider {} failed: {}", self.primary.name(), e);
                None
            }
        };

        let chosen = match primary {
            Some(response) if response.confidence() >= self.settings.confidence_threshold => Some(response),
            primary => {
                if let Some(response) = &primary {
                    log::info!(
                        "{} confidence {:.2} below {:.2}, trying fallbacks",
                        response.provider,
                        response.confidence(),
                        self.settings.confidence_threshold
                    );
                }
                // Placeholder names from a free-text reply are not worth looking up
                let hint = primary
                    .as_ref()
                    .filter(|r| r.provider != TEXT_FALLBACK_PROVIDER)
                    .map(|r| r.items.as_slice());

                let fallback = self.run_fallbacks(ImageRequest { image, hint }).await;
                fallback.or(primary)
            }
        };

        let Some(response) = chosen else {
            log::warn!("⚠️ All image providers failed, returning placeholder");
            return placeholder_result();
        };

        let mut result = into_result(response);

        if let Some(metadata) = metadata {
            if self.settings.volume_estimation {
                result = volume::adjust(result, metadata, &self.settings.volume);
            }
        }

        result = corrections::apply(result, corrections);
        finalize(result)
    }

    async fn run_fallbacks(&self, request: ImageRequest<'_>) -> Option<ProviderResponse> {
        for provider in &self.fallbacks {
            match provider.analyze_image(request).await {
                Ok(response) if !response.is_empty() => {
                    log::info!("✅ Fallback {} succeeded", provider.name());
                    return Some(response);
                }
                Ok(_) => log::info!("Fallback {} returned nothing", provider.name()),
                Err(e) => log::info!("Fallback {} failed: {}", provider.name(), e),
            }
        }
        None
    }

    /// The caller validates the code format and checks its cache first.
    pub async fn analyze_barcode(&self, barcode: &str) -> Result<AnalysisResult, AnalysisError> {
        let mut last_error = None;
        let mut answered = false;

        for source in &self.barcode_sources {
            match source.lookup_barcode(barcode).await {
                Ok(Some(response)) if !response.is_empty() => {
                    log::info!("✅ Barcode {} found in {}", barcode, source.name());
                    return Ok(finalize(into_result(response)));
                }
                Ok(_) => answered = true,
                Err(e) => {
                    log::warn!("Barcode source {} failed: {}", source.name(), e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !answered => Err(e),
            _ => Err(AnalysisError::NotFound(format!("product {} not found in any database", barcode))),
        }
    }

    pub async fn analyze_text(&self, description: &str) -> Result<AnalysisResult, AnalysisError> {
        let description = description.trim();
        if description.chars().count() < MIN_DESCRIPTION_CHARS {
            return Err(AnalysisError::Validation(format!(
                "description must be at least {} characters",
                MIN_DESCRIPTION_CHARS
            )));
        }

        let response = self.text.analyze_text(description).await?;
        if response.is_empty() {
            return Err(AnalysisError::NotFound("no food recognized in description".to_string()));
        }

        let cap = self.settings.text_confidence_cap;
        let mut result = into_result(response);
        for item in result.items.iter_mut() {
            item.confidence = Some(item.confidence.unwrap_or(cap).min(cap));
        }
        Ok(finalize(result))
    }
}

fn into_result(response: ProviderResponse) -> AnalysisResult {
    AnalysisResult {
        total: response.total,
        confidence: 0.0,
        items: response.items,
        provider: response.provider,
        volume_enhanced: false,
        ml_corrected: false,
    }
}

fn finalize(mut result: AnalysisResult) -> AnalysisResult {
    result.total = calculate_totals(&result.items);
    result.confidence = confidence_score(&result.items);
    result.ml_corrected = result.items.iter().any(|item: &FoodItemEstimate| item.ml_corrected);
    result
}
