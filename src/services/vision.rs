use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};

use crate::models::FoodItemEstimate;
use crate::services::ai_service::{strip_code_fence, ImageAnalyzer, ImageRequest, ProviderResponse, TextAnalyzer};
use crate::services::errors::{AnalysisError, ProviderError};

pub const VISION_PROVIDER: &str = "gpt4-vision";
pub const TEXT_PROVIDER: &str = "gpt4-text";
pub const TEXT_FALLBACK_PROVIDER: &str = "text-fallback";

const VISION_PROMPT: &str = "You are a professional nutritionist AI. Analyze this food image and provide:\n\
1. Identify all food items visible\n\
2. Estimate portion sizes (grams/cups/pieces)\n\
3. Calculate calories per item\n\
4. Provide macros (protein, carbs, fat, fiber)\n\
5. Rate confidence between 0 and 1\n\
\n\
Respond with JSON only, in this format:\n\
{\n\
  \"items\": [\n\
    {\"name\": \"food_name\", \"portion\": \"estimated_amount\", \"calories\": number, \"protein\": number,\n\
     \"carbs\": number, \"fat\": number, \"fiber\": number, \"confidence\": number}\n\
  ],\n\
  \"total\": {\"calories\": number, \"protein\": number, \"carbs\": number, \"fat\": number},\n\
  \"accuracy_notes\": \"suggestions for a better photo\"\n\
}";

const TEXT_PROMPT: &str = "Parse this food description and estimate nutritional values. \
Respond with JSON only: {\"items\": [{\"name\": string, \"portion\": string, \"calories\": number, \
\"protein\": number, \"carbs\": number, \"fat\": number, \"fiber\": number, \"confidence\": number}]}. \
Description: ";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        #[serde(rename = "type")]
        content_type: String,
        text: String,
    },
    ImageUrl {
        #[serde(rename = "type")]
        content_type: String,
        image_url: ImageData,
    },
}

#[derive(Debug, Serialize)]
struct ImageData {
    url: String,
    detail: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelAnalysis {
    items: Vec<FoodItemEstimate>,
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 1000,
        }
    }
}

/// OpenAI-compatible chat-completions client (OpenAI, OpenRouter, ...).
pub struct VisionClient {
    config: VisionConfig,
    client: reqwest::Client,
}

impl VisionClient {
    pub fn new(config: VisionConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    async fn complete(&self, provider: &str, content: Vec<ContentPart>) -> Result<String, ProviderError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(AnalysisError::unavailable(provider, "no API key configured"));
        };

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content,
            }],
            max_tokens: self.config.max_tokens,
            temperature: 0.1,
        };

        log::info!("🤖 Sending request to {} with model: {}", provider, self.config.model);

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalysisError::from_http(provider, e))?;

        log::debug!("📥 {} response status: {}", provider, response.status());

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            log::error!("❌ {} API error response: {}", provider, error_text);
            return Err(AnalysisError::unavailable(provider, format!("HTTP {}: {}", status, error_text)));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::malformed(provider, e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AnalysisError::malformed(provider, "response has no choices"))
    }
}

/// Strict parse of the model's JSON answer.
pub fn parse_model_items(content: &str) -> Result<Vec<FoodItemEstimate>, serde_json::Error> {
    let analysis: ModelAnalysis = serde_json::from_str(strip_code_fence(content))?;
    Ok(analysis.items)
}

/// Conservative single-item guess used when the model ignored the JSON format.
pub fn parse_text_response(content: &str) -> ProviderResponse {
    log::warn!(
        "Could not parse structured analysis, using placeholder ({} chars of free text)",
        content.len()
    );
    ProviderResponse::new(
        TEXT_FALLBACK_PROVIDER,
        vec![FoodItemEstimate::new("Detected Food", "1 serving", 200.0, 8.0, 25.0, 8.0).with_confidence(0.6)],
    )
}

#[async_trait::async_trait]
impl ImageAnalyzer for VisionClient {
    fn name(&self) -> &str {
        VISION_PROVIDER
    }

    async fn analyze_image(&self, request: ImageRequest<'_>) -> Result<ProviderResponse, ProviderError> {
        if request.image.is_empty() {
            return Err(AnalysisError::Validation("image is empty".to_string()));
        }

        log::debug!("📊 Image size: {} bytes", request.image.len());
        let data_url = format!(
            "data:image/jpeg;base64,{}",
            general_purpose::STANDARD.encode(request.image)
        );

        let content = self
            .complete(
                VISION_PROVIDER,
                vec![
                    ContentPart::Text {
                        content_type: "text".to_string(),
                        text: VISION_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        content_type: "image_url".to_string(),
                        image_url: ImageData {
                            url: data_url,
                            detail: "high".to_string(),
                        },
                    },
                ],
            )
            .await?;

        match parse_model_items(&content) {
            Ok(items) => Ok(ProviderResponse::new(VISION_PROVIDER, items)),
            Err(e) => {
                log::debug!("Strict parse failed: {}", e);
                Ok(parse_text_response(&content))
            }
        }
    }
}

#[async_trait::async_trait]
impl TextAnalyzer for VisionClient {
    fn name(&self) -> &str {
        TEXT_PROVIDER
    }

    async fn analyze_text(&self, description: &str) -> Result<ProviderResponse, ProviderError> {
        let content = self
            .complete(
                TEXT_PROVIDER,
                vec![ContentPart::Text {
                    content_type: "text".to_string(),
                    text: format!("{}\"{}\"", TEXT_PROMPT, description),
                }],
            )
            .await?;

        let items = parse_model_items(&content).map_err(|e| AnalysisError::malformed(TEXT_PROVIDER, e.to_string()))?;
        Ok(ProviderResponse::new(TEXT_PROVIDER, items))
    }
}
