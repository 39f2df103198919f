use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;

use crate::handlers::report::{format_analysis, format_daily_stats};
use crate::models::{AnalysisMethod, AnalysisResult, FoodItemEstimate, MealEntry, MealType};
use crate::services::analyzer::{FoodAnalyzer, MIN_DESCRIPTION_CHARS};
use crate::services::errors::AnalysisError;
use crate::services::nutrition::{calculate_totals, confidence_score, placeholder_result};
use crate::services::store::NutritionStore;
use crate::services::telegram::ChatService;

pub const QUICK_ESTIMATE_PROVIDER: &str = "quick-estimate";

const WELCOME_MESSAGE: &str = "🧠 Welcome to CalAI!\n\n\
Send me a photo of your meal and I will estimate calories and macros.\n\
You can also describe what you ate, e.g. \"2 eggs and a slice of toast\".\n\n\
Type /help to see all commands.";

const HELP_MESSAGE: &str = "🤖 Commands\n\n\
/start - Welcome message\n\
/help - Show this help\n\
/stats - Today's nutrition vs. your goals\n\n\
📸 Photo - Analyze a meal photo\n\
💬 Text - Describe a meal (at least 3 characters)";

struct KeywordEstimate {
    keywords: &'static [&'static str],
    name: &'static str,
    portion: &'static str,
    calories: f64,
    protein: f64,
    carbs: f64,
    fat: f64,
    confidence: f64,
}

const KEYWORD_ESTIMATES: &[KeywordEstimate] = &[
    KeywordEstimate {
        keywords: &["pizza", "пицца"],
        name: "Pizza Margherita",
        portion: "2 slices",
        calories: 485.0,
        protein: 18.0,
        carbs: 58.0,
        fat: 20.0,
        confidence: 0.92,
    },
    KeywordEstimate {
        keywords: &["burger", "бургер"],
        name: "Cheeseburger",
        portion: "1 medium burger",
        calories: 540.0,
        protein: 25.0,
        carbs: 45.0,
        fat: 30.0,
        confidence: 0.88,
    },
    KeywordEstimate {
        keywords: &["salad", "салат"],
        name: "Mixed Green Salad",
        portion: "1 large bowl",
        calories: 120.0,
        protein: 8.0,
        carbs: 15.0,
        fat: 5.0,
        confidence: 0.85,
    },
    KeywordEstimate {
        keywords: &["pasta", "spaghetti", "паста", "спагетти"],
        name: "Spaghetti Bolognese",
        portion: "1 portion",
        calories: 380.0,
        protein: 20.0,
        carbs: 55.0,
        fat: 12.0,
        confidence: 0.90,
    },
];

/// Offline estimate from the photo caption, used when no vision backend is reachable.
pub fn quick_estimate(caption: Option<&str>) -> AnalysisResult {
    let caption = caption.unwrap_or("").to_lowercase();
    let Some(found) = KEYWORD_ESTIMATES
        .iter()
        .find(|e| e.keywords.iter().any(|k| caption.contains(k)))
    else {
        return placeholder_result();
    };

    let items = vec![FoodItemEstimate::new(
        found.name,
        found.portion,
        found.calories,
        found.protein,
        found.carbs,
        found.fat,
    )
    .with_confidence(found.confidence)];

    AnalysisResult {
        total: calculate_totals(&items),
        confidence: confidence_score(&items),
        items,
        provider: QUICK_ESTIMATE_PROVIDER.to_string(),
        volume_enhanced: false,
        ml_corrected: false,
    }
}

pub struct BotHandler {
    store: Arc<dyn NutritionStore>,
    analyzer: Arc<FoodAnalyzer>,
    chat: Arc<dyn ChatService>,
    simple_mode: bool,
}

impl BotHandler {
    pub fn new(
        store: Arc<dyn NutritionStore>,
        analyzer: Arc<FoodAnalyzer>,
        chat: Arc<dyn ChatService>,
        simple_mode: bool,
    ) -> Self {
        Self {
            store,
            analyzer,
            chat,
            simple_mode,
        }
    }

    pub async fn handle_photo(&self, chat_id: i64, user_id: i64, file_id: &str, caption: Option<&str>) -> Result<()> {
        log::info!("📸 Photo from user {} (simple_mode={})", user_id, self.simple_mode);

        let result = if self.simple_mode {
            quick_estimate(caption)
        } else {
            match self.chat.download_file(file_id).await {
                Ok(image) => {
                    let corrections = self
                        .store
                        .get_correction_history(Some(user_id))
                        .await
                        .unwrap_or_else(|e| {
                            log::warn!("⚠️ Could not load corrections for {}: {}", user_id, e);
                            Vec::new()
                        });
                    self.analyzer.analyze_image(&image, None, &corrections).await
                }
                Err(e) => {
                    log::warn!("⚠️ Photo download failed, using quick estimate: {}", e);
                    quick_estimate(caption)
                }
            }
        };

        // The static placeholder says nothing about the meal
        if result.provider != "fallback" {
            self.save_items(user_id, AnalysisMethod::Bot, &result.items).await;
        }
        self.chat.send_message(chat_id, &format_analysis(&result)).await
    }

    pub async fn handle_text(&self, chat_id: i64, user_id: i64, text: &str) -> Result<()> {
        let trimmed = text.trim();

        if let Some(command) = trimmed.strip_prefix('/') {
            // "/stats@MyBot extra" -> "stats"
            let command = command
                .split(|c: char| c == '@' || c.is_whitespace())
                .next()
                .unwrap_or("")
                .to_lowercase();
            log::info!("⌨️ Command /{} from user {}", command, user_id);

            return match command.as_str() {
                "start" => self.chat.send_message(chat_id, WELCOME_MESSAGE).await,
                "stats" => self.send_stats(chat_id, user_id).await,
                _ => self.chat.send_message(chat_id, HELP_MESSAGE).await,
            };
        }

        if trimmed.chars().count() < MIN_DESCRIPTION_CHARS {
            return self.chat.send_message(chat_id, HELP_MESSAGE).await;
        }

        log::info!("💬 Meal description from user {}", user_id);
        match self.analyzer.analyze_text(trimmed).await {
            Ok(result) => {
                self.save_items(user_id, AnalysisMethod::Text, &result.items).await;
                self.chat.send_message(chat_id, &format_analysis(&result)).await
            }
            Err(AnalysisError::NotFound(_)) | Err(AnalysisError::Validation(_)) => {
                self.chat
                    .send_message(chat_id, "🤔 I could not recognize any food. Try describing it in more detail.")
                    .await
            }
            Err(e) => {
                log::error!("❌ Text analysis failed: {}", e);
                self.chat
                    .send_message(chat_id, "❌ Analysis is unavailable right now. Please send a photo or try again later.")
                    .await
            }
        }
    }

    async fn send_stats(&self, chat_id: i64, user_id: i64) -> Result<()> {
        let today = Utc::now().date_naive();
        let goals = self.store.get_goals(user_id).await?;
        let summaries = self.store.get_daily_summaries(user_id, today, today).await?;

        let report = format_daily_stats(summaries.first(), &goals);
        self.chat.send_message(chat_id, &report).await
    }

    async fn save_items(&self, user_id: i64, method: AnalysisMethod, items: &[FoodItemEstimate]) {
        let entries: Vec<MealEntry> = items
            .iter()
            .map(|item| MealEntry::from_item(user_id, MealType::Unspecified, method, item))
            .collect();

        if let Err(e) = self.store.save_meal_entries(&entries).await {
            log::error!("❌ Failed to save {} entries for user {}: {}", entries.len(), user_id, e);
        }
    }
}
