use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recognized food item, as reported by any provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItemEstimate {
    pub name: String,
    #[serde(default)]
    pub portion: String,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub fiber: f64,
    /// Missing confidence is scored as 0.5
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ml_corrected: bool,
}

impl FoodItemEstimate {
    pub fn new(name: &str, portion: &str, calories: f64, protein: f64, carbs: f64, fat: f64) -> Self {
        Self {
            name: name.to_string(),
            portion: portion.to_string(),
            calories,
            protein,
            carbs,
            fat,
            fiber: 0.0,
            confidence: None,
            brand: None,
            ml_corrected: false,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_brand(mut self, brand: Option<String>) -> Self {
        self.brand = brand.filter(|b| !b.trim().is_empty());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionTotals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub items: Vec<FoodItemEstimate>,
    pub total: NutritionTotals,
    pub confidence: f64,
    pub provider: String,
    pub volume_enhanced: bool,
    pub ml_corrected: bool,
}

/// Per-food multipliers learned from user corrections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub food_name_lower: String,
    pub calorie_multiplier: f64,
    pub protein_multiplier: f64,
    pub carb_multiplier: f64,
    pub fat_multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

/// Capture-device signal. Both fields must be present for volume adjustment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeMetadata {
    #[serde(default)]
    pub depth: Option<f64>,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    Unspecified,
}

impl std::fmt::Display for MealType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
            MealType::Snack => "snack",
            MealType::Unspecified => "unspecified",
        };
        write!(f, "{}", s)
    }
}

impl MealType {
    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "breakfast" => Some(MealType::Breakfast),
            "lunch" => Some(MealType::Lunch),
            "dinner" => Some(MealType::Dinner),
            "snack" => Some(MealType::Snack),
            "unspecified" => Some(MealType::Unspecified),
            _ => None,
        }
    }
}

/// How a meal entry was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    AiVision,
    Barcode,
    Text,
    Manual,
    Bot,
}

impl std::fmt::Display for AnalysisMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AnalysisMethod::AiVision => "ai_vision",
            AnalysisMethod::Barcode => "barcode",
            AnalysisMethod::Text => "text",
            AnalysisMethod::Manual => "manual",
            AnalysisMethod::Bot => "bot",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealEntry {
    pub id: Option<i64>,
    pub user_id: i64,
    pub meal_type: MealType,
    pub food_name: String,
    pub portion: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub analysis_method: String,
    pub confidence: f64,
    pub image_ref: Option<String>,
    pub barcode: Option<String>,
    pub meal_time: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MealEntry {
    pub fn from_item(
        user_id: i64,
        meal_type: MealType,
        method: AnalysisMethod,
        item: &FoodItemEstimate,
    ) -> Self {
        Self {
            id: None,
            user_id,
            meal_type,
            food_name: item.name.clone(),
            portion: item.portion.clone(),
            calories: item.calories,
            protein: item.protein,
            carbs: item.carbs,
            fat: item.fat,
            fiber: item.fiber,
            analysis_method: method.to_string(),
            confidence: item.confidence.unwrap_or(1.0),
            image_ref: None,
            barcode: None,
            meal_time: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionGoals {
    pub calories_goal: f64,
    pub protein_goal: f64,
    pub carbs_goal: f64,
    pub fat_goal: f64,
    #[serde(default = "default_fiber_goal")]
    pub fiber_goal: f64,
}

fn default_fiber_goal() -> f64 {
    25.0
}

impl Default for NutritionGoals {
    fn default() -> Self {
        Self {
            calories_goal: 2000.0,
            protein_goal: 150.0,
            carbs_goal: 250.0,
            fat_goal: 65.0,
            fiber_goal: default_fiber_goal(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: String,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    pub items_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedProduct {
    pub barcode: String,
    pub product_name: String,
    pub brand: Option<String>,
    pub serving_size: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl CachedProduct {
    pub fn from_item(barcode: &str, item: &FoodItemEstimate) -> Self {
        Self {
            barcode: barcode.to_string(),
            product_name: item.name.clone(),
            brand: item.brand.clone(),
            serving_size: item.portion.clone(),
            calories: item.calories,
            protein: item.protein,
            carbs: item.carbs,
            fat: item.fat,
        }
    }

    pub fn to_item(&self) -> FoodItemEstimate {
        FoodItemEstimate::new(
            &self.product_name,
            &self.serving_size,
            self.calories,
            self.protein,
            self.carbs,
            self.fat,
        )
        .with_brand(self.brand.clone())
        .with_confidence(0.98)
    }
}

/// Macro values as submitted in a correction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroValues {
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fat: f64,
}

/// A single user-submitted correction: what the system estimated vs. what the user says.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionEvent {
    pub user_id: i64,
    pub food_name: String,
    pub original: MacroValues,
    pub corrected: MacroValues,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meal_type_from_string() {
        assert_eq!(MealType::from_string("Lunch"), Some(MealType::Lunch));
        assert_eq!(MealType::from_string(" snack "), Some(MealType::Snack));
        assert_eq!(MealType::from_string("brunch"), None);
    }

    #[test]
    fn test_item_deserialization_defaults() {
        let item: FoodItemEstimate = serde_json::from_str(r#"{"name": "apple"}"#).unwrap();

        assert_eq!(item.name, "apple");
        assert_eq!(item.fiber, 0.0);
        assert_eq!(item.confidence, None);
        assert!(!item.ml_corrected);
    }

    #[test]
    fn test_cached_product_to_item() {
        let product = CachedProduct {
            barcode: "123456789012".to_string(),
            product_name: "Organic Banana".to_string(),
            brand: Some("Fresh Farms".to_string()),
            serving_size: "1 medium".to_string(),
            calories: 105.0,
            protein: 1.3,
            carbs: 27.0,
            fat: 0.4,
        };

        let item = product.to_item();
        assert_eq!(item.name, "Organic Banana");
        assert_eq!(item.brand.as_deref(), Some("Fresh Farms"));
        assert_eq!(item.confidence, Some(0.98));
    }

    #[test]
    fn test_volume_metadata_partial() {
        let meta: VolumeMetadata = serde_json::from_str(r#"{"depth": 4.0}"#).unwrap();
        assert_eq!(meta.depth, Some(4.0));
        assert!(meta.dimensions.is_none());
    }
}
