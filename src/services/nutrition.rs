use crate::models::{AnalysisResult, FoodItemEstimate, NutritionTotals};

const DEFAULT_ITEM_CONFIDENCE: f64 = 0.5;

pub fn calculate_totals(items: &[FoodItemEstimate]) -> NutritionTotals {
    items.iter().fold(NutritionTotals::default(), |totals, item| NutritionTotals {
        calories: totals.calories + item.calories,
        protein: totals.protein + item.protein,
        carbs: totals.carbs + item.carbs,
        fat: totals.fat + item.fat,
    })
}

/// Mean item confidence rounded to 2 decimals; 0 for an empty list.
pub fn confidence_score(items: &[FoodItemEstimate]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }

    let sum: f64 = items
        .iter()
        .map(|item| item.confidence.unwrap_or(DEFAULT_ITEM_CONFIDENCE))
        .sum();

    round_to(sum / items.len() as f64, 2).clamp(0.0, 1.0)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Multiply an item's macros: calories to the nearest integer, the rest to 0.1.
pub fn scale_macros(item: &mut FoodItemEstimate, calories: f64, protein: f64, carbs: f64, fat: f64) {
    item.calories = (item.calories * calories).round();
    item.protein = round_to(item.protein * protein, 1);
    item.carbs = round_to(item.carbs * carbs, 1);
    item.fat = round_to(item.fat * fat, 1);
}

/// Providers report confidence on 0-1, 1-10 or 0-100 scales.
pub fn normalize_confidence(raw: f64) -> f64 {
    if !raw.is_finite() || raw <= 0.0 {
        0.0
    } else if raw <= 1.0 {
        raw
    } else if raw <= 10.0 {
        raw / 10.0
    } else {
        (raw / 100.0).min(1.0)
    }
}

/// Clean up a provider item: non-empty name, non-negative macros, confidence in [0,1].
pub fn sanitize_item(mut item: FoodItemEstimate) -> FoodItemEstimate {
    let name = item.name.trim();
    item.name = if name.is_empty() {
        "Unknown Food".to_string()
    } else {
        name.to_string()
    };
    item.portion = item.portion.trim().to_string();
    for value in [
        &mut item.calories,
        &mut item.protein,
        &mut item.carbs,
        &mut item.fat,
        &mut item.fiber,
    ] {
        if !value.is_finite() || *value < 0.0 {
            *value = 0.0;
        }
    }
    item.confidence = item.confidence.map(normalize_confidence);
    item
}

/// Returned when every image provider fails.
pub fn placeholder_result() -> AnalysisResult {
    let items = vec![FoodItemEstimate::new("Unknown Food", "Medium serving", 250.0, 10.0, 30.0, 10.0)
        .with_confidence(0.3)];

    AnalysisResult {
        total: calculate_totals(&items),
        confidence: confidence_score(&items),
        items,
        provider: "fallback".to_string(),
        volume_enhanced: false,
        ml_corrected: false,
    }
}

pub fn confidence_hint(confidence: f64) -> &'static str {
    if confidence > 0.8 {
        "High confidence result"
    } else {
        "Consider manual verification"
    }
}
