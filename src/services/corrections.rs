use std::collections::BTreeMap;

use crate::models::{AnalysisResult, CorrectionEvent, CorrectionRecord};
use crate::services::nutrition::scale_macros;

/// Bias items toward what users reported for the same food name (exact,
/// case-insensitive match). Unmatched items pass through untouched.
pub fn apply(mut result: AnalysisResult, corrections: &[CorrectionRecord]) -> AnalysisResult {
    if corrections.is_empty() {
        return result;
    }

    for item in result.items.iter_mut() {
        let name = item.name.to_lowercase();
        let Some(correction) = corrections.iter().find(|c| c.food_name_lower == name) else {
            continue;
        };

        log::debug!("🧠 Applying learned correction for '{}'", item.name);
        scale_macros(
            item,
            correction.calorie_multiplier,
            correction.protein_multiplier,
            correction.carb_multiplier,
            correction.fat_multiplier,
        );
        item.confidence = Some((item.confidence.unwrap_or(0.5) + 0.1).min(1.0));
        item.ml_corrected = true;
        result.ml_corrected = true;
    }

    result
}

#[derive(Default)]
struct RatioSums {
    sum: f64,
    count: u32,
}

impl RatioSums {
    fn add(&mut self, original: f64, corrected: f64) {
        if original > 0.0 && corrected.is_finite() && corrected >= 0.0 {
            self.sum += corrected / original;
            self.count += 1;
        }
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            1.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Collapse raw correction events into one multiplier record per food name.
pub fn derive_records(events: &[CorrectionEvent]) -> Vec<CorrectionRecord> {
    let mut grouped: BTreeMap<String, [RatioSums; 4]> = BTreeMap::new();

    for event in events {
        let name = event.food_name.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }
        let sums = grouped.entry(name).or_default();
        sums[0].add(event.original.calories, event.corrected.calories);
        sums[1].add(event.original.protein, event.corrected.protein);
        sums[2].add(event.original.carbs, event.corrected.carbs);
        sums[3].add(event.original.fat, event.corrected.fat);
    }

    grouped
        .into_iter()
        .map(|(food_name_lower, sums)| CorrectionRecord {
            food_name_lower,
            calorie_multiplier: sums[0].mean(),
            protein_multiplier: sums[1].mean(),
            carb_multiplier: sums[2].mean(),
            fat_multiplier: sums[3].mean(),
        })
        .collect()
}
