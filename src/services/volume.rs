use crate::models::{AnalysisResult, VolumeMetadata};
use crate::services::nutrition::{calculate_totals, scale_macros};

/// Reference volume and clamp bounds for depth-based portion scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeConfig {
    pub reference_volume: f64,
    pub min_multiplier: f64,
    pub max_multiplier: f64,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            reference_volume: 100.0,
            min_multiplier: 0.5,
            max_multiplier: 2.0,
        }
    }
}

impl VolumeConfig {
    pub fn multiplier(&self, depth: f64, width: f64, height: f64) -> f64 {
        let estimated = depth * width * height / self.reference_volume;
        if estimated.is_nan() {
            return 1.0;
        }
        estimated.clamp(self.min_multiplier, self.max_multiplier)
    }
}

/// Rescale every item by the captured volume. Unchanged when depth or dimensions are missing.
pub fn adjust(mut result: AnalysisResult, metadata: &VolumeMetadata, config: &VolumeConfig) -> AnalysisResult {
    let (Some(depth), Some(dimensions)) = (metadata.depth, metadata.dimensions) else {
        return result;
    };

    let multiplier = config.multiplier(depth, dimensions.width, dimensions.height);
    log::debug!("📐 Volume multiplier {:.2} (depth={}, {}x{})", multiplier, depth, dimensions.width, dimensions.height);

    for item in result.items.iter_mut() {
        item.portion = scale_portion(&item.portion, multiplier);
        scale_macros(item, multiplier, multiplier, multiplier, multiplier);
    }

    result.total = calculate_totals(&result.items);
    result.volume_enhanced = true;
    result
}

/// Rewrite the first run of digits in a portion string; returns the input unchanged
/// when it has no digits. No unit handling.
pub fn scale_portion(portion: &str, multiplier: f64) -> String {
    let Some(start) = portion.find(|c: char| c.is_ascii_digit()) else {
        return portion.to_string();
    };
    let end = portion[start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(portion.len(), |offset| start + offset);

    match portion[start..end].parse::<f64>() {
        Ok(number) => {
            let scaled = (number * multiplier).round() as i64;
            format!("{}{}{}", &portion[..start], scaled, &portion[end..])
        }
        Err(_) => portion.to_string(),
    }
}
