//! Period insights over daily summaries: averages, goal adherence, trend.

use serde::Serialize;

use crate::models::{DailySummary, NutritionGoals};
use crate::services::nutrition::round_to;

/// Below this share of a goal the user gets a recommendation.
const ADHERENCE_FLOOR: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalAdherence {
    pub calories: f64,
    pub protein: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trends {
    pub direction: TrendDirection,
    /// Share of days in the period with at least one logged item.
    pub consistency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutritionInsights {
    pub average_daily_calories: f64,
    pub goal_adherence: GoalAdherence,
    pub trends: Trends,
    pub recommendations: Vec<String>,
}

/// `days` must be ordered newest first, as the store returns them.
pub fn compute(days: &[DailySummary], goals: &NutritionGoals, period_days: i64) -> NutritionInsights {
    let logged = days.len() as f64;
    let average_calories = average(days, |d| d.total_calories);
    let average_protein = average(days, |d| d.total_protein);

    let ratio = |value: f64, goal: f64| if goal > 0.0 { value / goal } else { 0.0 };
    let adherence = GoalAdherence {
        calories: round_to(ratio(average_calories, goals.calories_goal), 2),
        protein: round_to(ratio(average_protein, goals.protein_goal), 2),
    };

    let direction = match (days.first(), days.last()) {
        (Some(newest), Some(oldest)) if days.len() >= 2 => {
            if newest.total_calories > oldest.total_calories {
                TrendDirection::Increasing
            } else {
                TrendDirection::Decreasing
            }
        }
        _ => TrendDirection::Stable,
    };

    let mut recommendations = Vec::new();
    if average_calories < goals.calories_goal * ADHERENCE_FLOOR {
        recommendations.push("Consider increasing calorie intake to meet your goals".to_string());
    }
    if adherence.protein < ADHERENCE_FLOOR {
        recommendations.push("Try to include more protein sources in your meals".to_string());
    }

    NutritionInsights {
        average_daily_calories: round_to(average_calories, 1),
        goal_adherence: adherence,
        trends: Trends {
            direction,
            consistency: round_to(ratio(logged, period_days as f64), 2),
        },
        recommendations,
    }
}

fn average(days: &[DailySummary], value: impl Fn(&DailySummary) -> f64) -> f64 {
    if days.is_empty() {
        return 0.0;
    }
    days.iter().map(value).sum::<f64>() / days.len() as f64
}
