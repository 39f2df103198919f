use crate::models::{AnalysisResult, DailySummary, NutritionGoals};
use crate::services::nutrition::confidence_hint;

pub fn format_analysis(result: &AnalysisResult) -> String {
    let mut lines = vec!["🍽️ Food analysis".to_string(), String::new()];

    for item in &result.items {
        let label = match &item.brand {
            Some(brand) => format!("{} ({})", item.name, brand),
            None => item.name.clone(),
        };
        lines.push(format!(
            "• {} — {}: {:.0} kcal, P {:.1}g / C {:.1}g / F {:.1}g",
            label, item.portion, item.calories, item.protein, item.carbs, item.fat
        ));
    }

    lines.push(String::new());
    lines.push(format!(
        "🔥 Total: {:.0} kcal (P {:.1}g / C {:.1}g / F {:.1}g)",
        result.total.calories, result.total.protein, result.total.carbs, result.total.fat
    ));
    lines.push(format!("🎯 Confidence: {:.0}%", result.confidence * 100.0));
    lines.push(format!("💡 {}", confidence_hint(result.confidence)));

    if result.volume_enhanced {
        lines.push("📐 Portions adjusted with depth data".to_string());
    }
    if result.ml_corrected {
        lines.push("🧠 Adjusted with your previous corrections".to_string());
    }

    lines.join("\n")
}

pub fn format_daily_stats(summary: Option<&DailySummary>, goals: &NutritionGoals) -> String {
    let (calories, protein, carbs, fat, count) = summary.map_or((0.0, 0.0, 0.0, 0.0, 0), |s| {
        (s.total_calories, s.total_protein, s.total_carbs, s.total_fat, s.items_count)
    });

    let rows = [
        ("🔥 Calories", calories, goals.calories_goal, "kcal"),
        ("💪 Protein", protein, goals.protein_goal, "g"),
        ("🍞 Carbs", carbs, goals.carbs_goal, "g"),
        ("🥑 Fat", fat, goals.fat_goal, "g"),
    ];

    let mut text = String::from("📊 Today's nutrition\n");
    for (label, current, goal, unit) in rows {
        let bar = create_progress_bar(current, goal);
        text.push_str(&format!(
            "\n{}\n{}\n{:.0}/{:.0} {} ({}%)\n",
            label, bar.bar, current, goal, unit, bar.percentage
        ));
    }
    text.push_str(&format!("\n🍽️ Items logged: {}\n\n{}", count, motivational_message(calories, goals.calories_goal)));
    text
}

pub struct ProgressBar {
    pub bar: String,
    pub percentage: i32,
}

/// 10-cell bar, capped at 100%.
pub fn create_progress_bar(current: f64, goal: f64) -> ProgressBar {
    let percentage = if goal > 0.0 {
        ((current / goal) * 100.0).clamp(0.0, 100.0) as i32
    } else {
        0
    };
    let filled = (percentage / 10) as usize;
    let empty = 10 - filled;

    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(empty));

    ProgressBar { bar, percentage }
}

fn motivational_message(calories: f64, goal: f64) -> &'static str {
    if calories <= 0.0 {
        "📸 Send a food photo or describe your meal to start tracking."
    } else if calories > goal * 1.1 {
        "⚠️ You are above your calorie goal today."
    } else if calories >= goal * 0.9 {
        "🎉 Right on target!"
    } else {
        "👍 Keep going!"
    }
}
