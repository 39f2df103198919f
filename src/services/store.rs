use anyhow::Result;
use chrono::NaiveDate;

use crate::models::{CachedProduct, CorrectionEvent, CorrectionRecord, DailySummary, MealEntry, NutritionGoals};
use crate::services::corrections::derive_records;

/// Persistence used by the HTTP and bot layers.
#[async_trait::async_trait]
pub trait NutritionStore: Send + Sync {
    /// Returns the ids of the inserted entries, in input order.
    async fn save_meal_entries(&self, entries: &[MealEntry]) -> Result<Vec<i64>>;

    /// Raw correction events for one user, or for everyone when `user_id` is `None`.
    async fn get_correction_events(&self, user_id: Option<i64>) -> Result<Vec<CorrectionEvent>>;

    async fn record_correction(&self, event: &CorrectionEvent) -> Result<()>;

    async fn get_cached_barcode(&self, barcode: &str) -> Result<Option<CachedProduct>>;

    async fn cache_barcode(&self, product: &CachedProduct) -> Result<()>;

    /// Creates the default goals on first read.
    async fn get_goals(&self, user_id: i64) -> Result<NutritionGoals>;

    async fn upsert_goals(&self, user_id: i64, goals: &NutritionGoals) -> Result<()>;

    /// Entries newest first, optionally restricted to one day.
    async fn get_history(&self, user_id: i64, date: Option<NaiveDate>, limit: i64, offset: i64) -> Result<Vec<MealEntry>>;

    /// One summary per day that has entries in `from..=to`, newest first.
    async fn get_daily_summaries(&self, user_id: i64, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailySummary>>;

    async fn get_correction_history(&self, user_id: Option<i64>) -> Result<Vec<CorrectionRecord>> {
        let events = self.get_correction_events(user_id).await?;
        Ok(derive_records(&events))
    }
}

#[cfg(test)]
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Tables {
        entries: Vec<MealEntry>,
        corrections: Vec<CorrectionEvent>,
        barcodes: HashMap<String, CachedProduct>,
        goals: HashMap<i64, NutritionGoals>,
    }

    /// In-process store for handler tests.
    #[derive(Default)]
    pub struct MemoryStore {
        tables: Mutex<Tables>,
        pub fail_writes: bool,
    }

    impl MemoryStore {
        pub fn failing_writes() -> Self {
            Self {
                fail_writes: true,
                ..Self::default()
            }
        }

        pub fn entries(&self) -> Vec<MealEntry> {
            self.tables.lock().unwrap().entries.clone()
        }

        pub fn cached(&self, barcode: &str) -> Option<CachedProduct> {
            self.tables.lock().unwrap().barcodes.get(barcode).cloned()
        }

        fn check_writes(&self) -> Result<()> {
            if self.fail_writes {
                anyhow::bail!("database is read-only");
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl NutritionStore for MemoryStore {
        async fn save_meal_entries(&self, entries: &[MealEntry]) -> Result<Vec<i64>> {
            self.check_writes()?;
            let mut tables = self.tables.lock().unwrap();
            let mut ids = Vec::with_capacity(entries.len());
            for entry in entries {
                let id = tables.entries.len() as i64 + 1;
                let mut entry = entry.clone();
                entry.id = Some(id);
                tables.entries.push(entry);
                ids.push(id);
            }
            Ok(ids)
        }

        async fn get_correction_events(&self, user_id: Option<i64>) -> Result<Vec<CorrectionEvent>> {
            let tables = self.tables.lock().unwrap();
            Ok(tables
                .corrections
                .iter()
                .filter(|e| user_id.map_or(true, |id| e.user_id == id))
                .cloned()
                .collect())
        }

        async fn record_correction(&self, event: &CorrectionEvent) -> Result<()> {
            self.check_writes()?;
            self.tables.lock().unwrap().corrections.push(event.clone());
            Ok(())
        }

        async fn get_cached_barcode(&self, barcode: &str) -> Result<Option<CachedProduct>> {
            Ok(self.cached(barcode))
        }

        async fn cache_barcode(&self, product: &CachedProduct) -> Result<()> {
            self.check_writes()?;
            self.tables
                .lock()
                .unwrap()
                .barcodes
                .insert(product.barcode.clone(), product.clone());
            Ok(())
        }

        async fn get_goals(&self, user_id: i64) -> Result<NutritionGoals> {
            let mut tables = self.tables.lock().unwrap();
            Ok(tables.goals.entry(user_id).or_default().clone())
        }

        async fn upsert_goals(&self, user_id: i64, goals: &NutritionGoals) -> Result<()> {
            self.check_writes()?;
            self.tables.lock().unwrap().goals.insert(user_id, goals.clone());
            Ok(())
        }

        async fn get_history(&self, user_id: i64, date: Option<NaiveDate>, limit: i64, offset: i64) -> Result<Vec<MealEntry>> {
            let tables = self.tables.lock().unwrap();
            let mut entries: Vec<MealEntry> = tables
                .entries
                .iter()
                .filter(|e| e.user_id == user_id)
                .filter(|e| date.map_or(true, |d| e.created_at.date_naive() == d))
                .cloned()
                .collect();
            entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(entries
                .into_iter()
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .collect())
        }

        async fn get_daily_summaries(&self, user_id: i64, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailySummary>> {
            let tables = self.tables.lock().unwrap();
            let mut days: std::collections::BTreeMap<NaiveDate, DailySummary> = Default::default();
            for entry in tables.entries.iter().filter(|e| e.user_id == user_id) {
                let day = entry.created_at.date_naive();
                if day < from || day > to {
                    continue;
                }
                let summary = days.entry(day).or_insert_with(|| DailySummary {
                    date: day.format("%Y-%m-%d").to_string(),
                    total_calories: 0.0,
                    total_protein: 0.0,
                    total_carbs: 0.0,
                    total_fat: 0.0,
                    items_count: 0,
                });
                summary.total_calories += entry.calories;
                summary.total_protein += entry.protein;
                summary.total_carbs += entry.carbs;
                summary.total_fat += entry.fat;
                summary.items_count += 1;
            }
            Ok(days.into_values().rev().collect())
        }
    }
}
