use anyhow::Result;
use chrono::NaiveDate;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, types::Json, PgPool, Row};

use crate::models::{
    CachedProduct, CorrectionEvent, DailySummary, MacroValues, MealEntry, MealType, NutritionGoals,
};
use crate::services::store::NutritionStore;

pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let db = Database { pool };
        db.init_tables().await?;
        Ok(db)
    }

    async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS food_entries (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL,
                meal_type TEXT NOT NULL,
                food_name TEXT NOT NULL,
                portion TEXT NOT NULL DEFAULT '',
                calories DOUBLE PRECISION NOT NULL DEFAULT 0,
                protein DOUBLE PRECISION NOT NULL DEFAULT 0,
                carbs DOUBLE PRECISION NOT NULL DEFAULT 0,
                fat DOUBLE PRECISION NOT NULL DEFAULT 0,
                fiber DOUBLE PRECISION NOT NULL DEFAULT 0,
                analysis_method TEXT NOT NULL,
                confidence DOUBLE PRECISION NOT NULL DEFAULT 1,
                image_ref TEXT,
                barcode TEXT,
                meal_time TEXT,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_food_entries_user_date ON food_entries (user_id, created_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nutrition_goals (
                user_id BIGINT PRIMARY KEY,
                calories_goal DOUBLE PRECISION NOT NULL,
                protein_goal DOUBLE PRECISION NOT NULL,
                carbs_goal DOUBLE PRECISION NOT NULL,
                fat_goal DOUBLE PRECISION NOT NULL,
                fiber_goal DOUBLE PRECISION NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ai_corrections (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL,
                food_name TEXT NOT NULL,
                original JSONB NOT NULL,
                corrected JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS barcode_cache (
                id BIGSERIAL PRIMARY KEY,
                barcode TEXT NOT NULL UNIQUE,
                product_name TEXT NOT NULL,
                brand TEXT,
                serving_size TEXT NOT NULL,
                calories DOUBLE PRECISION NOT NULL,
                protein DOUBLE PRECISION NOT NULL,
                carbs DOUBLE PRECISION NOT NULL,
                fat DOUBLE PRECISION NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn meal_entry_from_row(row: &PgRow) -> MealEntry {
    let meal_type_str: String = row.get(2);
    let meal_type = MealType::from_string(&meal_type_str).unwrap_or_else(|| {
        log::warn!("Unknown meal type '{}', defaulting to unspecified", meal_type_str);
        MealType::Unspecified
    });

    MealEntry {
        id: Some(row.get(0)),
        user_id: row.get(1),
        meal_type,
        food_name: row.get(3),
        portion: row.get(4),
        calories: row.get(5),
        protein: row.get(6),
        carbs: row.get(7),
        fat: row.get(8),
        fiber: row.get(9),
        analysis_method: row.get(10),
        confidence: row.get(11),
        image_ref: row.get(12),
        barcode: row.get(13),
        meal_time: row.get(14),
        created_at: row.get(15),
    }
}

#[async_trait::async_trait]
impl NutritionStore for Database {
    async fn save_meal_entries(&self, entries: &[MealEntry]) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(entries.len());

        for entry in entries {
            let row = sqlx::query(
                r#"
                INSERT INTO food_entries (
                    user_id, meal_type, food_name, portion, calories, protein, carbs, fat, fiber,
                    analysis_method, confidence, image_ref, barcode, meal_time, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                RETURNING id
                "#,
            )
            .bind(entry.user_id)
            .bind(entry.meal_type.to_string())
            .bind(&entry.food_name)
            .bind(&entry.portion)
            .bind(entry.calories)
            .bind(entry.protein)
            .bind(entry.carbs)
            .bind(entry.fat)
            .bind(entry.fiber)
            .bind(&entry.analysis_method)
            .bind(entry.confidence)
            .bind(&entry.image_ref)
            .bind(&entry.barcode)
            .bind(&entry.meal_time)
            .bind(entry.created_at)
            .fetch_one(&mut *tx)
            .await?;

            ids.push(row.get(0));
        }

        tx.commit().await?;
        log::debug!("💾 Saved {} food entries", ids.len());
        Ok(ids)
    }

    async fn get_correction_events(&self, user_id: Option<i64>) -> Result<Vec<CorrectionEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, food_name, original, corrected, created_at
            FROM ai_corrections
            WHERE $1::BIGINT IS NULL OR user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let events = rows
            .into_iter()
            .map(|row| {
                let original: Json<MacroValues> = row.get(2);
                let corrected: Json<MacroValues> = row.get(3);
                CorrectionEvent {
                    user_id: row.get(0),
                    food_name: row.get(1),
                    original: original.0,
                    corrected: corrected.0,
                    created_at: row.get(4),
                }
            })
            .collect();

        Ok(events)
    }

    async fn record_correction(&self, event: &CorrectionEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ai_corrections (user_id, food_name, original, corrected, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.user_id)
        .bind(&event.food_name)
        .bind(Json(event.original))
        .bind(Json(event.corrected))
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_cached_barcode(&self, barcode: &str) -> Result<Option<CachedProduct>> {
        let product = sqlx::query(
            r#"
            SELECT barcode, product_name, brand, serving_size, calories, protein, carbs, fat
            FROM barcode_cache WHERE barcode = $1
            "#,
        )
        .bind(barcode)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| CachedProduct {
            barcode: row.get(0),
            product_name: row.get(1),
            brand: row.get(2),
            serving_size: row.get(3),
            calories: row.get(4),
            protein: row.get(5),
            carbs: row.get(6),
            fat: row.get(7),
        });

        Ok(product)
    }

    async fn cache_barcode(&self, product: &CachedProduct) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO barcode_cache (barcode, product_name, brand, serving_size, calories, protein, carbs, fat, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (barcode) DO UPDATE SET
                product_name = EXCLUDED.product_name,
                brand = EXCLUDED.brand,
                serving_size = EXCLUDED.serving_size,
                calories = EXCLUDED.calories,
                protein = EXCLUDED.protein,
                carbs = EXCLUDED.carbs,
                fat = EXCLUDED.fat,
                updated_at = NOW()
            "#,
        )
        .bind(&product.barcode)
        .bind(&product.product_name)
        .bind(&product.brand)
        .bind(&product.serving_size)
        .bind(product.calories)
        .bind(product.protein)
        .bind(product.carbs)
        .bind(product.fat)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_goals(&self, user_id: i64) -> Result<NutritionGoals> {
        let existing = sqlx::query(
            r#"
            SELECT calories_goal, protein_goal, carbs_goal, fat_goal, fiber_goal
            FROM nutrition_goals WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| NutritionGoals {
            calories_goal: row.get(0),
            protein_goal: row.get(1),
            carbs_goal: row.get(2),
            fat_goal: row.get(3),
            fiber_goal: row.get(4),
        });

        match existing {
            Some(goals) => Ok(goals),
            None => {
                let goals = NutritionGoals::default();
                self.upsert_goals(user_id, &goals).await?;
                log::info!("🎯 Created default goals for user {}", user_id);
                Ok(goals)
            }
        }
    }

    async fn upsert_goals(&self, user_id: i64, goals: &NutritionGoals) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO nutrition_goals (user_id, calories_goal, protein_goal, carbs_goal, fat_goal, fiber_goal, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                calories_goal = EXCLUDED.calories_goal,
                protein_goal = EXCLUDED.protein_goal,
                carbs_goal = EXCLUDED.carbs_goal,
                fat_goal = EXCLUDED.fat_goal,
                fiber_goal = EXCLUDED.fiber_goal,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(goals.calories_goal)
        .bind(goals.protein_goal)
        .bind(goals.carbs_goal)
        .bind(goals.fat_goal)
        .bind(goals.fiber_goal)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_history(&self, user_id: i64, date: Option<NaiveDate>, limit: i64, offset: i64) -> Result<Vec<MealEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, meal_type, food_name, portion, calories, protein, carbs, fat, fiber,
                   analysis_method, confidence, image_ref, barcode, meal_time, created_at
            FROM food_entries
            WHERE user_id = $1
                AND ($2::DATE IS NULL OR (created_at >= $2::DATE AND created_at < ($2::DATE + INTERVAL '1 day')))
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(date)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(meal_entry_from_row).collect())
    }

    async fn get_daily_summaries(&self, user_id: i64, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailySummary>> {
        // Per-day sums in one pass; days without entries are omitted
        let rows = sqlx::query(
            r#"
            SELECT
                created_at::DATE AS day,
                COALESCE(SUM(calories), 0.0) AS total_calories,
                COALESCE(SUM(protein), 0.0) AS total_protein,
                COALESCE(SUM(carbs), 0.0) AS total_carbs,
                COALESCE(SUM(fat), 0.0) AS total_fat,
                COUNT(*) AS items_count
            FROM food_entries
            WHERE user_id = $1
                AND created_at >= $2::DATE
                AND created_at < ($3::DATE + INTERVAL '1 day')
            GROUP BY day
            ORDER BY day DESC
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let summaries = rows
            .into_iter()
            .map(|row| {
                let day: NaiveDate = row.get(0);
                DailySummary {
                    date: day.format("%Y-%m-%d").to_string(),
                    total_calories: row.get(1),
                    total_protein: row.get(2),
                    total_carbs: row.get(3),
                    total_fat: row.get(4),
                    items_count: row.get(5),
                }
            })
            .collect();

        Ok(summaries)
    }
}
