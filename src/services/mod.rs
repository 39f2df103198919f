pub mod ai_service;
pub mod analyzer;
pub mod corrections;
pub mod database;
pub mod errors;
pub mod insights;
pub mod nutrition;
pub mod nutritionix;
pub mod openfoodfacts;
pub mod store;
pub mod telegram;
pub mod usda;
pub mod vision;
pub mod volume;

pub use analyzer::FoodAnalyzer;
pub use database::Database;
pub use store::NutritionStore;
pub use telegram::TelegramClient;
