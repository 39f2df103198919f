mod config;
mod handlers;
mod models;
mod services;
mod webhook;

use anyhow::Result;
use dotenv::dotenv;
use std::sync::Arc;

use config::Config;
use handlers::BotHandler;
use services::nutritionix::NutritionixClient;
use services::openfoodfacts::OpenFoodFactsClient;
use services::usda::UsdaClient;
use services::vision::VisionClient;
use services::{Database, FoodAnalyzer, NutritionStore, TelegramClient};
use webhook::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    // Load environment variables
    dotenv().ok();

    log::info!("🚀 Starting CalAI nutrition service...");

    let config = Config::from_env()?;

    let db = Arc::new(Database::new(&config.database_url).await?);
    let store: Arc<dyn NutritionStore> = db;
    log::info!("✅ PostgreSQL database initialized");

    if config.simple_mode() {
        log::warn!("⚠️ OPENAI_API_KEY not set, running in simple mode");
    }
    let vision = Arc::new(VisionClient::new(config.vision.clone()));
    log::info!("✅ Vision client initialized with model: {}", config.vision.model);

    let usda = Arc::new(UsdaClient::new(config.usda.clone()));
    let off = Arc::new(OpenFoodFactsClient::default());

    let mut analyzer = FoodAnalyzer::new(vision.clone(), vision, config.analyzer.clone());
    analyzer = analyzer.with_barcode_source(off);

    if config.nutritionix.app_id.is_some() && config.nutritionix.app_key.is_some() {
        let nutritionix = Arc::new(NutritionixClient::new(config.nutritionix.clone()));
        analyzer = analyzer
            .with_fallback(nutritionix.clone())
            .with_barcode_source(nutritionix);
        log::info!("✅ Nutritionix fallback enabled");
    } else {
        log::warn!("⚠️ Nutritionix credentials not set, skipping that provider");
    }

    let analyzer = Arc::new(analyzer.with_fallback(usda.clone()).with_barcode_source(usda));
    log::info!("✅ Food analyzer ready (threshold {:.2})", analyzer.settings().confidence_threshold);

    let bot = match config.telegram_bot_token.clone() {
        Some(token) => {
            let telegram = Arc::new(TelegramClient::new(token));
            log::info!("✅ Telegram bot enabled at /webhook/telegram");
            Some(Arc::new(BotHandler::new(
                store.clone(),
                analyzer.clone(),
                telegram,
                config.simple_mode(),
            )))
        }
        None => {
            log::warn!("⚠️ TELEGRAM_BOT_TOKEN not set, bot webhook disabled");
            None
        }
    };

    let app = create_router(
        AppState {
            store,
            analyzer,
            bot,
            telegram_secret: config.telegram_webhook_secret.clone(),
        },
        config.max_upload_bytes,
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    log::info!("🌐 HTTP server listening on {}", config.bind_addr);
    log::info!("🎉 Service is ready!");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("❌ Failed to listen for shutdown signal: {}", e);
            }
            log::info!("🛑 Shutting down...");
        })
        .await?;

    Ok(())
}
