use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

use crate::services::analyzer::AnalyzerSettings;
use crate::services::nutritionix::NutritionixConfig;
use crate::services::usda::UsdaConfig;
use crate::services::vision::VisionConfig;
use crate::services::volume::VolumeConfig;

/// Process configuration, read from the environment (and `.env` via dotenv).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub vision: VisionConfig,
    pub nutritionix: NutritionixConfig,
    pub usda: UsdaConfig,
    pub telegram_bot_token: Option<String>,
    pub telegram_webhook_secret: Option<String>,
    pub analyzer: AnalyzerSettings,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        fn parse<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            match value {
                Some(raw) => raw
                    .parse()
                    .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e)),
                None => Ok(default),
            }
        }

        let database_url = get("DATABASE_URL").context("DATABASE_URL must be set")?;

        let vision_defaults = VisionConfig::default();
        let vision = VisionConfig {
            api_key: get("OPENAI_API_KEY"),
            base_url: get("OPENAI_BASE_URL").unwrap_or(vision_defaults.base_url),
            model: get("OPENAI_MODEL").unwrap_or(vision_defaults.model),
            max_tokens: parse("OPENAI_MAX_TOKENS", get("OPENAI_MAX_TOKENS"), vision_defaults.max_tokens)?,
        };

        let nutritionix = NutritionixConfig {
            app_id: get("NUTRITIONIX_APP_ID"),
            app_key: get("NUTRITIONIX_APP_KEY"),
            ..NutritionixConfig::default()
        };

        let usda_defaults = UsdaConfig::default();
        let usda = UsdaConfig {
            api_key: get("USDA_API_KEY").unwrap_or(usda_defaults.api_key),
            base_url: usda_defaults.base_url,
        };

        let defaults = AnalyzerSettings::default();
        let volume = VolumeConfig {
            reference_volume: parse("VOLUME_REFERENCE", get("VOLUME_REFERENCE"), defaults.volume.reference_volume)?,
            min_multiplier: parse(
                "VOLUME_MIN_MULTIPLIER",
                get("VOLUME_MIN_MULTIPLIER"),
                defaults.volume.min_multiplier,
            )?,
            max_multiplier: parse(
                "VOLUME_MAX_MULTIPLIER",
                get("VOLUME_MAX_MULTIPLIER"),
                defaults.volume.max_multiplier,
            )?,
        };
        if volume.reference_volume <= 0.0 || volume.min_multiplier > volume.max_multiplier {
            anyhow::bail!("volume settings are inconsistent: {:?}", volume);
        }

        let analyzer = AnalyzerSettings {
            confidence_threshold: parse(
                "CONFIDENCE_THRESHOLD",
                get("CONFIDENCE_THRESHOLD"),
                defaults.confidence_threshold,
            )?,
            text_confidence_cap: defaults.text_confidence_cap,
            volume_estimation: parse("VOLUME_ESTIMATION", get("VOLUME_ESTIMATION"), defaults.volume_estimation)?,
            volume,
        };

        Ok(Self {
            database_url,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            vision,
            nutritionix,
            usda,
            telegram_bot_token: get("TELEGRAM_BOT_TOKEN"),
            telegram_webhook_secret: get("TELEGRAM_WEBHOOK_SECRET"),
            analyzer,
            max_upload_bytes: parse("MAX_UPLOAD_BYTES", get("MAX_UPLOAD_BYTES"), 10 * 1024 * 1024)?,
        })
    }

    /// Without an AI key the bot answers photos with the caption heuristic.
    pub fn simple_mode(&self) -> bool {
        self.vision.api_key.is_none()
    }
}
