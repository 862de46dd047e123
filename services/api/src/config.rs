//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use study_assistant_core::prompt::ModelTiers;
use study_assistant_core::registry::{DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD};
use study_assistant_core::uploads::DEFAULT_MAX_FILE_BYTES;
use tracing::Level;

pub const DEFAULT_WORKSPACE_IDLE: Duration = Duration::from_secs(2 * 60 * 60);

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    /// Any OpenAI-compatible endpoint, e.g. Gemini's compatibility layer.
    pub openai_base_url: Option<String>,
    pub pro_model: String,
    pub flash_model: String,
    pub admin_email: String,
    /// `None` seeds the administrator with `DEFAULT_ADMIN_PASSWORD`.
    pub admin_password: Option<String>,
    pub export_font_path: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub cors_origin: String,
    /// A workspace untouched for this long is dropped from memory.
    pub workspace_idle: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://study_assistant.db?mode=rwc".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Model Settings ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let openai_base_url = std::env::var("OPENAI_BASE_URL").ok();
        let tiers = ModelTiers::default();
        let pro_model = std::env::var("PRO_MODEL").unwrap_or(tiers.pro);
        let flash_model = std::env::var("FLASH_MODEL").unwrap_or(tiers.flash);

        // --- Accounts, Uploads and Export ---
        let admin_email =
            std::env::var("ADMIN_EMAIL").unwrap_or_else(|_| DEFAULT_ADMIN_EMAIL.to_string());
        let admin_password = std::env::var("ADMIN_PASSWORD").ok().filter(|p| !p.is_empty());
        let export_font_path = std::env::var("EXPORT_FONT_PATH").ok().map(PathBuf::from);

        let max_upload_bytes = match std::env::var("MAX_UPLOAD_BYTES") {
            Ok(raw) => raw.parse::<usize>().map_err(|e| {
                ConfigError::InvalidValue("MAX_UPLOAD_BYTES".to_string(), e.to_string())
            })?,
            Err(_) => DEFAULT_MAX_FILE_BYTES,
        };

        let cors_origin =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let workspace_idle = match std::env::var("WORKSPACE_IDLE_SECS") {
            Ok(raw) => Duration::from_secs(raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue("WORKSPACE_IDLE_SECS".to_string(), e.to_string())
            })?),
            Err(_) => DEFAULT_WORKSPACE_IDLE,
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            openai_base_url,
            pro_model,
            flash_model,
            admin_email,
            admin_password,
            export_font_path,
            max_upload_bytes,
            cors_origin,
            workspace_idle,
        })
    }

    /// The password the administrator account is seeded with.
    pub fn admin_password(&self) -> &str {
        self.admin_password
            .as_deref()
            .unwrap_or(DEFAULT_ADMIN_PASSWORD)
    }

    pub fn model_tiers(&self) -> ModelTiers {
        ModelTiers {
            pro: self.pro_model.clone(),
            flash: self.flash_model.clone(),
        }
    }
}
