//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.
//!
//! Accounts are stored durably in Postgres, while the login rate-limit window is
//! kept in process memory per client address. Restarting the service therefore
//! clears throttling but never accounts.

use std::net::SocketAddr;
use std::time::Duration;
use thinkpath_core::{
    access::{DEFAULT_RATE_LIMIT_KEY, DEFAULT_VAULT_KEY, LOCKOUT_DURATION, MAX_ATTEMPTS, TOKEN_TTL},
    chat::DEFAULT_CONVERSATION_CAPACITY,
    session_store::DEFAULT_SESSIONS_KEY,
};
use tracing::Level;

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
    pub cors_origin: String,
    pub openai_api_key: Option<String>,
    pub fast_model: String,
    pub deep_model: String,
    pub chat_model: String,
    /// How many assistant conversations are kept in memory at once.
    pub chat_capacity: usize,
    pub sst_model: String,
    pub tts_voice: String,
    pub tts_enabled: bool,
    pub model_timeout: Duration,
    pub auth: AuthSettings,
    pub storage_keys: StorageKeys,
}

/// Login throttling and token settings.
#[derive(Clone, Debug)]
pub struct AuthSettings {
    pub token_secret: String,
    pub max_attempts: u32,
    pub lockout: Duration,
    pub token_ttl: Duration,
}

/// Keys under which each record set is stored.
#[derive(Clone, Debug)]
pub struct StorageKeys {
    pub sessions: String,
    pub vault: String,
    pub rate_limit: String,
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
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        // --- Load Server and Database Settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:5173");

        // --- Load Model Settings ---
        let openai_api_key = lookup("OPENAI_API_KEY");
        let fast_model = var_or("FAST_MODEL", "gpt-4o-mini");
        let deep_model = var_or("DEEP_MODEL", "gpt-4o");
        let chat_model = var_or("CHAT_MODEL", "gpt-4o-mini");
        let chat_capacity =
            parse_var(&lookup, "CHAT_MAX_CONVERSATIONS", DEFAULT_CONVERSATION_CAPACITY)?;
        if chat_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "CHAT_MAX_CONVERSATIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let sst_model = var_or("SST_MODEL", "whisper-1");
        let tts_voice = var_or("TTS_VOICE", "alloy");
        let tts_enabled = parse_var(&lookup, "TTS_ENABLED", true)?;
        let model_timeout = Duration::from_secs(parse_var(&lookup, "MODEL_TIMEOUT_SECS", 60u64)?);

        // --- Load Auth Settings ---
        let token_secret = lookup("AUTH_TOKEN_SECRET")
            .ok_or_else(|| ConfigError::MissingVar("AUTH_TOKEN_SECRET".to_string()))?;
        if token_secret.len() < 32 {
            return Err(ConfigError::InvalidValue(
                "AUTH_TOKEN_SECRET".to_string(),
                "must be at least 32 characters".to_string(),
            ));
        }
        let max_attempts = parse_var(&lookup, "AUTH_MAX_ATTEMPTS", MAX_ATTEMPTS)?;
        let lockout = Duration::from_secs(parse_var(
            &lookup,
            "AUTH_LOCKOUT_SECS",
            LOCKOUT_DURATION.as_secs(),
        )?);
        let token_ttl = Duration::from_secs(
            parse_var(&lookup, "AUTH_TOKEN_TTL_HOURS", TOKEN_TTL.as_secs() / 3600)? * 3600,
        );

        // --- Load Storage Keys ---
        let storage_keys = StorageKeys {
            sessions: var_or("SESSIONS_STORAGE_KEY", DEFAULT_SESSIONS_KEY),
            vault: var_or("VAULT_STORAGE_KEY", DEFAULT_VAULT_KEY),
            rate_limit: var_or("RATE_LIMIT_STORAGE_KEY", DEFAULT_RATE_LIMIT_KEY),
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            openai_api_key,
            fast_model,
            deep_model,
            chat_model,
            chat_capacity,
            sst_model,
            tts_voice,
            tts_enabled,
            model_timeout,
            auth: AuthSettings {
                token_secret,
                max_attempts,
                lockout,
                token_ttl,
            },
            storage_keys,
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
    }
}
