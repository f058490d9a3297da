use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::core::cache::CacheConfig;
use crate::core::completion::ProviderConfig;
use crate::core::context::DEFAULT_SYSTEM_PROMPT;
use crate::core::rate_limiter::{RateLimitConfig, RatePolicy};

/// Output token ceiling sent with every completion request.
pub const MAX_OUTPUT_TOKENS: u32 = 1000;
/// Sampling temperature sent with every completion request.
pub const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub history: HistorySettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Hides internal failure detail from response bodies.
    pub production: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    pub secret_key: String,
    pub token_expiry_hours: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: String,
    pub text_model: String,
    pub vision_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
    pub referer: String,
    pub title: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RateLimitSettings {
    pub chat_window_seconds: u64,
    pub chat_max_requests: u32,
    pub auth_window_seconds: u64,
    pub auth_max_requests: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            chat_window_seconds: 60,
            chat_max_requests: 10,
            auth_window_seconds: 15 * 60,
            auth_max_requests: 5,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub default_ttl_seconds: u64,
    pub history_ttl_seconds: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_seconds: 300,
            history_ttl_seconds: 60,
        }
    }
}

/// The two history caps are deliberately independent.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct HistorySettings {
    /// Turns included in a prompt window (newest first, then reversed).
    pub context_turns: usize,
    /// Turns returned by a history read (ascending).
    pub fetch_limit: usize,
    pub default_system_prompt: String,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            context_turns: 20,
            fetch_limit: 100,
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(Environment::with_prefix("CHAT_GATEWAY").separator("__"))
    }

    fn load(environment: Environment) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("server.production", run_mode == "production")?
            .set_default("auth.secret_key", "change-me-in-production")?
            .set_default("auth.token_expiry_hours", 24)?
            .set_default("provider.base_url", "https://openrouter.ai/api/v1")?
            .set_default("provider.api_key", "")?
            .set_default("provider.text_model", "meta-llama/llama-3.1-8b-instruct")?
            .set_default("provider.vision_model", "google/gemini-pro-vision")?
            .set_default("provider.max_tokens", i64::from(MAX_OUTPUT_TOKENS))?
            .set_default("provider.temperature", f64::from(TEMPERATURE))?
            .set_default("provider.timeout_seconds", 30)?
            .set_default("provider.referer", "http://localhost:5000")?
            .set_default("provider.title", "Chatbot Platform")?
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(environment)
            .build()?;

        s.try_deserialize()
    }
}

impl From<&ProviderSettings> for ProviderConfig {
    fn from(settings: &ProviderSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            text_model: settings.text_model.clone(),
            vision_model: settings.vision_model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: Duration::from_secs(settings.timeout_seconds),
            referer: settings.referer.clone(),
            title: settings.title.clone(),
        }
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            turn_submission: RatePolicy {
                window: Duration::from_secs(settings.chat_window_seconds),
                ceiling: settings.chat_max_requests,
            },
            authentication: RatePolicy {
                window: Duration::from_secs(settings.auth_window_seconds),
                ceiling: settings.auth_max_requests,
            },
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            default_ttl: Duration::from_secs(settings.default_ttl_seconds),
            history_ttl: Duration::from_secs(settings.history_ttl_seconds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_defaults_match_gateway_policy() {
        let rate = RateLimitConfig::from(&RateLimitSettings::default());
        assert_eq!(rate.turn_submission.window, Duration::from_secs(60));
        assert_eq!(rate.turn_submission.ceiling, 10);
        assert_eq!(rate.authentication.window, Duration::from_secs(900));
        assert_eq!(rate.authentication.ceiling, 5);

        let cache = CacheConfig::from(&CacheSettings::default());
        assert_eq!(cache.default_ttl, Duration::from_secs(300));
        assert_eq!(cache.history_ttl, Duration::from_secs(60));

        let history = HistorySettings::default();
        assert_eq!(history.context_turns, 20);
        assert_eq!(history.fetch_limit, 100);
    }

    #[test]
    fn test_settings_load_with_builtin_defaults() {
        let settings = Settings::new().unwrap();
        assert_eq!(settings.provider.max_tokens, MAX_OUTPUT_TOKENS);
        assert_eq!(settings.provider.timeout_seconds, 30);
        assert!((settings.provider.temperature - TEMPERATURE).abs() < 1e-6);
        assert_ne!(settings.provider.text_model, settings.provider.vision_model);
    }

    fn with_env(vars: &[(&str, &str)]) -> Settings {
        let source: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::load(
            Environment::with_prefix("CHAT_GATEWAY")
                .separator("__")
                .source(Some(source)),
        )
        .unwrap()
    }

    #[test]
    fn test_single_key_override_keeps_section_defaults() {
        let settings = with_env(&[
            ("CHAT_GATEWAY__CACHE__ENABLED", "false"),
            ("CHAT_GATEWAY__RATE_LIMIT__CHAT_MAX_REQUESTS", "20"),
            ("CHAT_GATEWAY__LOGGING__JSON", "true"),
        ]);

        assert!(!settings.cache.enabled);
        assert_eq!(settings.cache.default_ttl_seconds, 300);
        assert_eq!(settings.cache.history_ttl_seconds, 60);

        assert_eq!(settings.rate_limit.chat_max_requests, 20);
        assert_eq!(settings.rate_limit.chat_window_seconds, 60);
        assert_eq!(settings.rate_limit.auth_max_requests, 5);

        assert!(settings.logging.json);
        assert_eq!(settings.history.context_turns, 20);
    }

    #[test]
    fn test_history_override_keeps_prompt_default() {
        let settings = with_env(&[("CHAT_GATEWAY__HISTORY__FETCH_LIMIT", "50")]);
        assert_eq!(settings.history.fetch_limit, 50);
        assert_eq!(settings.history.context_turns, 20);
        assert_eq!(settings.history.default_system_prompt, DEFAULT_SYSTEM_PROMPT);
    }
}
