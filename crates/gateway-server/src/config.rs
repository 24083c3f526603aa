use std::path::Path;
use std::time::Duration;

use gateway_core::BudgetLimits;
use gateway_llm::providers::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use gateway_llm::{CircuitBreakerConfig, FramingMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {key}")]
    InvalidEnv { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
        }
    }
}

/// Gateway limits, resilience parameters and upstream location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    pub global_token_limit: u64,
    pub session_token_limit: u64,
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub success_threshold: u32,
    pub probe_timeout_ms: u64,
    pub context_window_size: usize,
    pub health_history_size: usize,
    /// Background probe interval; 0 disables periodic probing.
    pub health_check_interval_ms: u64,
    pub cost_per_1k_tokens: f64,
    pub string_aware_framing: bool,
    pub upstream: UpstreamConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let limits = BudgetLimits::default();
        let breaker = CircuitBreakerConfig::default();
        Self {
            global_token_limit: limits.global_token_limit,
            session_token_limit: limits.session_token_limit,
            failure_threshold: breaker.failure_threshold,
            recovery_timeout_ms: breaker.recovery_timeout.as_millis() as u64,
            success_threshold: breaker.success_threshold,
            probe_timeout_ms: 5_000,
            context_window_size: gateway_core::DEFAULT_CONTEXT_WINDOW,
            health_history_size: 100,
            health_check_interval_ms: 30_000,
            cost_per_1k_tokens: 0.000_5,
            string_aware_framing: false,
            upstream: UpstreamConfig::default(),
        }
    }
}

fn parse_bool_env(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl GatewayConfig {
    /// Defaults, then the optional file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// `.toml` files are parsed as TOML, anything else as JSON.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let config = if is_toml {
            toml::from_str::<GatewayConfig>(&content)?
        } else {
            serde_json::from_str::<GatewayConfig>(&content)?
        };
        log::info!("Loaded gateway config from {:?}", path);
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("GATEWAY_GLOBAL_TOKEN_LIMIT") {
            self.global_token_limit = parse_env("GATEWAY_GLOBAL_TOKEN_LIMIT", &value)?;
        }
        if let Some(value) = lookup("GATEWAY_SESSION_TOKEN_LIMIT") {
            self.session_token_limit = parse_env("GATEWAY_SESSION_TOKEN_LIMIT", &value)?;
        }
        if let Some(value) = lookup("GATEWAY_FAILURE_THRESHOLD") {
            self.failure_threshold = parse_env("GATEWAY_FAILURE_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("GATEWAY_RECOVERY_TIMEOUT_MS") {
            self.recovery_timeout_ms = parse_env("GATEWAY_RECOVERY_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("GATEWAY_SUCCESS_THRESHOLD") {
            self.success_threshold = parse_env("GATEWAY_SUCCESS_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("GATEWAY_PROBE_TIMEOUT_MS") {
            self.probe_timeout_ms = parse_env("GATEWAY_PROBE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("GATEWAY_CONTEXT_WINDOW_SIZE") {
            self.context_window_size = parse_env("GATEWAY_CONTEXT_WINDOW_SIZE", &value)?;
        }
        if let Some(value) = lookup("GATEWAY_COST_PER_1K_TOKENS") {
            self.cost_per_1k_tokens = parse_env("GATEWAY_COST_PER_1K_TOKENS", &value)?;
        }
        if let Some(value) = lookup("GATEWAY_STRING_AWARE_FRAMING") {
            self.string_aware_framing = parse_bool_env(&value);
        }
        if let Some(api_key) = lookup("GEMINI_API_KEY") {
            self.upstream.api_key = Some(api_key);
        }
        if let Some(base_url) = lookup("GEMINI_BASE_URL") {
            self.upstream.base_url = base_url;
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.upstream.model = model;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.global_token_limit == 0, "globalTokenLimit must be positive"),
            (self.session_token_limit == 0, "sessionTokenLimit must be positive"),
            (self.failure_threshold == 0, "failureThreshold must be positive"),
            (self.success_threshold == 0, "successThreshold must be positive"),
            (self.probe_timeout_ms == 0, "probeTimeoutMs must be positive"),
            (self.context_window_size == 0, "contextWindowSize must be positive"),
            (self.health_history_size == 0, "healthHistorySize must be positive"),
            (
                !self.cost_per_1k_tokens.is_finite() || self.cost_per_1k_tokens < 0.0,
                "costPer1kTokens must be a non-negative number",
            ),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(ConfigError::Invalid(message.to_string())),
            None => Ok(()),
        }
    }

    pub fn budget_limits(&self) -> BudgetLimits {
        BudgetLimits {
            global_token_limit: self.global_token_limit,
            session_token_limit: self.session_token_limit,
        }
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_millis(self.recovery_timeout_ms),
            success_threshold: self.success_threshold,
        }
    }

    pub fn framing_mode(&self) -> FramingMode {
        if self.string_aware_framing {
            FramingMode::StringAware
        } else {
            FramingMode::BraceDepth
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}
