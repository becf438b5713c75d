use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ModelTier;

/// Configuration loaded from siteforge.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Text-generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible chat completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key; the SITEFORGE_API_KEY environment variable wins if set
    #[serde(default)]
    pub api_key: Option<String>,
    /// Hard wall-clock timeout per provider call
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Model identifier per tier
    #[serde(default = "default_models")]
    pub models: HashMap<ModelTier, String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_seconds: default_timeout(),
            models: default_models(),
        }
    }
}

impl ProviderConfig {
    pub fn model_for(&self, tier: ModelTier) -> Option<&str> {
        self.models.get(&tier).map(String::as_str)
    }

    /// Resolve the API key, preferring the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var("SITEFORGE_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone())
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/v1".to_string()
}

fn default_timeout() -> u64 {
    180
}

fn default_models() -> HashMap<ModelTier, String> {
    let mut models = HashMap::new();
    models.insert(ModelTier::Standard, "gen-standard".to_string());
    models.insert(ModelTier::Premium, "gen-premium".to_string());
    models
}

/// Customer-facing prices and internal token rates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Price reserved per job, by tier, in cents
    #[serde(default = "default_standard_price")]
    pub standard_cents: i64,
    #[serde(default = "default_premium_price")]
    pub premium_cents: i64,
    /// Internal cost rates keyed by model identifier
    #[serde(default = "default_token_rates")]
    pub token_rates: HashMap<String, TokenRate>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            standard_cents: default_standard_price(),
            premium_cents: default_premium_price(),
            token_rates: default_token_rates(),
        }
    }
}

impl PricingConfig {
    /// The customer-facing price reserved against the team balance.
    pub fn price_cents(&self, tier: ModelTier) -> i64 {
        match tier {
            ModelTier::Standard => self.standard_cents,
            ModelTier::Premium => self.premium_cents,
        }
    }
}

/// Cents per million tokens, prompt and completion priced separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRate {
    pub prompt_cents_per_million: i64,
    pub completion_cents_per_million: i64,
}

fn default_standard_price() -> i64 {
    500
}

fn default_premium_price() -> i64 {
    1500
}

fn default_token_rates() -> HashMap<String, TokenRate> {
    let mut rates = HashMap::new();
    rates.insert(
        "gen-standard".to_string(),
        TokenRate {
            prompt_cents_per_million: 25,
            completion_cents_per_million: 125,
        },
    );
    rates.insert(
        "gen-premium".to_string(),
        TokenRate {
            prompt_cents_per_million: 300,
            completion_cents_per_million: 1500,
        },
    );
    rates
}

/// Validation and repair loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Ceiling on provider calls per job (first attempt included)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Required files smaller than this are a blocking error
    #[serde(default = "default_min_file_bytes")]
    pub min_file_bytes: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_file_bytes: default_min_file_bytes(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_min_file_bytes() -> usize {
    64
}

/// Where job state and archives live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".siteforge")
}

impl Config {
    /// Load config from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e))?;
        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e))
    }

    /// Try to load config from siteforge.toml in the given directory
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let config_path = dir.join("siteforge.toml");
        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Merge CLI overrides into the config
    pub fn with_overrides(mut self, base_url: Option<String>, timeout: Option<u64>) -> Self {
        if let Some(u) = base_url {
            self.provider.base_url = u;
        }
        if let Some(t) = timeout {
            self.provider.timeout_seconds = t;
        }
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, std::io::Error),
    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, toml::de::Error),
}
