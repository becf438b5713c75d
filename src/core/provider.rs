//! Text-generation backend.
//!
//! Orchestration talks to a [`Provider`] trait object and a [`ModelTier`];
//! everything vendor-shaped (endpoint, model names, auth, token pricing)
//! stays behind the [`ProviderRegistry`] built from configuration.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;
use crate::models::{ModelTier, PricingConfig, ProviderConfig, TokenRate};

/// Token counts reported by the backend for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// One completed provider call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// A text-generation backend for one concrete model.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, ProviderError>;
}

/// One provider call under a hard wall-clock deadline. The HTTP client has
/// its own socket timeout; this bound also covers backends that stall
/// without ever touching the network.
pub async fn complete_with_deadline(
    provider: &dyn Provider,
    deadline: std::time::Duration,
    system: &str,
    user: &str,
) -> Result<Completion, ProviderError> {
    match tokio::time::timeout(deadline, provider.complete(system, user)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(deadline.as_secs())),
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible HTTP backend
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<UsageBody>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct UsageBody {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug)]
pub struct HttpProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_seconds: u64,
}

impl HttpProvider {
    pub fn new(config: &ProviderConfig, model: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.resolve_api_key(),
            model: model.into(),
            timeout_seconds: config.timeout_seconds,
        })
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!("Calling {} with model {}", url, self.model);

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout_seconds)
            } else {
                ProviderError::from(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => ProviderError::RateLimited,
                402 => ProviderError::PaymentRequired,
                code => ProviderError::Http {
                    status: code,
                    message,
                },
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::Malformed("response has no choices".to_string()))?;

        let usage = body.usage.unwrap_or_default();
        Ok(Completion {
            text,
            usage: TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Tier registry and token pricing
// ---------------------------------------------------------------------------

/// Maps the closed tier set to concrete backends.
pub struct ProviderRegistry {
    providers: HashMap<ModelTier, Arc<dyn Provider>>,
    models: HashMap<ModelTier, String>,
}

impl ProviderRegistry {
    /// Build one HTTP backend per configured tier.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let mut providers: HashMap<ModelTier, Arc<dyn Provider>> = HashMap::new();
        let mut models = HashMap::new();
        for (tier, model) in &config.models {
            providers.insert(*tier, Arc::new(HttpProvider::new(config, model.clone())?));
            models.insert(*tier, model.clone());
        }
        Ok(Self { providers, models })
    }

    /// Registry over caller-supplied backends. Test seam.
    pub fn from_providers(providers: HashMap<ModelTier, Arc<dyn Provider>>) -> Self {
        let models = providers
            .keys()
            .map(|tier| (*tier, tier.as_str().to_string()))
            .collect();
        Self { providers, models }
    }

    pub fn provider_for(&self, tier: ModelTier) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .get(&tier)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownTier(tier.as_str().to_string()))
    }

    pub fn model_for(&self, tier: ModelTier) -> Result<&str, ProviderError> {
        self.models
            .get(&tier)
            .map(String::as_str)
            .ok_or_else(|| ProviderError::UnknownTier(tier.as_str().to_string()))
    }
}

/// Internal token pricing, cents per million tokens per model.
pub struct CostTable {
    rates: HashMap<String, TokenRate>,
}

impl CostTable {
    pub fn from_pricing(pricing: &PricingConfig) -> Self {
        Self {
            rates: pricing.token_rates.clone(),
        }
    }

    /// Realized cost in cents, rounded up per component. A model without a
    /// configured rate costs zero; reporting only, never billed.
    pub fn cost_cents(&self, model: &str, usage: &TokenUsage) -> i64 {
        let Some(rate) = self.rates.get(model) else {
            return 0;
        };
        ceil_per_million(usage.prompt_tokens, rate.prompt_cents_per_million)
            + ceil_per_million(usage.completion_tokens, rate.completion_cents_per_million)
    }
}

fn ceil_per_million(tokens: u64, cents_per_million: i64) -> i64 {
    if tokens == 0 || cents_per_million <= 0 {
        return 0;
    }
    let product = tokens as i128 * cents_per_million as i128;
    ((product + 999_999) / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest {
            model: "gen-standard",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "be brief",
                },
                ChatMessage {
                    role: "user",
                    content: "hello",
                },
            ],
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gen-standard");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_chat_response_parsing_without_usage() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hi");
        assert!(parsed.usage.is_none());
    }

    #[test]
    fn test_registry_unknown_tier() {
        let registry = ProviderRegistry::from_providers(HashMap::new());
        assert!(matches!(
            registry.provider_for(ModelTier::Premium).unwrap_err(),
            ProviderError::UnknownTier(_)
        ));
    }

    #[test]
    fn test_cost_rounds_up() {
        let mut rates = HashMap::new();
        rates.insert(
            "gen-standard".to_string(),
            TokenRate {
                prompt_cents_per_million: 100,
                completion_cents_per_million: 300,
            },
        );
        let table = CostTable {
            rates,
        };
        // 1 token at 100c/M rounds up to a whole cent.
        let usage = TokenUsage {
            prompt_tokens: 1,
            completion_tokens: 0,
        };
        assert_eq!(table.cost_cents("gen-standard", &usage), 1);

        let usage = TokenUsage {
            prompt_tokens: 2_000_000,
            completion_tokens: 1_000_000,
        };
        assert_eq!(table.cost_cents("gen-standard", &usage), 500);
    }

    #[test]
    fn test_cost_unknown_model_is_zero() {
        let table = CostTable {
            rates: HashMap::new(),
        };
        let usage = TokenUsage {
            prompt_tokens: 50,
            completion_tokens: 50,
        };
        assert_eq!(table.cost_cents("mystery", &usage), 0);
    }

    #[test]
    fn test_usage_accumulates() {
        let mut total = TokenUsage::default();
        total.add(TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 20,
        });
        total.add(TokenUsage {
            prompt_tokens: 5,
            completion_tokens: 5,
        });
        assert_eq!(total.prompt_tokens, 15);
        assert_eq!(total.completion_tokens, 25);
    }
}
