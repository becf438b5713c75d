//! Shared fixtures: a scripted provider and orchestrator builders.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use siteforge::core::{
    Completion, MemoryStore, Orchestrator, Provider, ProviderRegistry, Store, TokenUsage,
};
use siteforge::error::ProviderError;
use siteforge::models::{Config, CreateRequest, ModelTier, OutputKind, TeamBalance, TokenRate};

/// Provider that pops scripted responses front to back and counts calls.
/// An exhausted script fails the call, which catches tests (and code) that
/// make more provider calls than they should.
#[derive(Debug)]
pub struct MockProvider {
    responses: Mutex<Vec<Result<String, ProviderError>>>,
    calls: Mutex<u32>,
    usage_per_call: TokenUsage,
}

impl MockProvider {
    pub fn scripted(responses: Vec<Result<String, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(0),
            usage_per_call: TokenUsage {
                prompt_tokens: 1000,
                completion_tokens: 2000,
            },
        })
    }

    pub fn once(response: &str) -> Arc<Self> {
        Self::scripted(vec![Ok(response.to_string())])
    }

    pub fn repeated(response: &str, times: usize) -> Arc<Self> {
        Self::scripted((0..times).map(|_| Ok(response.to_string())).collect())
    }

    pub fn failing(error: ProviderError) -> Arc<Self> {
        Self::scripted(vec![Err(error)])
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, _system: &str, _user: &str) -> Result<Completion, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(ProviderError::RequestFailed(
                "mock script exhausted".to_string(),
            ));
        }
        responses.remove(0).map(|text| Completion {
            text,
            usage: self.usage_per_call,
        })
    }
}

/// A parseable response with a large enough entry page plus one referenced
/// stylesheet.
pub fn website_response() -> String {
    let body = "<html><head><link rel=\"stylesheet\" href=\"style.css\"></head>\
                <body><h1>Welcome</h1><p>Freshly generated landing page with \
                enough content to clear the size floor.</p></body></html>";
    format!(
        "--- FILE: index.html ---\n{}\n--- END FILE ---\n\
         --- FILE: style.css ---\nbody {{ margin: 0; font-family: sans-serif; }}\n--- END FILE ---\n",
        body
    )
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    // A registry built from bare providers names models after their tier.
    config.pricing.token_rates = HashMap::from([
        (
            "standard".to_string(),
            TokenRate {
                prompt_cents_per_million: 1_000,
                completion_cents_per_million: 2_000,
            },
        ),
        (
            "premium".to_string(),
            TokenRate {
                prompt_cents_per_million: 10_000,
                completion_cents_per_million: 20_000,
            },
        ),
    ]);
    config
}

/// Orchestrator over a fresh in-memory store with one funded team and the
/// given provider behind the standard tier.
pub fn orchestrator_with(provider: Arc<dyn Provider>, balance_cents: i64) -> Orchestrator {
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_team(&TeamBalance::new("team-1", balance_cents, 0))
        .unwrap();
    let registry =
        ProviderRegistry::from_providers(HashMap::from([(ModelTier::Standard, provider)]));
    Orchestrator::new(store, registry, test_config())
}

pub fn request() -> CreateRequest {
    CreateRequest {
        prompt: "a landing page for a small bakery".to_string(),
        language: "en".to_string(),
        tier: ModelTier::Standard,
        output_kind: OutputKind::Website,
        layout_hint: None,
        site_name: Some("Crumb & Crust".to_string()),
        owner_id: "user-1".to_string(),
        team_id: "team-1".to_string(),
    }
}
