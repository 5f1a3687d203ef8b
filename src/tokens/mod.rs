//! Token accounting.
//!
//! Interchangeable strategies that estimate how many model tokens a piece of
//! text consumes. Every strategy always produces a number: precise strategies
//! degrade to the [`HeuristicTokenCounter`] instead of failing.
//!
//! - [`HeuristicTokenCounter`] - `ceil(chars / 4)`, the universal fallback
//! - [`EncoderTokenCounter`] - tiktoken BPE tables for OpenAI models
//! - [`RemoteTokenCounter`] - Anthropic `count_tokens` endpoint in precise mode
//! - [`CompositeTokenCounter`] - dispatches on the context's provider

pub mod composite;
pub mod encoder;
pub mod heuristic;
pub mod remote;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub use composite::CompositeTokenCounter;
pub use encoder::EncoderTokenCounter;
pub use heuristic::HeuristicTokenCounter;
pub use remote::RemoteTokenCounter;

/// Bundle metadata key naming the provider to count for.
pub const PROVIDER_METADATA_KEY: &str = "token_counter_provider";

/// Bundle metadata key naming the model to count for.
pub const MODEL_METADATA_KEY: &str = "token_counter_model";

/// A token counting strategy.
#[async_trait]
pub trait TokenCounter: Send + Sync {
    /// Count tokens in a single text.
    async fn count_text_tokens(&self, text: &str, context: &TokenCounterContext) -> usize;

    /// Count tokens of a system + user message pair.
    async fn count_message_tokens(
        &self,
        system: Option<&str>,
        user: &str,
        context: &TokenCounterContext,
    ) -> usize;
}

/// AI provider families with distinct tokenizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    #[serde(rename = "openai")]
    #[value(name = "openai")]
    OpenAi,
    Gemini,
    Mistral,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Mistral => "mistral",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "mistral" => Ok(Self::Mistral),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// Accuracy mode for token counting.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum TokenCountMode {
    /// Local approximation only
    #[default]
    Estimate,
    /// Call a remote counting service when credentials allow
    Precise,
}

/// Immutable selection of provider, model, mode and credential for counting.
///
/// Derived copies come from [`with_mode`](Self::with_mode); nothing mutates
/// an existing context.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenCounterContext {
    provider: Option<Provider>,
    model: Option<String>,
    mode: TokenCountMode,
    api_key: Option<String>,
}

impl TokenCounterContext {
    /// Estimate-mode context for a provider and model.
    pub fn new(provider: Option<Provider>, model: Option<String>) -> Self {
        Self {
            provider,
            model,
            mode: TokenCountMode::Estimate,
            api_key: None,
        }
    }

    /// Context with no provider, counted heuristically.
    pub fn estimate() -> Self {
        Self::default()
    }

    /// Read provider and model from bundle metadata.
    ///
    /// Unknown providers and non-string values are treated as absent.
    pub fn from_metadata(metadata: &HashMap<String, serde_json::Value>) -> Self {
        let provider = metadata
            .get(PROVIDER_METADATA_KEY)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok());
        let model = metadata
            .get(MODEL_METADATA_KEY)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Self::new(provider, model)
    }

    /// Copy with a different mode and credential, keeping provider and model.
    pub fn with_mode(&self, mode: TokenCountMode, api_key: Option<String>) -> Self {
        Self {
            provider: self.provider,
            model: self.model.clone(),
            mode,
            api_key,
        }
    }

    pub fn provider(&self) -> Option<Provider> {
        self.provider
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn mode(&self) -> TokenCountMode {
        self.mode
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn is_precise(&self) -> bool {
        self.mode == TokenCountMode::Precise
    }
}

impl fmt::Debug for TokenCounterContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCounterContext")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("mode", &self.mode)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}
