//! Precise token counts from the Anthropic `count_tokens` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{HeuristicTokenCounter, TokenCounter, TokenCounterContext};
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::VERSION;

/// Default Anthropic API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// API version header value.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Request timeout for a count call.
pub const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Serialize)]
struct CountRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

/// Asks the provider for an exact count in precise mode.
///
/// Requires precise mode, a credential and a model; anything else, and any
/// failure of the single request, answers with the heuristic estimate.
#[derive(Debug, Clone)]
pub struct RemoteTokenCounter {
    client: Client,
    base_url: String,
    metrics: Option<Arc<Metrics>>,
}

impl RemoteTokenCounter {
    /// Create a counter against the default API URL.
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a counter against a custom API URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("review-context/{}", VERSION))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            metrics: None,
        })
    }

    /// Record fallbacks in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request_count(
        &self,
        system: Option<&str>,
        user: &str,
        model: &str,
        api_key: &str,
    ) -> Result<usize> {
        let url = format!("{}/messages/count_tokens", self.base_url.trim_end_matches('/'));
        let body = CountRequest {
            model,
            messages: [Message {
                role: "user",
                content: user,
            }],
            system: system.filter(|s| !s.is_empty()),
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let status_text = status.canonical_reason().unwrap_or("Unknown");
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_u16(), status_text, body));
        }

        let json: serde_json::Value = response.json().await?;
        json.get("input_tokens")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .ok_or_else(|| Error::MissingTokenCount(json.to_string()))
    }

    fn fallback(&self, system: Option<&str>, user: &str) -> usize {
        if let Some(metrics) = &self.metrics {
            metrics.inc_token_count_fallbacks();
        }
        HeuristicTokenCounter::count_messages(system, user)
    }
}

#[async_trait]
impl TokenCounter for RemoteTokenCounter {
    async fn count_text_tokens(&self, text: &str, context: &TokenCounterContext) -> usize {
        self.count_message_tokens(None, text, context).await
    }

    async fn count_message_tokens(
        &self,
        system: Option<&str>,
        user: &str,
        context: &TokenCounterContext,
    ) -> usize {
        let (Some(api_key), Some(model)) = (context.api_key(), context.model()) else {
            return HeuristicTokenCounter::count_messages(system, user);
        };
        if !context.is_precise() || api_key.is_empty() || model.is_empty() {
            return HeuristicTokenCounter::count_messages(system, user);
        }

        match self.request_count(system, user, model, api_key).await {
            Ok(count) => {
                debug!(model, input_tokens = count, "Counted tokens remotely");
                count
            }
            Err(e) => {
                warn!(model, error = %e, "Remote token count failed, using heuristic");
                self.fallback(system, user)
            }
        }
    }
}
