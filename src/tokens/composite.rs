//! Provider-dispatching token counter.

use async_trait::async_trait;

use super::{
    EncoderTokenCounter, HeuristicTokenCounter, Provider, RemoteTokenCounter, TokenCounter,
    TokenCounterContext,
};
use crate::error::Result;

/// Routes each count to the strategy for the context's provider.
///
/// Anthropic goes to the remote counter, OpenAI to the encoder tables, and
/// every other provider (or none) to the heuristic.
pub struct CompositeTokenCounter {
    encoder: EncoderTokenCounter,
    remote: RemoteTokenCounter,
    heuristic: HeuristicTokenCounter,
}

impl CompositeTokenCounter {
    pub fn new(encoder: EncoderTokenCounter, remote: RemoteTokenCounter) -> Self {
        Self {
            encoder,
            remote,
            heuristic: HeuristicTokenCounter,
        }
    }

    /// Composite with default encoder and remote counters.
    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(EncoderTokenCounter::new(), RemoteTokenCounter::new()?))
    }

    fn strategy(&self, provider: Option<Provider>) -> &dyn TokenCounter {
        match provider {
            Some(Provider::Anthropic) => &self.remote,
            Some(Provider::OpenAi) => &self.encoder,
            Some(Provider::Gemini) | Some(Provider::Mistral) | None => &self.heuristic,
        }
    }
}

#[async_trait]
impl TokenCounter for CompositeTokenCounter {
    async fn count_text_tokens(&self, text: &str, context: &TokenCounterContext) -> usize {
        self.strategy(context.provider())
            .count_text_tokens(text, context)
            .await
    }

    async fn count_message_tokens(
        &self,
        system: Option<&str>,
        user: &str,
        context: &TokenCounterContext,
    ) -> usize {
        self.strategy(context.provider())
            .count_message_tokens(system, user, context)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::TokenCountMode;

    const TEXT: &str = "Hello World, this is a composite test";

    async fn composite(server_url: &str) -> CompositeTokenCounter {
        CompositeTokenCounter::new(
            EncoderTokenCounter::new(),
            RemoteTokenCounter::with_base_url(server_url).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_no_provider_uses_heuristic() {
        let counter = composite("http://127.0.0.1:9").await;
        let count = counter
            .count_text_tokens(TEXT, &TokenCounterContext::default())
            .await;
        assert_eq!(count, HeuristicTokenCounter::count(TEXT));
    }

    #[tokio::test]
    async fn test_other_providers_use_heuristic() {
        let counter = composite("http://127.0.0.1:9").await;
        for provider in [Provider::Gemini, Provider::Mistral] {
            let ctx = TokenCounterContext::new(Some(provider), Some("model-x".to_string()));
            assert_eq!(
                counter.count_text_tokens(TEXT, &ctx).await,
                HeuristicTokenCounter::count(TEXT)
            );
        }
    }

    #[tokio::test]
    async fn test_openai_uses_encoder() {
        let counter = composite("http://127.0.0.1:9").await;
        let ctx = TokenCounterContext::new(Some(Provider::OpenAi), Some("gpt-4o".to_string()));
        assert_eq!(counter.count_text_tokens("Hello World", &ctx).await, 2);
    }

    #[tokio::test]
    async fn test_anthropic_uses_remote() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/messages/count_tokens")
            .with_status(200)
            .with_body(r#"{"input_tokens": 99}"#)
            .create_async()
            .await;

        let counter = composite(&server.url()).await;
        let ctx = TokenCounterContext::new(
            Some(Provider::Anthropic),
            Some("claude-sonnet-4-5".to_string()),
        )
        .with_mode(TokenCountMode::Precise, Some("sk-ant".to_string()));

        assert_eq!(counter.count_message_tokens(None, TEXT, &ctx).await, 99);
        mock.assert_async().await;
    }
}
