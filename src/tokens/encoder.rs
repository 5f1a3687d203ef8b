//! Subword encoder token counts for OpenAI-family models.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tracing::debug;

use super::{HeuristicTokenCounter, TokenCounter, TokenCounterContext};
use crate::error::{Error, Result};

/// Model assumed when the context names none.
pub const DEFAULT_ENCODER_MODEL: &str = "gpt-4o";

/// Counts tokens with the tiktoken table for the context's model.
///
/// Encoders are built lazily and cached per model, including failed lookups,
/// so an unknown model costs one lookup and then counts heuristically.
#[derive(Default)]
pub struct EncoderTokenCounter {
    encoders: DashMap<String, Option<Arc<CoreBPE>>>,
}

impl EncoderTokenCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn model_for<'a>(context: &'a TokenCounterContext) -> &'a str {
        context
            .model()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_ENCODER_MODEL)
    }

    /// Cached encoder for `model`, `None` when the model has no known table.
    fn encoder(&self, model: &str) -> Option<Arc<CoreBPE>> {
        if let Some(cached) = self.encoders.get(model) {
            return cached.clone();
        }

        let built = match Self::build_encoder(model) {
            Ok(bpe) => Some(Arc::new(bpe)),
            Err(e) => {
                debug!("Falling back to heuristic token count: {}", e);
                None
            }
        };
        self.encoders.insert(model.to_string(), built.clone());
        built
    }

    fn build_encoder(model: &str) -> Result<CoreBPE> {
        tiktoken_rs::get_bpe_from_model(model).map_err(|e| Error::EncoderUnavailable {
            model: model.to_string(),
            reason: e.to_string(),
        })
    }

    fn count_with(&self, text: &str, context: &TokenCounterContext) -> usize {
        if text.is_empty() {
            return 0;
        }
        match self.encoder(Self::model_for(context)) {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => HeuristicTokenCounter::count(text),
        }
    }
}

#[async_trait]
impl TokenCounter for EncoderTokenCounter {
    async fn count_text_tokens(&self, text: &str, context: &TokenCounterContext) -> usize {
        self.count_with(text, context)
    }

    async fn count_message_tokens(
        &self,
        system: Option<&str>,
        user: &str,
        context: &TokenCounterContext,
    ) -> usize {
        match self.encoder(Self::model_for(context)) {
            Some(bpe) => {
                system.map_or(0, |s| bpe.encode_with_special_tokens(s).len())
                    + bpe.encode_with_special_tokens(user).len()
            }
            None => HeuristicTokenCounter::count_messages(system, user),
        }
    }
}
