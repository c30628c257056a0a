use std::sync::Arc;

use rollcall_core::{Intent, LlmConfig, RollcallError};
use rollcall_providers::{CompletionRequest, ProviderFactory};
use tracing::{debug, warn};

use crate::prompt::{
    build_extraction_messages, build_repair_messages, parse_reply, GenerativeExtraction,
    ParsedReply,
};

/// Entity extraction through a completion provider.
///
/// Invalid replies get exactly one corrective re-prompt; a second invalid
/// reply is a [`RollcallError::Parse`].
pub struct GenerativeExtractor {
    factory: Arc<ProviderFactory>,
    temperature: f32,
    max_tokens: u32,
    current_year: i32,
}

impl std::fmt::Debug for GenerativeExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerativeExtractor")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("current_year", &self.current_year)
            .finish_non_exhaustive()
    }
}

impl GenerativeExtractor {
    pub fn new(factory: Arc<ProviderFactory>, llm: &LlmConfig, current_year: i32) -> Self {
        Self {
            factory,
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
            current_year,
        }
    }

    /// `true` if at least one completion provider is configured.
    pub fn is_available(&self) -> bool {
        self.factory.has_text_providers()
    }

    fn request(&self, messages: Vec<rollcall_providers::ChatMessage>) -> CompletionRequest {
        CompletionRequest {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..CompletionRequest::new(messages)
        }
    }

    /// Extract entities from `query`, steering the prompt by `intent`.
    ///
    /// # Errors
    ///
    /// Returns [`RollcallError::ProvidersExhausted`] if no provider answers,
    /// or [`RollcallError::Parse`] if the reply is still invalid after one
    /// corrective re-prompt.
    pub async fn extract(
        &self,
        query: &str,
        context: Option<&str>,
        intent: Intent,
    ) -> rollcall_core::Result<GenerativeExtraction> {
        let messages = build_extraction_messages(query, context, intent);
        let completion = self.factory.generate(&self.request(messages.clone())).await?;

        let (raw, reason) = match parse_reply(&completion.text, self.current_year) {
            ParsedReply::Parsed(extraction) => {
                debug!(confidence = extraction.confidence, "generative extraction parsed");
                return Ok(extraction);
            }
            ParsedReply::Invalid { raw, reason } => (raw, reason),
        };

        warn!(%reason, "invalid extraction reply, re-prompting once");
        let repair = build_repair_messages(&messages, &raw, &reason);
        let completion = self.factory.generate(&self.request(repair)).await?;
        match parse_reply(&completion.text, self.current_year) {
            ParsedReply::Parsed(extraction) => {
                debug!(confidence = extraction.confidence, "repaired extraction parsed");
                Ok(extraction)
            }
            ParsedReply::Invalid { reason, .. } => Err(RollcallError::Parse(format!(
                "extraction reply invalid after re-prompt: {reason}"
            ))),
        }
    }
}
