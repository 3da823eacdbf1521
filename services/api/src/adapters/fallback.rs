//! services/api/src/adapters/fallback.rs
//!
//! Wraps a remote `AssistantService` so that any failure degrades to the
//! deterministic heuristic output instead of an error.

use async_trait::async_trait;
use std::sync::Arc;
use studyflow_core::{
    domain::{AssistantReply, QaContext},
    heuristics::HeuristicAssistant,
    ports::{AssistantService, PortResult},
};
use tracing::warn;

pub struct FallbackAssistant {
    primary: Arc<dyn AssistantService>,
    fallback: HeuristicAssistant,
}

impl FallbackAssistant {
    pub fn new(primary: Arc<dyn AssistantService>) -> Self {
        Self {
            primary,
            fallback: HeuristicAssistant::new(),
        }
    }
}

#[async_trait]
impl AssistantService for FallbackAssistant {
    async fn summarize(&self, text: &str, model: Option<&str>) -> PortResult<AssistantReply> {
        match self.primary.summarize(text, model).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!("Summarizer failed, falling back to heuristic summary: {}", e);
                self.fallback.summarize(text, model).await
            }
        }
    }

    async fn answer_question(
        &self,
        question: &str,
        context: &QaContext,
        model: Option<&str>,
    ) -> PortResult<AssistantReply> {
        match self.primary.answer_question(question, context, model).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!("Answerer failed, falling back to heuristic answer: {}", e);
                self.fallback.answer_question(question, context, model).await
            }
        }
    }
}
