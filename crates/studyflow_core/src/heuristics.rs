//! crates/studyflow_core/src/heuristics.rs
//!
//! A deterministic `AssistantService` used when no generative model is configured,
//! and as the fallback when a remote call fails.

use async_trait::async_trait;

use crate::domain::{AssistantReply, QaContext};
use crate::ports::{AssistantService, PortResult};

/// Error texts produced by extraction start with this marker.
pub const ERROR_MARKER: &str = "[Error";

/// Builds summaries and answers by slicing words out of the source text.
#[derive(Debug, Clone, Default)]
pub struct HeuristicAssistant;

impl HeuristicAssistant {
    pub fn new() -> Self {
        Self
    }

    /// Takes the first five words, words 21 to 25, and the last five words of `text`.
    pub fn summary_for(text: &str) -> String {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() > 50 {
            format!(
                "This page discusses {}... The content covers topics related to {} and includes information about {}.",
                join_words(&words, 0, 5, " "),
                join_words(&words, 20, 25, " "),
                join_words(&words, words.len() - 5, words.len(), " "),
            )
        } else {
            format!(
                "Brief content about {}. {} are also mentioned.",
                join_words(&words, 0, 3, " "),
                join_words(&words, words.len().saturating_sub(3), words.len(), " "),
            )
        }
    }

    /// Picks a templated sentence based on the question word and keywords from the context.
    pub fn answer_for(question: &str, context: &QaContext) -> String {
        let snippets: Vec<String> = if context.page_number.is_some() {
            context
                .pages
                .iter()
                .map(|p| p.text.chars().take(100).collect())
                .collect()
        } else {
            context
                .pages
                .iter()
                .filter(|p| !p.text.is_empty() && !p.text.starts_with(ERROR_MARKER))
                .map(|p| format!("{}...", p.text.chars().take(50).collect::<String>()))
                .collect()
        };

        let content = snippets.join(" ");
        let keywords: Vec<&str> = content
            .split_whitespace()
            .filter(|w| w.chars().count() > 3)
            .take(10)
            .collect();

        let question = question.to_lowercase();
        if question.contains("what") {
            format!(
                "The document discusses various concepts related to {}. This appears to be about {}.",
                join_words(&keywords, 0, 3, " and "),
                context.document_id.replace('-', " "),
            )
        } else if question.contains("how") {
            format!(
                "The process involving {} is explained in the document. It involves several steps related to {}.",
                join_words(&keywords, 0, 2, " and "),
                join_words(&keywords, 2, 4, " and "),
            )
        } else if question.contains("why") {
            format!(
                "The reasons related to {} are outlined in the document, primarily focusing on {} and {}.",
                join_words(&keywords, 0, 2, " and "),
                keywords.get(2).copied().unwrap_or("key concepts"),
                keywords.get(3).copied().unwrap_or("related aspects"),
            )
        } else {
            format!(
                "Based on the document content about {}, the answer relates to the information presented on page {} and other sections.",
                join_words(&keywords, 0, 3, " and "),
                context.first_page_number,
            )
        }
    }
}

/// Joins `words[start..end]`, clamping the range to the slice.
fn join_words(words: &[&str], start: usize, end: usize, sep: &str) -> String {
    let end = end.min(words.len());
    let start = start.min(end);
    words[start..end].join(sep)
}

#[async_trait]
impl AssistantService for HeuristicAssistant {
    async fn summarize(&self, text: &str, _model: Option<&str>) -> PortResult<AssistantReply> {
        Ok(AssistantReply::fallback(Self::summary_for(text)))
    }

    async fn answer_question(
        &self,
        question: &str,
        context: &QaContext,
        _model: Option<&str>,
    ) -> PortResult<AssistantReply> {
        Ok(AssistantReply::fallback(Self::answer_for(question, context)))
    }
}
