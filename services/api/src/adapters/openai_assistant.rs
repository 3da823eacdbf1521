//! services/api/src/adapters/openai_assistant.rs
//!
//! This module contains the adapter for the generative summarizer/answerer.
//! It implements the `AssistantService` port from the `core` crate using the
//! OpenAI chat completions API.

const SUMMARY_INSTRUCTIONS: &str = r#"You are a study assistant helping a student review a document one page at a time.

Summarize the page text you are given:
- Write two to four plain sentences.
- Keep the key terms, names, definitions, and numbers the page uses.
- Do not add facts that are not on the page.
- Do not start with "This page" more than once, and do not use bullet points."#;

const ANSWER_INSTRUCTIONS: &str = r#"You are a study assistant answering a student's questions about a document they uploaded.

Rules:
- Answer from the DOCUMENT CONTEXT. Page markers like "--- Page 3 ---" tell you where text came from; mention the page when it helps.
- If the context does not contain the answer, say so briefly, then give your best general explanation and make clear it is not from the document.
- Keep answers short and direct: usually a few sentences."#;

const ANSWER_INPUT_TEMPLATE: &str = r#"DOCUMENT CONTEXT ({scope}):
---
{context}
---

QUESTION:
{question}"#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use studyflow_core::{
    domain::{AssistantReply, QaContext},
    models::{resolve_model, truncate_chars, ModelInfo},
    ports::{AssistantService, PortError, PortResult},
};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `AssistantService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiAssistant {
    client: Client<OpenAIConfig>,
    default_model: String,
}

impl OpenAiAssistant {
    /// Creates a new `OpenAiAssistant`. `default_model` is used when a request
    /// names no model, or one outside the catalogue.
    pub fn new(client: Client<OpenAIConfig>, default_model: String) -> Self {
        Self {
            client,
            default_model,
        }
    }

    fn model_for(&self, requested: Option<&str>) -> &'static ModelInfo {
        resolve_model(requested, &self.default_model)
    }

    /// Sends one system + user exchange and returns the first choice's text.
    async fn complete(
        &self,
        model: &ModelInfo,
        instructions: &str,
        input: String,
    ) -> PortResult<AssistantReply> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(instructions)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(input)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(model.id)
            .messages(messages)
            .max_completion_tokens(model.max_output_tokens)
            .temperature(0.3)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unavailable(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                PortError::Unexpected(format!("Model {} returned no text content.", model.id))
            })?;

        debug!("Model {} returned {} characters", model.id, content.len());
        Ok(AssistantReply {
            text: content,
            model: Some(model.id.to_string()),
        })
    }
}

//=========================================================================================
// `AssistantService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AssistantService for OpenAiAssistant {
    async fn summarize(&self, text: &str, model: Option<&str>) -> PortResult<AssistantReply> {
        let model = self.model_for(model);
        let page_text = truncate_chars(text, model.max_input_chars());
        self.complete(model, SUMMARY_INSTRUCTIONS, format!("PAGE TEXT:\n{}", page_text))
            .await
    }

    async fn answer_question(
        &self,
        question: &str,
        context: &QaContext,
        model: Option<&str>,
    ) -> PortResult<AssistantReply> {
        let model = self.model_for(model);
        let combined = context.combined_text();
        // The question and template share the budget with the document text.
        let budget = model
            .max_input_chars()
            .saturating_sub(question.chars().count() + ANSWER_INPUT_TEMPLATE.len());
        let scope = match context.page_number {
            Some(n) => format!("page {}", n),
            None => format!("all {} pages", context.pages.len()),
        };

        let input = ANSWER_INPUT_TEMPLATE
            .replace("{scope}", &scope)
            .replace("{context}", truncate_chars(&combined, budget))
            .replace("{question}", question);
        self.complete(model, ANSWER_INSTRUCTIONS, input).await
    }
}
