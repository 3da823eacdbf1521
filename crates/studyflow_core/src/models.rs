//! crates/studyflow_core/src/models.rs
//!
//! The static catalogue of generative models the assistant can use, with the
//! input/output caps applied before a request is sent.

/// Rough number of characters per token used to turn token caps into text budgets.
pub const CHARS_PER_TOKEN: usize = 4;

/// Capability and cost metadata for one supported model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Input tokens we are willing to send per request.
    pub max_input_tokens: usize,
    /// Output tokens requested per completion.
    pub max_output_tokens: u32,
    /// USD per 1K input tokens.
    pub input_cost_per_1k: f64,
    /// USD per 1K output tokens.
    pub output_cost_per_1k: f64,
}

impl ModelInfo {
    pub fn max_input_chars(&self) -> usize {
        self.max_input_tokens * CHARS_PER_TOKEN
    }
}

pub const SUPPORTED_MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "gpt-4o-mini",
        name: "GPT-4o mini",
        description: "Fast and inexpensive. Good default for page summaries.",
        max_input_tokens: 12_000,
        max_output_tokens: 500,
        input_cost_per_1k: 0.00015,
        output_cost_per_1k: 0.0006,
    },
    ModelInfo {
        id: "gpt-4o",
        name: "GPT-4o",
        description: "Highest quality answers for detailed questions.",
        max_input_tokens: 24_000,
        max_output_tokens: 1_000,
        input_cost_per_1k: 0.0025,
        output_cost_per_1k: 0.01,
    },
    ModelInfo {
        id: "gpt-3.5-turbo",
        name: "GPT-3.5 Turbo",
        description: "Legacy model with a small context window.",
        max_input_tokens: 3_000,
        max_output_tokens: 300,
        input_cost_per_1k: 0.0005,
        output_cost_per_1k: 0.0015,
    },
];

/// Looks up a model by id.
pub fn find_model(id: &str) -> Option<&'static ModelInfo> {
    SUPPORTED_MODELS.iter().find(|m| m.id == id)
}

/// Picks the requested model, falling back to `default_id` and then to the first entry.
pub fn resolve_model(requested: Option<&str>, default_id: &str) -> &'static ModelInfo {
    requested
        .and_then(find_model)
        .or_else(|| find_model(default_id))
        .unwrap_or(&SUPPORTED_MODELS[0])
}

/// Cuts `text` down to at most `max_chars` characters, never splitting a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
