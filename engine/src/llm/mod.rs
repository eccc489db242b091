//! LLM Provider Abstraction Layer
//!
//! This module provides the interface the pipeline uses to talk to a
//! large-language-model backend. The `LLMProvider` trait defines the
//! contract; the one shipped implementation speaks the OpenAI-compatible
//! chat-completions wire format (see `openai`), and test doubles implement
//! the trait directly.
//!
//! It also hosts the JSON-extraction helpers shared by the intent
//! classifier and the LLM-backed agents: model output rarely arrives as
//! clean JSON, so the helpers handle fenced blocks and JSON embedded in
//! prose.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod openai;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Role of a chat message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRole::System => write!(f, "system"),
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in a provider conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// LLM Provider trait that all backends must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider
    fn name(&self) -> &str;

    /// Generate a completion for the given conversation
    ///
    /// Returns the raw text content of the model's reply. Structured
    /// output (intent labels, recording metadata) is carried inside the
    /// text and extracted by the caller.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Check if the provider is currently healthy and available.
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// Find the first JSON object embedded in model output.
///
/// Handles three formats, in order:
/// 1. The entire content is a valid JSON object
/// 2. A fenced code block (with or without trailing prose)
/// 3. A balanced `{...}` anywhere in the content
pub fn find_json_object(content: &str) -> Option<serde_json::Value> {
    let trimmed = content.trim();

    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str(trimmed) {
            return Some(value);
        }
    }

    if let Some(inner) = extract_fenced_block(trimmed) {
        let inner = inner.trim();
        if let Ok(value) = serde_json::from_str(inner) {
            return Some(value);
        }
    }

    if let Some(pos) = trimmed.find('{') {
        if let Some(candidate) = extract_balanced_json(&trimmed[pos..]) {
            if let Ok(value) = serde_json::from_str(candidate) {
                return Some(value);
            }
        }
    }

    None
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
/// Returns `None` if no fenced block is found.
fn extract_fenced_block(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals, to find the
/// matching close brace.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
