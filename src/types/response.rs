//! Invocation response types

use serde::{Deserialize, Serialize};

/// Response produced by an invocation target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationResponse {
    pub text: String,
    /// Id of the target that actually served the request (primary or fallback).
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub finish_reason: FinishReason,
}

impl InvocationResponse {
    pub fn new(text: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target: target.into(),
            ..Self::default()
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Reason the model stopped generating
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    /// Map a provider stop-reason string onto the common set.
    pub fn from_provider(reason: &str) -> Self {
        match reason {
            "end_turn" | "stop" | "stop_sequence" | "FINISH" | "COMPLETE" => FinishReason::Stop,
            "max_tokens" | "length" | "LENGTH" => FinishReason::Length,
            "content_filtered" | "CONTENT_FILTERED" | "guardrail_intervened" => {
                FinishReason::ContentFilter
            }
            other => FinishReason::Other(other.to_string()),
        }
    }
}
