//! Request/response payload shapes per model family.
//!
//! Foundation-model families hosted behind the same invocation API each
//! expect their own JSON body. [`ProviderKind`] names the family explicitly
//! (from configuration, never guessed from a model id) and maps to a
//! [`PayloadAdapter`] that encodes an [`InvocationRequest`] and decodes the
//! reply.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::types::{FinishReason, InvocationRequest, InvocationResponse, Usage};
use crate::{MimirError, Result};

/// Output cap used when a request does not set `max_tokens`.
pub const DEFAULT_MAX_TOKENS: u32 = 512;

/// Anthropic messages API version accepted by the hosted endpoint.
const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Model family of an invocation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    Titan,
    Llama,
    Mistral,
}

impl ProviderKind {
    /// The payload adapter for this family.
    pub fn adapter(self) -> &'static dyn PayloadAdapter {
        match self {
            ProviderKind::Anthropic => &AnthropicAdapter,
            ProviderKind::Titan => &TitanAdapter,
            ProviderKind::Llama => &LlamaAdapter,
            ProviderKind::Mistral => &MistralAdapter,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Titan => "titan",
            ProviderKind::Llama => "llama",
            ProviderKind::Mistral => "mistral",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = MimirError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "anthropic" => Ok(ProviderKind::Anthropic),
            "titan" => Ok(ProviderKind::Titan),
            "llama" => Ok(ProviderKind::Llama),
            "mistral" => Ok(ProviderKind::Mistral),
            other => Err(MimirError::Configuration(format!(
                "unknown provider kind: {other}"
            ))),
        }
    }
}

/// Encodes requests into, and decodes responses from, one family's JSON
/// shape.
pub trait PayloadAdapter: Send + Sync {
    fn encode(&self, request: &InvocationRequest) -> Value;

    /// Decode a successful response body. The caller fills in `target`.
    fn decode(&self, body: &[u8]) -> Result<InvocationResponse>;
}

/// Families without a separate system field get it prepended to the prompt.
fn inline_system(request: &InvocationRequest) -> String {
    match &request.system {
        Some(system) => format!("{system}\n\n{}", request.prompt),
        None => request.prompt.clone(),
    }
}

/// Insert `value` under `key` when present.
fn put_opt<T: Serialize>(body: &mut Value, key: &str, value: Option<T>) {
    if let (Some(value), Some(map)) = (value, body.as_object_mut()) {
        map.insert(key.to_string(), json!(value));
    }
}

// ============================================================================
// Anthropic
// ============================================================================

struct AnthropicAdapter;

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<AnthropicBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl PayloadAdapter for AnthropicAdapter {
    fn encode(&self, request: &InvocationRequest) -> Value {
        let mut body = json!({
            "anthropic_version": ANTHROPIC_VERSION,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": [{
                "role": "user",
                "content": [{ "type": "text", "text": request.prompt }],
            }],
        });
        put_opt(&mut body, "system", request.system.as_deref());
        put_opt(&mut body, "temperature", request.temperature);
        put_opt(&mut body, "top_p", request.top_p);
        put_opt(&mut body, "stop_sequences", request.stop.as_ref());
        body
    }

    fn decode(&self, body: &[u8]) -> Result<InvocationResponse> {
        let parsed: AnthropicResponse = serde_json::from_slice(body)?;
        let texts: Vec<String> = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if texts.is_empty() {
            return Err(MimirError::EmptyResponse);
        }
        Ok(InvocationResponse {
            text: texts.concat(),
            model: parsed.model,
            usage: parsed.usage.map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
            finish_reason: parsed
                .stop_reason
                .as_deref()
                .map(FinishReason::from_provider)
                .unwrap_or_default(),
            ..InvocationResponse::default()
        })
    }
}

// ============================================================================
// Titan
// ============================================================================

struct TitanAdapter;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TitanResponse {
    #[serde(default)]
    input_text_token_count: Option<u32>,
    #[serde(default)]
    results: Vec<TitanResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TitanResult {
    output_text: String,
    #[serde(default)]
    token_count: Option<u32>,
    #[serde(default)]
    completion_reason: Option<String>,
}

impl PayloadAdapter for TitanAdapter {
    fn encode(&self, request: &InvocationRequest) -> Value {
        let mut config = json!({
            "maxTokenCount": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        put_opt(&mut config, "temperature", request.temperature);
        put_opt(&mut config, "topP", request.top_p);
        put_opt(&mut config, "stopSequences", request.stop.as_ref());
        json!({
            "inputText": inline_system(request),
            "textGenerationConfig": config,
        })
    }

    fn decode(&self, body: &[u8]) -> Result<InvocationResponse> {
        let parsed: TitanResponse = serde_json::from_slice(body)?;
        let first = parsed
            .results
            .into_iter()
            .next()
            .ok_or(MimirError::EmptyResponse)?;
        let usage = match (parsed.input_text_token_count, first.token_count) {
            (Some(input), Some(output)) => Some(Usage {
                input_tokens: input,
                output_tokens: output,
            }),
            _ => None,
        };
        Ok(InvocationResponse {
            text: first.output_text,
            usage,
            finish_reason: first
                .completion_reason
                .as_deref()
                .map(FinishReason::from_provider)
                .unwrap_or_default(),
            ..InvocationResponse::default()
        })
    }
}

// ============================================================================
// Llama
// ============================================================================

struct LlamaAdapter;

#[derive(Deserialize)]
struct LlamaResponse {
    generation: String,
    #[serde(default)]
    prompt_token_count: Option<u32>,
    #[serde(default)]
    generation_token_count: Option<u32>,
    #[serde(default)]
    stop_reason: Option<String>,
}

impl PayloadAdapter for LlamaAdapter {
    fn encode(&self, request: &InvocationRequest) -> Value {
        let mut body = json!({
            "prompt": inline_system(request),
            "max_gen_len": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        put_opt(&mut body, "temperature", request.temperature);
        put_opt(&mut body, "top_p", request.top_p);
        body
    }

    fn decode(&self, body: &[u8]) -> Result<InvocationResponse> {
        let parsed: LlamaResponse = serde_json::from_slice(body)?;
        let usage = match (parsed.prompt_token_count, parsed.generation_token_count) {
            (Some(input), Some(output)) => Some(Usage {
                input_tokens: input,
                output_tokens: output,
            }),
            _ => None,
        };
        Ok(InvocationResponse {
            text: parsed.generation,
            usage,
            finish_reason: parsed
                .stop_reason
                .as_deref()
                .map(FinishReason::from_provider)
                .unwrap_or_default(),
            ..InvocationResponse::default()
        })
    }
}

// ============================================================================
// Mistral
// ============================================================================

struct MistralAdapter;

#[derive(Deserialize)]
struct MistralResponse {
    #[serde(default)]
    outputs: Vec<MistralOutput>,
}

#[derive(Deserialize)]
struct MistralOutput {
    text: String,
    #[serde(default)]
    stop_reason: Option<String>,
}

impl PayloadAdapter for MistralAdapter {
    fn encode(&self, request: &InvocationRequest) -> Value {
        let mut body = json!({
            "prompt": format!("<s>[INST] {} [/INST]", inline_system(request)),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        put_opt(&mut body, "temperature", request.temperature);
        put_opt(&mut body, "top_p", request.top_p);
        put_opt(&mut body, "stop", request.stop.as_ref());
        body
    }

    fn decode(&self, body: &[u8]) -> Result<InvocationResponse> {
        let parsed: MistralResponse = serde_json::from_slice(body)?;
        let first = parsed
            .outputs
            .into_iter()
            .next()
            .ok_or(MimirError::EmptyResponse)?;
        Ok(InvocationResponse {
            text: first.text,
            finish_reason: first
                .stop_reason
                .as_deref()
                .map(FinishReason::from_provider)
                .unwrap_or_default(),
            ..InvocationResponse::default()
        })
    }
}
