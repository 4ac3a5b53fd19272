//! Invocation request type

use serde::{Deserialize, Serialize};

use crate::cache::{compose_scope, normalize};

/// A single generation request (provider-agnostic).
///
/// The target's model id lives in the provider configuration, not here, so
/// the same request can be replayed against a fallback target unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl InvocationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.top_p = Some(p);
        self
    }

    pub fn stop(mut self, sequences: Vec<String>) -> Self {
        self.stop = Some(sequences);
        self
    }

    /// Cache scope for this request sent to `target`.
    ///
    /// Combines the target, the generation parameters and the normalized
    /// system prompt. The system prompt is kept out of the fingerprinted
    /// text, so moving words between it and the user prompt changes the key.
    pub fn cache_scope(&self, target: &str) -> String {
        let system = match &self.system {
            Some(system) => format!("system={}", normalize(system)),
            None => String::new(),
        };
        compose_scope(&[target, &self.parameter_tag(), &system])
    }

    /// Stable rendering of the generation parameters.
    ///
    /// Mixed into the cache scope so the same prompt sampled with different
    /// settings is cached separately.
    pub fn parameter_tag(&self) -> String {
        let mut parts = Vec::new();
        if let Some(max) = self.max_tokens {
            parts.push(format!("max_tokens={max}"));
        }
        if let Some(temp) = self.temperature {
            parts.push(format!("temperature={temp:.3}"));
        }
        if let Some(p) = self.top_p {
            parts.push(format!("top_p={p:.3}"));
        }
        if let Some(ref stop) = self.stop {
            parts.push(format!("stop={}", stop.join("\u{1f}")));
        }
        parts.join(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_is_scoped_apart_from_the_prompt() {
        let plain = InvocationRequest::new("be brief hello");
        let with_system = InvocationRequest::new("hello").system("be brief");
        let reworded = InvocationRequest::new("hello").system("  Be   BRIEF ");
        assert_ne!(plain.cache_scope("claude"), with_system.cache_scope("claude"));
        assert_eq!(
            with_system.cache_scope("claude"),
            reworded.cache_scope("claude")
        );
        assert_ne!(with_system.cache_scope("claude"), with_system.cache_scope("titan"));
    }

    #[test]
    fn parameter_tag_is_empty_without_parameters() {
        assert_eq!(InvocationRequest::new("x").parameter_tag(), "");
    }

    #[test]
    fn parameter_tag_distinguishes_settings() {
        let a = InvocationRequest::new("x").temperature(0.2);
        let b = InvocationRequest::new("x").temperature(0.7);
        let c = InvocationRequest::new("x").temperature(0.2).max_tokens(256);
        assert_ne!(a.parameter_tag(), b.parameter_tag());
        assert_ne!(a.parameter_tag(), c.parameter_tag());
        assert_eq!(c.parameter_tag(), "max_tokens=256;temperature=0.200");
    }
}
