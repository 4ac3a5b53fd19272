//! HTTP invocation provider.
//!
//! Posts the adapter-encoded body to `{endpoint}/model/{model}/invoke`, the
//! path layout of hosted foundation-model runtimes, and decodes the reply with
//! the same adapter. Authentication is an optional bearer token; request
//! signing schemes are out of scope.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};

use super::adapter::ProviderKind;
use super::traits::InvocationProvider;
use crate::types::{InvocationRequest, InvocationResponse};
use crate::{MimirError, Result};

/// Transport-level timeout. The invoker's per-attempt timeout is normally
/// tighter; this only bounds a stuck connection.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest error body echoed into an error message.
const MAX_ERROR_BODY: usize = 512;

/// Provider that invokes one model over HTTP.
#[derive(Clone)]
pub struct HttpProvider {
    name: String,
    endpoint: String,
    model: String,
    kind: ProviderKind,
    api_key: Option<String>,
    http: Client,
}

impl HttpProvider {
    /// Create a provider for `model` at `endpoint`.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        kind: ProviderKind,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()
            .map_err(|e| MimirError::Http(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            kind,
            api_key: None,
            http,
        })
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn invoke_url(&self) -> String {
        format!("{}/model/{}/invoke", self.endpoint, self.model)
    }
}

#[async_trait]
impl InvocationProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationResponse> {
        let adapter = self.kind.adapter();
        let mut builder = self
            .http
            .post(self.invoke_url())
            .header("accept", "application/json")
            .json(&adapter.encode(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| MimirError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &headers, &self.model, &body));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| MimirError::Http(e.to_string()))?;
        let mut decoded = adapter.decode(&body)?;
        if decoded.model.is_none() {
            decoded.model = Some(self.model.clone());
        }
        Ok(decoded)
    }
}

/// Map a non-success status onto the error taxonomy.
fn status_error(status: StatusCode, headers: &HeaderMap, model: &str, body: &str) -> MimirError {
    let message = truncate(body.trim(), MAX_ERROR_BODY);
    match status.as_u16() {
        400 | 422 => MimirError::InvalidRequest(message),
        401 | 403 => MimirError::AuthenticationFailed,
        404 => MimirError::ModelNotFound(model.to_string()),
        429 => {
            let retry_after = headers
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            MimirError::RateLimited { retry_after }
        }
        code => MimirError::Api {
            status: code,
            message: if message.is_empty() {
                status.to_string()
            } else {
                message
            },
        },
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
