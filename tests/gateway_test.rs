//! Tests for the gateway: builder validation and the cache in front of the
//! invoker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mimir::{
    CacheConfig, CircuitBreakerConfig, Gateway, InvocationProvider, InvocationRequest,
    InvocationResponse, ManualClock, Mimir, MimirConfig, MimirError, NullStore, Result,
    RetryConfig,
};

// ============================================================================
// Mock provider
// ============================================================================

struct CountingProvider {
    name: &'static str,
    failing: AtomicBool,
    calls: AtomicU32,
}

impl CountingProvider {
    fn healthy(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            failing: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        })
    }

    fn failing(name: &'static str) -> Arc<Self> {
        let provider = Self::healthy(name);
        provider.failing.store(true, Ordering::SeqCst);
        provider
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InvocationProvider for CountingProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(MimirError::Http("connection refused".into()));
        }
        Ok(InvocationResponse::new(
            format!("{} #{n}: {}", self.name, request.prompt),
            self.name,
        ))
    }
}

fn gateway(clock: &Arc<ManualClock>, primary: &Arc<CountingProvider>) -> Gateway {
    Mimir::builder()
        .target("primary", primary.clone())
        .retry(RetryConfig::disabled())
        .clock(clock.clone())
        .build()
        .unwrap()
}

// ============================================================================
// Builder validation
// ============================================================================

#[test]
fn build_requires_a_target() {
    let err = Mimir::builder().build().err().unwrap();
    assert!(matches!(err, MimirError::Configuration(_)));
}

#[test]
fn first_target_is_the_default_primary() {
    let gateway = Mimir::builder()
        .target("a", CountingProvider::healthy("a"))
        .target("b", CountingProvider::healthy("b"))
        .build()
        .unwrap();
    assert_eq!(gateway.primary_target(), "a");
    assert!(gateway.cache().is_some());
    assert_eq!(gateway.invoker().fallback_target(), None);
}

#[test]
fn build_rejects_unregistered_primary_and_fallback() {
    let err = Mimir::builder()
        .target("a", CountingProvider::healthy("a"))
        .primary("missing")
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, MimirError::UnknownTarget(ref id) if id == "missing"));

    let err = Mimir::builder()
        .target("a", CountingProvider::healthy("a"))
        .fallback("missing")
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, MimirError::UnknownTarget(ref id) if id == "missing"));
}

#[test]
fn build_rejects_fallback_equal_to_primary() {
    let err = Mimir::builder()
        .target("a", CountingProvider::healthy("a"))
        .fallback("a")
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, MimirError::Configuration(_)));
}

#[test]
fn build_rejects_invalid_policies() {
    let zero_threshold = Mimir::builder()
        .target("a", CountingProvider::healthy("a"))
        .circuit_breaker(CircuitBreakerConfig::new().failure_threshold(0))
        .build();
    assert!(matches!(zero_threshold, Err(MimirError::Configuration(_))));

    let zero_ttl = Mimir::builder()
        .target("a", CountingProvider::healthy("a"))
        .response_cache(CacheConfig::new().default_ttl(Duration::ZERO))
        .build();
    assert!(matches!(zero_ttl, Err(MimirError::Configuration(_))));

    // A disabled cache is not validated.
    let disabled = Mimir::builder()
        .target("a", CountingProvider::healthy("a"))
        .response_cache(CacheConfig::new().default_ttl(Duration::ZERO))
        .disable_cache()
        .build();
    assert!(disabled.is_ok());
}

// ============================================================================
// generate
// ============================================================================

#[tokio::test]
async fn repeat_request_is_served_from_cache() {
    let clock = Arc::new(ManualClock::new());
    let primary = CountingProvider::healthy("primary");
    let gateway = gateway(&clock, &primary);

    let first = gateway
        .generate(&InvocationRequest::new("What is a claim?"))
        .await
        .unwrap();
    let second = gateway
        .generate(&InvocationRequest::new("  what IS a claim? "))
        .await
        .unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.response, second.response);
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn ttl_expiry_triggers_fresh_call() {
    let clock = Arc::new(ManualClock::new());
    let primary = CountingProvider::healthy("primary");
    let gateway = gateway(&clock, &primary);
    let request = InvocationRequest::new("q");
    let ttl = Duration::from_secs(5);

    gateway.generate_with_ttl(&request, ttl).await.unwrap();
    clock.advance(Duration::from_secs(1));
    assert!(gateway.generate_with_ttl(&request, ttl).await.unwrap().cache_hit);
    clock.advance(Duration::from_secs(5));
    let fresh = gateway.generate_with_ttl(&request, ttl).await.unwrap();
    assert!(!fresh.cache_hit);
    assert_eq!(fresh.response.text, "primary #2: q");
}

#[tokio::test]
async fn generation_parameters_scope_the_cache() {
    let clock = Arc::new(ManualClock::new());
    let primary = CountingProvider::healthy("primary");
    let gateway = gateway(&clock, &primary);

    let cold = InvocationRequest::new("Write a haiku").temperature(0.0);
    let warm = InvocationRequest::new("Write a haiku").temperature(0.9);
    let with_system = InvocationRequest::new("Write a haiku").system("You are a poet.");

    for request in [&cold, &warm, &with_system] {
        assert!(!gateway.generate(request).await.unwrap().cache_hit);
    }
    assert!(gateway.generate(&warm).await.unwrap().cache_hit);
    assert_eq!(primary.calls(), 3);
}

#[tokio::test]
async fn system_prompt_boundary_is_part_of_the_key() {
    let clock = Arc::new(ManualClock::new());
    let primary = CountingProvider::healthy("primary");
    let gateway = gateway(&clock, &primary);

    let split = InvocationRequest::new("hello").system("be brief");
    let joined = InvocationRequest::new("be brief hello");

    assert!(!gateway.generate(&split).await.unwrap().cache_hit);
    assert!(!gateway.generate(&joined).await.unwrap().cache_hit);
    assert_eq!(primary.calls(), 2);

    let respaced = InvocationRequest::new(" Hello ").system("Be  brief");
    assert!(gateway.generate(&respaced).await.unwrap().cache_hit);
}

#[tokio::test]
async fn disabled_cache_always_invokes() {
    let primary = CountingProvider::healthy("primary");
    let gateway = Mimir::builder()
        .target("primary", primary.clone())
        .disable_cache()
        .build()
        .unwrap();
    let request = InvocationRequest::new("q");

    for _ in 0..3 {
        assert!(!gateway.generate(&request).await.unwrap().cache_hit);
    }
    assert_eq!(primary.calls(), 3);
    assert!(gateway.cache().is_none());
}

#[tokio::test]
async fn null_store_caches_nothing() {
    let primary = CountingProvider::healthy("primary");
    let gateway = Mimir::builder()
        .target("primary", primary.clone())
        .cache_store(Arc::new(NullStore))
        .build()
        .unwrap();
    let request = InvocationRequest::new("q");

    gateway.generate(&request).await.unwrap();
    gateway.generate(&request).await.unwrap();
    assert_eq!(primary.calls(), 2);
}

#[tokio::test]
async fn failures_are_not_cached() {
    let clock = Arc::new(ManualClock::new());
    let primary = CountingProvider::failing("primary");
    let gateway = gateway(&clock, &primary);
    let request = InvocationRequest::new("q");

    let err = gateway.generate(&request).await.unwrap_err();
    assert!(err.is_unavailable());

    primary.failing.store(false, Ordering::SeqCst);
    let outcome = gateway.generate(&request).await.unwrap();
    assert!(!outcome.cache_hit);
    assert_eq!(primary.calls(), 2);
}

#[tokio::test]
async fn fallback_response_is_cached_under_the_primary_scope() {
    let clock = Arc::new(ManualClock::new());
    let primary = CountingProvider::failing("primary");
    let fallback = CountingProvider::healthy("fallback");
    let gateway = Mimir::builder()
        .target("primary", primary.clone())
        .target("fallback", fallback.clone())
        .fallback("fallback")
        .retry(RetryConfig::disabled())
        .clock(clock.clone())
        .build()
        .unwrap();
    let request = InvocationRequest::new("q");

    let first = gateway.generate(&request).await.unwrap();
    assert_eq!(first.response.target, "fallback");

    let second = gateway.generate(&request).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.response.target, "fallback");
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 1);
}

// ============================================================================
// from_config
// ============================================================================

#[tokio::test]
async fn from_config_builds_http_targets() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/model/amazon.titan-text-lite-v1/invoke"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"outputText": "configured"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let toml = format!(
        r#"
        primary_target = "titan"

        [retry]
        max_retries = 0

        [targets.titan]
        kind = "titan"
        endpoint = "{}"
        model = "amazon.titan-text-lite-v1"
        "#,
        server.uri()
    );
    let config = MimirConfig::from_toml_str(&toml).unwrap();
    let gateway = Gateway::from_config(&config).unwrap();

    let request = InvocationRequest::new("hello");
    let first = gateway.generate(&request).await.unwrap();
    assert_eq!(first.response.text, "configured");
    assert_eq!(first.response.target, "titan");
    assert_eq!(
        first.response.model.as_deref(),
        Some("amazon.titan-text-lite-v1")
    );
    assert!(gateway.generate(&request).await.unwrap().cache_hit);
}

#[test]
fn from_config_respects_disabled_cache() {
    let config = MimirConfig::from_toml_str(
        r#"
        primary_target = "main"

        [cache]
        enabled = false

        [targets.main]
        kind = "llama"
        endpoint = "http://localhost:1"
        model = "meta.llama3-8b-instruct-v1"
        "#,
    )
    .unwrap();
    let gateway = Gateway::from_config(&config).unwrap();
    assert!(gateway.cache().is_none());
    assert_eq!(gateway.primary_target(), "main");
}
