use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sigforge_types::SignalError;

use crate::{DynProvider, ProviderAdapter, Request, Response};

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

pub trait Middleware: Send + Sync {
    fn before(&self, _request: &mut Request) {}
    fn after(&self, _request: &Request, _response: &mut Response) {}
}

// ---------------------------------------------------------------------------
// Built-in middleware: LoggingMiddleware
// ---------------------------------------------------------------------------

pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn before(&self, request: &mut Request) {
        tracing::info!(
            model = %request.model,
            contract = request.response_format.as_ref().map(|f| f.name.as_str()).unwrap_or("-"),
            messages = request.messages.len(),
            "completion request"
        );
    }

    fn after(&self, _request: &Request, response: &mut Response) {
        tracing::info!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            finish = ?response.finish_reason,
            "completion response"
        );
    }
}

// ---------------------------------------------------------------------------
// Built-in middleware: CostTrackingMiddleware
// ---------------------------------------------------------------------------

/// Accumulates token usage. Clones share the same counters.
#[derive(Clone)]
pub struct CostTrackingMiddleware {
    total_input: Arc<AtomicU64>,
    total_output: Arc<AtomicU64>,
}

impl CostTrackingMiddleware {
    pub fn new() -> Self {
        Self {
            total_input: Arc::new(AtomicU64::new(0)),
            total_output: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.total_input.load(Ordering::Relaxed)
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.total_output.load(Ordering::Relaxed)
    }
}

impl Default for CostTrackingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for CostTrackingMiddleware {
    fn after(&self, _request: &Request, response: &mut Response) {
        self.total_input
            .fetch_add(response.usage.input_tokens, Ordering::Relaxed);
        self.total_output
            .fetch_add(response.usage.output_tokens, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// ModelInfo / ModelCatalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    pub context_window: usize,
}

pub struct ModelCatalog {
    models: HashMap<String, ModelInfo>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        let mut models = HashMap::new();

        for (id, provider, ctx) in [
            ("gemini-2.5-pro", "google", 1_000_000),
            ("gemini-2.5-flash", "google", 1_000_000),
            ("gemini-2.0-flash", "google", 1_000_000),
            ("gpt-4o", "openai", 128_000),
            ("gpt-4o-mini", "openai", 128_000),
            ("gpt-4.1", "openai", 1_000_000),
        ] {
            models.insert(
                id.to_string(),
                ModelInfo {
                    id: id.to_string(),
                    provider: provider.to_string(),
                    context_window: ctx,
                },
            );
        }

        Self { models }
    }

    pub fn lookup(&self, model: &str) -> Option<&ModelInfo> {
        self.models.get(model)
    }

    pub fn provider_for_model(&self, model: &str) -> Option<&str> {
        self.models.get(model).map(|m| m.provider.as_str())
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// LlmClient
// ---------------------------------------------------------------------------

/// Routes completion requests to a registered provider.
pub struct LlmClient {
    providers: HashMap<String, DynProvider>,
    default_provider: Option<String>,
    model_catalog: ModelCatalog,
    middleware: Vec<Box<dyn Middleware>>,
}

impl LlmClient {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: None,
            model_catalog: ModelCatalog::new(),
            middleware: Vec::new(),
        }
    }

    /// Register a provider. The first one registered becomes the fallback.
    pub fn register_provider(&mut self, provider: impl ProviderAdapter + 'static) {
        let name = provider.name().to_string();
        if self.default_provider.is_none() {
            self.default_provider = Some(name.clone());
        }
        self.providers.insert(name, DynProvider::new(provider));
    }

    pub fn with_provider(mut self, provider: impl ProviderAdapter + 'static) -> Self {
        self.register_provider(provider);
        self
    }

    pub fn with_middleware(mut self, m: impl Middleware + 'static) -> Self {
        self.middleware.push(Box::new(m));
        self
    }

    pub fn model_catalog(&self) -> &ModelCatalog {
        &self.model_catalog
    }

    pub async fn complete(&self, request: &Request) -> Result<Response, SignalError> {
        let provider = self.resolve_provider(request)?;
        let mut req = request.clone();
        if req.model.is_empty() {
            req.model = provider.default_model().to_string();
        } else if let Some(owner) = self.model_catalog.provider_for_model(&req.model) {
            // A catalogued model never goes to a provider that does not serve it.
            if owner != provider.name() {
                tracing::warn!(
                    model = %req.model,
                    owner,
                    provider = provider.name(),
                    "model is served by another provider; using provider default"
                );
                req.model = provider.default_model().to_string();
            }
        }
        if req.response_format.is_some() && !provider.supports_structured_output() {
            tracing::warn!(
                provider = provider.name(),
                "provider ignores response schema; output will still be validated"
            );
        }

        for m in &self.middleware {
            m.before(&mut req);
        }

        let mut resp = provider.complete(&req).await?;

        for m in &self.middleware {
            m.after(&req, &mut resp);
        }

        Ok(resp)
    }

    fn resolve_provider(&self, request: &Request) -> Result<&DynProvider, SignalError> {
        // 1. Explicit provider field
        if let Some(ref provider_name) = request.provider {
            return self.providers.get(provider_name).ok_or_else(|| {
                SignalError::Config(format!("Provider '{}' not registered", provider_name))
            });
        }

        // 2. Model catalog lookup
        if let Some(provider_name) = self.model_catalog.provider_for_model(&request.model) {
            if let Some(provider) = self.providers.get(provider_name) {
                return Ok(provider);
            }
        }

        // 3. First registered provider
        self.default_provider
            .as_ref()
            .and_then(|name| self.providers.get(name))
            .ok_or_else(|| SignalError::Config("No providers registered".to_string()))
    }

    /// Create from environment variables (detect available API keys).
    pub fn from_env() -> Result<Self, SignalError> {
        let mut client = Self::new();

        if let Ok(adapter) = crate::GeminiAdapter::from_env() {
            client.register_provider(adapter);
        }

        if let Ok(adapter) = crate::OpenAiAdapter::from_env() {
            client.register_provider(adapter);
        }

        if client.providers.is_empty() {
            return Err(SignalError::Config(
                "No completion provider API keys found in environment".to_string(),
            ));
        }

        Ok(client)
    }
}

impl Default for LlmClient {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FinishReason, Message, Usage};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct MockProvider {
        name: &'static str,
        call_count: Arc<AtomicUsize>,
    }

    impl MockProvider {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                call_count: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for MockProvider {
        async fn complete(&self, request: &Request) -> Result<Response, SignalError> {
            self.call_count.fetch_add(1, Ordering::Relaxed);
            Ok(Response {
                id: format!("{}-resp", self.name),
                text: "{}".into(),
                usage: Usage {
                    input_tokens: 10,
                    output_tokens: 20,
                    total_tokens: 30,
                },
                model: request.model.clone(),
                finish_reason: FinishReason::EndTurn,
            })
        }

        fn name(&self) -> &str {
            self.name
        }

        fn default_model(&self) -> &str {
            "mock-model"
        }

        fn supports_structured_output(&self) -> bool {
            true
        }
    }

    fn make_request(model: &str, provider: Option<&str>) -> Request {
        let mut req = Request::new(model, vec![Message::user("hello")]);
        req.provider = provider.map(String::from);
        req
    }

    #[tokio::test]
    async fn register_provider_and_complete() {
        let client = LlmClient::new().with_provider(MockProvider::new("mock"));

        let req = make_request("mock-model", Some("mock"));
        let resp = client.complete(&req).await.unwrap();
        assert_eq!(resp.id, "mock-resp");
    }

    #[test]
    fn model_catalog_lookup() {
        let catalog = ModelCatalog::new();

        let info = catalog.lookup("gemini-2.5-flash").unwrap();
        assert_eq!(info.provider, "google");
        assert_eq!(info.context_window, 1_000_000);

        let info = catalog.lookup("gpt-4o").unwrap();
        assert_eq!(info.provider, "openai");
        assert_eq!(info.context_window, 128_000);

        assert!(catalog.lookup("nonexistent-model").is_none());
        assert_eq!(catalog.provider_for_model("unknown"), None);
    }

    #[tokio::test]
    async fn resolve_provider_by_model_name() {
        let client = LlmClient::new()
            .with_provider(MockProvider::new("openai"))
            .with_provider(MockProvider::new("google"));

        let req = make_request("gemini-2.5-flash", None);
        let resp = client.complete(&req).await.unwrap();
        assert_eq!(resp.id, "google-resp");
    }

    #[tokio::test]
    async fn unknown_model_falls_back_to_first_registered() {
        let client = LlmClient::new()
            .with_provider(MockProvider::new("openai"))
            .with_provider(MockProvider::new("google"));

        let req = make_request("local-llama", None);
        let resp = client.complete(&req).await.unwrap();
        assert_eq!(resp.id, "openai-resp");
    }

    #[tokio::test]
    async fn foreign_catalog_model_is_replaced_by_provider_default() {
        let client = LlmClient::new().with_provider(MockProvider::new("openai"));

        let resp = client
            .complete(&make_request("gemini-2.5-flash", None))
            .await
            .unwrap();
        assert_eq!(resp.id, "openai-resp");
        assert_eq!(resp.model, "mock-model");
    }

    #[tokio::test]
    async fn empty_model_uses_provider_default() {
        let client = LlmClient::new().with_provider(MockProvider::new("mock"));
        let resp = client.complete(&make_request("", None)).await.unwrap();
        assert_eq!(resp.model, "mock-model");
    }

    #[tokio::test]
    async fn middleware_before_after_called() {
        let before_count = Arc::new(AtomicUsize::new(0));
        let after_count = Arc::new(AtomicUsize::new(0));

        struct CountingMiddleware {
            before_count: Arc<AtomicUsize>,
            after_count: Arc<AtomicUsize>,
        }

        impl Middleware for CountingMiddleware {
            fn before(&self, _request: &mut Request) {
                self.before_count.fetch_add(1, Ordering::Relaxed);
            }
            fn after(&self, _request: &Request, _response: &mut Response) {
                self.after_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        let client = LlmClient::new()
            .with_middleware(CountingMiddleware {
                before_count: before_count.clone(),
                after_count: after_count.clone(),
            })
            .with_provider(MockProvider::new("mock"));

        let _resp = client
            .complete(&make_request("mock-model", Some("mock")))
            .await
            .unwrap();

        assert_eq!(before_count.load(Ordering::Relaxed), 1);
        assert_eq!(after_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn resolve_provider_unknown_returns_error() {
        let client = LlmClient::new();
        let req = make_request("some-model", Some("nonexistent"));
        let err = client.resolve_provider(&req).err().unwrap();
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn no_providers_returns_error() {
        let client = LlmClient::new();
        let req = make_request("some-model", None);
        let err = client.resolve_provider(&req).err().unwrap();
        assert!(err.to_string().contains("No providers"));
    }

    #[tokio::test]
    async fn cost_tracking_middleware_accumulates() {
        let cost = CostTrackingMiddleware::new();
        let client = LlmClient::new()
            .with_middleware(cost.clone())
            .with_provider(MockProvider::new("mock"));

        let req = make_request("mock-model", Some("mock"));
        let _resp = client.complete(&req).await.unwrap();
        assert_eq!(cost.total_input_tokens(), 10);
        assert_eq!(cost.total_output_tokens(), 20);

        let _resp = client.complete(&req).await.unwrap();
        assert_eq!(cost.total_input_tokens(), 20);
        assert_eq!(cost.total_output_tokens(), 40);
    }
}
