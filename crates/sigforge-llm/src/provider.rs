use async_trait::async_trait;

use sigforge_types::SignalError;

use crate::{Request, Response};

// ---------------------------------------------------------------------------
// ProviderAdapter
// ---------------------------------------------------------------------------

/// One completion backend. Each call is a fresh, independent request.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn complete(&self, request: &Request) -> Result<Response, SignalError>;
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
    fn supports_structured_output(&self) -> bool;
}

// ---------------------------------------------------------------------------
// DynProvider
// ---------------------------------------------------------------------------

pub struct DynProvider(Box<dyn ProviderAdapter>);

impl DynProvider {
    pub fn new(provider: impl ProviderAdapter + 'static) -> Self {
        Self(Box::new(provider))
    }

    pub async fn complete(&self, request: &Request) -> Result<Response, SignalError> {
        self.0.complete(request).await
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn default_model(&self) -> &str {
        self.0.default_model()
    }

    pub fn supports_structured_output(&self) -> bool {
        self.0.supports_structured_output()
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Map a failed HTTP exchange (no status received) to the unified error.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> SignalError {
    if err.is_timeout() {
        return SignalError::RequestTimeout {
            provider: provider.into(),
        };
    }
    SignalError::ProviderError {
        provider: provider.into(),
        status: 0,
        message: err.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
