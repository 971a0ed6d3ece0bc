use crate::error::Result;
use crate::signal::AbortSignal;
use async_trait::async_trait;
use context_protocol::SearchMode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Inputs for a provider's capability probe.
#[derive(Debug, Clone, Copy)]
pub struct PreflightRequest<'a> {
    pub mode: SearchMode,
    pub embedding: Option<&'a [f32]>,
    pub signal: Option<&'a AbortSignal>,
}

#[derive(Debug, Clone, Default)]
pub struct AnnQuery {
    pub mode: Option<SearchMode>,
    pub embedding: Option<Vec<f32>>,
    pub top_n: usize,
    /// Restrict the search to these corpus items when set.
    pub allowlist: Option<Arc<[usize]>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnHit {
    pub idx: usize,
    pub score: f64,
}

/// One interchangeable approximate-nearest-neighbor backend.
#[async_trait]
pub trait AnnProvider: Send + Sync {
    /// Stable backend identity used as the health-tracking key.
    fn id(&self) -> &str;

    /// Cheap probe run before the backend is trusted for real queries.
    async fn preflight(&self, request: PreflightRequest<'_>) -> Result<bool>;

    async fn query(&self, query: &AnnQuery) -> Result<Vec<AnnHit>>;
}

/// Providers available to a ranking context, in registration order.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn AnnProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .finish()
    }
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider`, replacing any provider with the same id.
    pub fn register(&mut self, provider: Arc<dyn AnnProvider>) {
        self.providers.retain(|p| p.id() != provider.id());
        self.providers.push(provider);
    }

    #[must_use]
    pub fn with(mut self, provider: Arc<dyn AnnProvider>) -> Self {
        self.register(provider);
        self
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<dyn AnnProvider>> {
        self.providers.iter().find(|p| p.id() == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
