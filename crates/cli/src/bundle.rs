use anyhow::{Context, Result};
use async_trait::async_trait;
use context_ann::{AnnError, AnnHit, AnnProvider, AnnQuery, PreflightRequest, ProviderRegistry};
use context_graph::GraphRelations;
use context_protocol::SearchMode;
use context_search::{ChunkMeta, FileRelations};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Everything one `rank` invocation needs: the query, corpus metadata, the
/// sparse hits and the ANN backends to dispatch to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryBundle {
    pub query: String,
    pub mode: Option<SearchMode>,
    pub meta: Vec<ChunkMeta>,
    /// `[idx, score]` pairs from the lexical index
    pub sparse: Vec<(usize, f64)>,
    pub ann: AnnSection,
    pub allowlist: Option<Vec<usize>>,
    pub file_relations: HashMap<String, FileRelations>,
    pub graph: Option<GraphRelations>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnnSection {
    /// Configured backend order; defaults to the backend ids sorted.
    pub order: Vec<String>,
    pub embedding: Option<Vec<f32>>,
    pub backends: BTreeMap<String, FixtureBackend>,
}

/// Canned ANN backend: fixed hits, optionally failing or refusing preflight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FixtureBackend {
    pub hits: Vec<(usize, f64)>,
    pub fail: bool,
    pub preflight: bool,
}

impl Default for FixtureBackend {
    fn default() -> Self {
        Self {
            hits: Vec::new(),
            fail: false,
            preflight: true,
        }
    }
}

impl QueryBundle {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read bundle {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Bundle {} is not valid JSON", path.display()))
    }

    #[must_use]
    pub fn backend_order(&self) -> Vec<String> {
        if self.ann.order.is_empty() {
            self.ann.backends.keys().cloned().collect()
        } else {
            self.ann.order.clone()
        }
    }

    #[must_use]
    pub fn registry(&self) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for (id, backend) in &self.ann.backends {
            registry.register(Arc::new(FixtureProvider {
                id: id.clone(),
                backend: backend.clone(),
            }));
        }
        registry
    }
}

struct FixtureProvider {
    id: String,
    backend: FixtureBackend,
}

#[async_trait]
impl AnnProvider for FixtureProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn preflight(&self, _request: PreflightRequest<'_>) -> context_ann::Result<bool> {
        Ok(self.backend.preflight)
    }

    async fn query(&self, query: &AnnQuery) -> context_ann::Result<Vec<AnnHit>> {
        if self.backend.fail {
            return Err(AnnError::query(format!("backend '{}' is marked failing", self.id)));
        }
        Ok(self
            .backend
            .hits
            .iter()
            .filter(|(idx, _)| query.allowlist.as_ref().map_or(true, |allow| allow.contains(idx)))
            .take(query.top_n)
            .map(|&(idx, score)| AnnHit { idx, score })
            .collect())
    }
}
