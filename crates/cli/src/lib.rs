//! Runs the ranking pipeline over a JSON query bundle:
//! adaptive ANN dispatch, sparse+ANN fusion, the rank stage and payload
//! rendering.

pub mod bundle;

use anyhow::Result;
use context_ann::{AbortSignal, ProviderRuntime};
use context_graph::GraphContext;
use context_protocol::SearchMode;
use context_search::{
    fetch_ann_candidates, fuse_candidates, AnnRequest, RankProfile, RankStage, SearchPayload,
};
use std::collections::HashSet;

pub use bundle::{AnnSection, FixtureBackend, QueryBundle};

#[derive(Debug, Clone, Default)]
pub struct RankOptions {
    pub explain: bool,
    pub top_n: Option<usize>,
    pub mode: Option<SearchMode>,
}

/// Runs one query bundle end to end.
pub async fn execute(
    bundle: &QueryBundle,
    profile: &RankProfile,
    runtime: &ProviderRuntime,
    options: &RankOptions,
    signal: Option<&AbortSignal>,
) -> Result<SearchPayload> {
    let mode = options.mode.or(bundle.mode).unwrap_or(SearchMode::Code);
    let top_n = options.top_n.unwrap_or(profile.top_n);

    let ann = if bundle.ann.backends.is_empty() {
        None
    } else {
        let registry = bundle.registry();
        let order = bundle.backend_order();
        let request = AnnRequest {
            mode,
            backends: &order,
            embedding: bundle.ann.embedding.clone(),
            top_n: top_n.saturating_add(profile.top_k_slack),
            allowlist: bundle.allowlist.as_deref(),
        };
        Some(fetch_ann_candidates(runtime, &registry, profile, request, signal).await?)
    };

    let (ann_hits, ann_backend) = match ann.as_ref() {
        Some(a) => (a.hits.as_slice(), a.backend.as_deref()),
        None => (&[][..], None),
    };
    let entries = fuse_candidates(&bundle.sparse, ann_hits, ann_backend, &profile.fusion);

    let graph = bundle.graph.as_ref().map(GraphContext::from_relations);
    let allowlist: Option<HashSet<usize>> =
        bundle.allowlist.as_ref().map(|ids| ids.iter().copied().collect());

    let mut stage = RankStage::new(profile, &bundle.meta, &bundle.query)
        .file_relations(&bundle.file_relations)
        .explain(options.explain)
        .top_n(top_n);
    if let Some(graph) = graph.as_ref() {
        stage = stage.graph(graph);
    }
    if let Some(allowlist) = allowlist.as_ref() {
        stage = stage.allowlist(allowlist);
    }
    if let Some(ann) = ann.as_ref() {
        stage = stage.ann_policy(ann.policy);
    }
    if let Some(signal) = signal {
        stage = stage.abort_signal(signal);
    }
    let output = stage.run(entries)?;

    Ok(SearchPayload::from_rank(
        mode,
        ann.and_then(|a| a.backend),
        output,
    ))
}
