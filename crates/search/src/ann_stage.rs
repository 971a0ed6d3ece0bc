use crate::ann_policy::{select_ann_candidate_policy, AnnCandidatePolicy};
use crate::error::Result;
use crate::profile::RankProfile;
use context_ann::{
    AbortSignal, AnnError, AnnQuery, DispatchAttempt, ProviderRegistry, ProviderRuntime,
};
use context_protocol::SearchMode;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// What the ANN side of a query needs to know.
#[derive(Debug, Clone)]
pub struct AnnRequest<'a> {
    pub mode: SearchMode,
    /// Backend ids in configured order, before adaptive reordering.
    pub backends: &'a [String],
    pub embedding: Option<Vec<f32>>,
    pub top_n: usize,
    /// Pre-filtered candidate set, if the query is filtered.
    pub allowlist: Option<&'a [usize]>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnCandidates {
    pub policy: AnnCandidatePolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    pub hits: Vec<(usize, f64)>,
    pub attempts: Vec<DispatchAttempt>,
    /// Set when every backend was unusable and the query went sparse-only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnnCandidates {
    fn empty(policy: AnnCandidatePolicy) -> Self {
        Self {
            policy,
            backend: None,
            hits: Vec::new(),
            attempts: Vec::new(),
            error: None,
        }
    }
}

/// Fetches ANN candidates under the candidate policy.
///
/// A skipped policy never reaches a backend. A restricted policy hands the
/// allowlist to the backend; an oversized allowlist runs a full query and
/// filters afterwards. When no backend is usable the query degrades to
/// sparse-only with the failure recorded; cancellation is an error.
pub async fn fetch_ann_candidates(
    runtime: &ProviderRuntime,
    registry: &ProviderRegistry,
    profile: &RankProfile,
    request: AnnRequest<'_>,
    signal: Option<&AbortSignal>,
) -> Result<AnnCandidates> {
    let policy = select_ann_candidate_policy(
        request.allowlist.map(<[usize]>::len),
        &profile.ann_policy,
    );
    if policy.skips_ann() {
        log::debug!("ANN skipped: {:?}", policy.reason);
        return Ok(AnnCandidates::empty(policy));
    }

    let query = AnnQuery {
        mode: Some(request.mode),
        embedding: request.embedding,
        top_n: request.top_n,
        allowlist: request
            .allowlist
            .filter(|_| policy.is_restricted())
            .map(Arc::from),
    };

    let dispatch = match runtime
        .dispatch(
            registry,
            request.mode,
            request.backends,
            profile.providers.adaptive,
            &query,
            signal,
        )
        .await
    {
        Ok(dispatch) => dispatch,
        Err(err @ AnnError::NoUsableBackend { .. }) => {
            log::warn!("ANN unavailable, continuing sparse-only: {err}");
            let mut out = AnnCandidates::empty(policy);
            out.error = Some(err.to_string());
            return Ok(out);
        }
        Err(err) => return Err(err.into()),
    };

    let mut hits: Vec<(usize, f64)> = dispatch.hits.iter().map(|h| (h.idx, h.score)).collect();
    if policy.needs_post_filter() {
        if let Some(allowlist) = request.allowlist {
            let allowed: HashSet<usize> = allowlist.iter().copied().collect();
            let before = hits.len();
            hits.retain(|(idx, _)| allowed.contains(idx));
            log::debug!("ANN post-filter kept {}/{before} hits", hits.len());
        }
    }

    Ok(AnnCandidates {
        policy,
        backend: Some(dispatch.backend),
        hits,
        attempts: dispatch.attempts,
        error: None,
    })
}
