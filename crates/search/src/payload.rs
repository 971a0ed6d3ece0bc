use crate::ann_policy::AnnCandidatePolicy;
use crate::lexicon::LexiconStatus;
use crate::rank::{ExplainBudgetStats, PipelineStage, RankOutput, RankedHit, RelationBoostStats};
use context_graph::{GraphRankingExplain, GraphRankingStats};
use context_protocol::SearchMode;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub stages: Vec<PipelineStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphRankingStats>,
    /// Weights, caps, seeds and stop/truncation records of the graph pass.
    /// Present only when explain was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_explain: Option<GraphRankingExplain>,
    pub explain_budget: ExplainBudgetStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ann_candidate_policy: Option<AnnCandidatePolicy>,
    pub relation_boost: RelationBoostStats,
    /// Same as `RankStats::lexicon`.
    pub lexicon: LexiconStatus,
    pub pipeline: PipelineStats,
}

/// Rendered search result, one hit list per search mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPayload {
    /// ANN backend that served the query, if any.
    pub backend: Option<String>,
    pub prose: Vec<RankedHit>,
    pub extracted_prose: Vec<RankedHit>,
    pub code: Vec<RankedHit>,
    pub records: Vec<RankedHit>,
    pub stats: PayloadStats,
}

impl SearchPayload {
    /// Places a rank pass's hits under `mode` and lifts its stats.
    #[must_use]
    pub fn from_rank(mode: SearchMode, backend: Option<String>, output: RankOutput) -> Self {
        let RankOutput {
            hits,
            stats,
            graph_explain,
        } = output;
        let mut payload = Self {
            backend,
            prose: Vec::new(),
            extracted_prose: Vec::new(),
            code: Vec::new(),
            records: Vec::new(),
            stats: PayloadStats {
                ann_candidate_policy: stats.ann_candidate_policy,
                relation_boost: stats.relation_boost,
                lexicon: stats.lexicon,
                pipeline: PipelineStats {
                    stages: stats.stages,
                    graph: stats.graph,
                    graph_explain,
                    explain_budget: stats.explain_budget,
                },
            },
        };
        *payload.hits_mut(mode) = hits;
        payload
    }

    #[must_use]
    pub fn hits(&self, mode: SearchMode) -> &[RankedHit] {
        match mode {
            SearchMode::Code => &self.code,
            SearchMode::Prose => &self.prose,
            SearchMode::ExtractedProse => &self.extracted_prose,
            SearchMode::Records => &self.records,
        }
    }

    fn hits_mut(&mut self, mode: SearchMode) -> &mut Vec<RankedHit> {
        match mode {
            SearchMode::Code => &mut self.code,
            SearchMode::Prose => &mut self.prose,
            SearchMode::ExtractedProse => &mut self.extracted_prose,
            SearchMode::Records => &mut self.records,
        }
    }
}
