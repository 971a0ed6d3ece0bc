use crate::ann_policy::AnnCandidatePolicy;
use crate::cache::{FileRelationResolver, NoFileRelations, QueryCache};
use crate::candidate::{CandidateEntry, ChunkMeta, ScoreType};
use crate::error::{Result, SearchError};
use crate::explain::{
    enforce_explain_budget, AnnExplain, ExplainPruning, GraphHitExplain, ScoreBreakdown,
    SparseExplain,
};
use crate::lexicon::{BuiltinLexicon, Lexicon, LexiconStatus};
use crate::phrase::{phrase_boost, query_ngrams};
use crate::profile::RankProfile;
use crate::relation_boost::RelationBooster;
use crate::symbol::symbol_boost;
use crate::tokens::{query_tokens, query_words};
use crate::topk::TopK;
use context_ann::AbortSignal;
use context_graph::{
    apply_graph_ranking, GraphAdjustment, GraphContext, GraphRankable, GraphRankingExplain,
    GraphRankingStats,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

static BUILTIN_LEXICON: BuiltinLexicon = BuiltinLexicon;
static NO_FILE_RELATIONS: NoFileRelations = NoFileRelations;

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedHit {
    pub idx: usize,
    pub score: f64,
    pub score_type: ScoreType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ann_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ann_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_breakdown: Option<Value>,
    #[serde(skip)]
    graph: Option<GraphAdjustment>,
    #[serde(skip)]
    draft: Option<Box<ScoreBreakdown>>,
}

impl GraphRankable for RankedHit {
    fn graph_node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    fn score(&self) -> f64 {
        self.score
    }

    fn apply_graph_score(&mut self, adjustment: &GraphAdjustment) {
        self.score += adjustment.score;
        self.graph = Some(adjustment.clone());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationBoostStats {
    pub enabled: bool,
    pub boosted_hits: usize,
    pub total_boost: f64,
    /// Largest boost applied to a single candidate
    pub max_boost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStage {
    pub name: String,
    pub elapsed_ms: f64,
    pub input: usize,
    pub output: usize,
}

impl PipelineStage {
    fn new(name: &str, started: Instant, input: usize, output: usize) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms: (started.elapsed().as_secs_f64() * 1_000_000.0).round() / 1_000.0,
            input,
            output,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainBudgetStats {
    pub pruned_hits: usize,
    pub dropped_sections: usize,
    pub minimal_hits: usize,
}

impl ExplainBudgetStats {
    fn record(&mut self, pruning: &ExplainPruning) {
        if pruning.pruned() {
            self.pruned_hits += 1;
        }
        self.dropped_sections += pruning.dropped_sections.len();
        if pruning.minimal {
            self.minimal_hits += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankStats {
    pub input: usize,
    pub admitted: usize,
    pub filtered: usize,
    pub missing_metadata: usize,
    pub phrase_boosted: usize,
    pub symbol_boosted: usize,
    pub relation_boost: RelationBoostStats,
    /// Lexicon for the most frequent language among admitted candidates
    /// (ties go to the smaller name). Each hit's relation explain carries the
    /// lexicon of its own language.
    pub lexicon: LexiconStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ann_candidate_policy: Option<AnnCandidatePolicy>,
    pub file_relation_lookups: usize,
    pub topk_compactions: usize,
    pub stages: Vec<PipelineStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphRankingStats>,
    pub explain_budget: ExplainBudgetStats,
}

#[derive(Debug, Clone)]
pub struct RankOutput {
    pub hits: Vec<RankedHit>,
    pub stats: RankStats,
    pub graph_explain: Option<GraphRankingExplain>,
}

/// Query-time rank stage: boosts fused candidates, reduces them to the top
/// `top_n`, optionally applies graph ranking and attaches bounded explain
/// payloads.
///
/// ```text
/// entries ─▶ phrase × symbol × (+relation) ─▶ TopK ─▶ graph ─▶ explain budget
/// ```
pub struct RankStage<'a> {
    profile: &'a RankProfile,
    meta: &'a [ChunkMeta],
    query: &'a str,
    lexicon: &'a dyn Lexicon,
    file_relations: &'a dyn FileRelationResolver,
    graph: Option<&'a GraphContext>,
    ann_policy: Option<AnnCandidatePolicy>,
    allowlist: Option<&'a HashSet<usize>>,
    signal: Option<&'a AbortSignal>,
    explain: bool,
    top_n: Option<usize>,
}

impl<'a> RankStage<'a> {
    pub fn new(profile: &'a RankProfile, meta: &'a [ChunkMeta], query: &'a str) -> Self {
        Self {
            profile,
            meta,
            query,
            lexicon: &BUILTIN_LEXICON,
            file_relations: &NO_FILE_RELATIONS,
            graph: None,
            ann_policy: None,
            allowlist: None,
            signal: None,
            explain: false,
            top_n: None,
        }
    }

    #[must_use]
    pub fn lexicon(mut self, lexicon: &'a dyn Lexicon) -> Self {
        self.lexicon = lexicon;
        self
    }

    #[must_use]
    pub fn file_relations(mut self, resolver: &'a dyn FileRelationResolver) -> Self {
        self.file_relations = resolver;
        self
    }

    #[must_use]
    pub fn graph(mut self, graph: &'a GraphContext) -> Self {
        self.graph = Some(graph);
        self
    }

    #[must_use]
    pub fn ann_policy(mut self, policy: AnnCandidatePolicy) -> Self {
        self.ann_policy = Some(policy);
        self
    }

    #[must_use]
    pub fn allowlist(mut self, allowlist: &'a HashSet<usize>) -> Self {
        self.allowlist = Some(allowlist);
        self
    }

    #[must_use]
    pub fn abort_signal(mut self, signal: &'a AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    #[must_use]
    pub fn explain(mut self, explain: bool) -> Self {
        self.explain = explain;
        self
    }

    #[must_use]
    pub fn top_n(mut self, top_n: usize) -> Self {
        self.top_n = Some(top_n);
        self
    }

    pub fn run<I>(self, entries: I) -> Result<RankOutput>
    where
        I: IntoIterator<Item = CandidateEntry>,
    {
        let profile = self.profile;
        let case_sensitive = profile.case_sensitive;
        let top_n = self.top_n.unwrap_or(profile.top_n);

        let tokens = query_tokens(self.query, case_sensitive);
        let ngrams = if profile.phrase.enabled {
            query_ngrams(&query_words(self.query, case_sensitive), &profile.phrase)
        } else {
            Vec::new()
        };
        let mut booster =
            RelationBooster::new(&profile.relation, self.lexicon, &tokens, case_sensitive);
        let mut cache = QueryCache::new(self.file_relations, case_sensitive);
        let mut topk = TopK::new(top_n, profile.top_k_slack);

        let mut input = 0usize;
        let mut admitted = 0usize;
        let mut filtered = 0usize;
        let mut missing_metadata = 0usize;
        let mut phrase_boosted = 0usize;
        let mut symbol_boosted = 0usize;
        let mut relation_stats = RelationBoostStats {
            enabled: profile.relation.enabled,
            ..Default::default()
        };
        let mut languages: BTreeMap<String, usize> = BTreeMap::new();
        let mut stages = Vec::new();

        let boost_started = Instant::now();
        for (rank, entry) in entries.into_iter().enumerate() {
            input += 1;
            if self.allowlist.is_some_and(|allow| !allow.contains(&entry.idx)) {
                filtered += 1;
                continue;
            }
            if self.signal.is_some_and(AbortSignal::is_aborted) {
                log::debug!("Rank stage aborted after {admitted} candidates");
                return Err(SearchError::Aborted { admitted });
            }
            admitted += 1;

            let base = if entry.score.is_finite() { entry.score } else { 0.0 };
            let mut breakdown = self.explain.then(|| self.base_breakdown(&entry, base));
            let Some(chunk) = self.meta.get(entry.idx) else {
                missing_metadata += 1;
                let hit = RankedHit::from_entry(&entry, base, None, breakdown);
                topk.push(base, rank, hit);
                continue;
            };

            let enriched = cache.enriched(entry.idx, chunk);
            if let Some(language) = enriched.language_hint() {
                *languages.entry(language.to_ascii_lowercase()).or_default() += 1;
            }
            let mut score = base;

            if let Some(phrase) = phrase_boost(&ngrams, &enriched.tokens, case_sensitive, &profile.phrase) {
                score *= 1.0 + phrase.factor;
                phrase_boosted += 1;
                if let Some(b) = breakdown.as_mut() {
                    b.phrase = Some(phrase);
                }
            }

            // File exports are already merged into the enriched chunk.
            if let Some(symbol) = symbol_boost(&enriched, None, case_sensitive, &profile.symbol) {
                score *= symbol.factor;
                symbol_boosted += 1;
                if let Some(b) = breakdown.as_mut() {
                    b.symbol = Some(symbol);
                }
            }

            let relation = booster.compute(&enriched);
            if relation.boost > 0.0 {
                score += relation.boost;
                relation_stats.boosted_hits += 1;
                relation_stats.total_boost += relation.boost;
                relation_stats.max_boost = relation_stats.max_boost.max(relation.boost);
            }
            if let Some(b) = breakdown.as_mut() {
                if relation.enabled {
                    b.relation = Some(relation);
                }
            }

            let hit = RankedHit::from_entry(&entry, score, Some(chunk), breakdown);
            topk.push(score, rank, hit);
        }
        stages.push(PipelineStage::new("boost", boost_started, input, admitted));

        let topk_started = Instant::now();
        let topk_compactions = topk.compactions();
        let mut hits: Vec<RankedHit> = topk
            .finish()
            .into_iter()
            .map(|(score, mut hit)| {
                hit.score = score;
                hit
            })
            .collect();
        stages.push(PipelineStage::new("topK", topk_started, admitted, hits.len()));

        let mut graph_stats = None;
        let mut graph_explain = None;
        if let Some(graph) = self.graph.filter(|_| profile.graph.is_active()) {
            let graph_started = Instant::now();
            let count = hits.len();
            let outcome = apply_graph_ranking(hits, graph, &profile.graph, self.explain);
            hits = outcome.candidates;
            graph_stats = Some(outcome.stats);
            graph_explain = outcome
                .explain
                .map(|e| e.bounded(profile.explain.max_explain_items));
            stages.push(PipelineStage::new("graph", graph_started, count, hits.len()));
        }

        let mut explain_budget = ExplainBudgetStats::default();
        if self.explain {
            let explain_started = Instant::now();
            for hit in &mut hits {
                let Some(mut draft) = hit.draft.take() else {
                    continue;
                };
                draft.selected.score = hit.score;
                if let Some(adjustment) = hit.graph.take() {
                    draft.graph = Some(GraphHitExplain {
                        adjustment,
                        seeds: graph_explain
                            .as_ref()
                            .map(|e| e.seeds.clone())
                            .unwrap_or_default(),
                        stop_reason: graph_stats.as_ref().and_then(|s| s.stop_reason),
                    });
                }
                let value = match serde_json::to_value(&*draft) {
                    Ok(value) => value,
                    Err(err) => {
                        log::warn!("Failed to encode explain for hit {}: {err}", hit.idx);
                        continue;
                    }
                };
                let (bounded, pruning) = enforce_explain_budget(value, &profile.explain);
                explain_budget.record(&pruning);
                hit.score_breakdown = Some(bounded);
            }
            stages.push(PipelineStage::new("explain", explain_started, hits.len(), hits.len()));
        }

        let lexicon_language = languages
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(language, _)| language.as_str());
        let stats = RankStats {
            input,
            admitted,
            filtered,
            missing_metadata,
            phrase_boosted,
            symbol_boosted,
            relation_boost: relation_stats,
            lexicon: self.lexicon.status(lexicon_language),
            ann_candidate_policy: self.ann_policy,
            file_relation_lookups: cache.resolver_calls(),
            topk_compactions,
            stages,
            graph: graph_stats,
            explain_budget,
        };
        log::debug!(
            "Rank stage: input={} admitted={} hits={} relation_boosted={}",
            stats.input,
            stats.admitted,
            hits.len(),
            stats.relation_boost.boosted_hits
        );

        Ok(RankOutput {
            hits,
            stats,
            graph_explain,
        })
    }

    fn base_breakdown(&self, entry: &CandidateEntry, base: f64) -> ScoreBreakdown {
        let mut breakdown = ScoreBreakdown::new(entry.score_type, base);
        breakdown.sparse = entry.sparse_score.map(|score| SparseExplain {
            score,
            kind: entry.sparse_type.clone(),
            rank: entry.rrf.as_ref().and_then(|r| r.sparse_rank),
        });
        if entry.ann_score.is_some() || self.ann_policy.is_some() {
            breakdown.ann = Some(AnnExplain {
                score: entry.ann_score,
                source: entry.ann_source.clone(),
                rank: entry.rrf.as_ref().and_then(|r| r.ann_rank),
                candidate_policy: self.ann_policy,
            });
        }
        breakdown.rrf = entry.rrf.clone();
        breakdown.blend = entry.blend_info.clone();
        breakdown
    }
}

impl RankedHit {
    fn from_entry(
        entry: &CandidateEntry,
        score: f64,
        chunk: Option<&ChunkMeta>,
        draft: Option<ScoreBreakdown>,
    ) -> Self {
        Self {
            idx: entry.idx,
            score,
            score_type: entry.score_type,
            file: chunk.map(|c| c.file.clone()),
            name: chunk.and_then(|c| c.name.clone()),
            kind: chunk.and_then(|c| c.kind.clone()),
            node_id: chunk.and_then(|c| c.id.clone()),
            sparse_score: entry.sparse_score,
            ann_score: entry.ann_score,
            ann_source: entry.ann_source.clone(),
            score_breakdown: None,
            graph: None,
            draft: draft.map(Box::new),
        }
    }
}
