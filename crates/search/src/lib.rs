//! # Context Search
//!
//! Query-time ranking over fused sparse and ANN candidates.
//!
//! ```text
//! sparse hits ─┐
//!              ├─> fuse_candidates (RRF | blend) ─> RankStage ─> SearchPayload
//! ANN hits ────┘        ▲                              │
//!   (fetch_ann_candidates: policy + adaptive dispatch) ├─ phrase / symbol / relation boosts
//!                                                      ├─ TopK (slack-bounded)
//!                                                      ├─ graph ranking (optional)
//!                                                      └─ explain budget
//! ```

mod ann_policy;
mod ann_stage;
mod cache;
mod candidate;
mod error;
mod explain;
mod fusion;
mod lexicon;
mod payload;
mod phrase;
mod profile;
mod rank;
mod relation_boost;
mod symbol;
mod tokens;
mod topk;

pub use ann_policy::{
    select_ann_candidate_policy, AnnCandidatePolicy, AnnCandidatePolicyConfig,
    AnnCandidateStrategy, AnnPolicyReason, DEFAULT_MAX_RESTRICTED_CANDIDATES,
};
pub use ann_stage::{fetch_ann_candidates, AnnCandidates, AnnRequest};
pub use cache::{FileRelationResolver, NoFileRelations, QueryCache};
pub use candidate::{
    BlendInfo, CallDetail, CandidateEntry, ChunkMeta, CodeRelations, FileRelations, ImportLink,
    RrfInfo, ScoreType,
};
pub use error::{Result, SearchError};
pub use explain::{enforce_explain_budget, ExplainPruning, ScoreBreakdown, PRUNE_ORDER};
pub use fusion::{fuse_candidates, FusionConfig, FusionMode};
pub use lexicon::{BuiltinLexicon, Lexicon, LexiconStatus};
pub use payload::{PayloadStats, PipelineStats, SearchPayload};
pub use phrase::{phrase_boost, query_ngrams, PhraseBoost, PhraseConfig};
pub use profile::RankProfile;
pub use rank::{
    ExplainBudgetStats, PipelineStage, RankOutput, RankStage, RankStats, RankedHit,
    RelationBoostStats,
};
pub use relation_boost::{
    score_relation_matches, RelationBoostConfig, RelationBoostResult, RelationBooster,
};
pub use symbol::{is_definition_kind, symbol_boost, SymbolBoost, SymbolConfig, DEFINITION_KINDS};
pub use tokens::{query_tokens, query_words};
pub use topk::TopK;
