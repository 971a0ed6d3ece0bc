use crate::candidate::ChunkMeta;
use crate::lexicon::{Lexicon, LexiconStatus};
use crate::tokens::fold;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelationBoostConfig {
    pub enabled: bool,
    pub per_call: f64,
    pub per_use: f64,
    pub max_boost: f64,
    /// Cap on each token list reported in explain output
    pub max_explain_tokens: usize,
}

impl Default for RelationBoostConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_call: 0.25,
            per_use: 0.1,
            max_boost: 1.5,
            max_explain_tokens: 8,
        }
    }
}

impl RelationBoostConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("per_call", self.per_call),
            ("per_use", self.per_use),
            ("max_boost", self.max_boost),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(format!("relation.{name} must be a finite non-negative number"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationBoostResult {
    pub enabled: bool,
    pub call_matches: usize,
    pub usage_matches: usize,
    pub raw_boost: f64,
    pub boost: f64,
    pub signal_tokens: Vec<String>,
    pub matched_calls: Vec<String>,
    pub matched_usages: Vec<String>,
    /// Signal tokens that named neither a call target nor a usage
    pub unmatched_tokens: Vec<String>,
    pub lexicon: LexiconStatus,
}

/// `(raw, capped)` boost for the given match counts.
#[must_use]
pub fn score_relation_matches(
    call_matches: usize,
    usage_matches: usize,
    config: &RelationBoostConfig,
) -> (f64, f64) {
    let raw = call_matches as f64 * config.per_call + usage_matches as f64 * config.per_use;
    (raw, raw.min(config.max_boost))
}

/// Base name of a call target: `crate::io::read` -> `read`, `self.load()` -> `load`.
fn call_base_name(target: &str) -> &str {
    let target = target.trim();
    let target = target.split('(').next().unwrap_or(target);
    target
        .rsplit(|c: char| c == ':' || c == '.' || c == '>' || c == '/')
        .find(|part| !part.is_empty())
        .unwrap_or(target)
}

/// Per-query relation scorer; caches the stopword-filtered query tokens per
/// language.
pub struct RelationBooster<'a> {
    config: &'a RelationBoostConfig,
    lexicon: &'a dyn Lexicon,
    query_tokens: &'a [String],
    case_sensitive: bool,
    signal_by_language: HashMap<Option<String>, (Vec<String>, LexiconStatus)>,
}

impl<'a> RelationBooster<'a> {
    pub fn new(
        config: &'a RelationBoostConfig,
        lexicon: &'a dyn Lexicon,
        query_tokens: &'a [String],
        case_sensitive: bool,
    ) -> Self {
        Self {
            config,
            lexicon,
            query_tokens,
            case_sensitive,
            signal_by_language: HashMap::new(),
        }
    }

    fn signal_tokens(&mut self, language: Option<&str>) -> &(Vec<String>, LexiconStatus) {
        let key = language.map(str::to_ascii_lowercase);
        let lexicon = self.lexicon;
        let query_tokens = self.query_tokens;
        let case_sensitive = self.case_sensitive;
        self.signal_by_language.entry(key).or_insert_with(|| {
            let tokens = query_tokens
                .iter()
                .map(|t| fold(t, case_sensitive))
                .filter(|t| t.chars().count() > 1 && !lexicon.is_ranking_stopword(language, t))
                .collect();
            (tokens, lexicon.status(language))
        })
    }

    /// Additive, capped boost from query tokens that name the chunk's call
    /// targets or usages.
    pub fn compute(&mut self, chunk: &ChunkMeta) -> RelationBoostResult {
        let case_sensitive = self.case_sensitive;
        let config = self.config;
        let (signal, lexicon) = self.signal_tokens(chunk.language_hint()).clone();

        if !config.enabled || signal.is_empty() {
            return RelationBoostResult {
                enabled: config.enabled,
                call_matches: 0,
                usage_matches: 0,
                raw_boost: 0.0,
                boost: 0.0,
                signal_tokens: cap_sorted(signal.iter().cloned(), config.max_explain_tokens),
                matched_calls: Vec::new(),
                matched_usages: Vec::new(),
                unmatched_tokens: Vec::new(),
                lexicon,
            };
        }

        let relations = &chunk.code_relations;
        let calls: BTreeSet<String> = relations
            .calls
            .iter()
            .map(String::as_str)
            .chain(relations.call_details.iter().map(|d| d.target.as_str()))
            .map(call_base_name)
            .filter(|name| !name.is_empty())
            .map(|name| fold(name, case_sensitive))
            .collect();
        let usages: BTreeSet<String> = relations
            .usages
            .iter()
            .map(|u| fold(u.trim(), case_sensitive))
            .filter(|u| !u.is_empty())
            .collect();

        let signal_set: BTreeSet<&String> = signal.iter().collect();
        let matched_calls: Vec<String> = calls
            .iter()
            .filter(|c| signal_set.contains(c))
            .cloned()
            .collect();
        let matched_usages: Vec<String> = usages
            .iter()
            .filter(|u| signal_set.contains(u))
            .cloned()
            .collect();

        let unmatched: Vec<String> = signal
            .iter()
            .filter(|t| !calls.contains(t.as_str()) && !usages.contains(t.as_str()))
            .cloned()
            .collect();

        let (raw_boost, boost) =
            score_relation_matches(matched_calls.len(), matched_usages.len(), config);
        RelationBoostResult {
            enabled: true,
            call_matches: matched_calls.len(),
            usage_matches: matched_usages.len(),
            raw_boost,
            boost,
            signal_tokens: cap_sorted(signal.iter().cloned(), config.max_explain_tokens),
            matched_calls: cap_sorted(matched_calls, config.max_explain_tokens),
            matched_usages: cap_sorted(matched_usages, config.max_explain_tokens),
            unmatched_tokens: cap_sorted(unmatched, config.max_explain_tokens),
            lexicon,
        }
    }
}

fn cap_sorted(items: impl IntoIterator<Item = String>, cap: usize) -> Vec<String> {
    let mut items: Vec<String> = items.into_iter().collect();
    items.sort();
    items.dedup();
    items.truncate(cap);
    items
}
