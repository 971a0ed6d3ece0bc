use crate::ann_policy::AnnCandidatePolicy;
use crate::candidate::{BlendInfo, RrfInfo, ScoreType};
use crate::phrase::PhraseBoost;
use crate::relation_boost::RelationBoostResult;
use crate::symbol::SymbolBoost;
use context_graph::GraphAdjustment;
use context_protocol::{enforce_max_bytes, ExplainLimits, StopReason, EXPLAIN_SCHEMA_VERSION};
use serde::Serialize;
use serde_json::{Map, Value};

/// Top-level sections in the order they are sacrificed under budget pressure.
pub const PRUNE_ORDER: [&str; 8] = [
    "graph", "relation", "symbol", "phrase", "blend", "rrf", "ann", "sparse",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedScore {
    #[serde(rename = "type")]
    pub score_type: ScoreType,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SparseExplain {
    pub score: f64,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnExplain {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_policy: Option<AnnCandidatePolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphHitExplain {
    #[serde(flatten)]
    pub adjustment: GraphAdjustment,
    pub seeds: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

/// Per-hit trace of how the final score was composed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub schema_version: u32,
    pub selected: SelectedScore,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse: Option<SparseExplain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ann: Option<AnnExplain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrf: Option<RrfInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blend: Option<BlendInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<SymbolBoost>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phrase: Option<PhraseBoost>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<RelationBoostResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphHitExplain>,
}

impl ScoreBreakdown {
    #[must_use]
    pub const fn new(score_type: ScoreType, score: f64) -> Self {
        Self {
            schema_version: EXPLAIN_SCHEMA_VERSION,
            selected: SelectedScore { score_type, score },
            sparse: None,
            ann: None,
            rrf: None,
            blend: None,
            symbol: None,
            phrase: None,
            relation: None,
            graph: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainPruning {
    pub dropped_sections: Vec<String>,
    pub clamped_arrays: usize,
    pub trimmed_fields: usize,
    pub minimal: bool,
}

impl ExplainPruning {
    #[must_use]
    pub fn pruned(&self) -> bool {
        self.minimal
            || self.clamped_arrays > 0
            || self.trimmed_fields > 0
            || !self.dropped_sections.is_empty()
    }
}

/// Bounds an explain payload by array length, field count and encoded size.
///
/// Arrays are clamped to `max_explain_items` and nested objects to
/// `max_fields` keys. Top-level sections are then dropped in [`PRUNE_ORDER`]
/// until both the field count and `max_bytes` fit. If that is not enough the
/// payload collapses to `{schemaVersion, selected}`, then `{selected}`, then
/// `{}`.
pub fn enforce_explain_budget(value: Value, limits: &ExplainLimits) -> (Value, ExplainPruning) {
    let mut pruning = ExplainPruning::default();
    let mut top = match value {
        Value::Object(map) => map,
        other => return (other, pruning),
    };
    let selected = top.get("selected").cloned();

    for child in top.values_mut() {
        clamp_nested(child, limits, &mut pruning);
    }

    let mut order = PRUNE_ORDER.iter();
    while top.len() > limits.max_fields {
        match order.next() {
            Some(section) => drop_section(&mut top, section, &mut pruning),
            None => break,
        }
    }

    let mut candidate = Value::Object(top);
    let fits = top_len(&candidate) <= limits.max_fields
        && enforce_max_bytes(&mut candidate, limits.max_bytes, |value| {
            let Value::Object(map) = value else {
                return false;
            };
            match order.by_ref().find(|section| map.contains_key(**section)) {
                Some(section) => {
                    drop_section(map, section, &mut pruning);
                    true
                }
                None => false,
            }
        })
        .ok()
        .flatten()
        .is_some();
    if fits {
        if pruning.pruned() {
            log::debug!("Explain pruned: {pruning:?}");
        }
        return (candidate, pruning);
    }

    pruning.minimal = true;
    let mut fallbacks = Vec::new();
    if let Some(selected) = selected {
        let mut full = Map::new();
        full.insert("schemaVersion".to_string(), Value::from(EXPLAIN_SCHEMA_VERSION));
        full.insert("selected".to_string(), selected.clone());
        fallbacks.push(Value::Object(full));
        let mut bare = Map::new();
        bare.insert("selected".to_string(), selected);
        fallbacks.push(Value::Object(bare));
    }
    let minimal = fallbacks
        .into_iter()
        .find(|v| {
            top_len(v) <= limits.max_fields
                && context_protocol::serialized_len(v).is_ok_and(|len| len <= limits.max_bytes)
        })
        .unwrap_or_else(|| Value::Object(Map::new()));
    log::debug!("Explain collapsed to minimal summary: {pruning:?}");
    (minimal, pruning)
}

fn top_len(value: &Value) -> usize {
    value.as_object().map_or(0, Map::len)
}

fn drop_section(map: &mut Map<String, Value>, section: &str, pruning: &mut ExplainPruning) {
    if map.remove(section).is_some() {
        pruning.dropped_sections.push(section.to_string());
    }
}

fn clamp_nested(value: &mut Value, limits: &ExplainLimits, pruning: &mut ExplainPruning) {
    match value {
        Value::Array(items) => {
            if items.len() > limits.max_explain_items {
                items.truncate(limits.max_explain_items);
                pruning.clamped_arrays += 1;
            }
            for item in items {
                clamp_nested(item, limits, pruning);
            }
        }
        Value::Object(map) => {
            if map.len() > limits.max_fields {
                let extra: Vec<String> = map.keys().skip(limits.max_fields).cloned().collect();
                pruning.trimmed_fields += extra.len();
                for key in extra {
                    map.remove(&key);
                }
            }
            for child in map.values_mut() {
                clamp_nested(child, limits, pruning);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn limits(max_bytes: usize, max_fields: usize, max_explain_items: usize) -> ExplainLimits {
        ExplainLimits {
            max_bytes,
            max_fields,
            max_explain_items,
        }
    }

    #[test]
    fn small_payload_is_untouched() {
        let value = serde_json::to_value(ScoreBreakdown::new(ScoreType::Sparse, 1.5)).unwrap();
        let (out, pruning) = enforce_explain_budget(value.clone(), &ExplainLimits::default());
        assert_eq!(out, value);
        assert!(!pruning.pruned());
    }

    #[test]
    fn sections_drop_in_priority_order() {
        let value = json!({
            "schemaVersion": 1,
            "selected": {"type": "rrf", "score": 0.5},
            "sparse": {"score": 1.0},
            "ann": {"score": 0.9},
            "graph": {"score": 0.1},
            "relation": {"boost": 0.2}
        });
        let (out, pruning) = enforce_explain_budget(value, &limits(16_384, 4, 64));
        assert_eq!(pruning.dropped_sections, vec!["graph", "relation"]);
        let keys: Vec<&String> = out.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["ann", "schemaVersion", "selected", "sparse"]);
    }

    #[test]
    fn byte_budget_falls_back_to_selected() {
        let value = json!({
            "schemaVersion": 1,
            "selected": {"type": "sparse", "score": 2.0},
            "sparse": {"score": 2.0, "terms": ["x".repeat(200)]}
        });
        let (out, pruning) = enforce_explain_budget(value, &limits(64, 64, 64));
        assert_eq!(pruning.dropped_sections, vec!["sparse"]);
        assert!(!pruning.minimal);
        assert_eq!(out["selected"]["score"], json!(2.0));

        let value = json!({"schemaVersion": 1, "selected": {"type": "sparse", "score": 2.0}});
        let (out, pruning) = enforce_explain_budget(value, &limits(48, 64, 64));
        assert!(pruning.minimal);
        assert_eq!(out, json!({"selected": {"type": "sparse", "score": 2.0}}));

        let (out, _) = enforce_explain_budget(out, &limits(4, 64, 64));
        assert_eq!(out, json!({}));
    }

    #[test]
    fn nested_objects_and_arrays_are_clamped() {
        let value = json!({
            "selected": {"type": "ann", "score": 1.0},
            "ann": {"a": 1, "b": 2, "c": 3, "hits": [1, 2, 3, 4, 5]}
        });
        let (out, pruning) = enforce_explain_budget(value, &limits(16_384, 3, 2));
        assert_eq!(pruning.trimmed_fields, 1);
        assert_eq!(out["ann"], json!({"a": 1, "b": 2, "c": 3}));

        let value = json!({"selected": {"type": "ann", "score": 1.0}, "ann": {"hits": [1, 2, 3]}});
        let (out, pruning) = enforce_explain_budget(value, &limits(16_384, 3, 2));
        assert_eq!(pruning.clamped_arrays, 1);
        assert_eq!(out["ann"]["hits"], json!([1, 2]));
    }
}
