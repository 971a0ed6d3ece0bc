use crate::budget::{WorkBudget, WorkBudgetConfig, DEFAULT_CHECK_EVERY};
use crate::error::{GraphError, Result};
use crate::expansion::{expand_neighborhood, Expansion, ExpansionPolicy, ExpansionStop};
use crate::graph::GraphContext;
use context_protocol::{StopReason, Truncation, TruncationDetail};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const DEFAULT_MAX_GRAPH_WORK_UNITS: u64 = 500;

/// Which top-ranked candidates seed the neighborhood expansion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SeedSelection {
    #[default]
    Top1,
    TopK,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphRankingConfig {
    pub enabled: bool,
    pub degree_weight: f64,
    pub proximity_weight: f64,
    pub seed_selection: SeedSelection,
    /// Number of seeds for [`SeedSelection::TopK`]
    pub seed_k: usize,
    pub expansion: ExpansionPolicy,
    pub max_work_units: Option<u64>,
    pub max_wall_clock_ms: Option<u64>,
    pub check_every: u64,
}

impl Default for GraphRankingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            degree_weight: 0.02,
            proximity_weight: 0.5,
            seed_selection: SeedSelection::Top1,
            seed_k: 3,
            expansion: ExpansionPolicy::default(),
            max_work_units: Some(DEFAULT_MAX_GRAPH_WORK_UNITS),
            max_wall_clock_ms: None,
            check_every: DEFAULT_CHECK_EVERY,
        }
    }
}

impl GraphRankingConfig {
    /// Graph ranking only runs when enabled with at least one nonzero weight.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && (self.degree_weight != 0.0 || self.proximity_weight != 0.0)
    }

    #[must_use]
    pub const fn budget_config(&self) -> WorkBudgetConfig {
        WorkBudgetConfig {
            max_units: self.max_work_units,
            max_wall_clock_ms: self.max_wall_clock_ms,
            check_every: self.check_every,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.degree_weight.is_finite() || !self.proximity_weight.is_finite() {
            return Err(GraphError::InvalidConfig(
                "graph weights must be finite".to_string(),
            ));
        }
        if self.check_every == 0 {
            return Err(GraphError::InvalidConfig(
                "graph.check_every must be > 0".to_string(),
            ));
        }
        if self.seed_selection == SeedSelection::TopK && self.seed_k == 0 {
            return Err(GraphError::InvalidConfig(
                "graph.seed_k must be > 0 for topK seeding".to_string(),
            ));
        }
        Ok(())
    }
}

/// A candidate that graph ranking can rescore.
pub trait GraphRankable {
    fn graph_node_id(&self) -> Option<&str>;
    fn score(&self) -> f64;
    /// Adds `adjustment.score` to the candidate's score.
    fn apply_graph_score(&mut self, adjustment: &GraphAdjustment);
}

/// Additive graph contribution for a single candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphAdjustment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub score: f64,
    pub degree: usize,
    pub proximity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_distance: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRankingStats {
    pub applied: bool,
    pub seeds: usize,
    pub visited_nodes: usize,
    pub expanded_nodes: usize,
    pub width_limited_nodes: usize,
    pub depth_limited_nodes: usize,
    pub work_units_used: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRankingExplain {
    pub degree_weight: f64,
    pub proximity_weight: f64,
    pub seed_selection: SeedSelection,
    pub seeds: Vec<String>,
    pub max_depth: usize,
    pub max_width_per_node: usize,
    pub max_visited_nodes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_work_units: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<ExpansionStop>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncation: Option<Truncation>,
    pub candidates: Vec<GraphAdjustment>,
    #[serde(skip_serializing_if = "is_zero")]
    pub omitted_seeds: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub omitted_candidates: usize,
}

impl GraphRankingExplain {
    /// Caps the seed and candidate lists at `max_items`, counting what was cut.
    #[must_use]
    pub fn bounded(mut self, max_items: usize) -> Self {
        self.omitted_seeds += self.seeds.len().saturating_sub(max_items);
        self.seeds.truncate(max_items);
        self.omitted_candidates += self.candidates.len().saturating_sub(max_items);
        self.candidates.truncate(max_items);
        self
    }
}

const fn is_zero(n: &usize) -> bool {
    *n == 0
}

#[derive(Debug, Clone)]
pub struct GraphRankingOutcome<C> {
    pub candidates: Vec<C>,
    pub stats: GraphRankingStats,
    pub explain: Option<GraphRankingExplain>,
}

/// Adds `degree_weight * degree + proximity_weight * proximity` to every
/// candidate and re-sorts by `(score desc, input position asc)`.
///
/// The output is always a permutation of the input; nothing is filtered.
pub fn apply_graph_ranking<C: GraphRankable>(
    candidates: Vec<C>,
    graph: &GraphContext,
    config: &GraphRankingConfig,
    explain: bool,
) -> GraphRankingOutcome<C> {
    if !config.is_active() || candidates.is_empty() {
        return GraphRankingOutcome {
            candidates,
            stats: GraphRankingStats::default(),
            explain: None,
        };
    }

    let seeds = select_seeds(&candidates, config);
    let mut budget = WorkBudget::new(config.budget_config());
    let mut resolver = graph.neighbor_resolver();
    let expansion = expand_neighborhood(&seeds, &mut resolver, &config.expansion, &mut budget);

    let mut adjustments = Vec::new();
    let mut ranked: Vec<(usize, C)> = candidates.into_iter().enumerate().collect();
    for (_, candidate) in &mut ranked {
        let adjustment = adjustment_for(candidate.graph_node_id(), graph, &expansion, config);
        candidate.apply_graph_score(&adjustment);
        if explain {
            adjustments.push(adjustment);
        }
    }
    ranked.sort_by(|(ia, a), (ib, b)| compare_scores(a.score(), b.score()).then_with(|| ia.cmp(ib)));

    let stop_reason = expansion.stop_reason();
    let stats = GraphRankingStats {
        applied: true,
        seeds: seeds.len(),
        visited_nodes: expansion.visited_nodes(),
        expanded_nodes: expansion.expanded_nodes,
        width_limited_nodes: expansion.width_limited_nodes,
        depth_limited_nodes: expansion.depth_limited_nodes,
        work_units_used: budget.used(),
        stop_reason,
    };
    log::debug!(
        "graph ranking: seeds={} visited={} units={} stop={:?}",
        stats.seeds,
        stats.visited_nodes,
        stats.work_units_used,
        stop_reason
    );

    let explain = explain.then(|| GraphRankingExplain {
        degree_weight: config.degree_weight,
        proximity_weight: config.proximity_weight,
        seed_selection: config.seed_selection,
        seeds: seeds.clone(),
        max_depth: config.expansion.max_depth,
        max_width_per_node: config.expansion.max_width_per_node,
        max_visited_nodes: config.expansion.max_visited_nodes,
        max_work_units: config.max_work_units,
        stop_reason,
        stop: expansion.stop.clone(),
        truncation: budget.build_truncation(
            "graph",
            TruncationDetail {
                observed: Some(expansion.visited_nodes() as u64),
                omitted: None,
                at: expansion.stop.as_ref().and_then(|s| s.at_node.clone()),
            },
        ),
        candidates: adjustments,
        omitted_seeds: 0,
        omitted_candidates: 0,
    });

    GraphRankingOutcome {
        candidates: ranked.into_iter().map(|(_, c)| c).collect(),
        stats,
        explain,
    }
}

fn select_seeds<C: GraphRankable>(candidates: &[C], config: &GraphRankingConfig) -> Vec<String> {
    let take = match config.seed_selection {
        SeedSelection::None => return Vec::new(),
        SeedSelection::Top1 => 1,
        SeedSelection::TopK => config.seed_k.max(1),
    };
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        compare_scores(candidates[a].score(), candidates[b].score()).then_with(|| a.cmp(&b))
    });
    order
        .into_iter()
        .filter_map(|i| candidates[i].graph_node_id())
        .filter(|id| !id.is_empty())
        .take(take)
        .map(str::to_string)
        .collect()
}

fn adjustment_for(
    node_id: Option<&str>,
    graph: &GraphContext,
    expansion: &Expansion,
    config: &GraphRankingConfig,
) -> GraphAdjustment {
    let degree = node_id.map(|id| graph.degree(id)).unwrap_or(0);
    let seed_distance = node_id.and_then(|id| expansion.seed_distance(id));
    let proximity = match seed_distance {
        Some(0) => 1.0,
        Some(d) => 1.0 / (d as f64 + 1.0),
        None => 0.0,
    };
    GraphAdjustment {
        node_id: node_id.map(str::to_string),
        score: config.degree_weight * degree as f64 + config.proximity_weight * proximity,
        degree,
        proximity,
        seed_distance,
    }
}

/// Descending order with non-finite scores treated as zero.
fn compare_scores(a: f64, b: f64) -> Ordering {
    let a = if a.is_finite() { a } else { 0.0 };
    let b = if b.is_finite() { b } else { 0.0 };
    b.total_cmp(&a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GraphNode, GraphPayload, GraphRelations};
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: Option<&'static str>,
        score: f64,
    }

    impl GraphRankable for Item {
        fn graph_node_id(&self) -> Option<&str> {
            self.id
        }

        fn score(&self) -> f64 {
            self.score
        }

        fn apply_graph_score(&mut self, adjustment: &GraphAdjustment) {
            self.score += adjustment.score;
        }
    }

    fn context() -> GraphContext {
        GraphContext::from_relations(&GraphRelations {
            call_graph: Some(GraphPayload::new(vec![
                GraphNode::new("a").out_edge("b"),
                GraphNode::new("hub").out_edge("x").out_edge("y").out_edge("z"),
            ])),
            usage_graph: None,
        })
    }

    fn enabled(degree_weight: f64, proximity_weight: f64) -> GraphRankingConfig {
        GraphRankingConfig {
            enabled: true,
            degree_weight,
            proximity_weight,
            ..Default::default()
        }
    }

    #[test]
    fn disabled_config_is_a_no_op() {
        let items = vec![
            Item { id: Some("b"), score: 1.0 },
            Item { id: Some("a"), score: 2.0 },
        ];
        let mut cfg = enabled(0.0, 0.0);
        let out = apply_graph_ranking(items.clone(), &context(), &cfg, true);
        assert_eq!(out.candidates, items);
        assert!(!out.stats.applied);
        assert!(out.explain.is_none());

        cfg = enabled(1.0, 1.0);
        cfg.enabled = false;
        let out = apply_graph_ranking(items.clone(), &context(), &cfg, false);
        assert_eq!(out.candidates, items);
    }

    #[test]
    fn proximity_to_seed_lifts_neighbor() {
        let items = vec![
            Item { id: Some("a"), score: 1.0 },
            Item { id: Some("other"), score: 0.9 },
            Item { id: Some("b"), score: 0.8 },
        ];
        let out = apply_graph_ranking(items, &context(), &enabled(0.0, 0.5), true);
        let ids: Vec<_> = out.candidates.iter().map(|c| c.id.unwrap()).collect();
        assert_eq!(ids, vec!["a", "b", "other"]);
        assert!((out.candidates[0].score - 1.5).abs() < 1e-9);
        assert!((out.candidates[1].score - 1.05).abs() < 1e-9);

        let explain = out.explain.unwrap();
        assert_eq!(explain.seeds, vec!["a".to_string()]);
        assert_eq!(explain.candidates[2].seed_distance, Some(1));
        assert_eq!(explain.candidates[1].seed_distance, None);
        assert_eq!(explain.candidates[1].proximity, 0.0);
    }

    #[test]
    fn degree_weight_favors_hubs_and_ties_keep_input_order() {
        let items = vec![
            Item { id: None, score: 1.0 },
            Item { id: Some("hub"), score: 1.0 },
            Item { id: Some("missing"), score: 1.0 },
        ];
        let mut cfg = enabled(0.1, 0.0);
        cfg.seed_selection = SeedSelection::None;
        let out = apply_graph_ranking(items, &context(), &cfg, false);
        assert_eq!(out.candidates[0].id, Some("hub"));
        assert_eq!(out.candidates[1].id, None);
        assert_eq!(out.candidates[2].id, Some("missing"));
        assert_eq!(out.stats.seeds, 0);
    }

    #[test]
    fn top_k_seeding_uses_highest_scores() {
        let items = vec![
            Item { id: Some("x"), score: 0.1 },
            Item { id: Some("a"), score: 0.9 },
            Item { id: None, score: 0.8 },
            Item { id: Some("hub"), score: 0.7 },
        ];
        let mut cfg = enabled(0.0, 1.0);
        cfg.seed_selection = SeedSelection::TopK;
        cfg.seed_k = 2;
        let out = apply_graph_ranking(items, &context(), &cfg, true);
        assert_eq!(out.explain.unwrap().seeds, vec!["a".to_string(), "hub".to_string()]);
    }

    #[test]
    fn bounded_explain_caps_lists_and_counts_the_rest() {
        let items = vec![
            Item { id: Some("a"), score: 0.9 },
            Item { id: Some("hub"), score: 0.8 },
            Item { id: Some("x"), score: 0.7 },
            Item { id: Some("b"), score: 0.6 },
        ];
        let mut cfg = enabled(0.1, 1.0);
        cfg.seed_selection = SeedSelection::TopK;
        cfg.seed_k = 3;
        let explain = apply_graph_ranking(items, &context(), &cfg, true)
            .explain
            .unwrap()
            .bounded(2);
        assert_eq!(explain.seeds, vec!["a".to_string(), "hub".to_string()]);
        assert_eq!(explain.omitted_seeds, 1);
        assert_eq!(explain.candidates.len(), 2);
        assert_eq!(explain.omitted_candidates, 2);

        let json = serde_json::to_value(&explain).unwrap();
        assert_eq!(json["omittedCandidates"], serde_json::json!(2));
        let untouched = serde_json::to_value(explain.bounded(8)).unwrap();
        assert_eq!(untouched["omittedSeeds"], serde_json::json!(1));
    }

    #[test]
    fn validate_rejects_non_finite_weights() {
        let cfg = enabled(f64::NAN, 0.0);
        assert!(cfg.validate().is_err());
        assert!(GraphRankingConfig::default().validate().is_ok());
    }
}
