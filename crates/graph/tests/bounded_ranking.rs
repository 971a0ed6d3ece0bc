use context_graph::{
    apply_graph_ranking, expand_neighborhood, ExpansionPolicy, GraphAdjustment, GraphContext,
    GraphNode, GraphPayload, GraphRankable, GraphRankingConfig, GraphRelations, SeedSelection,
    WorkBudget, WorkBudgetConfig,
};
use context_protocol::StopReason;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Hit {
    idx: usize,
    node: Option<String>,
    score: f64,
}

impl GraphRankable for Hit {
    fn graph_node_id(&self) -> Option<&str> {
        self.node.as_deref()
    }

    fn score(&self) -> f64 {
        self.score
    }

    fn apply_graph_score(&mut self, adjustment: &GraphAdjustment) {
        self.score += adjustment.score;
    }
}

fn fan_out_graph() -> GraphContext {
    GraphContext::from_relations(&GraphRelations {
        call_graph: Some(GraphPayload::new(vec![GraphNode::new("a")
            .out_edge("b")
            .out_edge("c")
            .out_edge("d")
            .out_edge("e")])),
        usage_graph: None,
    })
}

#[test]
fn width_cap_is_reported_as_stop_reason() {
    let graph = fan_out_graph();
    let policy = ExpansionPolicy {
        max_depth: 2,
        max_width_per_node: 2,
        max_visited_nodes: 8,
    };
    let mut resolver = graph.neighbor_resolver();
    let mut budget = WorkBudget::unbounded();
    let expansion = expand_neighborhood(&["a".to_string()], &mut resolver, &policy, &mut budget);

    assert_eq!(expansion.stop_reason(), Some(StopReason::MaxWidthPerNode));
    assert!(expansion.width_limited_nodes > 0);
    assert!(expansion
        .depth_by_node
        .values()
        .all(|&distance| distance <= policy.max_depth));
    assert_eq!(expansion.seed_distance("b"), Some(1));
    assert_eq!(expansion.seed_distance("c"), Some(1));
    assert_eq!(expansion.seed_distance("d"), None, "sorted order keeps b and c only");
}

#[test]
fn width_cap_flows_into_ranking_explain() {
    let graph = fan_out_graph();
    let config = GraphRankingConfig {
        enabled: true,
        degree_weight: 0.0,
        proximity_weight: 1.0,
        expansion: ExpansionPolicy {
            max_depth: 2,
            max_width_per_node: 2,
            max_visited_nodes: 8,
        },
        ..Default::default()
    };
    let hits = vec![
        Hit { idx: 0, node: Some("a".into()), score: 3.0 },
        Hit { idx: 1, node: Some("e".into()), score: 2.0 },
        Hit { idx: 2, node: Some("b".into()), score: 1.0 },
    ];
    let out = apply_graph_ranking(hits, &graph, &config, true);
    let explain = out.explain.unwrap();
    assert_eq!(explain.stop_reason, Some(StopReason::MaxWidthPerNode));
    assert_eq!(out.stats.stop_reason, Some(StopReason::MaxWidthPerNode));
    for entry in &explain.candidates {
        if let Some(distance) = entry.seed_distance {
            assert!(distance <= 2);
        }
    }
    assert!(explain.truncation.is_none(), "width caps are not budget truncations");
}

#[test]
fn budget_exhaustion_produces_truncation_record() {
    let graph = fan_out_graph();
    let config = GraphRankingConfig {
        enabled: true,
        proximity_weight: 1.0,
        max_work_units: Some(2),
        ..Default::default()
    };
    let hits = vec![Hit { idx: 0, node: Some("a".into()), score: 1.0 }];
    let out = apply_graph_ranking(hits, &graph, &config, true);
    let explain = out.explain.unwrap();
    assert_eq!(explain.stop_reason, Some(StopReason::MaxWorkUnits));
    let truncation = explain.truncation.unwrap();
    assert_eq!(truncation.scope, "graph");
    assert_eq!(truncation.limit, 2);
    assert_eq!(truncation.at.as_deref(), Some("a"));
}

#[test]
fn shared_budget_is_respected_across_expansions() {
    let graph = fan_out_graph();
    let mut budget = WorkBudget::new(WorkBudgetConfig {
        max_units: Some(3),
        ..Default::default()
    });
    let policy = ExpansionPolicy {
        max_depth: 1,
        ..Default::default()
    };
    let mut resolver = graph.neighbor_resolver();
    let first = expand_neighborhood(&["b".to_string()], &mut resolver, &policy, &mut budget);
    assert!(first.stop.is_none());
    let second = expand_neighborhood(&["a".to_string()], &mut resolver, &policy, &mut budget);
    assert_eq!(second.stop_reason(), Some(StopReason::MaxWorkUnits));
    assert!(budget.should_stop());
}

fn random_graph() -> impl Strategy<Value = Vec<(u8, u8)>> {
    proptest::collection::vec((0u8..12, 0u8..12), 0..40)
}

fn build(edges: &[(u8, u8)]) -> GraphContext {
    let nodes = edges
        .iter()
        .map(|(a, b)| GraphNode::new(format!("n{a}")).out_edge(format!("n{b}")))
        .collect();
    GraphContext::from_relations(&GraphRelations {
        call_graph: Some(GraphPayload::new(nodes)),
        usage_graph: None,
    })
}

fn hits_from(scores: &[(u8, f64)]) -> Vec<Hit> {
    scores
        .iter()
        .enumerate()
        .map(|(idx, (node, score))| Hit {
            idx,
            node: (*node < 14).then(|| format!("n{node}")),
            score: *score,
        })
        .collect()
}

proptest! {
    #[test]
    fn ranking_preserves_membership(
        edges in random_graph(),
        scores in proptest::collection::vec((0u8..16, -5.0f64..5.0), 0..20),
        degree_weight in 0.0f64..1.0,
        proximity_weight in 0.0f64..1.0,
        top_k in proptest::bool::ANY,
    ) {
        let graph = build(&edges);
        let config = GraphRankingConfig {
            enabled: true,
            degree_weight,
            proximity_weight,
            seed_selection: if top_k { SeedSelection::TopK } else { SeedSelection::Top1 },
            ..Default::default()
        };
        let hits = hits_from(&scores);
        let mut before: Vec<usize> = hits.iter().map(|h| h.idx).collect();
        let out = apply_graph_ranking(hits, &graph, &config, false);
        let mut after: Vec<usize> = out.candidates.iter().map(|h| h.idx).collect();
        before.sort_unstable();
        after.sort_unstable();
        prop_assert_eq!(before, after);
        for pair in out.candidates.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn expansion_and_ranking_are_deterministic(
        edges in random_graph(),
        scores in proptest::collection::vec((0u8..16, 0.0f64..5.0), 1..20),
        max_width in 0usize..4,
        max_units in 1u64..30,
    ) {
        let graph = build(&edges);
        let config = GraphRankingConfig {
            enabled: true,
            degree_weight: 0.1,
            proximity_weight: 0.5,
            seed_selection: SeedSelection::TopK,
            seed_k: 2,
            expansion: ExpansionPolicy {
                max_depth: 3,
                max_width_per_node: max_width,
                max_visited_nodes: 64,
            },
            max_work_units: Some(max_units),
            ..Default::default()
        };
        let first = apply_graph_ranking(hits_from(&scores), &graph, &config, true);
        let second = apply_graph_ranking(hits_from(&scores), &graph, &config, true);
        prop_assert_eq!(&first.candidates, &second.candidates);
        let a = serde_json::to_string(&first.explain).unwrap();
        let b = serde_json::to_string(&second.explain).unwrap();
        prop_assert_eq!(a, b);
        prop_assert_eq!(first.stats, second.stats);
    }
}
