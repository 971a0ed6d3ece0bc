use crate::budget::WorkBudget;
use crate::graph::NeighborResolver;
use context_protocol::StopReason;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Caps for a bounded neighborhood expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExpansionPolicy {
    pub max_depth: usize,
    pub max_width_per_node: usize,
    pub max_visited_nodes: usize,
}

impl Default for ExpansionPolicy {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_width_per_node: 16,
            max_visited_nodes: 256,
        }
    }
}

/// Where and why a traversal halted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionStop {
    pub reason: StopReason,
    pub limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_depth: Option<usize>,
}

/// Result of [`expand_neighborhood`]: minimum seed distance per reached node
/// plus the limits that shaped the traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expansion {
    pub depth_by_node: BTreeMap<String, usize>,
    pub expanded_nodes: usize,
    pub width_limited_nodes: usize,
    pub depth_limited_nodes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<ExpansionStop>,
}

impl Expansion {
    #[must_use]
    pub fn seed_distance(&self, id: &str) -> Option<usize> {
        self.depth_by_node.get(id).copied()
    }

    #[must_use]
    pub fn visited_nodes(&self) -> usize {
        self.depth_by_node.len()
    }

    /// Hard stop reason if the traversal halted, otherwise the soft cap that
    /// pruned it (width before depth), otherwise `None`.
    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        if let Some(stop) = &self.stop {
            return Some(stop.reason);
        }
        if self.width_limited_nodes > 0 {
            return Some(StopReason::MaxWidthPerNode);
        }
        if self.depth_limited_nodes > 0 {
            return Some(StopReason::MaxDepth);
        }
        None
    }

    fn halt(&mut self, reason: StopReason, limit: u64, node: &str, depth: usize) {
        log::debug!("graph expansion stopped: reason={reason} limit={limit} node={node} depth={depth}");
        self.stop = Some(ExpansionStop {
            reason,
            limit,
            at_node: Some(node.to_string()),
            at_depth: Some(depth),
        });
    }
}

/// Breadth-first expansion from `seeds` (distance 0).
///
/// Every retained neighbor costs one budget unit, consumed in frontier order,
/// so identical inputs always produce identical output.
pub fn expand_neighborhood(
    seeds: &[String],
    resolver: &mut NeighborResolver<'_>,
    policy: &ExpansionPolicy,
    budget: &mut WorkBudget,
) -> Expansion {
    let mut state = Expansion::default();
    let mut frontier: VecDeque<String> = VecDeque::new();
    let visited_limit = policy.max_visited_nodes as u64;

    for seed in seeds {
        if seed.is_empty() || state.depth_by_node.contains_key(seed) {
            continue;
        }
        if state.depth_by_node.len() >= policy.max_visited_nodes {
            state.halt(StopReason::MaxVisitedNodes, visited_limit, seed, 0);
            return state;
        }
        state.depth_by_node.insert(seed.clone(), 0);
        frontier.push_back(seed.clone());
    }

    'frontier: while let Some(node) = frontier.pop_front() {
        let depth = state.depth_by_node.get(&node).copied().unwrap_or(0);
        if depth >= policy.max_depth {
            state.depth_limited_nodes += 1;
            continue;
        }
        state.expanded_nodes += 1;

        let mut neighbors = resolver.neighbors(&node);
        if neighbors.len() > policy.max_width_per_node {
            neighbors = &neighbors[..policy.max_width_per_node];
            state.width_limited_nodes += 1;
        }

        let next_depth = depth + 1;
        for neighbor in neighbors {
            let budget_state = budget.consume(1);
            if budget_state.stopped {
                let reason = budget_state.reason.unwrap_or(StopReason::MaxWorkUnits);
                let limit = budget_state.limit.unwrap_or(budget_state.used);
                state.halt(reason, limit, &node, depth);
                break 'frontier;
            }

            match state.depth_by_node.get(neighbor).copied() {
                Some(known) if known <= next_depth => {}
                Some(_) => {
                    state.depth_by_node.insert(neighbor.clone(), next_depth);
                }
                None => {
                    if state.depth_by_node.len() >= policy.max_visited_nodes {
                        state.halt(StopReason::MaxVisitedNodes, visited_limit, &node, depth);
                        break 'frontier;
                    }
                    state.depth_by_node.insert(neighbor.clone(), next_depth);
                    frontier.push_back(neighbor.clone());
                }
            }
        }
    }

    state
}
