use crate::types::{GraphPayload, GraphRelations};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};

/// Adjacency over one graph payload with O(1) id lookup.
///
/// Edges declared on either endpoint (`a.out` or `b.in`) collapse into a
/// single directed edge; self-loops are ignored.
#[derive(Debug, Clone, Default)]
pub struct GraphIndex {
    graph: DiGraph<String, ()>,
    node_index: HashMap<String, NodeIndex>,
}

impl GraphIndex {
    #[must_use]
    pub fn from_payload(payload: &GraphPayload) -> Self {
        let mut index = Self::default();
        for node in &payload.nodes {
            if node.id.is_empty() {
                continue;
            }
            let from = index.ensure_node(&node.id);
            for target in &node.out {
                if target.is_empty() {
                    continue;
                }
                let to = index.ensure_node(target);
                index.add_edge_once(from, to);
            }
            for source in &node.inbound {
                if source.is_empty() {
                    continue;
                }
                let src = index.ensure_node(source);
                index.add_edge_once(src, from);
            }
        }
        index
    }

    fn ensure_node(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.node_index.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.node_index.insert(id.to_string(), idx);
        idx
    }

    fn add_edge_once(&mut self, from: NodeIndex, to: NodeIndex) {
        if from != to && self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
        }
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    #[must_use]
    pub fn out_degree(&self, id: &str) -> usize {
        self.directed_count(id, Direction::Outgoing)
    }

    #[must_use]
    pub fn in_degree(&self, id: &str) -> usize {
        self.directed_count(id, Direction::Incoming)
    }

    #[must_use]
    pub fn degree(&self, id: &str) -> usize {
        self.out_degree(id) + self.in_degree(id)
    }

    fn directed_count(&self, id: &str, direction: Direction) -> usize {
        self.node_index
            .get(id)
            .map(|&idx| self.graph.neighbors_directed(idx, direction).count())
            .unwrap_or(0)
    }

    /// Callees/used ids followed by callers/users, unsorted.
    pub fn neighbors<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a str> + 'a {
        let idx = self.node_index.get(id).copied();
        idx.into_iter().flat_map(move |idx| {
            self.graph
                .neighbors_directed(idx, Direction::Outgoing)
                .chain(self.graph.neighbors_directed(idx, Direction::Incoming))
                .filter_map(move |n| self.graph.node_weight(n).map(String::as_str))
        })
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Call graph and usage graph consulted together for ranking.
#[derive(Debug, Clone, Default)]
pub struct GraphContext {
    call: GraphIndex,
    usage: GraphIndex,
}

impl GraphContext {
    #[must_use]
    pub fn from_relations(relations: &GraphRelations) -> Self {
        let call = relations
            .call_graph
            .as_ref()
            .map(GraphIndex::from_payload)
            .unwrap_or_default();
        let usage = relations
            .usage_graph
            .as_ref()
            .map(GraphIndex::from_payload)
            .unwrap_or_default();
        log::debug!(
            "graph context: call={} nodes/{} edges, usage={} nodes/{} edges",
            call.node_count(),
            call.edge_count(),
            usage.node_count(),
            usage.edge_count()
        );
        Self { call, usage }
    }

    #[must_use]
    pub const fn call_graph(&self) -> &GraphIndex {
        &self.call
    }

    #[must_use]
    pub const fn usage_graph(&self) -> &GraphIndex {
        &self.usage
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.call.node_count() == 0 && self.usage.node_count() == 0
    }

    /// `out + in` degree summed across both graphs.
    #[must_use]
    pub fn degree(&self, id: &str) -> usize {
        self.call.degree(id) + self.usage.degree(id)
    }

    #[must_use]
    pub fn neighbor_resolver(&self) -> NeighborResolver<'_> {
        NeighborResolver::new(self)
    }
}

/// Merges call and usage adjacency per node and caches the sorted,
/// deduplicated result for the lifetime of one traversal.
#[derive(Debug)]
pub struct NeighborResolver<'a> {
    context: &'a GraphContext,
    cache: HashMap<String, Vec<String>>,
}

impl<'a> NeighborResolver<'a> {
    #[must_use]
    pub fn new(context: &'a GraphContext) -> Self {
        Self {
            context,
            cache: HashMap::new(),
        }
    }

    pub fn neighbors(&mut self, id: &str) -> &[String] {
        let context = self.context;
        self.cache
            .entry(id.to_string())
            .or_insert_with(|| {
                let merged: BTreeSet<&str> = context
                    .call
                    .neighbors(id)
                    .chain(context.usage.neighbors(id))
                    .collect();
                merged.into_iter().map(str::to_string).collect()
            })
            .as_slice()
    }

    #[must_use]
    pub fn cached_nodes(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GraphNode;
    use pretty_assertions::assert_eq;

    fn relations() -> GraphRelations {
        GraphRelations {
            call_graph: Some(GraphPayload::new(vec![
                GraphNode::new("a").out_edge("c").out_edge("b"),
                GraphNode::new("b").in_edge("a"),
                GraphNode::new("d").out_edge("d"),
            ])),
            usage_graph: Some(GraphPayload::new(vec![
                GraphNode::new("a").out_edge("b").out_edge("e"),
                GraphNode::new("z").out_edge("a"),
            ])),
        }
    }

    #[test]
    fn edges_declared_twice_are_collapsed() {
        let ctx = GraphContext::from_relations(&relations());
        assert_eq!(ctx.call_graph().out_degree("a"), 2);
        assert_eq!(ctx.call_graph().in_degree("b"), 1);
        assert_eq!(ctx.call_graph().degree("d"), 0, "self-loops are ignored");
    }

    #[test]
    fn degree_sums_both_graphs() {
        let ctx = GraphContext::from_relations(&relations());
        // call: a->b, a->c ; usage: a->b, a->e, z->a
        assert_eq!(ctx.degree("a"), 2 + 3);
        assert_eq!(ctx.degree("missing"), 0);
    }

    #[test]
    fn resolver_merges_sorted_and_deduplicated() {
        let ctx = GraphContext::from_relations(&relations());
        let mut resolver = ctx.neighbor_resolver();
        assert_eq!(resolver.neighbors("a"), ["b", "c", "e", "z"]);
        assert_eq!(resolver.neighbors("b"), ["a"]);
        assert!(resolver.neighbors("unknown").is_empty());
        assert_eq!(resolver.cached_nodes(), 3);
    }

    #[test]
    fn empty_relations_build_empty_context() {
        let ctx = GraphContext::from_relations(&GraphRelations::default());
        assert!(ctx.is_empty());
    }
}
