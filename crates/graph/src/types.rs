use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Node of a call or usage graph, keyed by a stable chunk identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    #[serde(default)]
    pub id: String,

    /// Targets this node points at (callees, used symbols)
    #[serde(default)]
    pub out: Vec<String>,

    /// Sources pointing at this node (callers, users)
    #[serde(default, rename = "in")]
    pub inbound: Vec<String>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Builder: add outgoing edge
    #[must_use]
    pub fn out_edge(mut self, target: impl Into<String>) -> Self {
        self.out.push(target.into());
        self
    }

    /// Builder: add incoming edge
    #[must_use]
    pub fn in_edge(mut self, source: impl Into<String>) -> Self {
        self.inbound.push(source.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphPayload {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
}

impl GraphPayload {
    #[must_use]
    pub fn new(nodes: Vec<GraphNode>) -> Self {
        Self { nodes }
    }
}

/// Relations payload as produced by the indexer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRelations {
    #[serde(default)]
    pub call_graph: Option<GraphPayload>,

    #[serde(default)]
    pub usage_graph: Option<GraphPayload>,
}

impl GraphRelations {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
