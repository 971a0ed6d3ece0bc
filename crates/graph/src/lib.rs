//! # Context Graph
//!
//! Relevance propagation over call and usage graphs, bounded by explicit
//! work budgets.
//!
//! ## Architecture
//!
//! ```text
//! GraphRelations {callGraph, usageGraph}
//!     │
//!     ├──> GraphIndex (petgraph, id -> node in O(1))
//!     │
//!     ├──> NeighborResolver (merged, sorted, deduplicated, cached)
//!     │
//!     ├──> expand_neighborhood (BFS from seeds, consumes WorkBudget)
//!     │      └─ depth map + width/depth/visited/budget stop descriptor
//!     │
//!     └──> apply_graph_ranking
//!            ├─ degree + seed proximity -> additive score
//!            └─ stable re-sort, optional explain block
//! ```

mod budget;
mod error;
mod expansion;
mod graph;
mod ranking;
mod types;

pub use budget::{BudgetState, BudgetStop, WorkBudget, WorkBudgetConfig, DEFAULT_CHECK_EVERY};
pub use error::{GraphError, Result};
pub use expansion::{expand_neighborhood, Expansion, ExpansionPolicy, ExpansionStop};
pub use graph::{GraphContext, GraphIndex, NeighborResolver};
pub use ranking::{
    apply_graph_ranking, GraphAdjustment, GraphRankable, GraphRankingConfig,
    GraphRankingExplain, GraphRankingOutcome, GraphRankingStats, SeedSelection,
    DEFAULT_MAX_GRAPH_WORK_UNITS,
};
pub use types::{GraphNode, GraphPayload, GraphRelations};
