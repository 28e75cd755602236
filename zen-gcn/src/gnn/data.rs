/**
 * @file zen-gcn/src/gnn/data.rs
 * @brief Graph data structures for message passing
 *
 * This module holds the graph representation consumed by the GCN layers:
 * a node feature matrix plus an adjacency list with forward and backward
 * lookup tables. Edges are directed; undirected input is symmetrized so that
 * every undirected edge carries messages both ways.
 *
 * ## Key Data Structures:
 *
 * - **GraphData**: node features, connectivity and optional metadata
 * - **AdjacencyList**: edge list with per-node outgoing/incoming lookups
 * - **LabeledNodes**: the supervised subset used by semi-supervised training
 *
 * Every node carries a per-node list of incoming edge indices, kept in edge
 * order. Reducers walk these lists so the accumulation order for a node never
 * depends on how the work is scheduled.
 *
 * @see crate::gnn::aggregation Reducers over incoming edges
 * @see crate::gnn::karate Built-in karate club graph
 */

use std::collections::{HashMap, HashSet};

use ndarray::{Array2, ArrayView1};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{GNNError, GNNResult};

// === TYPE ALIASES FOR CLARITY ===

/// Node feature matrix type: [num_nodes, node_feature_dim]
pub type NodeFeatures = Array2<f32>;

/// Node index type for graph operations
pub type NodeIndex = usize;

/// Edge index type for graph operations
pub type EdgeIndex = usize;

// === CORE DATA STRUCTURES ===

/// A graph with dense node features
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct GraphData {
    /// Node feature matrix: [num_nodes, node_feature_dim]
    pub node_features: NodeFeatures,

    /// Directed connectivity
    pub adjacency_list: AdjacencyList,

    /// Graph metadata (ground-truth labels)
    pub metadata: GraphMetadata,
}

/**
 * Directed adjacency with lookup tables for message passing.
 *
 * `edges[e] = (source, target)` means a message flows from `source` to
 * `target` along edge `e`. Parallel edges are kept; each one sends its own
 * message.
 */
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct AdjacencyList {
    /// Edge list as (source, target) pairs
    pub edges: Vec<(NodeIndex, NodeIndex)>,

    /// Forward adjacency: node -> list of outgoing neighbors
    pub forward_adj: HashMap<NodeIndex, Vec<NodeIndex>>,

    /// Backward adjacency: node -> list of incoming neighbors
    pub backward_adj: HashMap<NodeIndex, Vec<NodeIndex>>,

    /// Edge index lookup: (source, target) -> first matching edge index
    pub edge_index: HashMap<(NodeIndex, NodeIndex), EdgeIndex>,

    /// Incoming edge indices per node, in edge order
    pub incoming_edges: Vec<Vec<EdgeIndex>>,

    /// Number of nodes in the graph
    pub num_nodes: usize,

    /// Number of edges in the graph
    pub num_edges: usize,
}

/// Graph metadata for additional information
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct GraphMetadata {
    /// Ground-truth node labels, when known
    pub node_labels: Option<Vec<usize>>,
}

/// Node ids with their class labels for the supervised loss
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledNodes {
    pub(crate) nodes: Vec<NodeIndex>,
    pub(crate) labels: Vec<usize>,
}

// === IMPLEMENTATIONS ===

impl GraphData {
    /**
     * Create a graph from node features and directed edges.
     *
     * ```rust
     * use ndarray::Array2;
     * use zen_gcn::gnn::data::GraphData;
     *
     * let features = Array2::<f32>::eye(3);
     * let graph = GraphData::new(features, vec![(0, 1), (1, 2), (2, 0)])?;
     * assert_eq!(graph.num_nodes(), 3);
     * assert_eq!(graph.num_edges(), 3);
     * # Ok::<(), zen_gcn::gnn::GNNError>(())
     * ```
     */
    pub fn new(
        node_features: NodeFeatures,
        adjacency_edges: Vec<(NodeIndex, NodeIndex)>,
    ) -> GNNResult<Self> {
        let num_nodes = node_features.nrows();
        let adjacency_list = AdjacencyList::new(adjacency_edges, num_nodes)?;

        Ok(Self {
            node_features,
            adjacency_list,
            metadata: GraphMetadata::default(),
        })
    }

    /// Create a graph from undirected edges, adding both directions
    pub fn from_undirected(
        node_features: NodeFeatures,
        undirected_edges: &[(NodeIndex, NodeIndex)],
    ) -> GNNResult<Self> {
        let num_nodes = node_features.nrows();
        let adjacency_list = AdjacencyList::undirected(undirected_edges, num_nodes)?;

        Ok(Self {
            node_features,
            adjacency_list,
            metadata: GraphMetadata::default(),
        })
    }

    /// Undirected graph whose features are the identity matrix
    pub fn one_hot(num_nodes: usize, undirected_edges: &[(NodeIndex, NodeIndex)]) -> GNNResult<Self> {
        Self::from_undirected(Array2::eye(num_nodes), undirected_edges)
    }

    /// Get number of nodes in the graph
    pub fn num_nodes(&self) -> usize {
        self.node_features.nrows()
    }

    /// Get number of directed edges in the graph
    pub fn num_edges(&self) -> usize {
        self.adjacency_list.num_edges
    }

    /// Get node feature dimension
    pub fn node_feature_dim(&self) -> usize {
        self.node_features.ncols()
    }

    /// Get node features for a specific node
    pub fn node_features_for(&self, node_idx: NodeIndex) -> GNNResult<ArrayView1<f32>> {
        if node_idx >= self.num_nodes() {
            return Err(GNNError::InvalidInput(format!(
                "Node index {} out of bounds for {} nodes",
                node_idx,
                self.num_nodes()
            )));
        }

        Ok(self.node_features.row(node_idx))
    }

    /// Get neighbors of a node (outgoing edges)
    pub fn neighbors(&self, node_idx: NodeIndex) -> Vec<NodeIndex> {
        self.adjacency_list
            .forward_adj
            .get(&node_idx)
            .cloned()
            .unwrap_or_default()
    }

    /// Get incoming neighbors of a node (for undirected graphs, same as neighbors)
    pub fn incoming_neighbors(&self, node_idx: NodeIndex) -> Vec<NodeIndex> {
        self.adjacency_list
            .backward_adj
            .get(&node_idx)
            .cloned()
            .unwrap_or_default()
    }

    /// Get degree (number of outgoing edges) for a node
    pub fn degree(&self, node_idx: NodeIndex) -> usize {
        self.adjacency_list.out_degree(node_idx)
    }

    /// Add metadata to the graph
    pub fn with_metadata(mut self, metadata: GraphMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl AdjacencyList {
    /**
     * Create a new adjacency list from a directed edge list.
     *
     * Builds forward and backward lookup tables plus the per-node incoming
     * edge lists used by the reducers. Any endpoint `>= num_nodes` is
     * rejected.
     */
    pub fn new(edges: Vec<(NodeIndex, NodeIndex)>, num_nodes: usize) -> GNNResult<Self> {
        let num_edges = edges.len();

        let mut forward_adj: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
        let mut backward_adj: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
        let mut edge_index: HashMap<(NodeIndex, NodeIndex), EdgeIndex> = HashMap::new();
        let mut incoming_edges: Vec<Vec<EdgeIndex>> = vec![Vec::new(); num_nodes];

        for (edge_idx, &(source, target)) in edges.iter().enumerate() {
            if source >= num_nodes || target >= num_nodes {
                return Err(GNNError::InvalidInput(format!(
                    "Invalid edge ({}, {}): node indices must be below {}",
                    source, target, num_nodes
                )));
            }

            forward_adj.entry(source).or_default().push(target);
            backward_adj.entry(target).or_default().push(source);
            edge_index.entry((source, target)).or_insert(edge_idx);
            incoming_edges[target].push(edge_idx);
        }

        Ok(Self {
            edges,
            forward_adj,
            backward_adj,
            edge_index,
            incoming_edges,
            num_nodes,
            num_edges,
        })
    }

    /**
     * Symmetrize an undirected edge list.
     *
     * Each `(u, v)` contributes `(u, v)` and `(v, u)` in input order; repeated
     * pairs are dropped and a self edge `(u, u)` is kept once.
     */
    pub fn undirected(edges: &[(NodeIndex, NodeIndex)], num_nodes: usize) -> GNNResult<Self> {
        let mut seen = HashSet::with_capacity(edges.len() * 2);
        let mut directed = Vec::with_capacity(edges.len() * 2);

        for &(u, v) in edges {
            for pair in [(u, v), (v, u)] {
                if seen.insert(pair) {
                    directed.push(pair);
                }
            }
        }

        Self::new(directed, num_nodes)
    }

    /// Copy of this adjacency with one `(i, i)` edge appended per node that lacks one
    pub fn with_self_loops(&self) -> GNNResult<Self> {
        let mut edges = self.edges.clone();
        for node in 0..self.num_nodes {
            if !self.edge_index.contains_key(&(node, node)) {
                edges.push((node, node));
            }
        }
        Self::new(edges, self.num_nodes)
    }

    /// Number of edges ending at `node`
    pub fn in_degree(&self, node: NodeIndex) -> usize {
        self.incoming_edges.get(node).map_or(0, Vec::len)
    }

    /// Number of edges starting at `node`
    pub fn out_degree(&self, node: NodeIndex) -> usize {
        self.forward_adj.get(&node).map_or(0, Vec::len)
    }

    /// Get maximum node ID referenced in the adjacency list
    pub fn max_node_id(&self) -> Option<NodeIndex> {
        self.edges
            .iter()
            .flat_map(|(source, target)| [*source, *target])
            .max()
    }

    /// Check if the graph is undirected (every edge has a reverse edge)
    pub fn is_undirected(&self) -> bool {
        self.edges
            .iter()
            .all(|&(source, target)| self.edge_index.contains_key(&(target, source)))
    }
}

impl LabeledNodes {
    /// Pair node ids with class labels; both lists must have the same length
    pub fn new(nodes: Vec<NodeIndex>, labels: Vec<usize>) -> GNNResult<Self> {
        if nodes.len() != labels.len() {
            return Err(GNNError::DimensionMismatch(format!(
                "Labeled node count {} does not match label count {}",
                nodes.len(),
                labels.len()
            )));
        }
        Ok(Self { nodes, labels })
    }

    /**
     * Check the subset against a graph and a class count.
     *
     * Requires a non-empty subset of distinct ids below `num_nodes` and
     * labels below `num_classes`.
     */
    pub fn validate(&self, num_nodes: usize, num_classes: usize) -> GNNResult<()> {
        if self.nodes.is_empty() {
            return Err(GNNError::InvalidInput(
                "At least one labeled node is required".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(self.nodes.len());
        for (&node, &label) in self.nodes.iter().zip(&self.labels) {
            if node >= num_nodes {
                return Err(GNNError::InvalidInput(format!(
                    "Labeled node {} out of range for {} nodes",
                    node, num_nodes
                )));
            }
            if label >= num_classes {
                return Err(GNNError::InvalidInput(format!(
                    "Label {} for node {} out of range for {} classes",
                    label, node, num_classes
                )));
            }
            if !seen.insert(node) {
                return Err(GNNError::InvalidInput(format!(
                    "Node {} is labeled more than once",
                    node
                )));
            }
        }

        Ok(())
    }

    pub fn nodes(&self) -> &[NodeIndex] {
        &self.nodes
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over (node, label) pairs
    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, usize)> + '_ {
        self.nodes.iter().copied().zip(self.labels.iter().copied())
    }
}

// === UTILITY FUNCTIONS ===

/**
 * Generate a seeded random directed graph for testing and benchmarking.
 *
 * Features are uniform in [-1, 1). Edges avoid self-loops and duplicates;
 * fewer than `num_edges` are produced when the graph is too small to hold them.
 */
pub fn generate_random_graph(
    num_nodes: usize,
    num_edges: usize,
    node_feature_dim: usize,
    seed: u64,
) -> GNNResult<GraphData> {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let node_features = Array2::random_using(
        (num_nodes, node_feature_dim),
        Uniform::new(-1.0f32, 1.0f32),
        &mut rng,
    );

    let capacity = num_nodes * num_nodes.saturating_sub(1);
    let mut edges = Vec::new();
    let mut edge_set = HashSet::new();

    while edges.len() < num_edges && edge_set.len() < capacity {
        let source = rng.gen_range(0..num_nodes);
        let target = rng.gen_range(0..num_nodes);

        if source != target && edge_set.insert((source, target)) {
            edges.push((source, target));
        }
    }

    GraphData::new(node_features, edges)
}

// === TESTS ===

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_graph_data_creation() {
        let node_features =
            Array2::from_shape_vec((3, 2), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();

        let graph = GraphData::new(node_features, vec![(0, 1), (1, 2), (2, 0)]).unwrap();

        assert_eq!(graph.num_nodes(), 3);
        assert_eq!(graph.num_edges(), 3);
        assert_eq!(graph.node_feature_dim(), 2);

        let node_1 = graph.node_features_for(1).unwrap();
        assert_abs_diff_eq!(node_1[0], 3.0);
        assert!(graph.node_features_for(3).is_err());
    }

    #[test]
    fn test_adjacency_list_functionality() {
        let edges = vec![(0, 1), (1, 2), (2, 0), (1, 0)];
        let adj = AdjacencyList::new(edges, 3).unwrap();

        assert_eq!(adj.forward_adj[&0], vec![1]);
        assert_eq!(adj.forward_adj[&1], vec![2, 0]);
        assert_eq!(adj.backward_adj[&0], vec![2, 1]);
        assert_eq!(adj.incoming_edges[0], vec![2, 3]);

        assert_eq!(adj.edge_index[&(0, 1)], 0);
        assert_eq!(adj.edge_index[&(1, 2)], 1);
        assert_eq!(adj.max_node_id(), Some(2));
        assert_eq!(adj.in_degree(0), 2);
        assert_eq!(adj.out_degree(1), 2);
        assert!(!adj.is_undirected());
    }

    #[test]
    fn test_out_of_range_edge_rejected() {
        let result = AdjacencyList::new(vec![(0, 3)], 3);
        assert!(matches!(result, Err(GNNError::InvalidInput(_))));

        let result = GraphData::one_hot(2, &[(0, 2)]);
        assert!(matches!(result, Err(GNNError::InvalidInput(_))));
    }

    #[test]
    fn test_undirected_symmetrization() {
        let adj = AdjacencyList::undirected(&[(0, 1), (1, 0), (1, 2), (2, 2)], 3).unwrap();

        assert_eq!(adj.edges, vec![(0, 1), (1, 0), (1, 2), (2, 1), (2, 2)]);
        assert!(adj.is_undirected());
        assert_eq!(adj.in_degree(1), 2);
    }

    #[test]
    fn test_self_loops_added_once() {
        let adj = AdjacencyList::undirected(&[(0, 1), (2, 2)], 3).unwrap();
        let looped = adj.with_self_loops().unwrap();

        assert_eq!(looped.num_edges, adj.num_edges + 2);
        assert_eq!(looped.in_degree(2), 1);
        assert_eq!(looped.in_degree(0), 2);
    }

    #[test]
    fn test_isolated_node_has_no_incoming_edges() {
        let graph = GraphData::one_hot(4, &[(0, 1), (1, 2)]).unwrap();
        assert_eq!(graph.adjacency_list.in_degree(3), 0);
        assert!(graph.neighbors(3).is_empty());
        assert!(graph.incoming_neighbors(3).is_empty());
        assert_eq!(graph.degree(1), 2);
    }

    #[test]
    fn test_labeled_nodes_validation() {
        assert!(matches!(
            LabeledNodes::new(vec![0, 1], vec![0]),
            Err(GNNError::DimensionMismatch(_))
        ));

        let labeled = LabeledNodes::new(vec![0, 3], vec![0, 1]).unwrap();
        assert!(labeled.validate(4, 2).is_ok());
        assert!(labeled.validate(3, 2).is_err());
        assert!(labeled.validate(4, 1).is_err());

        let duplicated = LabeledNodes::new(vec![1, 1], vec![0, 0]).unwrap();
        assert!(duplicated.validate(4, 2).is_err());

        let empty = LabeledNodes::new(Vec::new(), Vec::new()).unwrap();
        assert!(empty.validate(4, 2).is_err());
    }

    #[test]
    fn test_random_graph_is_seeded() {
        let a = generate_random_graph(10, 20, 3, 42).unwrap();
        let b = generate_random_graph(10, 20, 3, 42).unwrap();

        assert_eq!(a.num_edges(), 20);
        assert_eq!(a.adjacency_list.edges, b.adjacency_list.edges);
        assert_eq!(a.node_features, b.node_features);
        assert!(a.adjacency_list.edges.iter().all(|(s, t)| s != t));
    }

    #[test]
    fn test_random_graph_caps_edge_count() {
        let graph = generate_random_graph(3, 100, 2, 1).unwrap();
        assert_eq!(graph.num_edges(), 6);

        let single = generate_random_graph(1, 5, 2, 1).unwrap();
        assert_eq!(single.num_edges(), 0);
    }
}
