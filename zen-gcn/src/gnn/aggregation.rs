/**
 * @file zen-gcn/src/gnn/aggregation.rs
 * @brief Message passing: the send step and the reduce strategies
 *
 * A message-passing round is split in two:
 *
 * 1. **Send** ([`MessagePlan::send`]): every directed edge `e = (src, dst)`
 *    carries `coef_e * payload[src]`, producing a `[num_edges, dim]` message
 *    matrix.
 * 2. **Reduce** ([`AggregationStrategy::aggregate`]): every node combines the
 *    messages on its incoming edges into one row.
 *
 * ## Reducers:
 *
 * - **SumAggregation**: `h[v] = Σ_{e: u→v} m_e`
 * - **MeanAggregation**: `h[v] = (1/|in(v)|) Σ_{e: u→v} m_e`
 * - **MaxAggregation**: `h[v][k] = max_{e: u→v} m_e[k]`
 *
 * Nodes without incoming edges receive the zero row for every reducer.
 * Each reducer also returns a [`ReduceRouting`] that maps node gradients back
 * onto the edges that produced them.
 *
 * With the `parallel` feature enabled, nodes are reduced concurrently with
 * rayon. Each node still walks its own incoming edges in edge order, so the
 * output does not depend on the thread count.
 *
 * @see crate::gnn::data Graph data structures
 * @see crate::gnn::layers Message passing layers
 */

use ndarray::{Array2, ArrayView2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::data::{AdjacencyList, EdgeIndex, NodeIndex};
use super::{GNNError, GNNResult, Normalization};

// === SEND STEP ===

/**
 * Edge set and per-edge coefficients for one graph.
 *
 * Built once per forward pass and shared by every layer. Self-loops, when
 * requested, are appended before coefficients are computed so that they count
 * toward the degrees used by symmetric normalization.
 */
#[derive(Debug, Clone)]
pub struct MessagePlan {
    adjacency: AdjacencyList,
    coefficients: Vec<f32>,
    normalization: Normalization,
}

impl MessagePlan {
    pub fn new(
        adjacency_list: &AdjacencyList,
        normalization: Normalization,
        add_self_loops: bool,
    ) -> GNNResult<Self> {
        let adjacency = if add_self_loops {
            adjacency_list.with_self_loops()?
        } else {
            adjacency_list.clone()
        };

        let coefficients = match normalization {
            Normalization::None => vec![1.0; adjacency.num_edges],
            Normalization::Symmetric => adjacency
                .edges
                .iter()
                .map(|&(source, target)| {
                    // Both degrees are >= 1 because this edge exists
                    let denom = (adjacency.out_degree(source) * adjacency.in_degree(target)) as f32;
                    1.0 / denom.sqrt()
                })
                .collect(),
        };

        Ok(Self {
            adjacency,
            coefficients,
            normalization,
        })
    }

    /// Effective adjacency, self-loops included
    pub fn adjacency(&self) -> &AdjacencyList {
        &self.adjacency
    }

    /// Scale applied to each edge's message
    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    pub fn num_nodes(&self) -> usize {
        self.adjacency.num_nodes
    }

    pub fn num_edges(&self) -> usize {
        self.adjacency.num_edges
    }

    /// Build per-edge messages `[num_edges, dim]` from per-node payloads `[num_nodes, dim]`
    pub fn send(&self, payloads: ArrayView2<f32>) -> GNNResult<Array2<f32>> {
        if payloads.nrows() != self.num_nodes() {
            return Err(GNNError::DimensionMismatch(format!(
                "Payload has {} rows but the graph has {} nodes",
                payloads.nrows(),
                self.num_nodes()
            )));
        }

        let mut messages = Array2::zeros((self.num_edges(), payloads.ncols()));
        for (edge_idx, &(source, _)) in self.adjacency.edges.iter().enumerate() {
            messages
                .row_mut(edge_idx)
                .scaled_add(self.coefficients[edge_idx], &payloads.row(source));
        }

        Ok(messages)
    }

    /// Scatter-add edge gradients `[num_edges, dim]` back onto source nodes
    pub fn send_backward(&self, grad_messages: ArrayView2<f32>) -> Array2<f32> {
        let mut grad_payloads = Array2::zeros((self.num_nodes(), grad_messages.ncols()));
        for (edge_idx, &(source, _)) in self.adjacency.edges.iter().enumerate() {
            grad_payloads
                .row_mut(source)
                .scaled_add(self.coefficients[edge_idx], &grad_messages.row(edge_idx));
        }
        grad_payloads
    }
}

// === CORE TRAIT ===

/// Reduced node rows plus what backward needs to route gradients to edges
#[derive(Debug, Clone)]
pub struct Aggregated {
    /// Aggregated messages for each node [num_nodes, message_dim]
    pub values: Array2<f32>,

    pub routing: ReduceRouting,
}

/**
 * How a reduce step distributes a node gradient back over its incoming edges.
 */
#[derive(Debug, Clone, PartialEq)]
pub enum ReduceRouting {
    /// Edge `e` receives `factors[e] * grad[targets[e]]` (sum and mean)
    Scaled {
        targets: Vec<NodeIndex>,
        factors: Vec<f32>,
    },
    /// Only the winning edge of each (node, dim) receives the gradient (max)
    Selected {
        winners: Vec<Option<EdgeIndex>>,
        num_edges: usize,
        dim: usize,
    },
}

impl ReduceRouting {
    /// Map a node gradient `[num_nodes, dim]` onto edges `[num_edges, dim]`
    pub fn backward(&self, grad: ArrayView2<f32>) -> Array2<f32> {
        match self {
            ReduceRouting::Scaled { targets, factors } => {
                let mut grad_messages = Array2::zeros((targets.len(), grad.ncols()));
                for (edge_idx, (&target, &factor)) in targets.iter().zip(factors).enumerate() {
                    grad_messages
                        .row_mut(edge_idx)
                        .scaled_add(factor, &grad.row(target));
                }
                grad_messages
            }
            ReduceRouting::Selected {
                winners,
                num_edges,
                dim,
            } => {
                let mut grad_messages = Array2::zeros((*num_edges, *dim));
                for (slot, winner) in winners.iter().enumerate() {
                    if let Some(edge_idx) = winner {
                        let (node, k) = (slot / dim, slot % dim);
                        grad_messages[[*edge_idx, k]] += grad[[node, k]];
                    }
                }
                grad_messages
            }
        }
    }
}

/**
 * Base trait for message aggregation strategies.
 *
 * `messages` holds one row per edge of `adjacency_list`, in edge order.
 * Implementations must return a `[num_nodes, message_dim]` matrix with a zero
 * row for every node that has no incoming edge.
 */
pub trait AggregationStrategy: Send + Sync + std::fmt::Debug {
    fn aggregate(
        &self,
        messages: &Array2<f32>,
        adjacency_list: &AdjacencyList,
    ) -> GNNResult<Aggregated>;

    /// Get aggregation method name for debugging/serialization
    fn name(&self) -> &'static str;

    /// Clone the aggregator (for use in trait objects)
    fn clone_box(&self) -> Box<dyn AggregationStrategy>;
}

impl Clone for Box<dyn AggregationStrategy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

fn check_message_count(messages: &Array2<f32>, adjacency_list: &AdjacencyList) -> GNNResult<()> {
    if messages.nrows() != adjacency_list.num_edges {
        return Err(GNNError::DimensionMismatch(format!(
            "Message count {} doesn't match edge count {}",
            messages.nrows(),
            adjacency_list.num_edges
        )));
    }
    Ok(())
}

/// Run `f` for every node, concurrently when the `parallel` feature is on
fn per_node<R, F>(num_nodes: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(NodeIndex) -> R + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        (0..num_nodes).into_par_iter().map(f).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        (0..num_nodes).map(f).collect()
    }
}

/// Shared body of sum and mean: accumulate incoming messages, then scale
fn scaled_sum(
    messages: &Array2<f32>,
    adjacency_list: &AdjacencyList,
    node_factor: impl Fn(usize) -> f32 + Send + Sync,
) -> GNNResult<Aggregated> {
    check_message_count(messages, adjacency_list)?;

    let dim = messages.ncols();
    let num_nodes = adjacency_list.num_nodes;

    let rows = per_node(num_nodes, |node| {
        let incoming = &adjacency_list.incoming_edges[node];
        let mut acc = vec![0.0f32; dim];
        for &edge_idx in incoming {
            for (slot, &value) in acc.iter_mut().zip(messages.row(edge_idx).iter()) {
                *slot += value;
            }
        }
        if !incoming.is_empty() {
            let factor = node_factor(incoming.len());
            acc.iter_mut().for_each(|v| *v *= factor);
        }
        acc
    });

    let values = Array2::from_shape_vec((num_nodes, dim), rows.into_iter().flatten().collect())?;

    let targets: Vec<NodeIndex> = adjacency_list.edges.iter().map(|&(_, t)| t).collect();
    let factors = targets
        .iter()
        .map(|&t| node_factor(adjacency_list.in_degree(t)))
        .collect();

    Ok(Aggregated {
        values,
        routing: ReduceRouting::Scaled { targets, factors },
    })
}

// === SUM AGGREGATION ===

/// Sum of incoming messages, the base GCN reducer
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct SumAggregation;

impl SumAggregation {
    pub fn new() -> Self {
        Self
    }
}

impl AggregationStrategy for SumAggregation {
    fn aggregate(
        &self,
        messages: &Array2<f32>,
        adjacency_list: &AdjacencyList,
    ) -> GNNResult<Aggregated> {
        scaled_sum(messages, adjacency_list, |_| 1.0)
    }

    fn name(&self) -> &'static str {
        "sum"
    }

    fn clone_box(&self) -> Box<dyn AggregationStrategy> {
        Box::new(self.clone())
    }
}

// === MEAN AGGREGATION ===

/**
 * Mean aggregation strategy.
 *
 * `aggregated[v] = (1/|N(v)|) * Σ_{u ∈ N(v)} message[u→v]`
 */
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct MeanAggregation;

impl MeanAggregation {
    pub fn new() -> Self {
        Self
    }
}

impl AggregationStrategy for MeanAggregation {
    fn aggregate(
        &self,
        messages: &Array2<f32>,
        adjacency_list: &AdjacencyList,
    ) -> GNNResult<Aggregated> {
        scaled_sum(messages, adjacency_list, |in_degree| {
            1.0 / in_degree.max(1) as f32
        })
    }

    fn name(&self) -> &'static str {
        "mean"
    }

    fn clone_box(&self) -> Box<dyn AggregationStrategy> {
        Box::new(self.clone())
    }
}

// === MAX AGGREGATION ===

/**
 * Element-wise maximum over incoming messages.
 *
 * Ties go to the earliest incoming edge; only that edge receives gradient.
 */
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct MaxAggregation;

impl MaxAggregation {
    pub fn new() -> Self {
        Self
    }
}

impl AggregationStrategy for MaxAggregation {
    fn aggregate(
        &self,
        messages: &Array2<f32>,
        adjacency_list: &AdjacencyList,
    ) -> GNNResult<Aggregated> {
        check_message_count(messages, adjacency_list)?;

        let dim = messages.ncols();
        let num_nodes = adjacency_list.num_nodes;

        let rows = per_node(num_nodes, |node| {
            let mut best = vec![0.0f32; dim];
            let mut winners: Vec<Option<EdgeIndex>> = vec![None; dim];

            for &edge_idx in &adjacency_list.incoming_edges[node] {
                let message = messages.row(edge_idx);
                for k in 0..dim {
                    if winners[k].is_none() || message[k] > best[k] {
                        best[k] = message[k];
                        winners[k] = Some(edge_idx);
                    }
                }
            }
            (best, winners)
        });

        let mut values = Vec::with_capacity(num_nodes * dim);
        let mut winners = Vec::with_capacity(num_nodes * dim);
        for (row, row_winners) in rows {
            values.extend(row);
            winners.extend(row_winners);
        }

        Ok(Aggregated {
            values: Array2::from_shape_vec((num_nodes, dim), values)?,
            routing: ReduceRouting::Selected {
                winners,
                num_edges: adjacency_list.num_edges,
                dim,
            },
        })
    }

    fn name(&self) -> &'static str {
        "max"
    }

    fn clone_box(&self) -> Box<dyn AggregationStrategy> {
        Box::new(self.clone())
    }
}

// === TESTS ===
