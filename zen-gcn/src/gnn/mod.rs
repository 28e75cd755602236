/**
 * @file zen-gcn/src/gnn/mod.rs
 * @brief Graph Convolutional Network model for semi-supervised node classification
 *
 * This module ties the graph store, the message-passing engine and the
 * gradient tape together into a stack of graph convolution layers.
 *
 * ## Architecture Overview
 *
 * - **Graph Data**: node features plus forward/backward adjacency (`data`)
 * - **Message Passing Layers**: linear payload, send along edges, reduce (`layers`)
 * - **Aggregation Strategies**: sum / mean / max reducers with backward routing (`aggregation`)
 * - **Training**: masked cross-entropy over labeled nodes with Adam or SGD (`training`)
 * - **History**: per-epoch logit snapshots for the embedding animation (`history`)
 * - **Karate Club**: the built-in 34-node dataset (`karate`)
 *
 * ## Forward pass
 *
 * ```text
 * H0 = X (one-hot)
 * H1 = ReLU( REDUCE_{(j -> i)} c_ji * (H0 W1 + b1)_j )
 * Z  =       REDUCE_{(j -> i)} c_ji * (H1 W2 + b2)_j
 * ```
 *
 * with `c_ji = 1` unless symmetric normalization is enabled.
 */

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::autograd::{ParameterStore, Tape, Var};
use crate::training::TrainingError;

// === MODULE DECLARATIONS ===

/// Core graph data structures (adjacency lists, labeled subsets)
pub mod data;

/// Message aggregation strategies (sum, mean, max) and the send plan
pub mod aggregation;

/// Graph convolution layers
pub mod layers;

/// Training loop for semi-supervised node classification
pub mod training;

/// Per-epoch embedding snapshots and animation frames
pub mod history;

/// Zachary's Karate Club dataset
pub mod karate;

// === RE-EXPORTS ===

pub use aggregation::{
    AggregationStrategy, Aggregated, MaxAggregation, MeanAggregation, MessagePlan, ReduceRouting,
    SumAggregation,
};
pub use data::{AdjacencyList, GraphData, GraphMetadata, LabeledNodes, NodeFeatures, NodeIndex};
pub use history::{EmbeddingFrame, EmbeddingHistory};
pub use layers::{GraphConvLayer, MessagePassingLayer};
pub use training::{EpochResult, GCNTrainer, TrainingCallback, TrainingConfig, TrainingResults};

/// Result alias used throughout the graph modules
pub type GNNResult<T> = Result<T, GNNError>;

// === CONFIGURATION ===

/// Configuration for GCN models
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct GCNConfig {
    /// Input node feature dimension
    pub node_dimensions: usize,

    /// Width of every hidden layer
    pub hidden_dimensions: usize,

    /// Number of classes produced by the last layer
    pub output_dimensions: usize,

    /// Number of message passing layers
    pub num_layers: usize,

    /// Reducer applied to incoming messages
    pub aggregation: AggregationMethod,

    /// Per-edge message scaling
    pub normalization: Normalization,

    /// Add one self-loop per node before message passing
    pub add_self_loops: bool,

    /// Whether to use bias terms in the linear transformations
    pub use_bias: bool,

    /// Weight initialization strategy
    pub weight_init: WeightInitialization,

    /// Seed for parameter initialization
    pub seed: u64,
}

impl Default for GCNConfig {
    /// The karate club setup: 34 one-hot inputs, 5 hidden units, 2 classes
    fn default() -> Self {
        Self {
            node_dimensions: 34,
            hidden_dimensions: 5,
            output_dimensions: 2,
            num_layers: 2,
            aggregation: AggregationMethod::Sum,
            normalization: Normalization::None,
            add_self_loops: false,
            use_bias: true,
            weight_init: WeightInitialization::Xavier,
            seed: 0,
        }
    }
}

/// Message aggregation methods
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationMethod {
    /// Sum neighbor messages
    Sum,
    /// Average neighbor messages
    Mean,
    /// Element-wise maximum of neighbor messages
    Max,
}

impl AggregationMethod {
    /// Instantiate the reducer for this method
    pub fn strategy(self) -> Box<dyn AggregationStrategy> {
        match self {
            AggregationMethod::Sum => Box::new(SumAggregation::new()),
            AggregationMethod::Mean => Box::new(MeanAggregation::new()),
            AggregationMethod::Max => Box::new(MaxAggregation::new()),
        }
    }
}

impl std::str::FromStr for AggregationMethod {
    type Err = GNNError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(AggregationMethod::Sum),
            "mean" => Ok(AggregationMethod::Mean),
            "max" => Ok(AggregationMethod::Max),
            other => Err(GNNError::InvalidConfiguration(format!(
                "Unknown aggregation method '{}'. Expected one of: sum, mean, max",
                other
            ))),
        }
    }
}

/// Per-edge message scaling applied in the send step
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Normalization {
    /// Raw neighbor contributions
    None,
    /// Scale by 1 / sqrt(out_degree(src) * in_degree(dst))
    Symmetric,
}

/// Weight initialization strategies
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightInitialization {
    /// He initialization (uniform in ±sqrt(2 / fan_in))
    He,
    /// Xavier/Glorot uniform initialization
    Xavier,
    /// Random normal distribution
    Normal { mean: f32, std: f32 },
    /// Random uniform distribution
    Uniform { min: f32, max: f32 },
}

// === CORE GCN MODEL ===

/**
 * Graph Convolutional Network built from message passing layers.
 *
 * The model owns its layers and a [`ParameterStore`]; parameter tensors are
 * looked up by name (`layer1.weight`, `layer1.bias`, ...) when a forward pass
 * is recorded on a [`Tape`]. Only the optimizer step mutates them.
 *
 * ```rust
 * use zen_gcn::gnn::{karate, GCNModel};
 *
 * let graph = karate::karate_club_graph()?;
 * let model = GCNModel::builder().seed(7).build()?;
 * let logits = model.predict(&graph)?;
 * assert_eq!(logits.dim(), (34, 2));
 * # Ok::<(), zen_gcn::gnn::GNNError>(())
 * ```
 */
#[derive(Debug, Clone)]
pub struct GCNModel {
    /// Model configuration
    pub config: GCNConfig,

    /// Stack of message passing layers
    layers: Vec<GraphConvLayer>,

    /// Trainable tensors keyed by name
    parameters: ParameterStore,
}

impl GCNModel {
    /// Create a new GCN model builder for fluent configuration
    pub fn builder() -> GCNModelBuilder {
        GCNModelBuilder::default()
    }

    /// Create a GCN model with the default karate configuration
    pub fn new() -> GNNResult<Self> {
        Self::builder().build()
    }

    /// Create a GCN model with custom configuration
    pub fn with_config(config: GCNConfig) -> GNNResult<Self> {
        Self::builder().config(config).build()
    }

    /**
     * Record a forward pass on `tape` and return the logits variable.
     *
     * Every layer but the last is followed by ReLU. The returned variable has
     * shape `[num_nodes, output_dimensions]`.
     */
    pub fn forward(&self, tape: &mut Tape, graph_data: &GraphData) -> GNNResult<Var> {
        self.validate_graph_data(graph_data)?;

        let plan = Arc::new(MessagePlan::new(
            &graph_data.adjacency_list,
            self.config.normalization,
            self.config.add_self_loops,
        )?);

        let mut hidden = tape.input(graph_data.node_features.clone());
        let last = self.layers.len() - 1;

        for (layer_idx, layer) in self.layers.iter().enumerate() {
            hidden = layer.forward(tape, &self.parameters, hidden, &plan)?;
            if layer_idx != last {
                hidden = tape.relu(hidden);
            }
        }

        Ok(hidden)
    }

    /// Inference-only forward pass returning detached logits
    pub fn predict(&self, graph_data: &GraphData) -> GNNResult<NodeFeatures> {
        let mut tape = Tape::new();
        let logits = self.forward(&mut tape, graph_data)?;
        Ok(tape.value(logits).clone())
    }

    /// Message passing layers in forward order
    pub fn layers(&self) -> &[GraphConvLayer] {
        &self.layers
    }

    /// Read access to the trainable tensors
    pub fn parameters(&self) -> &ParameterStore {
        &self.parameters
    }

    /// Mutable access for optimizer steps
    pub fn parameters_mut(&mut self) -> &mut ParameterStore {
        &mut self.parameters
    }

    /// Count total number of trainable scalars
    pub fn count_parameters(&self) -> usize {
        self.parameters.parameter_count()
    }

    // === PRIVATE HELPER METHODS ===

    /// Validate input graph data structure
    fn validate_graph_data(&self, graph_data: &GraphData) -> GNNResult<()> {
        let num_nodes = graph_data.num_nodes();

        if num_nodes == 0 {
            return Err(GNNError::InvalidInput(
                "Graph must contain at least one node".to_string(),
            ));
        }

        if graph_data.node_feature_dim() != self.config.node_dimensions {
            return Err(GNNError::DimensionMismatch(format!(
                "Node feature dimension mismatch: expected {}, got {}. \
                 Check your input node features and GCN configuration.",
                self.config.node_dimensions,
                graph_data.node_feature_dim()
            )));
        }

        if let Some(max_node_id) = graph_data.adjacency_list.max_node_id() {
            if max_node_id >= num_nodes {
                return Err(GNNError::InvalidInput(format!(
                    "Adjacency list references node {} but only {} nodes provided",
                    max_node_id, num_nodes
                )));
            }
        }

        Ok(())
    }
}

// === BUILDER PATTERN ===

/// Builder for [`GCNModel`]
#[derive(Debug, Default)]
pub struct GCNModelBuilder {
    config: GCNConfig,
}

impl GCNModelBuilder {
    /// Set complete configuration
    pub fn config(mut self, config: GCNConfig) -> Self {
        self.config = config;
        self
    }

    /// Set input feature dimensions
    pub fn node_dimensions(mut self, dims: usize) -> Self {
        self.config.node_dimensions = dims;
        self
    }

    /// Set hidden layer width
    pub fn hidden_dimensions(mut self, dims: usize) -> Self {
        self.config.hidden_dimensions = dims;
        self
    }

    /// Set number of output classes
    pub fn output_dimensions(mut self, dims: usize) -> Self {
        self.config.output_dimensions = dims;
        self
    }

    /// Set number of layers
    pub fn num_layers(mut self, layers: usize) -> Self {
        self.config.num_layers = layers;
        self
    }

    /// Set aggregation method
    pub fn aggregation(mut self, agg: AggregationMethod) -> Self {
        self.config.aggregation = agg;
        self
    }

    /// Set message normalization
    pub fn normalization(mut self, normalization: Normalization) -> Self {
        self.config.normalization = normalization;
        self
    }

    /// Add self-loops before message passing
    pub fn self_loops(mut self, enabled: bool) -> Self {
        self.config.add_self_loops = enabled;
        self
    }

    pub fn use_bias(mut self, enabled: bool) -> Self {
        self.config.use_bias = enabled;
        self
    }

    pub fn weight_init(mut self, init: WeightInitialization) -> Self {
        self.config.weight_init = init;
        self
    }

    /// Seed for parameter initialization
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Build the GCN model
    pub fn build(self) -> GNNResult<GCNModel> {
        let config = self.config;

        if config.num_layers == 0 {
            return Err(GNNError::InvalidConfiguration(
                "Number of layers must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("Node dimensions", config.node_dimensions),
            ("Output dimensions", config.output_dimensions),
        ] {
            if value == 0 {
                return Err(GNNError::InvalidConfiguration(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if config.num_layers > 1 && config.hidden_dimensions == 0 {
            return Err(GNNError::InvalidConfiguration(
                "Hidden dimensions must be greater than 0".to_string(),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut parameters = ParameterStore::new();
        let mut layers = Vec::with_capacity(config.num_layers);

        for layer_idx in 0..config.num_layers {
            let input_dim = if layer_idx == 0 {
                config.node_dimensions
            } else {
                config.hidden_dimensions
            };
            let output_dim = if layer_idx + 1 == config.num_layers {
                config.output_dimensions
            } else {
                config.hidden_dimensions
            };

            let layer = GraphConvLayer::new(
                format!("layer{}", layer_idx + 1),
                input_dim,
                output_dim,
                config.aggregation,
                config.use_bias,
            );
            layer.init_parameters(&mut parameters, config.weight_init, &mut rng)?;
            layers.push(layer);
        }

        Ok(GCNModel {
            config,
            layers,
            parameters,
        })
    }
}

// === ERRORS ===

/// GNN-specific error types
#[derive(Debug, thiserror::Error)]
pub enum GNNError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    #[error("Training error: {0}")]
    TrainingError(#[from] TrainingError),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serde")]
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// === TESTS ===

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcn_config_default() {
        let config = GCNConfig::default();
        assert_eq!(config.node_dimensions, 34);
        assert_eq!(config.hidden_dimensions, 5);
        assert_eq!(config.output_dimensions, 2);
        assert_eq!(config.num_layers, 2);
        assert_eq!(config.aggregation, AggregationMethod::Sum);
        assert_eq!(config.normalization, Normalization::None);
        assert!(!config.add_self_loops);
    }

    #[test]
    fn test_gcn_builder() {
        let model = GCNModel::builder()
            .node_dimensions(8)
            .hidden_dimensions(4)
            .output_dimensions(3)
            .num_layers(3)
            .aggregation(AggregationMethod::Max)
            .build()
            .unwrap();

        assert_eq!(model.layers().len(), 3);
        assert_eq!(model.layers()[0].input_dim(), 8);
        assert_eq!(model.layers()[2].output_dim(), 3);
        assert_eq!(model.config.aggregation, AggregationMethod::Max);
    }

    #[test]
    fn test_parameter_count() {
        let model = GCNModel::new().unwrap();
        // 34*5 + 5 + 5*2 + 2
        assert_eq!(model.count_parameters(), 187);

        let no_bias = GCNModel::builder().use_bias(false).build().unwrap();
        assert_eq!(no_bias.count_parameters(), 180);
    }

    #[test]
    fn test_invalid_configurations() {
        assert!(matches!(
            GCNModel::builder().num_layers(0).build(),
            Err(GNNError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            GCNModel::builder().output_dimensions(0).build(),
            Err(GNNError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            GCNModel::builder().hidden_dimensions(0).build(),
            Err(GNNError::InvalidConfiguration(_))
        ));
        // A single layer never uses the hidden width
        assert!(GCNModel::builder().num_layers(1).hidden_dimensions(0).build().is_ok());
    }

    #[test]
    fn test_feature_dimension_mismatch() {
        let model = GCNModel::builder().node_dimensions(4).build().unwrap();
        let graph = GraphData::one_hot(3, &[(0, 1)]).unwrap();
        assert!(matches!(
            model.predict(&graph),
            Err(GNNError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_aggregation_from_str() {
        assert_eq!("SUM".parse::<AggregationMethod>().unwrap(), AggregationMethod::Sum);
        assert_eq!("mean".parse::<AggregationMethod>().unwrap(), AggregationMethod::Mean);
        assert!("median".parse::<AggregationMethod>().is_err());
    }

    #[test]
    fn test_same_seed_same_parameters() {
        let a = GCNModel::builder().seed(11).build().unwrap();
        let b = GCNModel::builder().seed(11).build().unwrap();
        let c = GCNModel::builder().seed(12).build().unwrap();
        assert_eq!(a.parameters(), b.parameters());
        assert_ne!(a.parameters(), c.parameters());
    }
}
