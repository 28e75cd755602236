/**
 * @file zen-gcn/src/gnn/layers.rs
 * @brief Graph convolution layers
 *
 * A layer runs one message-passing round on the gradient tape:
 *
 * 1. **Message Computation**: `payload = H · W + b` for every node
 * 2. **Message Passing**: send `coef_e · payload[src]` along every edge
 * 3. **Aggregation**: reduce incoming messages per node
 *
 * Applying the linear transform before sending keeps the per-edge work at
 * `out_dim` instead of `in_dim`. A node with no incoming edge ends the layer
 * with a zero row, bias included.
 *
 * @see crate::gnn::aggregation Send step and reducers
 */

use std::sync::Arc;

use ndarray::Array2;
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::Rng;

use crate::autograd::{ParameterStore, Tape, Var};

use super::aggregation::{AggregationStrategy, MessagePlan};
use super::{AggregationMethod, GNNError, GNNResult, WeightInitialization};

// === CORE TRAIT ===

/// One message-passing round recorded on a [`Tape`]
pub trait MessagePassingLayer: Send + Sync {
    /// Transform node features and place the resulting payloads on the edges
    fn compute_messages(
        &self,
        tape: &mut Tape,
        parameters: &ParameterStore,
        input: Var,
        plan: &Arc<MessagePlan>,
    ) -> GNNResult<Var>;

    /// Reduce per-edge messages into per-node features
    fn aggregate(&self, tape: &mut Tape, messages: Var, plan: &MessagePlan) -> GNNResult<Var>;

    /// Full round: messages then aggregation
    fn forward(
        &self,
        tape: &mut Tape,
        parameters: &ParameterStore,
        input: Var,
        plan: &Arc<MessagePlan>,
    ) -> GNNResult<Var> {
        let messages = self.compute_messages(tape, parameters, input, plan)?;
        self.aggregate(tape, messages, plan)
    }

    fn input_dim(&self) -> usize;

    fn output_dim(&self) -> usize;
}

// === GRAPH CONVOLUTION ===

/**
 * Graph convolution with a linear payload and a pluggable reducer.
 *
 * Parameters are stored outside the layer under `<name>.weight`
 * (`input_dim x output_dim`) and `<name>.bias` (`1 x output_dim`).
 */
#[derive(Debug, Clone)]
pub struct GraphConvLayer {
    name: String,
    input_dim: usize,
    output_dim: usize,
    use_bias: bool,
    aggregator: Box<dyn AggregationStrategy>,
}

impl GraphConvLayer {
    pub fn new(
        name: impl Into<String>,
        input_dim: usize,
        output_dim: usize,
        aggregation: AggregationMethod,
        use_bias: bool,
    ) -> Self {
        Self {
            name: name.into(),
            input_dim,
            output_dim,
            use_bias,
            aggregator: aggregation.strategy(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight_name(&self) -> String {
        format!("{}.weight", self.name)
    }

    pub fn bias_name(&self) -> String {
        format!("{}.bias", self.name)
    }

    pub fn aggregator(&self) -> &dyn AggregationStrategy {
        self.aggregator.as_ref()
    }

    /// Register freshly initialized weight and zero bias tensors
    pub fn init_parameters<R: Rng + ?Sized>(
        &self,
        store: &mut ParameterStore,
        init: WeightInitialization,
        rng: &mut R,
    ) -> GNNResult<()> {
        let weight = create_weight_matrix((self.input_dim, self.output_dim), init, rng)?;
        store.insert(self.weight_name(), weight)?;

        if self.use_bias {
            store.insert(self.bias_name(), Array2::zeros((1, self.output_dim)))?;
        }

        Ok(())
    }
}

impl MessagePassingLayer for GraphConvLayer {
    fn compute_messages(
        &self,
        tape: &mut Tape,
        parameters: &ParameterStore,
        input: Var,
        plan: &Arc<MessagePlan>,
    ) -> GNNResult<Var> {
        let weight = tape.parameter(parameters, &self.weight_name())?;
        let mut payload = tape.matmul(input, weight)?;

        if self.use_bias {
            let bias = tape.parameter(parameters, &self.bias_name())?;
            payload = tape.add_bias(payload, bias)?;
        }

        tape.send(payload, plan)
    }

    fn aggregate(&self, tape: &mut Tape, messages: Var, plan: &MessagePlan) -> GNNResult<Var> {
        tape.reduce(messages, self.aggregator.as_ref(), plan)
    }

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn output_dim(&self) -> usize {
        self.output_dim
    }
}

/// Draw an `input_dim x output_dim` weight matrix
fn create_weight_matrix<R: Rng + ?Sized>(
    shape: (usize, usize),
    init: WeightInitialization,
    rng: &mut R,
) -> GNNResult<Array2<f32>> {
    let (input_dim, output_dim) = shape;

    if input_dim == 0 || output_dim == 0 {
        return Ok(Array2::zeros(shape));
    }

    let weights = match init {
        WeightInitialization::He => {
            // scale = sqrt(2 / fan_in)
            let scale = (2.0f32 / input_dim as f32).sqrt();
            Array2::random_using(shape, Uniform::new(-scale, scale), rng)
        }
        WeightInitialization::Xavier => {
            // scale = sqrt(6 / (fan_in + fan_out))
            let scale = (6.0f32 / (input_dim + output_dim) as f32).sqrt();
            Array2::random_using(shape, Uniform::new(-scale, scale), rng)
        }
        WeightInitialization::Normal { mean, std } => {
            if !mean.is_finite() || !std.is_finite() || std < 0.0 {
                return Err(GNNError::InvalidConfiguration(format!(
                    "Normal initialization needs finite mean and std >= 0, got N({}, {})",
                    mean, std
                )));
            }
            let distribution = Normal::new(mean, std).map_err(|e| {
                GNNError::InvalidConfiguration(format!("Invalid normal distribution: {}", e))
            })?;
            Array2::random_using(shape, distribution, rng)
        }
        WeightInitialization::Uniform { min, max } => {
            if min >= max || !min.is_finite() || !max.is_finite() {
                return Err(GNNError::InvalidConfiguration(format!(
                    "Uniform initialization needs finite min < max, got [{}, {})",
                    min, max
                )));
            }
            Array2::random_using(shape, Uniform::new(min, max), rng)
        }
    };

    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gnn::data::GraphData;
    use crate::gnn::Normalization;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_graph_conv_layer_creation() {
        let layer = GraphConvLayer::new("layer1", 34, 5, AggregationMethod::Mean, true);
        assert_eq!(layer.input_dim(), 34);
        assert_eq!(layer.output_dim(), 5);
        assert_eq!(layer.weight_name(), "layer1.weight");
        assert_eq!(layer.bias_name(), "layer1.bias");
        assert_eq!(layer.aggregator().name(), "mean");
    }

    #[test]
    fn test_weight_initialization() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let xavier =
            create_weight_matrix((10, 5), WeightInitialization::Xavier, &mut rng).unwrap();
        let limit = (6.0f32 / 15.0).sqrt();
        assert_eq!(xavier.dim(), (10, 5));
        assert!(xavier.iter().all(|&w| w.abs() <= limit));

        let he = create_weight_matrix((8, 2), WeightInitialization::He, &mut rng).unwrap();
        assert!(he.iter().all(|&w| w.abs() <= 0.5));

        let constant = create_weight_matrix(
            (3, 3),
            WeightInitialization::Normal { mean: 1.5, std: 0.0 },
            &mut rng,
        )
        .unwrap();
        assert!(constant.iter().all(|&w| w == 1.5));

        assert!(create_weight_matrix(
            (3, 3),
            WeightInitialization::Uniform { min: 1.0, max: 1.0 },
            &mut rng
        )
        .is_err());
        assert!(create_weight_matrix(
            (3, 3),
            WeightInitialization::Normal { mean: 0.0, std: -1.0 },
            &mut rng
        )
        .is_err());
    }

    #[test]
    fn test_layer_forward_pass() {
        // Path 0 - 1 - 2 plus isolated node 3
        let graph = GraphData::one_hot(4, &[(0, 1), (1, 2)]).unwrap();
        let plan = Arc::new(
            MessagePlan::new(&graph.adjacency_list, Normalization::None, false).unwrap(),
        );

        let layer = GraphConvLayer::new("layer1", 4, 1, AggregationMethod::Sum, true);
        let mut store = ParameterStore::new();
        store
            .insert("layer1.weight", ndarray::array![[1.0], [10.0], [100.0], [1000.0]])
            .unwrap();
        store.insert("layer1.bias", ndarray::array![[0.5]]).unwrap();

        let mut tape = Tape::new();
        let x = tape.input(graph.node_features.clone());
        let out = layer.forward(&mut tape, &store, x, &plan).unwrap();
        let value = tape.value(out);

        assert_abs_diff_eq!(value[[0, 0]], 10.5);
        assert_abs_diff_eq!(value[[1, 0]], 102.0);
        assert_abs_diff_eq!(value[[2, 0]], 10.5);
        // no incoming edges, bias does not leak in
        assert_abs_diff_eq!(value[[3, 0]], 0.0);
    }

    #[test]
    fn test_missing_parameters_reported() {
        let graph = GraphData::one_hot(2, &[(0, 1)]).unwrap();
        let plan = Arc::new(
            MessagePlan::new(&graph.adjacency_list, Normalization::None, false).unwrap(),
        );
        let layer = GraphConvLayer::new("layer1", 2, 2, AggregationMethod::Sum, true);

        let mut tape = Tape::new();
        let x = tape.input(graph.node_features.clone());
        assert!(layer.forward(&mut tape, &ParameterStore::new(), x, &plan).is_err());
    }
}
