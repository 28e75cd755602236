/**
 * @file zen-gcn/src/gnn/training.rs
 * @brief Semi-supervised training loop for GCN node classification
 *
 * Every epoch runs the full graph through the model, but only the labeled
 * nodes contribute to the loss:
 *
 * 1. **Forward Pass**: fresh tape, message passing through all layers
 * 2. **Snapshot**: detached logits appended to the embedding history
 * 3. **Loss Computation**: softmax cross-entropy over the labeled rows
 * 4. **Backward Pass**: reverse sweep of the tape, gradients per parameter name
 * 5. **Parameter Updates**: optional global-norm clipping, then the optimizer step
 *
 * There is no validation split, early stopping or convergence check; the
 * loop always runs the configured number of epochs unless a loss, gradient or
 * parameter stops being finite.
 *
 * @see crate::training Optimizers and loss functions
 * @see crate::gnn::history Snapshot consumer
 */

use std::fmt;
use std::time::Instant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::autograd::Tape;
use crate::training::{
    create_optimizer, CrossEntropyLoss, NumericalUtils, OptimizerType, ReductionType,
};

use super::data::{GraphData, LabeledNodes, NodeFeatures};
use super::history::{argmax_rows, EmbeddingHistory};
use super::{GCNModel, GNNError, GNNResult};

// === TRAINING CONFIGURATION ===

/// Training hyperparameters
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    /// Number of training epochs
    pub epochs: usize,

    /// Optimizer learning rate
    pub learning_rate: f32,

    /// Optimizer type with its hyperparameters
    pub optimizer: OptimizerType,

    /// How per-node losses over the labeled set are combined
    pub loss_reduction: ReductionType,

    /// Weight decay (L2 regularization)
    pub weight_decay: f32,

    /// Gradient clipping threshold on the global L2 norm
    pub gradient_clip_norm: Option<f32>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 30,
            learning_rate: 0.01,
            optimizer: OptimizerType::default(),
            loss_reduction: ReductionType::Sum,
            weight_decay: 0.0,
            gradient_clip_norm: None,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> GNNResult<()> {
        if self.epochs == 0 {
            return Err(GNNError::InvalidConfiguration(
                "Number of epochs must be greater than 0".to_string(),
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(GNNError::InvalidConfiguration(format!(
                "Learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return Err(GNNError::InvalidConfiguration(format!(
                "Weight decay must be non-negative, got {}",
                self.weight_decay
            )));
        }
        if let Some(max_norm) = self.gradient_clip_norm {
            if !(max_norm.is_finite() && max_norm > 0.0) {
                return Err(GNNError::InvalidConfiguration(format!(
                    "Gradient clip norm must be positive, got {}",
                    max_norm
                )));
            }
        }
        Ok(())
    }
}

// === RESULTS ===

/// Results from a single training epoch
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct EpochResult {
    /// 0-based epoch index
    pub epoch: usize,
    /// Loss before this epoch's update
    pub loss: f32,
    /// Global gradient norm before clipping
    pub gradient_norm: f32,
    pub elapsed_time: f32,
}

impl fmt::Display for EpochResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch {} | Loss: {:.4}", self.epoch, self.loss)
    }
}

/// Outcome of a full training run
#[derive(Debug, Clone)]
pub struct TrainingResults {
    /// Per-epoch losses
    pub history: Vec<EpochResult>,
    /// Per-epoch logits, taken before each update
    pub snapshots: EmbeddingHistory,
    pub final_loss: f32,
    /// Total training time in seconds
    pub training_time: f64,
}

/// Observer invoked after every epoch with the epoch summary and its logits
pub trait TrainingCallback {
    fn on_epoch_end(&mut self, result: &EpochResult, logits: &NodeFeatures) -> GNNResult<()>;
}

impl<F> TrainingCallback for F
where
    F: FnMut(&EpochResult, &NodeFeatures),
{
    fn on_epoch_end(&mut self, result: &EpochResult, logits: &NodeFeatures) -> GNNResult<()> {
        self(result, logits);
        Ok(())
    }
}

// === TRAINER ===

/// Full-batch trainer for semi-supervised node classification
pub struct GCNTrainer {
    config: TrainingConfig,
    loss: CrossEntropyLoss<f32>,
    callbacks: Vec<Box<dyn TrainingCallback>>,
}

impl fmt::Debug for GCNTrainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GCNTrainer")
            .field("config", &self.config)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl GCNTrainer {
    pub fn new(config: TrainingConfig) -> GNNResult<Self> {
        config.validate()?;
        let loss = CrossEntropyLoss::new().with_reduction(config.loss_reduction);
        Ok(Self {
            config,
            loss,
            callbacks: Vec::new(),
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Register an epoch observer
    pub fn with_callback(mut self, callback: impl TrainingCallback + 'static) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    /**
     * Train `model` on `graph`, supervising only the `labeled` nodes.
     *
     * Parameters are updated in place. Aborts with `NumericalInstability` as
     * soon as the loss or a gradient is NaN or infinite.
     */
    pub fn train(
        &mut self,
        model: &mut GCNModel,
        graph: &GraphData,
        labeled: &LabeledNodes,
    ) -> GNNResult<TrainingResults> {
        labeled.validate(graph.num_nodes(), model.config.output_dimensions)?;

        let mut optimizer = create_optimizer(
            &self.config.optimizer,
            self.config.learning_rate,
            self.config.weight_decay,
        )?;
        optimizer.initialize(model.count_parameters())?;

        log::info!(
            "Starting GCN training: {} epochs, learning rate {}, {} labeled of {} nodes, {} parameters",
            self.config.epochs,
            self.config.learning_rate,
            labeled.len(),
            graph.num_nodes(),
            model.count_parameters()
        );

        let start_time = Instant::now();
        let mut history = Vec::with_capacity(self.config.epochs);
        let mut snapshots = EmbeddingHistory::new();

        for epoch in 0..self.config.epochs {
            let epoch_start = Instant::now();

            let mut tape = Tape::new();
            let logits = model.forward(&mut tape, graph)?;
            let snapshot = tape.value(logits).clone();

            let labeled_logits = tape.gather_rows(logits, labeled.nodes())?;
            let loss_var = tape.cross_entropy(labeled_logits, labeled.labels(), &self.loss)?;
            let loss = tape.value(loss_var)[[0, 0]];

            if !NumericalUtils::is_finite(loss) {
                return Err(GNNError::NumericalInstability(format!(
                    "Loss became {} at epoch {}",
                    loss, epoch
                )));
            }

            let gradients = tape.backward(loss_var)?.parameter_gradients();
            drop(tape);

            let mut flat_gradients = model.parameters().flatten_gradients(&gradients)?;
            if let Some(bad) = gradients
                .iter()
                .find(|(_, g)| g.iter().any(|v| !v.is_finite()))
                .map(|(name, _)| name)
            {
                return Err(GNNError::NumericalInstability(format!(
                    "Non-finite gradient for '{}' at epoch {}",
                    bad, epoch
                )));
            }

            let gradient_norm = NumericalUtils::l2_norm(&flat_gradients);
            log::debug!("Epoch {} gradient norm {:.6}", epoch, gradient_norm);

            if let Some(max_norm) = self.config.gradient_clip_norm {
                clip_gradients(&mut flat_gradients, gradient_norm, max_norm);
            }

            optimizer.update_parameters(model.parameters_mut().flat_mut(), &flat_gradients)?;

            let result = EpochResult {
                epoch,
                loss,
                gradient_norm,
                elapsed_time: epoch_start.elapsed().as_secs_f32(),
            };
            log::info!("{}", result);

            for callback in &mut self.callbacks {
                callback.on_epoch_end(&result, &snapshot)?;
            }

            snapshots.push(snapshot);
            history.push(result);
        }

        let final_loss = history.last().map_or(0.0, |r: &EpochResult| r.loss);
        let training_time = start_time.elapsed().as_secs_f64();

        log::info!(
            "Training completed: {:.2}s, final loss: {:.4}",
            training_time,
            final_loss
        );

        Ok(TrainingResults {
            history,
            snapshots,
            final_loss,
            training_time,
        })
    }
}

/// Rescale `gradients` in place so their global L2 norm is at most `max_norm`
fn clip_gradients(gradients: &mut [f32], total_norm: f32, max_norm: f32) {
    if total_norm > max_norm {
        let clip_factor = max_norm / total_norm;
        gradients.iter_mut().for_each(|g| *g *= clip_factor);
        log::debug!(
            "Gradient clipping applied: norm {:.4} -> {:.4}",
            total_norm,
            max_norm
        );
    }
}

// === METRICS ===

/// Arg-max class per node
pub fn predicted_classes(logits: &NodeFeatures) -> Vec<usize> {
    argmax_rows(logits)
}

/// Fraction of positions where `predicted` matches `ground_truth`
pub fn accuracy(predicted: &[usize], ground_truth: &[usize]) -> GNNResult<f32> {
    if predicted.len() != ground_truth.len() {
        return Err(GNNError::DimensionMismatch(format!(
            "{} predictions for {} ground-truth labels",
            predicted.len(),
            ground_truth.len()
        )));
    }
    if predicted.is_empty() {
        return Err(GNNError::InvalidInput(
            "Accuracy of an empty prediction set is undefined".to_string(),
        ));
    }

    let correct = predicted
        .iter()
        .zip(ground_truth)
        .filter(|(p, t)| p == t)
        .count();
    Ok(correct as f32 / predicted.len() as f32)
}

// === TESTS ===

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gnn::karate;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_training_config_default() {
        let config = TrainingConfig::default();
        assert_eq!(config.epochs, 30);
        assert_abs_diff_eq!(config.learning_rate, 0.01);
        assert_eq!(config.loss_reduction, ReductionType::Sum);
        assert!(config.gradient_clip_norm.is_none());
    }

    #[test]
    fn test_invalid_training_config() {
        let zero_epochs = TrainingConfig {
            epochs: 0,
            ..TrainingConfig::default()
        };
        assert!(matches!(
            GCNTrainer::new(zero_epochs),
            Err(GNNError::InvalidConfiguration(_))
        ));

        let bad_lr = TrainingConfig {
            learning_rate: -1.0,
            ..TrainingConfig::default()
        };
        assert!(GCNTrainer::new(bad_lr).is_err());

        let bad_clip = TrainingConfig {
            gradient_clip_norm: Some(0.0),
            ..TrainingConfig::default()
        };
        assert!(GCNTrainer::new(bad_clip).is_err());
    }

    #[test]
    fn test_epoch_result_display() {
        let result = EpochResult {
            epoch: 3,
            loss: 0.693147,
            gradient_norm: 1.0,
            elapsed_time: 0.0,
        };
        assert_eq!(result.to_string(), "Epoch 3 | Loss: 0.6931");
    }

    #[test]
    fn test_accuracy() {
        assert_abs_diff_eq!(accuracy(&[0, 1, 1, 0], &[0, 1, 0, 0]).unwrap(), 0.75);
        assert!(matches!(
            accuracy(&[0, 1], &[0]),
            Err(GNNError::DimensionMismatch(_))
        ));
        assert!(accuracy(&[], &[]).is_err());
    }

    #[test]
    fn test_predicted_classes() {
        let logits = array![[0.2, 0.1], [-0.3, 0.4]];
        assert_eq!(predicted_classes(&logits), vec![0, 1]);
    }

    #[test]
    fn test_clip_gradients() {
        let mut grads = vec![3.0f32, 4.0];
        clip_gradients(&mut grads, 5.0, 1.0);
        assert_abs_diff_eq!(NumericalUtils::l2_norm(&grads), 1.0, epsilon = 1e-6);

        let mut small = vec![0.3f32, 0.4];
        clip_gradients(&mut small, 0.5, 1.0);
        assert_eq!(small, vec![0.3, 0.4]);
    }

    #[test]
    fn test_training_records_every_epoch() {
        let graph = karate::karate_club_graph().unwrap();
        let labeled = karate::default_labeled_nodes();
        let mut model = GCNModel::builder().seed(1).build().unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let config = TrainingConfig {
            epochs: 5,
            ..TrainingConfig::default()
        };
        let mut trainer = GCNTrainer::new(config)
            .unwrap()
            .with_callback(move |result: &EpochResult, _: &NodeFeatures| {
                sink.lock().unwrap().push(result.epoch);
            });

        let results = trainer.train(&mut model, &graph, &labeled).unwrap();

        assert_eq!(results.history.len(), 5);
        assert_eq!(results.snapshots.len(), 5);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(results.final_loss, results.history[4].loss);
        assert!(results.snapshots.iter().all(|s| s.dim() == (34, 2)));
    }

    #[test]
    fn test_snapshot_taken_before_update() {
        let graph = karate::karate_club_graph().unwrap();
        let labeled = karate::default_labeled_nodes();
        let mut model = GCNModel::builder().seed(9).build().unwrap();
        let initial_logits = model.predict(&graph).unwrap();

        let config = TrainingConfig {
            epochs: 1,
            ..TrainingConfig::default()
        };
        let results = GCNTrainer::new(config)
            .unwrap()
            .train(&mut model, &graph, &labeled)
            .unwrap();

        assert_eq!(results.snapshots.get(0), Some(&initial_logits));
        assert_ne!(model.predict(&graph).unwrap(), initial_logits);
    }

    #[test]
    fn test_non_finite_loss_aborts() {
        let graph = karate::karate_club_graph().unwrap();
        let labeled = karate::default_labeled_nodes();
        let mut model = GCNModel::new().unwrap();
        model
            .parameters_mut()
            .get_mut("layer2.bias")
            .unwrap()
            .fill(f32::NAN);

        let result = GCNTrainer::new(TrainingConfig::default())
            .unwrap()
            .train(&mut model, &graph, &labeled);
        assert!(matches!(result, Err(GNNError::NumericalInstability(_))));
    }

    #[test]
    fn test_labels_validated_against_model() {
        let graph = karate::karate_club_graph().unwrap();
        let mut model = GCNModel::new().unwrap();
        let labeled = LabeledNodes::new(vec![0, 34], vec![0, 1]).unwrap();

        let result = GCNTrainer::new(TrainingConfig::default())
            .unwrap()
            .train(&mut model, &graph, &labeled);
        assert!(matches!(result, Err(GNNError::InvalidInput(_))));

        let three_classes = LabeledNodes::new(vec![0, 33], vec![0, 2]).unwrap();
        let result = GCNTrainer::new(TrainingConfig::default())
            .unwrap()
            .train(&mut model, &graph, &three_classes);
        assert!(result.is_err());
    }
}
