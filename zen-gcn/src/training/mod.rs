//! Optimizers and loss functions shared by the graph trainers
//!
//! Everything in here works on flat parameter slices or dense per-row
//! predictions and knows nothing about graphs. The GCN trainer in
//! [`crate::gnn::training`] flattens its parameter store into the shape these
//! components expect.

use num_traits::Float;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Optimizer implementations
pub mod optimizers;
pub use optimizers::*;

/// Loss function library
pub mod losses;
pub use losses::*;

/// Errors raised by optimizers and loss functions
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrainingError {
    #[error("Invalid training data: {0}")]
    InvalidData(String),

    #[error("Training failed: {0}")]
    TrainingFailed(String),
}

/// Optimizer selection with its hyperparameters
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizerType {
    /// Stochastic Gradient Descent with optional momentum
    SGD { momentum: f32 },
    /// Adam with bias correction
    Adam { beta1: f32, beta2: f32, epsilon: f32 },
}

impl Default for OptimizerType {
    fn default() -> Self {
        OptimizerType::Adam {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// Optimizer trait for zen training loops
pub trait ZenOptimizer<T: Float>: Send + Sync {
    fn initialize(&mut self, parameter_count: usize) -> Result<(), TrainingError>;
    fn update_parameters(&mut self, parameters: Vec<&mut T>, gradients: &[T]) -> Result<(), TrainingError>;
    fn set_learning_rate(&mut self, lr: T);
    fn get_learning_rate(&self) -> T;
    fn reset(&mut self);
}

/// Loss function trait, evaluated one sample at a time
pub trait ZenLossFunction<T: Float>: Send + Sync {
    fn compute_loss(&self, predictions: &[T], targets: &[T]) -> Result<T, TrainingError>;
    fn compute_gradient(&self, predictions: &[T], targets: &[T]) -> Result<Vec<T>, TrainingError>;
}

/// Small numerical helpers used by optimizers and trainers
pub struct NumericalUtils;

impl NumericalUtils {
    /// Check if a value is finite and not NaN
    pub fn is_finite<T: Float>(value: T) -> bool {
        value.is_finite() && !value.is_nan()
    }

    /// Compute the L2 norm of a vector
    pub fn l2_norm<T: Float>(vector: &[T]) -> T {
        vector
            .iter()
            .map(|x| *x * *x)
            .fold(T::zero(), |acc, x| acc + x)
            .sqrt()
    }

    /// Numerically stable log-sum-exp
    pub fn log_sum_exp<T: Float>(values: &[T]) -> T {
        let max = values
            .iter()
            .fold(T::neg_infinity(), |max, &x| if x > max { x } else { max });
        if !max.is_finite() {
            return max;
        }
        let sum = values
            .iter()
            .fold(T::zero(), |acc, &x| acc + (x - max).exp());
        max + sum.ln()
    }
}
