//! Softmax cross-entropy for multi-class node classification

use std::marker::PhantomData;

use ndarray::{Array2, ArrayView2};
use num_traits::Float;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{NumericalUtils, TrainingError, ZenLossFunction};

/// How per-sample losses are combined into one scalar
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionType {
    Mean, // Average loss over samples
    Sum,  // Sum loss over samples
}

/// Cross entropy between softmax(logits) and a target distribution
#[derive(Debug, Clone)]
pub struct CrossEntropyLoss<T: Float> {
    reduction: ReductionType,
    _phantom: PhantomData<T>,
}

impl<T: Float> Default for CrossEntropyLoss<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float> CrossEntropyLoss<T> {
    pub fn new() -> Self {
        Self {
            reduction: ReductionType::Mean,
            _phantom: PhantomData,
        }
    }

    pub fn with_reduction(mut self, reduction: ReductionType) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn reduction(&self) -> ReductionType {
        self.reduction
    }

    fn softmax(&self, logits: &[T]) -> Vec<T> {
        // Numerically stable softmax
        let max_logit = logits
            .iter()
            .fold(T::neg_infinity(), |max, &x| if x > max { x } else { max });

        let exp_logits: Vec<T> = logits.iter().map(|&x| (x - max_logit).exp()).collect();
        let sum_exp: T = exp_logits.iter().fold(T::zero(), |acc, &x| acc + x);

        exp_logits.into_iter().map(|x| x / sum_exp).collect()
    }
}

impl<T: Float + Send + Sync> CrossEntropyLoss<T> {
    /**
     * Loss and logit gradient for a batch of rows with integer class labels.
     *
     * Row `i` of `logits` is scored against class `labels[i]`. The returned
     * gradient has the shape of `logits` and already includes the reduction
     * scale, so a caller only multiplies it by the upstream gradient.
     */
    pub fn batch_loss(
        &self,
        logits: ArrayView2<T>,
        labels: &[usize],
    ) -> Result<(T, Array2<T>), TrainingError> {
        let (rows, classes) = logits.dim();
        if rows != labels.len() {
            return Err(TrainingError::InvalidData(format!(
                "Got {} logit rows but {} labels",
                rows,
                labels.len()
            )));
        }
        if rows == 0 || classes == 0 {
            return Err(TrainingError::InvalidData("Empty predictions".to_string()));
        }

        let scale = match self.reduction {
            ReductionType::Mean => T::one() / T::from(rows).unwrap_or_else(T::one),
            ReductionType::Sum => T::one(),
        };

        let mut total = T::zero();
        let mut gradient = Array2::zeros((rows, classes));

        for (i, &label) in labels.iter().enumerate() {
            if label >= classes {
                return Err(TrainingError::InvalidData(format!(
                    "Label {} out of range for {} classes",
                    label, classes
                )));
            }
            let row: Vec<T> = logits.row(i).to_vec();
            let mut target = vec![T::zero(); classes];
            target[label] = T::one();

            total = total + self.compute_loss(&row, &target)?;
            for (k, g) in self.compute_gradient(&row, &target)?.into_iter().enumerate() {
                gradient[[i, k]] = g * scale;
            }
        }

        Ok((total * scale, gradient))
    }
}

impl<T: Float + Send + Sync> ZenLossFunction<T> for CrossEntropyLoss<T> {
    fn compute_loss(&self, predictions: &[T], targets: &[T]) -> Result<T, TrainingError> {
        if predictions.len() != targets.len() {
            return Err(TrainingError::InvalidData(
                "Predictions and targets must have the same length".to_string(),
            ));
        }

        if predictions.is_empty() {
            return Err(TrainingError::InvalidData("Empty predictions".to_string()));
        }

        // -sum_k t_k * log_softmax_k, with log_softmax_k = x_k - lse(x)
        let lse = NumericalUtils::log_sum_exp(predictions);
        let loss = predictions
            .iter()
            .zip(targets.iter())
            .fold(T::zero(), |acc, (&x, &t)| acc + t * (lse - x));

        Ok(loss)
    }

    fn compute_gradient(&self, predictions: &[T], targets: &[T]) -> Result<Vec<T>, TrainingError> {
        if predictions.len() != targets.len() {
            return Err(TrainingError::InvalidData(
                "Predictions and targets must have the same length".to_string(),
            ));
        }

        let probabilities = self.softmax(predictions);
        let target_mass = targets.iter().fold(T::zero(), |acc, &t| acc + t);

        Ok(probabilities
            .iter()
            .zip(targets.iter())
            .map(|(&p, &t)| p * target_mass - t)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_cross_entropy_loss() {
        let ce = CrossEntropyLoss::<f32>::new();
        let predictions = vec![2.0, 1.0, 0.1]; // logits
        let targets = vec![1.0, 0.0, 0.0]; // one-hot encoding

        let loss = ce.compute_loss(&predictions, &targets).unwrap();
        let expected = -(2.0f32.exp() / (2.0f32.exp() + 1.0f32.exp() + 0.1f32.exp())).ln();
        assert_abs_diff_eq!(loss, expected, epsilon = 1e-6);

        let gradients = ce.compute_gradient(&predictions, &targets).unwrap();
        assert_eq!(gradients.len(), 3);
        // Softmax gradient rows sum to zero
        assert_abs_diff_eq!(gradients.iter().sum::<f32>(), 0.0, epsilon = 1e-6);
        assert!(gradients[0] < 0.0);
    }

    #[test]
    fn test_uniform_logits_give_log_classes() {
        let ce = CrossEntropyLoss::<f64>::new();
        let loss = ce.compute_loss(&[0.5, 0.5], &[0.0, 1.0]).unwrap();
        assert_abs_diff_eq!(loss, 2.0f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_batch_loss_reductions() {
        let logits = array![[1.0f32, -1.0], [0.0, 2.0]];
        let labels = [0usize, 1];

        let (sum, sum_grad) = CrossEntropyLoss::new()
            .with_reduction(ReductionType::Sum)
            .batch_loss(logits.view(), &labels)
            .unwrap();
        let (mean, mean_grad) = CrossEntropyLoss::new()
            .with_reduction(ReductionType::Mean)
            .batch_loss(logits.view(), &labels)
            .unwrap();

        assert_abs_diff_eq!(sum, mean * 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(sum_grad[[0, 1]], mean_grad[[0, 1]] * 2.0, epsilon = 1e-6);
        assert!(sum > 0.0);
    }

    #[test]
    fn test_batch_loss_rejects_bad_labels() {
        let logits = array![[1.0f32, -1.0]];
        let ce = CrossEntropyLoss::new();
        assert!(ce.batch_loss(logits.view(), &[2]).is_err());
        assert!(ce.batch_loss(logits.view(), &[0, 1]).is_err());
    }

    #[test]
    fn test_large_logits_stay_finite() {
        let ce = CrossEntropyLoss::<f32>::new();
        let loss = ce.compute_loss(&[1000.0, -1000.0], &[0.0, 1.0]).unwrap();
        assert!(loss.is_finite());
        assert_abs_diff_eq!(loss, 2000.0, epsilon = 1e-2);
    }
}
