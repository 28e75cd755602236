//! Optimizer implementations over flat parameter slices
//!
//! Both optimizers keep one state slot per scalar parameter, so the caller
//! must present parameters and gradients in the same order on every step.

use num_traits::Float;

use super::{NumericalUtils, OptimizerType, TrainingError, ZenOptimizer};

/// SGD with momentum optimizer
pub struct ZenSGD<T: Float> {
    learning_rate: T,
    momentum: T,
    weight_decay: T,

    // State buffers
    momentum_buffers: Vec<T>,
    initialized: bool,
}

impl<T: Float + Default + Send + Sync> ZenSGD<T> {
    pub fn new(learning_rate: T, momentum: T) -> Self {
        Self {
            learning_rate,
            momentum,
            weight_decay: T::zero(),
            momentum_buffers: Vec::new(),
            initialized: false,
        }
    }

    pub fn with_weight_decay(mut self, weight_decay: T) -> Self {
        self.weight_decay = weight_decay;
        self
    }
}

impl<T: Float + Default + Send + Sync> ZenOptimizer<T> for ZenSGD<T> {
    fn initialize(&mut self, parameter_count: usize) -> Result<(), TrainingError> {
        self.momentum_buffers = vec![T::default(); parameter_count];
        self.initialized = true;
        Ok(())
    }

    fn update_parameters(&mut self, parameters: Vec<&mut T>, gradients: &[T]) -> Result<(), TrainingError> {
        if !self.initialized {
            return Err(TrainingError::TrainingFailed("Optimizer not initialized".to_string()));
        }

        if parameters.len() != gradients.len() || parameters.len() != self.momentum_buffers.len() {
            return Err(TrainingError::TrainingFailed(format!(
                "Parameter/gradient size mismatch: {} parameters, {} gradients, {} state slots",
                parameters.len(),
                gradients.len(),
                self.momentum_buffers.len()
            )));
        }

        // Nothing is written back unless every updated value is finite
        let mut buffers = self.momentum_buffers.clone();
        let mut updated = Vec::with_capacity(parameters.len());
        for (i, (param, &grad)) in parameters.iter().zip(gradients.iter()).enumerate() {
            let d_p = if self.weight_decay != T::zero() {
                grad + self.weight_decay * **param
            } else {
                grad
            };

            let update = if self.momentum != T::zero() {
                buffers[i] = self.momentum * buffers[i] + d_p;
                buffers[i]
            } else {
                d_p
            };

            let value = **param - self.learning_rate * update;
            if !NumericalUtils::is_finite(value) {
                return Err(TrainingError::TrainingFailed(
                    "Parameter became NaN or infinite during SGD update".to_string(),
                ));
            }
            updated.push(value);
        }

        for (param, value) in parameters.into_iter().zip(updated) {
            *param = value;
        }
        self.momentum_buffers = buffers;

        Ok(())
    }

    fn set_learning_rate(&mut self, lr: T) {
        self.learning_rate = lr;
    }

    fn get_learning_rate(&self) -> T {
        self.learning_rate
    }

    fn reset(&mut self) {
        for buffer in &mut self.momentum_buffers {
            *buffer = T::default();
        }
    }
}

/// Adam optimizer with bias correction
pub struct ZenAdam<T: Float> {
    learning_rate: T,
    beta1: T,
    beta2: T,
    epsilon: T,
    weight_decay: T,

    // State buffers
    m_buffers: Vec<T>, // First moment
    v_buffers: Vec<T>, // Second moment
    step_count: u64,
    initialized: bool,
}

impl<T: Float + Default + Send + Sync> ZenAdam<T> {
    pub fn new(learning_rate: T, beta1: T, beta2: T, epsilon: T) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            weight_decay: T::zero(),
            m_buffers: Vec::new(),
            v_buffers: Vec::new(),
            step_count: 0,
            initialized: false,
        }
    }

    pub fn with_weight_decay(mut self, weight_decay: T) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    /// Number of updates applied since the last initialize/reset
    pub fn step_count(&self) -> u64 {
        self.step_count
    }
}

impl<T: Float + Default + Send + Sync> ZenOptimizer<T> for ZenAdam<T> {
    fn initialize(&mut self, parameter_count: usize) -> Result<(), TrainingError> {
        self.m_buffers = vec![T::default(); parameter_count];
        self.v_buffers = vec![T::default(); parameter_count];
        self.initialized = true;
        self.step_count = 0;
        Ok(())
    }

    fn update_parameters(&mut self, parameters: Vec<&mut T>, gradients: &[T]) -> Result<(), TrainingError> {
        if !self.initialized {
            return Err(TrainingError::TrainingFailed("Optimizer not initialized".to_string()));
        }

        if parameters.len() != gradients.len() || parameters.len() != self.m_buffers.len() {
            return Err(TrainingError::TrainingFailed(format!(
                "Parameter/gradient size mismatch: {} parameters, {} gradients, {} state slots",
                parameters.len(),
                gradients.len(),
                self.m_buffers.len()
            )));
        }

        let step = (self.step_count + 1).min(i32::MAX as u64) as i32;
        let bias_correction1 = T::one() - self.beta1.powi(step);
        let bias_correction2 = T::one() - self.beta2.powi(step);

        let mut m_buffers = self.m_buffers.clone();
        let mut v_buffers = self.v_buffers.clone();
        let mut updated = Vec::with_capacity(parameters.len());
        for (i, (param, &grad)) in parameters.iter().zip(gradients.iter()).enumerate() {
            // L2 penalty folded into the gradient
            let d_p = if self.weight_decay != T::zero() {
                grad + self.weight_decay * **param
            } else {
                grad
            };

            m_buffers[i] = self.beta1 * m_buffers[i] + (T::one() - self.beta1) * d_p;
            v_buffers[i] = self.beta2 * v_buffers[i] + (T::one() - self.beta2) * d_p * d_p;

            let m_hat = m_buffers[i] / bias_correction1;
            let v_hat = v_buffers[i] / bias_correction2;

            let value = **param - self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
            if !NumericalUtils::is_finite(value) {
                return Err(TrainingError::TrainingFailed(
                    "Parameter became NaN or infinite during Adam update".to_string(),
                ));
            }
            updated.push(value);
        }

        for (param, value) in parameters.into_iter().zip(updated) {
            *param = value;
        }
        self.m_buffers = m_buffers;
        self.v_buffers = v_buffers;
        self.step_count += 1;

        Ok(())
    }

    fn set_learning_rate(&mut self, lr: T) {
        self.learning_rate = lr;
    }

    fn get_learning_rate(&self) -> T {
        self.learning_rate
    }

    fn reset(&mut self) {
        for buffer in &mut self.m_buffers {
            *buffer = T::default();
        }
        for buffer in &mut self.v_buffers {
            *buffer = T::default();
        }
        self.step_count = 0;
    }
}

/// Factory function to create optimizers
pub fn create_optimizer(
    optimizer_type: &OptimizerType,
    learning_rate: f32,
    weight_decay: f32,
) -> Result<Box<dyn ZenOptimizer<f32>>, TrainingError> {
    if !(learning_rate.is_finite() && learning_rate > 0.0) {
        return Err(TrainingError::TrainingFailed(format!(
            "Learning rate must be positive and finite, got {}",
            learning_rate
        )));
    }

    match *optimizer_type {
        OptimizerType::SGD { momentum } => Ok(Box::new(
            ZenSGD::new(learning_rate, momentum).with_weight_decay(weight_decay),
        )),
        OptimizerType::Adam { beta1, beta2, epsilon } => {
            if !(0.0..1.0).contains(&beta1) || !(0.0..1.0).contains(&beta2) {
                return Err(TrainingError::TrainingFailed(format!(
                    "Adam betas must lie in [0, 1), got ({}, {})",
                    beta1, beta2
                )));
            }
            Ok(Box::new(
                ZenAdam::new(learning_rate, beta1, beta2, epsilon).with_weight_decay(weight_decay),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_sgd_optimizer() {
        let mut sgd = ZenSGD::new(0.1f32, 0.9);
        sgd.initialize(3).unwrap();

        let mut params = vec![1.0f32, 2.0f32, 3.0f32];
        let param_refs: Vec<&mut f32> = params.iter_mut().collect();
        let gradients = vec![0.1f32, 0.2f32, 0.3f32];

        sgd.update_parameters(param_refs, &gradients).unwrap();

        // First update should be: param = param - lr * grad
        assert_abs_diff_eq!(params[0], 0.99, epsilon = 1e-6);
        assert_abs_diff_eq!(params[1], 1.98, epsilon = 1e-6);
        assert_abs_diff_eq!(params[2], 2.97, epsilon = 1e-6);
    }

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        let mut adam = ZenAdam::new(0.01f32, 0.9, 0.999, 1e-8);
        adam.initialize(2).unwrap();

        let mut params = vec![1.0f32, 2.0f32];
        let param_refs: Vec<&mut f32> = params.iter_mut().collect();
        let gradients = vec![0.1f32, -0.2f32];

        adam.update_parameters(param_refs, &gradients).unwrap();

        // Bias-corrected first step is lr * sign(grad)
        assert_abs_diff_eq!(params[0], 0.99, epsilon = 1e-5);
        assert_abs_diff_eq!(params[1], 2.01, epsilon = 1e-5);
        assert_eq!(adam.step_count(), 1);
    }

    #[test]
    fn test_adam_rejects_mismatched_sizes() {
        let mut adam = ZenAdam::new(0.01f32, 0.9, 0.999, 1e-8);
        adam.initialize(3).unwrap();

        let mut params = vec![1.0f32, 2.0f32];
        let param_refs: Vec<&mut f32> = params.iter_mut().collect();
        assert!(adam.update_parameters(param_refs, &[0.1, 0.2]).is_err());
    }

    #[test]
    fn test_uninitialized_optimizer_fails() {
        let mut sgd = ZenSGD::new(0.1f32, 0.0);
        let mut params = vec![1.0f32];
        let param_refs: Vec<&mut f32> = params.iter_mut().collect();
        assert!(sgd.update_parameters(param_refs, &[0.1]).is_err());
    }

    #[test]
    fn test_non_finite_update_is_reported() {
        let mut sgd = ZenSGD::new(0.1f32, 0.0);
        sgd.initialize(1).unwrap();
        let mut params = vec![1.0f32];
        let param_refs: Vec<&mut f32> = params.iter_mut().collect();
        let result = sgd.update_parameters(param_refs, &[f32::NAN]);
        assert!(matches!(result, Err(TrainingError::TrainingFailed(_))));
    }

    #[test]
    fn test_failed_update_leaves_parameters_and_state_untouched() {
        let mut adam = ZenAdam::new(0.01f32, 0.9, 0.999, 1e-8);
        adam.initialize(3).unwrap();

        // The last gradient is the only bad one
        let mut params = vec![1.0f32, 2.0, 3.0];
        let param_refs: Vec<&mut f32> = params.iter_mut().collect();
        let result = adam.update_parameters(param_refs, &[0.1, 0.2, f32::INFINITY]);

        assert!(result.is_err());
        assert_eq!(params, vec![1.0f32, 2.0, 3.0]);
        assert_eq!(adam.step_count(), 0);
        assert!(adam.m_buffers.iter().all(|&m| m == 0.0));

        let mut sgd = ZenSGD::new(0.1f32, 0.9);
        sgd.initialize(2).unwrap();
        let mut params = vec![1.0f32, 2.0];
        let param_refs: Vec<&mut f32> = params.iter_mut().collect();
        assert!(sgd.update_parameters(param_refs, &[0.5, f32::NAN]).is_err());
        assert_eq!(params, vec![1.0f32, 2.0]);
        assert!(sgd.momentum_buffers.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_optimizer_learning_rate() {
        let mut adam = ZenAdam::new(0.001f32, 0.9, 0.999, 1e-8);
        assert_eq!(adam.get_learning_rate(), 0.001);

        adam.set_learning_rate(0.01);
        assert_eq!(adam.get_learning_rate(), 0.01);
    }

    #[test]
    fn test_optimizer_reset() {
        let mut sgd = ZenSGD::new(0.1f32, 0.9);
        sgd.initialize(2).unwrap();

        let mut params = vec![1.0f32, 2.0f32];
        let param_refs: Vec<&mut f32> = params.iter_mut().collect();
        let gradients = vec![0.1f32, 0.2f32];
        sgd.update_parameters(param_refs, &gradients).unwrap();

        sgd.reset();

        assert_eq!(sgd.momentum_buffers[0], 0.0);
        assert_eq!(sgd.momentum_buffers[1], 0.0);
    }

    #[test]
    fn test_optimizer_factory() {
        assert!(create_optimizer(&OptimizerType::default(), 0.01, 0.0).is_ok());
        assert!(create_optimizer(&OptimizerType::SGD { momentum: 0.9 }, 0.1, 0.0).is_ok());
        assert!(create_optimizer(&OptimizerType::default(), 0.0, 0.0).is_err());
        assert!(create_optimizer(
            &OptimizerType::Adam { beta1: 1.5, beta2: 0.999, epsilon: 1e-8 },
            0.01,
            0.0
        )
        .is_err());
    }
}
