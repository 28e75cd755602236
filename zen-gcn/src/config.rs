//! Experiment configuration
//!
//! An [`ExperimentConfig`] bundles the model and training settings. With the
//! `serde` feature it loads from JSON; any field left out keeps its default,
//! so `{}` describes the standard karate run.
//!
//! ```json
//! {
//!   "model": { "hidden_dimensions": 8, "aggregation": "mean" },
//!   "training": { "epochs": 50, "learning_rate": 0.005 }
//! }
//! ```

#[cfg(feature = "serde")]
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::gnn::{GCNConfig, GNNResult, TrainingConfig};

/// Model and training settings for one run
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentConfig {
    pub model: GCNConfig,
    pub training: TrainingConfig,
}

impl ExperimentConfig {
    /// Check the training settings; model settings are checked when the model is built
    pub fn validate(&self) -> GNNResult<()> {
        self.training.validate()
    }

    #[cfg(feature = "serde")]
    pub fn from_json_str(json: &str) -> GNNResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "serde")]
    pub fn from_json_file(path: impl AsRef<Path>) -> GNNResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    #[cfg(feature = "serde")]
    pub fn to_json_string(&self) -> GNNResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
