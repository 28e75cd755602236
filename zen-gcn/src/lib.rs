//! # zen-gcn
//!
//! Semi-supervised node classification with a graph convolutional network,
//! built on an explicit message-passing engine and a small reverse-mode
//! gradient tape over `ndarray` matrices.
//!
//! The bundled experiment trains a two-layer GCN (34 → 5 → 2) on Zachary's
//! Karate Club with one labeled node per faction and records the logits of
//! every node at every epoch.
//!
//! ```rust
//! use zen_gcn::gnn::{karate, GCNModel, GCNTrainer, TrainingConfig};
//!
//! let graph = karate::karate_club_graph()?;
//! let labeled = karate::default_labeled_nodes();
//!
//! let mut model = GCNModel::builder().seed(0).build()?;
//! let mut trainer = GCNTrainer::new(TrainingConfig::default())?;
//! let results = trainer.train(&mut model, &graph, &labeled)?;
//!
//! assert_eq!(results.history.len(), 30);
//! assert_eq!(results.snapshots.len(), 30);
//! # Ok::<(), zen_gcn::gnn::GNNError>(())
//! ```
//!
//! ## Modules
//!
//! - [`gnn`]: graph data, message passing, the GCN model and its trainer
//! - [`autograd`]: the gradient tape and the parameter store
//! - [`training`]: optimizers and loss functions
//! - [`config`]: JSON-loadable experiment settings

pub mod autograd;
pub mod config;
pub mod gnn;
pub mod training;

pub use autograd::{Gradients, ParameterStore, Tape, Var};
pub use config::ExperimentConfig;
pub use gnn::{
    AggregationMethod, GCNConfig, GCNModel, GCNTrainer, GNNError, GNNResult, GraphData,
    LabeledNodes, Normalization, TrainingConfig, WeightInitialization,
};
pub use training::{OptimizerType, ReductionType, TrainingError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
