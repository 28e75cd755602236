//! Reverse-mode automatic differentiation over dense matrices
//!
//! A [`Tape`] is an arena of nodes appended in evaluation order. Each node
//! owns its forward value and remembers the operation and parent handles
//! that produced it. Since parents always precede children, walking the arena
//! backwards is a valid reverse topological order; [`Tape::backward`] does
//! exactly that and accumulates gradients into each parent.
//!
//! The tape is rebuilt for every forward pass and dropped after backward.
//! Parameter nodes hold a copy of the tensor at record time, so the
//! [`ParameterStore`] can be mutated freely once the gradients are out.
//!
//! ```rust
//! use ndarray::array;
//! use zen_gcn::autograd::Tape;
//!
//! let mut tape = Tape::new();
//! let x = tape.input(array![[1.0, 2.0]]);
//! let w = tape.input(array![[3.0], [4.0]]);
//! let y = tape.matmul(x, w)?;
//! let grads = tape.backward(y)?;
//! assert_eq!(grads.wrt(w), Some(&array![[1.0f32], [2.0]]));
//! # Ok::<(), zen_gcn::gnn::GNNError>(())
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use ndarray::{Array2, Axis, Zip};

use crate::gnn::aggregation::{AggregationStrategy, MessagePlan, ReduceRouting};
use crate::gnn::{GNNError, GNNResult};
use crate::training::CrossEntropyLoss;

pub mod params;
pub use params::ParameterStore;

/// Dense row-major matrix used for every value on the tape
pub type Matrix = Array2<f32>;

/// Handle to a node on a [`Tape`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(usize);

impl Var {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
enum Op {
    Input,
    Parameter(String),
    MatMul(Var, Var),
    /// Broadcast a `1 x n` bias over every row
    AddBias(Var, Var),
    Relu(Var),
    Send {
        input: Var,
        plan: Arc<MessagePlan>,
    },
    Reduce {
        input: Var,
        routing: ReduceRouting,
    },
    GatherRows {
        input: Var,
        rows: Vec<usize>,
    },
    /// Gradient w.r.t. the logits is produced alongside the loss
    CrossEntropy {
        input: Var,
        grad: Matrix,
    },
}

#[derive(Debug)]
struct Node {
    value: Matrix,
    op: Op,
}

/// Arena of recorded operations
#[derive(Debug, Default)]
pub struct Tape {
    nodes: Vec<Node>,
}

impl Tape {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Forward value of `var`
    pub fn value(&self, var: Var) -> &Matrix {
        &self.nodes[var.0].value
    }

    pub fn shape(&self, var: Var) -> (usize, usize) {
        self.value(var).dim()
    }

    fn push(&mut self, value: Matrix, op: Op) -> Var {
        self.nodes.push(Node { value, op });
        Var(self.nodes.len() - 1)
    }

    /// Constant leaf; gradients are computed but never applied
    pub fn input(&mut self, value: Matrix) -> Var {
        self.push(value, Op::Input)
    }

    /// Leaf holding a copy of a named parameter
    pub fn parameter(&mut self, store: &ParameterStore, name: &str) -> GNNResult<Var> {
        let value = store.get(name)?.clone();
        Ok(self.push(value, Op::Parameter(name.to_string())))
    }

    pub fn matmul(&mut self, a: Var, b: Var) -> GNNResult<Var> {
        let (lhs, rhs) = (self.value(a), self.value(b));
        if lhs.ncols() != rhs.nrows() {
            return Err(GNNError::DimensionMismatch(format!(
                "Cannot multiply {:?} by {:?}",
                lhs.dim(),
                rhs.dim()
            )));
        }
        let value = lhs.dot(rhs);
        Ok(self.push(value, Op::MatMul(a, b)))
    }

    pub fn add_bias(&mut self, a: Var, bias: Var) -> GNNResult<Var> {
        let (input, b) = (self.value(a), self.value(bias));
        if b.nrows() != 1 || b.ncols() != input.ncols() {
            return Err(GNNError::DimensionMismatch(format!(
                "Bias of shape {:?} cannot be added to {:?}",
                b.dim(),
                input.dim()
            )));
        }
        let value = input + b;
        Ok(self.push(value, Op::AddBias(a, bias)))
    }

    pub fn relu(&mut self, a: Var) -> Var {
        let value = self.value(a).mapv(|x| x.max(0.0));
        self.push(value, Op::Relu(a))
    }

    /// Per-edge messages from per-node payloads
    pub fn send(&mut self, input: Var, plan: &Arc<MessagePlan>) -> GNNResult<Var> {
        let value = plan.send(self.value(input).view())?;
        Ok(self.push(
            value,
            Op::Send {
                input,
                plan: Arc::clone(plan),
            },
        ))
    }

    /// Reduce per-edge messages onto their target nodes
    pub fn reduce(
        &mut self,
        messages: Var,
        strategy: &dyn AggregationStrategy,
        plan: &MessagePlan,
    ) -> GNNResult<Var> {
        let aggregated = strategy.aggregate(self.value(messages), plan.adjacency())?;
        Ok(self.push(
            aggregated.values,
            Op::Reduce {
                input: messages,
                routing: aggregated.routing,
            },
        ))
    }

    /// Select rows (in the given order, repeats allowed)
    pub fn gather_rows(&mut self, input: Var, rows: &[usize]) -> GNNResult<Var> {
        let source = self.value(input);
        if let Some(&bad) = rows.iter().find(|&&r| r >= source.nrows()) {
            return Err(GNNError::InvalidInput(format!(
                "Row {} out of range for {} rows",
                bad,
                source.nrows()
            )));
        }
        let value = source.select(Axis(0), rows);
        Ok(self.push(
            value,
            Op::GatherRows {
                input,
                rows: rows.to_vec(),
            },
        ))
    }

    /// Softmax cross-entropy of `logits` rows against `labels`, as a `1 x 1` scalar
    pub fn cross_entropy(
        &mut self,
        logits: Var,
        labels: &[usize],
        loss: &CrossEntropyLoss<f32>,
    ) -> GNNResult<Var> {
        let (value, grad) = loss.batch_loss(self.value(logits).view(), labels)?;
        Ok(self.push(
            Array2::from_elem((1, 1), value),
            Op::CrossEntropy {
                input: logits,
                grad,
            },
        ))
    }

    /**
     * Reverse pass from a scalar output.
     *
     * Returns gradients for every node that `output` depends on. Nodes
     * recorded after `output` are ignored.
     */
    pub fn backward(&self, output: Var) -> GNNResult<Gradients> {
        if self.shape(output) != (1, 1) {
            return Err(GNNError::InvalidInput(format!(
                "Backward needs a scalar output, got shape {:?}",
                self.shape(output)
            )));
        }

        let mut grads: Vec<Option<Matrix>> = vec![None; output.0 + 1];
        grads[output.0] = Some(Array2::ones((1, 1)));

        for idx in (0..=output.0).rev() {
            let Some(g) = grads[idx].take() else {
                continue;
            };

            match &self.nodes[idx].op {
                Op::Input | Op::Parameter(_) => {}
                Op::MatMul(a, b) => {
                    accumulate(&mut grads, *a, g.dot(&self.value(*b).t()));
                    accumulate(&mut grads, *b, self.value(*a).t().dot(&g));
                }
                Op::AddBias(a, bias) => {
                    accumulate(&mut grads, *bias, g.sum_axis(Axis(0)).insert_axis(Axis(0)));
                    accumulate(&mut grads, *a, g.clone());
                }
                Op::Relu(a) => {
                    let mut masked = g.clone();
                    Zip::from(&mut masked)
                        .and(self.value(*a))
                        .for_each(|grad, &x| {
                            if x <= 0.0 {
                                *grad = 0.0;
                            }
                        });
                    accumulate(&mut grads, *a, masked);
                }
                Op::Send { input, plan } => {
                    accumulate(&mut grads, *input, plan.send_backward(g.view()));
                }
                Op::Reduce { input, routing } => {
                    accumulate(&mut grads, *input, routing.backward(g.view()));
                }
                Op::GatherRows { input, rows } => {
                    let mut scattered = Array2::zeros(self.shape(*input));
                    for (i, &row) in rows.iter().enumerate() {
                        let mut target = scattered.row_mut(row);
                        target += &g.row(i);
                    }
                    accumulate(&mut grads, *input, scattered);
                }
                Op::CrossEntropy { input, grad } => {
                    accumulate(&mut grads, *input, grad * g[[0, 0]]);
                }
            }

            grads[idx] = Some(g);
        }

        let parameters = self.nodes[..=output.0]
            .iter()
            .enumerate()
            .filter_map(|(idx, node)| match &node.op {
                Op::Parameter(name) => Some((Var(idx), name.clone())),
                _ => None,
            })
            .collect();

        let shapes = self.nodes[..=output.0].iter().map(|n| n.value.dim()).collect();

        Ok(Gradients {
            grads,
            shapes,
            parameters,
        })
    }
}

fn accumulate(grads: &mut [Option<Matrix>], var: Var, g: Matrix) {
    match &mut grads[var.0] {
        Some(existing) => *existing += &g,
        slot @ None => *slot = Some(g),
    }
}

/// Result of [`Tape::backward`]
#[derive(Debug)]
pub struct Gradients {
    grads: Vec<Option<Matrix>>,
    shapes: Vec<(usize, usize)>,
    parameters: Vec<(Var, String)>,
}

impl Gradients {
    /// Gradient of the output with respect to `var`, if `var` influenced it
    pub fn wrt(&self, var: Var) -> Option<&Matrix> {
        self.grads.get(var.0).and_then(Option::as_ref)
    }

    /**
     * Gradients keyed by parameter name.
     *
     * A parameter recorded more than once has its gradients summed; one that
     * did not influence the output gets zeros.
     */
    pub fn parameter_gradients(&self) -> BTreeMap<String, Matrix> {
        let mut by_name: BTreeMap<String, Matrix> = BTreeMap::new();

        for (var, name) in &self.parameters {
            let grad = match self.wrt(*var) {
                Some(g) => g.clone(),
                None => Array2::zeros(self.shapes[var.0]),
            };
            match by_name.get_mut(name) {
                Some(existing) => *existing += &grad,
                None => {
                    by_name.insert(name.clone(), grad);
                }
            }
        }

        by_name
    }
}
