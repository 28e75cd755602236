/**
 * @file zen-gcn/src/gnn/history.rs
 * @brief Per-epoch logit snapshots and animation frames
 *
 * The trainer records the full `[num_nodes, num_classes]` logit matrix once
 * per epoch, before that epoch's optimizer step. With two classes each row is
 * directly a point in the plane; [`EmbeddingHistory::frames`] turns the
 * snapshots into plot-ready frames (position plus predicted class per node)
 * for an external renderer.
 */

use std::slice::Iter;

#[cfg(feature = "serde")]
use std::path::Path;

use ndarray::Array2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::data::NodeFeatures;
use super::{GNNError, GNNResult};

/// Append-only sequence of logit snapshots, one per epoch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingHistory {
    snapshots: Vec<NodeFeatures>,
}

/// One animation frame: every node's 2-d logits and its arg-max class
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingFrame {
    pub epoch: usize,
    pub positions: Vec<[f32; 2]>,
    pub classes: Vec<usize>,
}

impl EmbeddingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, logits: NodeFeatures) {
        self.snapshots.push(logits);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Snapshot taken during `epoch` (0-based)
    pub fn get(&self, epoch: usize) -> Option<&NodeFeatures> {
        self.snapshots.get(epoch)
    }

    pub fn last(&self) -> Option<&NodeFeatures> {
        self.snapshots.last()
    }

    pub fn iter(&self) -> Iter<'_, NodeFeatures> {
        self.snapshots.iter()
    }

    /// Arg-max class per node at `epoch`
    pub fn predicted_classes(&self, epoch: usize) -> Option<Vec<usize>> {
        self.get(epoch).map(argmax_rows)
    }

    /**
     * Build one frame per snapshot.
     *
     * Only two-class logits can be plotted directly; anything else is
     * rejected with `InvalidInput`.
     */
    pub fn frames(&self) -> GNNResult<Vec<EmbeddingFrame>> {
        self.snapshots
            .iter()
            .enumerate()
            .map(|(epoch, logits)| {
                if logits.ncols() != 2 {
                    return Err(GNNError::InvalidInput(format!(
                        "Frames need 2-dimensional logits, epoch {} has {}",
                        epoch,
                        logits.ncols()
                    )));
                }
                Ok(EmbeddingFrame {
                    epoch,
                    positions: logits.rows().into_iter().map(|r| [r[0], r[1]]).collect(),
                    classes: argmax_rows(logits),
                })
            })
            .collect()
    }

    /// Serialize [`frames`](Self::frames) as pretty-printed JSON
    #[cfg(feature = "serde")]
    pub fn frames_json(&self) -> GNNResult<String> {
        Ok(serde_json::to_string_pretty(&self.frames()?)?)
    }

    #[cfg(feature = "serde")]
    pub fn write_frames_json(&self, path: impl AsRef<Path>) -> GNNResult<()> {
        std::fs::write(path, self.frames_json()?)?;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a EmbeddingHistory {
    type Item = &'a NodeFeatures;
    type IntoIter = Iter<'a, NodeFeatures>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.iter()
    }
}

/// Index of the largest entry in each row; the first one wins ties
pub fn argmax_rows(matrix: &Array2<f32>) -> Vec<usize> {
    matrix
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(best_idx, best), (idx, &v)| {
                    if v > best {
                        (idx, v)
                    } else {
                        (best_idx, best)
                    }
                })
                .0
        })
        .collect()
}
