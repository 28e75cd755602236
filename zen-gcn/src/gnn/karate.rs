/**
 * @file zen-gcn/src/gnn/karate.rs
 * @brief Zachary's Karate Club
 *
 * 34 members of a university karate club observed by Wayne Zachary (1977).
 * After a dispute between the instructor (node 0, "Mr. Hi") and the
 * administrator (node 33, "Officer") the club split in two. Node ids are
 * 0-based and the edge list follows the usual published ordering.
 */

use super::data::{GraphData, GraphMetadata, LabeledNodes, NodeIndex};
use super::GNNResult;

/// Number of club members
pub const KARATE_NUM_NODES: usize = 34;

/// Instructor's node id
pub const INSTRUCTOR: NodeIndex = 0;

/// Administrator's node id
pub const ADMINISTRATOR: NodeIndex = 33;

/// The 78 undirected friendships
pub const KARATE_EDGES: [(NodeIndex, NodeIndex); 78] = [
    (0, 1), (0, 2), (0, 3), (0, 4), (0, 5), (0, 6), (0, 7), (0, 8),
    (0, 10), (0, 11), (0, 12), (0, 13), (0, 17), (0, 19), (0, 21), (0, 31),
    (1, 2), (1, 3), (1, 7), (1, 13), (1, 17), (1, 19), (1, 21), (1, 30),
    (2, 3), (2, 7), (2, 8), (2, 9), (2, 13), (2, 27), (2, 28), (2, 32),
    (3, 7), (3, 12), (3, 13),
    (4, 6), (4, 10),
    (5, 6), (5, 10), (5, 16),
    (6, 16),
    (8, 30), (8, 32), (8, 33),
    (9, 33),
    (13, 33),
    (14, 32), (14, 33),
    (15, 32), (15, 33),
    (18, 32), (18, 33),
    (19, 33),
    (20, 32), (20, 33),
    (22, 32), (22, 33),
    (23, 25), (23, 27), (23, 29), (23, 32), (23, 33),
    (24, 25), (24, 27), (24, 31),
    (25, 31),
    (26, 29), (26, 33),
    (27, 33),
    (28, 31), (28, 33),
    (29, 32), (29, 33),
    (30, 32), (30, 33),
    (31, 32), (31, 33),
    (32, 33),
];

/// Members who followed the instructor after the split
pub const MR_HI_MEMBERS: [NodeIndex; 17] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 13, 16, 17, 19, 21];

/// One-hot karate graph (34 x 34 identity features, 156 directed edges)
/// with the club split attached as node labels
pub fn karate_club_graph() -> GNNResult<GraphData> {
    let metadata = GraphMetadata {
        node_labels: Some(club_labels()),
    };

    Ok(GraphData::one_hot(KARATE_NUM_NODES, &KARATE_EDGES)?.with_metadata(metadata))
}

/// Club after the split: 0 for the instructor's side, 1 for the administrator's
pub fn club_labels() -> Vec<usize> {
    (0..KARATE_NUM_NODES)
        .map(|node| usize::from(!MR_HI_MEMBERS.contains(&node)))
        .collect()
}

/// The two supervised nodes: instructor in class 0, administrator in class 1
pub fn default_labeled_nodes() -> LabeledNodes {
    LabeledNodes {
        nodes: vec![INSTRUCTOR, ADMINISTRATOR],
        labels: vec![0, 1],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_karate_shape() {
        let graph = karate_club_graph().unwrap();
        assert_eq!(graph.num_nodes(), 34);
        assert_eq!(graph.num_edges(), 156);
        assert_eq!(graph.node_feature_dim(), 34);
        assert!(graph.adjacency_list.is_undirected());
    }

    #[test]
    fn test_karate_degrees() {
        let graph = karate_club_graph().unwrap();
        assert_eq!(graph.degree(0), 16);
        assert_eq!(graph.degree(33), 17);
        assert_eq!(graph.degree(32), 12);
        assert_eq!(graph.degree(11), 1);
        let total: usize = (0..34).map(|n| graph.degree(n)).sum();
        assert_eq!(total, 156);
    }

    #[test]
    fn test_club_split() {
        let labels = club_labels();
        assert_eq!(labels.iter().filter(|&&l| l == 0).count(), 17);
        assert_eq!(labels[INSTRUCTOR], 0);
        assert_eq!(labels[ADMINISTRATOR], 1);

        let graph = karate_club_graph().unwrap();
        assert_eq!(graph.metadata.node_labels, Some(labels));
    }

    #[test]
    fn test_default_labeled_nodes() {
        let labeled = default_labeled_nodes();
        assert!(labeled.validate(KARATE_NUM_NODES, 2).is_ok());
        assert_eq!(labeled.iter().collect::<Vec<_>>(), vec![(0, 0), (33, 1)]);
    }
}
