use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, NodeId};
use crate::model::node::LearningNode;

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

/// A course owning an ordered set of learning nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    id: CourseId,
    title: String,
    created_at: DateTime<Utc>,
}

impl Course {
    /// Create a validated course.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyTitle` for a blank title.
    pub fn new(
        id: CourseId,
        title: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyTitle);
        }
        Ok(Self {
            id,
            title,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

//
// ─── COURSE GRAPH ──────────────────────────────────────────────────────────────
//

/// A course together with its nodes in declared order.
///
/// Ordering happens exactly once, here: nodes are sorted by
/// `(position, id)` so evaluation can do a single forward walk without
/// re-sorting. Prerequisite references stay as plain `NodeId`s; the
/// evaluator resolves them against this order.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseGraph {
    course: Course,
    nodes: Vec<LearningNode>,
}

impl CourseGraph {
    /// Build a graph from a course and its (possibly unordered) nodes.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::ForeignNode` if a node belongs to another
    /// course, or `CourseError::DuplicateNode` for repeated node ids.
    pub fn new(course: Course, mut nodes: Vec<LearningNode>) -> Result<Self, CourseError> {
        for node in &nodes {
            if node.course_id() != course.id() {
                return Err(CourseError::ForeignNode {
                    node: node.id(),
                    course: node.course_id(),
                });
            }
        }

        nodes.sort_by_key(|n| (n.position(), n.id()));

        let mut ids: Vec<NodeId> = nodes.iter().map(LearningNode::id).collect();
        ids.sort_unstable();
        for pair in ids.windows(2) {
            if pair[0] == pair[1] {
                return Err(CourseError::DuplicateNode { node: pair[0] });
            }
        }

        Ok(Self { course, nodes })
    }

    #[must_use]
    pub fn course(&self) -> &Course {
        &self.course
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course.id()
    }

    /// Nodes in declared order.
    #[must_use]
    pub fn nodes(&self) -> &[LearningNode] {
        &self.nodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&LearningNode> {
        self.nodes.iter().find(|n| n.id() == id)
    }
}

//
// ─── COURSE VALIDATION ERRORS ──────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title must not be empty")]
    EmptyTitle,

    #[error("node {node} belongs to course {course}, not this one")]
    ForeignNode { node: NodeId, course: CourseId },

    #[error("duplicate node id {node} in course graph")]
    DuplicateNode { node: NodeId },
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::{NodeType, UnlockRule};
    use crate::time::fixed_now;

    fn build_node(id: u64, course: u64, position: u32) -> LearningNode {
        LearningNode::new(
            NodeId::new(id),
            CourseId::new(course),
            position,
            format!("Node {id}"),
            NodeType::Video,
            false,
            UnlockRule::none(),
        )
        .unwrap()
    }

    #[test]
    fn course_rejects_empty_title() {
        let err = Course::new(CourseId::new(1), "  ", fixed_now()).unwrap_err();
        assert!(matches!(err, CourseError::EmptyTitle));
    }

    #[test]
    fn graph_orders_nodes_by_position_then_id() {
        let course = Course::new(CourseId::new(1), "Rust 101", fixed_now()).unwrap();
        let nodes = vec![
            build_node(3, 1, 2),
            build_node(1, 1, 0),
            build_node(5, 1, 1),
            build_node(4, 1, 1),
        ];

        let graph = CourseGraph::new(course, nodes).unwrap();
        let order: Vec<u64> = graph.nodes().iter().map(|n| n.id().value()).collect();
        assert_eq!(order, vec![1, 4, 5, 3]);
    }

    #[test]
    fn graph_rejects_foreign_node() {
        let course = Course::new(CourseId::new(1), "Rust 101", fixed_now()).unwrap();
        let err = CourseGraph::new(course, vec![build_node(1, 2, 0)]).unwrap_err();
        assert!(matches!(err, CourseError::ForeignNode { .. }));
    }

    #[test]
    fn graph_rejects_duplicate_node_ids() {
        let course = Course::new(CourseId::new(1), "Rust 101", fixed_now()).unwrap();
        let err =
            CourseGraph::new(course, vec![build_node(1, 1, 0), build_node(1, 1, 3)]).unwrap_err();
        assert!(matches!(err, CourseError::DuplicateNode { node } if node == NodeId::new(1)));
    }

    #[test]
    fn empty_graph_is_valid() {
        let course = Course::new(CourseId::new(1), "Rust 101", fixed_now()).unwrap();
        let graph = CourseGraph::new(course, Vec::new()).unwrap();
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
    }

    #[test]
    fn node_lookup_finds_by_id() {
        let course = Course::new(CourseId::new(1), "Rust 101", fixed_now()).unwrap();
        let graph = CourseGraph::new(course, vec![build_node(1, 1, 0), build_node(2, 1, 1)])
            .unwrap();

        assert_eq!(graph.node(NodeId::new(2)).unwrap().position(), 1);
        assert!(graph.node(NodeId::new(9)).is_none());
    }
}
