use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, NodeId};

//
// ─── NODE TYPE ─────────────────────────────────────────────────────────────────
//

/// Kind of content a learning node delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Video,
    Scorm,
    Quiz,
}

impl NodeType {
    /// Stable string encoding used by storage backends.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Video => "video",
            NodeType::Scorm => "scorm",
            NodeType::Quiz => "quiz",
        }
    }

    /// Whether this node type can carry a score requirement.
    #[must_use]
    pub fn is_scored(&self) -> bool {
        matches!(self, NodeType::Quiz | NodeType::Scorm)
    }
}

//
// ─── UNLOCK RULE ───────────────────────────────────────────────────────────────
//

/// Conditions that must hold before a node becomes accessible.
///
/// Prerequisites are a typed set of node references, resolved once when the
/// course graph is loaded; the score threshold applies to scored node types
/// and gates propagation to the following node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnlockRule {
    prerequisites: BTreeSet<NodeId>,
    required_score: Option<f64>,
}

impl UnlockRule {
    /// Rule with no prerequisites and no score requirement.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Rule requiring the given explicit prerequisite nodes.
    #[must_use]
    pub fn with_prerequisites<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = NodeId>,
    {
        Self {
            prerequisites: ids.into_iter().collect(),
            required_score: None,
        }
    }

    /// Attach a minimum score (0..=100) to this rule.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::InvalidScoreThreshold` if the score is not a
    /// finite value within 0..=100.
    pub fn with_required_score(mut self, score: f64) -> Result<Self, NodeError> {
        if !score.is_finite() || !(0.0..=100.0).contains(&score) {
            return Err(NodeError::InvalidScoreThreshold { provided: score });
        }
        self.required_score = Some(score);
        Ok(self)
    }

    #[must_use]
    pub fn prerequisites(&self) -> &BTreeSet<NodeId> {
        &self.prerequisites
    }

    #[must_use]
    pub fn required_score(&self) -> Option<f64> {
        self.required_score
    }

    /// Rehydrate a rule from persisted parts without re-validating the
    /// threshold range (storage wrote a validated value).
    #[must_use]
    pub fn from_persisted(prerequisites: BTreeSet<NodeId>, required_score: Option<f64>) -> Self {
        Self {
            prerequisites,
            required_score,
        }
    }
}

//
// ─── LEARNING NODE ─────────────────────────────────────────────────────────────
//

/// One unit of course content: a video, SCORM package, or quiz, with its
/// position in the course and the rule unlocking it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningNode {
    id: NodeId,
    course_id: CourseId,
    position: u32,
    title: String,
    node_type: NodeType,
    is_optional: bool,
    unlock: UnlockRule,
}

impl LearningNode {
    /// Create a validated node.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::EmptyTitle` for a blank title,
    /// `NodeError::SelfPrerequisite` if the node lists itself as a
    /// prerequisite, or `NodeError::ScoreOnUnscoredType` if a score
    /// requirement is attached to a video node.
    pub fn new(
        id: NodeId,
        course_id: CourseId,
        position: u32,
        title: impl Into<String>,
        node_type: NodeType,
        is_optional: bool,
        unlock: UnlockRule,
    ) -> Result<Self, NodeError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(NodeError::EmptyTitle);
        }
        if unlock.prerequisites().contains(&id) {
            return Err(NodeError::SelfPrerequisite { node: id });
        }
        if unlock.required_score().is_some() && !node_type.is_scored() {
            return Err(NodeError::ScoreOnUnscoredType { node: id });
        }

        Ok(Self {
            id,
            course_id,
            position,
            title,
            node_type,
            is_optional,
            unlock,
        })
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.is_optional
    }

    #[must_use]
    pub fn unlock(&self) -> &UnlockRule {
        &self.unlock
    }

    /// Score a learner must reach on this node, if any.
    #[must_use]
    pub fn required_score(&self) -> Option<f64> {
        self.unlock.required_score()
    }
}

//
// ─── NODE VALIDATION ERRORS ────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum NodeError {
    #[error("node title must not be empty")]
    EmptyTitle,

    #[error("node {node} lists itself as a prerequisite")]
    SelfPrerequisite { node: NodeId },

    #[error("node {node} is not a scored type but carries a score requirement")]
    ScoreOnUnscoredType { node: NodeId },

    #[error("score threshold must be a finite value in 0..=100, got {provided}")]
    InvalidScoreThreshold { provided: f64 },
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
