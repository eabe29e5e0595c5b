use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, NodeId, UserId};

//
// ─── NODE PROGRESS ─────────────────────────────────────────────────────────────
//

/// Per-user progress on a single learning node.
///
/// Created lazily on first interaction; a missing row means the learner
/// has not touched the node at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeProgress {
    pub user_id: UserId,
    pub node_id: NodeId,
    pub completed: bool,
    pub score: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl NodeProgress {
    /// A fresh, untouched progress row.
    #[must_use]
    pub fn started(user_id: UserId, node_id: NodeId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            node_id,
            completed: false,
            score: None,
            updated_at: now,
        }
    }

    /// A completed row with an optional recorded score.
    #[must_use]
    pub fn completed(
        user_id: UserId,
        node_id: NodeId,
        score: Option<f64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            node_id,
            completed: true,
            score,
            updated_at: now,
        }
    }

    /// Whether this row satisfies the given score threshold.
    ///
    /// Absent score with a threshold present counts as not met.
    #[must_use]
    pub fn meets_score(&self, required: Option<f64>) -> bool {
        match required {
            None => true,
            Some(threshold) => self.score.is_some_and(|s| s >= threshold),
        }
    }
}

//
// ─── COURSE PROGRESS SUMMARY ───────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SummaryError {
    #[error("completed nodes ({completed}) exceeds total nodes ({total})")]
    CountMismatch { completed: u32, total: u32 },

    #[error("progress percent must be a finite value in 0..=100, got {provided}")]
    InvalidPercent { provided: f64 },
}

/// Cached aggregate of a user's completion state across one course.
///
/// Derived exclusively by the summary writer; recomputed, never
/// hand-edited. Totals count required (non-optional) nodes only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseProgressSummary {
    user_id: UserId,
    course_id: CourseId,
    total_nodes: u32,
    completed_nodes: u32,
    progress_percent: f64,
    can_take_final_exam: bool,
    final_exam_passed: bool,
    certificate_issued: bool,
    updated_at: DateTime<Utc>,
}

impl CourseProgressSummary {
    /// Rehydrate a summary from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SummaryError::CountMismatch` if completed exceeds total, or
    /// `SummaryError::InvalidPercent` if the percent is outside 0..=100.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        user_id: UserId,
        course_id: CourseId,
        total_nodes: u32,
        completed_nodes: u32,
        progress_percent: f64,
        can_take_final_exam: bool,
        final_exam_passed: bool,
        certificate_issued: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, SummaryError> {
        if completed_nodes > total_nodes {
            return Err(SummaryError::CountMismatch {
                completed: completed_nodes,
                total: total_nodes,
            });
        }
        if !progress_percent.is_finite() || !(0.0..=100.0).contains(&progress_percent) {
            return Err(SummaryError::InvalidPercent {
                provided: progress_percent,
            });
        }

        Ok(Self {
            user_id,
            course_id,
            total_nodes,
            completed_nodes,
            progress_percent,
            can_take_final_exam,
            final_exam_passed,
            certificate_issued,
            updated_at,
        })
    }

    /// Build a summary from freshly computed counts.
    ///
    /// The percent is derived here (0 when there are no required nodes, so
    /// an empty course never yields NaN).
    ///
    /// # Errors
    ///
    /// Returns `SummaryError::CountMismatch` if completed exceeds total.
    #[allow(clippy::too_many_arguments)]
    pub fn from_counts(
        user_id: UserId,
        course_id: CourseId,
        total_nodes: u32,
        completed_nodes: u32,
        can_take_final_exam: bool,
        final_exam_passed: bool,
        certificate_issued: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, SummaryError> {
        let progress_percent = if total_nodes == 0 {
            0.0
        } else {
            f64::from(completed_nodes) / f64::from(total_nodes) * 100.0
        };

        Self::from_persisted(
            user_id,
            course_id,
            total_nodes,
            completed_nodes,
            progress_percent,
            can_take_final_exam,
            final_exam_passed,
            certificate_issued,
            updated_at,
        )
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn total_nodes(&self) -> u32 {
        self.total_nodes
    }

    #[must_use]
    pub fn completed_nodes(&self) -> u32 {
        self.completed_nodes
    }

    #[must_use]
    pub fn progress_percent(&self) -> f64 {
        self.progress_percent
    }

    #[must_use]
    pub fn can_take_final_exam(&self) -> bool {
        self.can_take_final_exam
    }

    #[must_use]
    pub fn final_exam_passed(&self) -> bool {
        self.final_exam_passed
    }

    #[must_use]
    pub fn certificate_issued(&self) -> bool {
        self.certificate_issued
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
