use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use course_core::model::{
    CourseGraph, CourseId, CourseProgressSummary, NodeId, NodeProgress, UserId,
};
use course_core::time::Clock;
use course_core::unlock::{self, NodeDecision, UnlockState};
use storage::repository::{
    CourseRepository, ProgressRepository, Storage, SummaryRepository, UnlockLogRecord,
    UnlockLogRepository,
};

use super::loader::GraphQueries;
use crate::error::{BootstrapError, FlowError};

//
// ─── ACCESS CHECK RESULT ───────────────────────────────────────────────────────
//

/// Outcome of a single node access check, with the course it resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessCheck {
    pub course_id: CourseId,
    pub decision: NodeDecision,
}

impl AccessCheck {
    #[must_use]
    pub fn granted(&self) -> bool {
        self.decision.can_access
    }
}

/// Full unlock picture for one user and course: per-node decisions plus
/// the summary persisted from the same progress rows.
#[derive(Debug, Clone, PartialEq)]
pub struct UnlockOverview {
    pub state: UnlockState,
    pub summary: CourseProgressSummary,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Coordinates unlock evaluation, progress recording, and the audit trail.
///
/// All reads go through the repositories; the evaluation itself is pure and
/// recomputed from stored rows on every call, so there is no cached unlock
/// state to invalidate.
pub struct CourseFlowService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    progress: Arc<dyn ProgressRepository>,
    summaries: Arc<dyn SummaryRepository>,
    unlock_logs: Arc<dyn UnlockLogRepository>,
}

impl CourseFlowService {
    /// Build the service over an assembled storage bundle, using real time.
    #[must_use]
    pub fn new(storage: &Storage) -> Self {
        Self {
            clock: Clock::default(),
            courses: Arc::clone(&storage.courses),
            progress: Arc::clone(&storage.progress),
            summaries: Arc::clone(&storage.summaries),
            unlock_logs: Arc::clone(&storage.unlock_logs),
        }
    }

    /// Build the service over a fresh `SQLite` database at the given URL.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError` if the connection or migrations fail.
    pub async fn sqlite(database_url: &str) -> Result<Self, BootstrapError> {
        let storage = Storage::sqlite(database_url).await?;
        Ok(Self::new(&storage))
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Current time according to the service's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Evaluate the full unlock state of a course for one user.
    ///
    /// The returned summary is the one persisted by this call, derived from
    /// the same progress rows as the decisions, so the two never disagree.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::NotFound` if the course does not exist, otherwise
    /// storage or summary derivation errors.
    pub async fn evaluate_course_unlock_state(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<UnlockOverview, FlowError> {
        let graph = GraphQueries::load_graph(course_id, self.courses.as_ref()).await?;
        let rows = GraphQueries::load_progress(user_id, &graph, self.progress.as_ref()).await?;

        let state = unlock::evaluate(&graph, &rows);
        let summary = self.refresh_summary(user_id, &graph, &rows).await?;
        Ok(UnlockOverview { state, summary })
    }

    /// Check whether one user may open one node, and record the outcome.
    ///
    /// Both grants and denials land in the audit log. A log write failure is
    /// logged and swallowed: the access decision is already made and the
    /// trail is advisory, not a gate.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::NotFound` if the node or its course does not
    /// exist, otherwise storage errors from loading the graph.
    pub async fn check_node_access(
        &self,
        user_id: UserId,
        node_id: NodeId,
    ) -> Result<AccessCheck, FlowError> {
        let node = self
            .courses
            .get_node(node_id)
            .await?
            .ok_or(FlowError::NotFound)?;
        let course_id = node.course_id();

        let graph = GraphQueries::load_graph(course_id, self.courses.as_ref()).await?;
        let rows = GraphQueries::load_progress(user_id, &graph, self.progress.as_ref()).await?;

        let state = unlock::evaluate(&graph, &rows);
        let decision = *state.decision_for(node_id).ok_or(FlowError::NotFound)?;

        let record = UnlockLogRecord::new(
            user_id,
            course_id,
            node_id,
            decision.can_access,
            decision.reason,
            self.clock.now(),
        );
        if let Err(e) = self.unlock_logs.append_log(record).await {
            tracing::warn!("failed to append unlock audit entry: {}", e);
        }

        Ok(AccessCheck {
            course_id,
            decision,
        })
    }

    /// Record progress on a node and refresh the course summary.
    ///
    /// `completed` with a score marks a scored attempt; `completed` without
    /// one is plain completion (videos, unscored SCORM). An uncompleted call
    /// records a "started" row.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::NotFound` if the node does not exist,
    /// `FlowError::InvalidScore` for a non-finite or out-of-range score,
    /// otherwise storage errors.
    pub async fn record_node_progress(
        &self,
        user_id: UserId,
        node_id: NodeId,
        completed: bool,
        score: Option<f64>,
    ) -> Result<CourseProgressSummary, FlowError> {
        if let Some(s) = score {
            if !s.is_finite() || !(0.0..=100.0).contains(&s) {
                return Err(FlowError::InvalidScore(s));
            }
        }

        let node = self
            .courses
            .get_node(node_id)
            .await?
            .ok_or(FlowError::NotFound)?;

        let now = self.clock.now();
        let row = if completed {
            NodeProgress::completed(user_id, node_id, score, now)
        } else {
            NodeProgress::started(user_id, node_id, now)
        };
        self.progress.upsert_progress(&row).await?;

        let graph = GraphQueries::load_graph(node.course_id(), self.courses.as_ref()).await?;
        let rows = GraphQueries::load_progress(user_id, &graph, self.progress.as_ref()).await?;
        self.refresh_summary(user_id, &graph, &rows).await
    }

    /// The next node the user should open: first accessible, not yet
    /// completed, in declared order. `None` when the course is finished.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::NotFound` if the course does not exist, otherwise
    /// storage errors.
    pub async fn get_next_recommended_node(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<NodeId>, FlowError> {
        let graph = GraphQueries::load_graph(course_id, self.courses.as_ref()).await?;
        let rows = GraphQueries::load_progress(user_id, &graph, self.progress.as_ref()).await?;
        Ok(unlock::evaluate(&graph, &rows).next_recommended())
    }

    /// Fetch the user's course summary, computing and persisting it when no
    /// stored row exists yet.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::NotFound` if the course does not exist, otherwise
    /// storage or summary derivation errors.
    pub async fn get_course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CourseProgressSummary, FlowError> {
        if let Some(stored) = self.summaries.get_summary(user_id, course_id).await? {
            return Ok(stored);
        }

        let graph = GraphQueries::load_graph(course_id, self.courses.as_ref()).await?;
        let rows = GraphQueries::load_progress(user_id, &graph, self.progress.as_ref()).await?;
        self.refresh_summary(user_id, &graph, &rows).await
    }

    /// Most recent audit entries for (user, course), newest first.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Storage` when repository access fails.
    pub async fn get_unlock_history(
        &self,
        user_id: UserId,
        course_id: CourseId,
        limit: u32,
    ) -> Result<Vec<UnlockLogRecord>, FlowError> {
        Ok(self
            .unlock_logs
            .logs_for_course(user_id, course_id, limit)
            .await?)
    }

    /// Recompute the summary from the given rows and persist it.
    async fn refresh_summary(
        &self,
        user_id: UserId,
        graph: &CourseGraph,
        rows: &HashMap<NodeId, NodeProgress>,
    ) -> Result<CourseProgressSummary, FlowError> {
        let previous = self
            .summaries
            .get_summary(user_id, graph.course_id())
            .await?;
        let summary =
            unlock::summarize(graph, rows, previous.as_ref(), user_id, self.clock.now())?;
        self.summaries.upsert_summary(&summary).await?;
        tracing::debug!(
            "refreshed course summary: user={} course={} {}/{} nodes",
            user_id,
            graph.course_id(),
            summary.completed_nodes(),
            summary.total_nodes()
        );
        Ok(summary)
    }
}
