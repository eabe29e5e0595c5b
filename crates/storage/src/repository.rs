use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::{
    Course, CourseId, CourseProgressSummary, LearningNode, NodeId, NodeProgress, UserId,
};
use course_core::unlock::LockReason;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persisted shape of one unlock audit entry.
///
/// Append-only: written whenever an access check grants or denies a node,
/// read back only by support tooling, never by the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct UnlockLogRecord {
    pub id: Option<i64>,
    pub user_id: UserId,
    pub course_id: CourseId,
    pub node_id: NodeId,
    pub granted: bool,
    pub reason: Option<LockReason>,
    pub checked_at: DateTime<Utc>,
}

impl UnlockLogRecord {
    /// Build an unsaved record for one access check outcome.
    #[must_use]
    pub fn new(
        user_id: UserId,
        course_id: CourseId,
        node_id: NodeId,
        granted: bool,
        reason: Option<LockReason>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            user_id,
            course_id,
            node_id,
            granted,
            reason,
            checked_at,
        }
    }
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Repository contract for courses and their nodes.
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Persist or update a course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError>;

    /// Fetch a course by ID, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError>;

    /// Persist or update a learning node.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the node cannot be stored.
    async fn upsert_node(&self, node: &LearningNode) -> Result<(), StorageError>;

    /// Fetch a single node by ID, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn get_node(&self, id: NodeId) -> Result<Option<LearningNode>, StorageError>;

    /// All nodes of a course, in declared order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn course_nodes(&self, course_id: CourseId) -> Result<Vec<LearningNode>, StorageError>;
}

/// Repository contract for per-user node progress.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Persist or update one progress row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn upsert_progress(&self, progress: &NodeProgress) -> Result<(), StorageError>;

    /// Fetch one progress row, `None` when the node was never touched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn get_progress(
        &self,
        user_id: UserId,
        node_id: NodeId,
    ) -> Result<Option<NodeProgress>, StorageError>;

    /// Fetch the progress rows a user has for the given nodes.
    ///
    /// Missing rows are simply absent from the result; that is the normal
    /// state for untouched nodes, not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn progress_for_nodes(
        &self,
        user_id: UserId,
        node_ids: &[NodeId],
    ) -> Result<Vec<NodeProgress>, StorageError>;
}

/// Repository contract for the derived course progress summaries.
#[async_trait]
pub trait SummaryRepository: Send + Sync {
    /// Persist or replace the summary row for (user, course).
    ///
    /// Last write wins: the summary is a recomputable cache, so a stale
    /// overwrite heals on the next recompute.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn upsert_summary(&self, summary: &CourseProgressSummary) -> Result<(), StorageError>;

    /// Fetch the stored summary, `None` when never computed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn get_summary(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgressSummary>, StorageError>;
}

/// Repository contract for the append-only unlock audit trail.
#[async_trait]
pub trait UnlockLogRepository: Send + Sync {
    /// Append one audit entry, returning its assigned row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be stored.
    async fn append_log(&self, record: UnlockLogRecord) -> Result<i64, StorageError>;

    /// Most recent entries for (user, course), newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn logs_for_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
        limit: u32,
    ) -> Result<Vec<UnlockLogRecord>, StorageError>;
}

//
// ─── IN-MEMORY IMPLEMENTATION ──────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    courses: Arc<Mutex<HashMap<CourseId, Course>>>,
    nodes: Arc<Mutex<HashMap<NodeId, LearningNode>>>,
    progress: Arc<Mutex<HashMap<(UserId, NodeId), NodeProgress>>>,
    summaries: Arc<Mutex<HashMap<(UserId, CourseId), CourseProgressSummary>>>,
    logs: Arc<Mutex<Vec<UnlockLogRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl CourseRepository for InMemoryRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut guard = self.courses.lock().map_err(poisoned)?;
        guard.insert(course.id(), course.clone());
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let guard = self.courses.lock().map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }

    async fn upsert_node(&self, node: &LearningNode) -> Result<(), StorageError> {
        let mut guard = self.nodes.lock().map_err(poisoned)?;
        guard.insert(node.id(), node.clone());
        Ok(())
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<LearningNode>, StorageError> {
        let guard = self.nodes.lock().map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }

    async fn course_nodes(&self, course_id: CourseId) -> Result<Vec<LearningNode>, StorageError> {
        let guard = self.nodes.lock().map_err(poisoned)?;
        let mut nodes: Vec<LearningNode> = guard
            .values()
            .filter(|n| n.course_id() == course_id)
            .cloned()
            .collect();
        nodes.sort_by_key(|n| (n.position(), n.id()));
        Ok(nodes)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn upsert_progress(&self, progress: &NodeProgress) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        guard.insert((progress.user_id, progress.node_id), progress.clone());
        Ok(())
    }

    async fn get_progress(
        &self,
        user_id: UserId,
        node_id: NodeId,
    ) -> Result<Option<NodeProgress>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.get(&(user_id, node_id)).cloned())
    }

    async fn progress_for_nodes(
        &self,
        user_id: UserId,
        node_ids: &[NodeId],
    ) -> Result<Vec<NodeProgress>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(node_ids
            .iter()
            .filter_map(|id| guard.get(&(user_id, *id)).cloned())
            .collect())
    }
}

#[async_trait]
impl SummaryRepository for InMemoryRepository {
    async fn upsert_summary(&self, summary: &CourseProgressSummary) -> Result<(), StorageError> {
        let mut guard = self.summaries.lock().map_err(poisoned)?;
        guard.insert((summary.user_id(), summary.course_id()), summary.clone());
        Ok(())
    }

    async fn get_summary(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgressSummary>, StorageError> {
        let guard = self.summaries.lock().map_err(poisoned)?;
        Ok(guard.get(&(user_id, course_id)).cloned())
    }
}

#[async_trait]
impl UnlockLogRepository for InMemoryRepository {
    async fn append_log(&self, mut record: UnlockLogRecord) -> Result<i64, StorageError> {
        let mut guard = self.logs.lock().map_err(poisoned)?;
        let id = i64::try_from(guard.len())
            .map_err(|_| StorageError::Serialization("log id overflow".into()))?
            + 1;
        record.id = Some(id);
        guard.push(record);
        Ok(id)
    }

    async fn logs_for_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
        limit: u32,
    ) -> Result<Vec<UnlockLogRecord>, StorageError> {
        let guard = self.logs.lock().map_err(poisoned)?;
        Ok(guard
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id && r.course_id == course_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub courses: Arc<dyn CourseRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub summaries: Arc<dyn SummaryRepository>,
    pub unlock_logs: Arc<dyn UnlockLogRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            courses: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            summaries: Arc::new(repo.clone()),
            unlock_logs: Arc::new(repo),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
