//! Shared error types for the services crate.

use thiserror::Error;

use course_core::model::{CourseError, NodeError, SummaryError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `CourseFlowService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FlowError {
    /// The caller presented no user identity.
    #[error("user identity is required")]
    Unauthorized,
    /// The referenced course or node does not exist.
    #[error("course or node not found")]
    NotFound,
    /// A recorded score must be a finite value in 0..=100.
    #[error("score out of range: {0}")]
    InvalidScore(f64),
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Summary(#[from] SummaryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BootstrapError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
