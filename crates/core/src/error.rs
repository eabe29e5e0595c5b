use thiserror::Error;

use crate::model::{CourseError, NodeError, SummaryError};

/// Crate-level aggregate of domain validation errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Summary(#[from] SummaryError),
}
