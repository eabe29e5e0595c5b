//! Course flow: unlock evaluation, progress recording, and the audit trail.

mod loader;
mod service;

pub use service::{AccessCheck, CourseFlowService, UnlockOverview};
