#![forbid(unsafe_code)]

pub mod api;
pub mod error;
pub mod flow;

pub use course_core::time::Clock;

pub use api::{ApiError, ApiResponse};
pub use error::{BootstrapError, FlowError};
pub use flow::{AccessCheck, CourseFlowService, UnlockOverview};
