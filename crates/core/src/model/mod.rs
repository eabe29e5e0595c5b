mod course;
mod ids;
mod node;
mod progress;

pub use course::{Course, CourseError, CourseGraph};
pub use ids::{CourseId, NodeId, ParseIdError, UserId};
pub use node::{LearningNode, NodeError, NodeType, UnlockRule};
pub use progress::{CourseProgressSummary, NodeProgress, SummaryError};
