use std::collections::HashMap;

use course_core::model::{CourseGraph, CourseId, NodeId, NodeProgress, UserId};
use storage::repository::{CourseRepository, ProgressRepository};

use crate::error::FlowError;

/// Storage-backed loaders shared by the flow operations.
pub(crate) struct GraphQueries;

impl GraphQueries {
    /// Load a course and its ordered nodes into a validated graph.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::NotFound` when the course does not exist, and
    /// `FlowError::Course` when the stored rows do not form a valid graph.
    pub async fn load_graph(
        course_id: CourseId,
        courses: &dyn CourseRepository,
    ) -> Result<CourseGraph, FlowError> {
        let course = courses
            .get_course(course_id)
            .await?
            .ok_or(FlowError::NotFound)?;
        let nodes = courses.course_nodes(course_id).await?;
        Ok(CourseGraph::new(course, nodes)?)
    }

    /// Load the user's progress rows for every node in the graph, keyed by
    /// node id. Untouched nodes are simply absent.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Storage` when repository access fails.
    pub async fn load_progress(
        user_id: UserId,
        graph: &CourseGraph,
        progress: &dyn ProgressRepository,
    ) -> Result<HashMap<NodeId, NodeProgress>, FlowError> {
        let ids: Vec<NodeId> = graph.nodes().iter().map(|n| n.id()).collect();
        let rows = progress.progress_for_nodes(user_id, &ids).await?;
        Ok(rows.into_iter().map(|row| (row.node_id, row)).collect())
    }
}
