use course_core::model::{Course, CourseId, LearningNode, NodeId};

use super::{
    SqliteRepository,
    mapping::{id_to_i64, map_course_row, map_node_row, prerequisites_to_json},
};
use crate::repository::{CourseRepository, StorageError};

#[async_trait::async_trait]
impl CourseRepository for SqliteRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO courses (id, title, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                -- keep created_at from the original insert
                title = excluded.title
            ",
        )
        .bind(id_to_i64("course_id", course.id().value())?)
        .bind(course.title().to_owned())
        .bind(course.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, title, created_at
            FROM courses
            WHERE id = ?1
            ",
        )
        .bind(id_to_i64("course_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.map(|row| map_course_row(&row)).transpose()
    }

    async fn upsert_node(&self, node: &LearningNode) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO learning_nodes (
                id, course_id, position, title, node_type, is_optional,
                prerequisites, required_score
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                position = excluded.position,
                title = excluded.title,
                node_type = excluded.node_type,
                is_optional = excluded.is_optional,
                prerequisites = excluded.prerequisites,
                required_score = excluded.required_score
            ",
        )
        .bind(id_to_i64("node_id", node.id().value())?)
        .bind(id_to_i64("course_id", node.course_id().value())?)
        .bind(i64::from(node.position()))
        .bind(node.title().to_owned())
        .bind(node.node_type().as_str())
        .bind(node.is_optional())
        .bind(prerequisites_to_json(node.unlock().prerequisites())?)
        .bind(node.required_score())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<LearningNode>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, course_id, position, title, node_type, is_optional,
                   prerequisites, required_score
            FROM learning_nodes
            WHERE id = ?1
            ",
        )
        .bind(id_to_i64("node_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.map(|row| map_node_row(&row)).transpose()
    }

    async fn course_nodes(&self, course_id: CourseId) -> Result<Vec<LearningNode>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, course_id, position, title, node_type, is_optional,
                   prerequisites, required_score
            FROM learning_nodes
            WHERE course_id = ?1
            ORDER BY position ASC, id ASC
            ",
        )
        .bind(id_to_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in rows {
            nodes.push(map_node_row(&row)?);
        }
        Ok(nodes)
    }
}
