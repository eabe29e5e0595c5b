use course_core::model::{NodeId, NodeProgress, UserId};

use super::{
    SqliteRepository,
    mapping::{id_to_i64, map_progress_row},
};
use crate::repository::{ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn upsert_progress(&self, progress: &NodeProgress) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO node_progress (user_id, node_id, completed, score, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id, node_id) DO UPDATE SET
                completed = excluded.completed,
                score = excluded.score,
                updated_at = excluded.updated_at
            ",
        )
        .bind(progress.user_id.to_string())
        .bind(id_to_i64("node_id", progress.node_id.value())?)
        .bind(progress.completed)
        .bind(progress.score)
        .bind(progress.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_progress(
        &self,
        user_id: UserId,
        node_id: NodeId,
    ) -> Result<Option<NodeProgress>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT user_id, node_id, completed, score, updated_at
            FROM node_progress
            WHERE user_id = ?1 AND node_id = ?2
            ",
        )
        .bind(user_id.to_string())
        .bind(id_to_i64("node_id", node_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.map(|row| map_progress_row(&row)).transpose()
    }

    async fn progress_for_nodes(
        &self,
        user_id: UserId,
        node_ids: &[NodeId],
    ) -> Result<Vec<NodeProgress>, StorageError> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r"
            SELECT user_id, node_id, completed, score, updated_at
            FROM node_progress
            WHERE user_id = ?1 AND node_id IN (
            ",
        );

        for i in 0..node_ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 2).to_string());
        }
        sql.push_str(")\n");

        let mut q = sqlx::query(&sql).bind(user_id.to_string());
        for id in node_ids {
            q = q.bind(id_to_i64("node_id", id.value())?);
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        // Untouched nodes have no row; callers treat absence as not started.
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_progress_row(&row)?);
        }
        Ok(out)
    }
}
