use course_core::model::{CourseId, CourseProgressSummary, UserId};

use super::{
    SqliteRepository,
    mapping::{id_to_i64, map_summary_row},
};
use crate::repository::{StorageError, SummaryRepository};

#[async_trait::async_trait]
impl SummaryRepository for SqliteRepository {
    async fn upsert_summary(&self, summary: &CourseProgressSummary) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO course_progress_summaries (
                user_id, course_id, total_nodes, completed_nodes, progress_percent,
                can_take_final_exam, final_exam_passed, certificate_issued, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(user_id, course_id) DO UPDATE SET
                total_nodes = excluded.total_nodes,
                completed_nodes = excluded.completed_nodes,
                progress_percent = excluded.progress_percent,
                can_take_final_exam = excluded.can_take_final_exam,
                final_exam_passed = excluded.final_exam_passed,
                certificate_issued = excluded.certificate_issued,
                updated_at = excluded.updated_at
            ",
        )
        .bind(summary.user_id().to_string())
        .bind(id_to_i64("course_id", summary.course_id().value())?)
        .bind(i64::from(summary.total_nodes()))
        .bind(i64::from(summary.completed_nodes()))
        .bind(summary.progress_percent())
        .bind(summary.can_take_final_exam())
        .bind(summary.final_exam_passed())
        .bind(summary.certificate_issued())
        .bind(summary.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_summary(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgressSummary>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT user_id, course_id, total_nodes, completed_nodes, progress_percent,
                   can_take_final_exam, final_exam_passed, certificate_issued, updated_at
            FROM course_progress_summaries
            WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(user_id.to_string())
        .bind(id_to_i64("course_id", course_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.map(|row| map_summary_row(&row)).transpose()
    }
}
