use course_core::model::{CourseId, UserId};

use super::{
    SqliteRepository,
    mapping::{id_to_i64, map_unlock_log_row},
};
use crate::repository::{StorageError, UnlockLogRecord, UnlockLogRepository};

#[async_trait::async_trait]
impl UnlockLogRepository for SqliteRepository {
    async fn append_log(&self, record: UnlockLogRecord) -> Result<i64, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO unlock_logs (
                user_id, course_id, node_id, granted, reason, checked_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(record.user_id.to_string())
        .bind(id_to_i64("course_id", record.course_id.value())?)
        .bind(id_to_i64("node_id", record.node_id.value())?)
        .bind(record.granted)
        .bind(record.reason.map(|r| r.as_str()))
        .bind(record.checked_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(res.last_insert_rowid())
    }

    async fn logs_for_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
        limit: u32,
    ) -> Result<Vec<UnlockLogRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, course_id, node_id, granted, reason, checked_at
            FROM unlock_logs
            WHERE user_id = ?1 AND course_id = ?2
            ORDER BY checked_at DESC, id DESC
            LIMIT ?3
            ",
        )
        .bind(user_id.to_string())
        .bind(id_to_i64("course_id", course_id.value())?)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_unlock_log_row(&row)?);
        }
        Ok(out)
    }
}
