use std::collections::BTreeSet;
use std::str::FromStr;

use course_core::model::{
    Course, CourseId, CourseProgressSummary, LearningNode, NodeId, NodeProgress, NodeType,
    UnlockRule, UserId,
};
use course_core::unlock::LockReason;
use sqlx::Row;

use crate::repository::{StorageError, UnlockLogRecord};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(i64_to_u64("course_id", v)?))
}

pub(crate) fn node_id_from_i64(v: i64) -> Result<NodeId, StorageError> {
    Ok(NodeId::new(i64_to_u64("node_id", v)?))
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

/// User ids are stored as their canonical UUID string.
pub(crate) fn user_id_from_str(s: &str) -> Result<UserId, StorageError> {
    UserId::from_str(s).map_err(ser)
}

pub(crate) fn parse_node_type(s: &str) -> Result<NodeType, StorageError> {
    match s {
        "video" => Ok(NodeType::Video),
        "scorm" => Ok(NodeType::Scorm),
        "quiz" => Ok(NodeType::Quiz),
        _ => Err(StorageError::Serialization(format!(
            "invalid node type: {s}"
        ))),
    }
}

/// Must stay consistent with `LockReason::as_str`.
pub(crate) fn parse_lock_reason(s: &str) -> Result<LockReason, StorageError> {
    match s {
        "PREVIOUS_INCOMPLETE" => Ok(LockReason::PreviousIncomplete),
        "PREREQUISITE_MISSING" => Ok(LockReason::PrerequisiteMissing),
        "SCORE_BELOW_THRESHOLD" => Ok(LockReason::ScoreBelowThreshold),
        _ => Err(StorageError::Serialization(format!("invalid reason: {s}"))),
    }
}

/// Prerequisites persist as a JSON array of node ids and are parsed into
/// the typed set exactly once, here; nothing downstream re-parses strings.
pub(crate) fn prerequisites_to_json(set: &BTreeSet<NodeId>) -> Result<String, StorageError> {
    let ids: Vec<u64> = set.iter().map(NodeId::value).collect();
    serde_json::to_string(&ids).map_err(ser)
}

pub(crate) fn prerequisites_from_json(raw: &str) -> Result<BTreeSet<NodeId>, StorageError> {
    let ids: Vec<u64> = serde_json::from_str(raw).map_err(ser)?;
    Ok(ids.into_iter().map(NodeId::new).collect())
}

pub(crate) fn map_course_row(row: &sqlx::sqlite::SqliteRow) -> Result<Course, StorageError> {
    Course::new(
        course_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_node_row(row: &sqlx::sqlite::SqliteRow) -> Result<LearningNode, StorageError> {
    let node_type = parse_node_type(row.try_get::<String, _>("node_type").map_err(ser)?.as_str())?;
    let prerequisites =
        prerequisites_from_json(row.try_get::<String, _>("prerequisites").map_err(ser)?.as_str())?;
    let required_score: Option<f64> = row.try_get("required_score").map_err(ser)?;

    let position_i64: i64 = row.try_get("position").map_err(ser)?;
    let position = u32::try_from(position_i64)
        .map_err(|_| StorageError::Serialization(format!("invalid position: {position_i64}")))?;

    LearningNode::new(
        node_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        position,
        row.try_get::<String, _>("title").map_err(ser)?,
        node_type,
        row.try_get::<bool, _>("is_optional").map_err(ser)?,
        UnlockRule::from_persisted(prerequisites, required_score),
    )
    .map_err(ser)
}

pub(crate) fn map_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<NodeProgress, StorageError> {
    Ok(NodeProgress {
        user_id: user_id_from_str(row.try_get::<String, _>("user_id").map_err(ser)?.as_str())?,
        node_id: node_id_from_i64(row.try_get::<i64, _>("node_id").map_err(ser)?)?,
        completed: row.try_get("completed").map_err(ser)?,
        score: row.try_get("score").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

pub(crate) fn map_summary_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<CourseProgressSummary, StorageError> {
    let total_i64: i64 = row.try_get("total_nodes").map_err(ser)?;
    let completed_i64: i64 = row.try_get("completed_nodes").map_err(ser)?;
    let total = u32::try_from(total_i64)
        .map_err(|_| StorageError::Serialization(format!("invalid total_nodes: {total_i64}")))?;
    let completed = u32::try_from(completed_i64).map_err(|_| {
        StorageError::Serialization(format!("invalid completed_nodes: {completed_i64}"))
    })?;

    CourseProgressSummary::from_persisted(
        user_id_from_str(row.try_get::<String, _>("user_id").map_err(ser)?.as_str())?,
        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        total,
        completed,
        row.try_get("progress_percent").map_err(ser)?,
        row.try_get("can_take_final_exam").map_err(ser)?,
        row.try_get("final_exam_passed").map_err(ser)?,
        row.try_get("certificate_issued").map_err(ser)?,
        row.try_get("updated_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_unlock_log_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<UnlockLogRecord, StorageError> {
    let reason = row
        .try_get::<Option<String>, _>("reason")
        .map_err(ser)?
        .map(|s| parse_lock_reason(&s))
        .transpose()?;

    Ok(UnlockLogRecord {
        id: Some(row.try_get("id").map_err(ser)?),
        user_id: user_id_from_str(row.try_get::<String, _>("user_id").map_err(ser)?.as_str())?,
        course_id: course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        node_id: node_id_from_i64(row.try_get::<i64, _>("node_id").map_err(ser)?)?,
        granted: row.try_get("granted").map_err(ser)?,
        reason,
        checked_at: row.try_get("checked_at").map_err(ser)?,
    })
}
