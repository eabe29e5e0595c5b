//! Transport-agnostic response envelope for the flow operations.
//!
//! These shapes are what an HTTP or RPC layer would serialize directly; no
//! framework types leak in here.

use serde::Serialize;
use serde_json::{Map, Value, json};

use course_core::model::{CourseProgressSummary, UserId};
use course_core::unlock::UnlockState;

use crate::error::FlowError;
use crate::flow::UnlockOverview;

//
// ─── ERROR CODES ───────────────────────────────────────────────────────────────
//

pub const CODE_UNAUTHORIZED: &str = "UNAUTHORIZED";
pub const CODE_NOT_FOUND: &str = "NOT_FOUND";
pub const CODE_INVALID_INPUT: &str = "INVALID_INPUT";
pub const CODE_INTERNAL_ERROR: &str = "INTERNAL_ERROR";

//
// ─── ENVELOPE ──────────────────────────────────────────────────────────────────
//

/// Machine-readable error payload inside a failed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
}

/// Uniform success/failure envelope for every flow operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl ApiResponse {
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn err(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Map a flow outcome into the envelope, classifying errors by code.
    #[must_use]
    pub fn from_result(result: Result<Value, FlowError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(error_code(&e), e.to_string()),
        }
    }
}

/// Stable error code for a `FlowError`.
///
/// Storage and graph-consistency failures all collapse to `INTERNAL_ERROR`;
/// callers get the detail in the message, not the code.
#[must_use]
pub fn error_code(error: &FlowError) -> &'static str {
    match error {
        FlowError::Unauthorized => CODE_UNAUTHORIZED,
        FlowError::NotFound => CODE_NOT_FOUND,
        FlowError::InvalidScore(_) => CODE_INVALID_INPUT,
        _ => CODE_INTERNAL_ERROR,
    }
}

/// Reject anonymous callers before touching storage.
///
/// # Errors
///
/// Returns `FlowError::Unauthorized` when no identity was presented.
pub fn require_user(user_id: Option<UserId>) -> Result<UserId, FlowError> {
    user_id.ok_or(FlowError::Unauthorized)
}

/// Serialize an unlock state as a JSON object keyed by node id.
///
/// Node ids become strings only here, at the boundary; everything upstream
/// stays typed.
#[must_use]
pub fn unlock_state_to_json(state: &UnlockState) -> Value {
    let mut nodes = Map::new();
    for decision in state.decisions() {
        nodes.insert(
            decision.node_id.to_string(),
            json!({
                "can_access": decision.can_access,
                "state": decision.state.as_str(),
                "reason": decision.reason.map(|r| r.as_str()),
            }),
        );
    }
    json!({
        "nodes": Value::Object(nodes),
        "is_complete": state.is_complete(),
    })
}

#[must_use]
pub fn summary_to_json(summary: &CourseProgressSummary) -> Value {
    json!({
        "total_nodes": summary.total_nodes(),
        "completed_nodes": summary.completed_nodes(),
        "progress_percent": summary.progress_percent(),
        "can_take_final_exam": summary.can_take_final_exam(),
        "final_exam_passed": summary.final_exam_passed(),
        "certificate_issued": summary.certificate_issued(),
        "updated_at": summary.updated_at(),
    })
}

/// Serialize the full evaluation response: keyed decisions plus the
/// summary written from the same rows.
#[must_use]
pub fn unlock_overview_to_json(overview: &UnlockOverview) -> Value {
    let mut body = unlock_state_to_json(&overview.state);
    if let Some(obj) = body.as_object_mut() {
        obj.insert("summary".into(), summary_to_json(&overview.summary));
    }
    body
}
