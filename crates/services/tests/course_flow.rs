use std::sync::Arc;

use course_core::model::{
    Course, CourseId, LearningNode, NodeId, NodeType, UnlockRule, UserId,
};
use course_core::time::{fixed_clock, fixed_now};
use course_core::unlock::{LockReason, NodeState};
use services::flow::CourseFlowService;
use services::error::FlowError;
use storage::repository::{Storage, StorageError, UnlockLogRecord, UnlockLogRepository};

const COURSE: u64 = 1;

async fn seed_linear_course(storage: &Storage) {
    let course = Course::new(CourseId::new(COURSE), "Intro to Rust", fixed_now()).unwrap();
    storage.courses.upsert_course(&course).await.unwrap();

    let nodes = [
        node(10, 0, NodeType::Video, false, UnlockRule::none()),
        node(
            20,
            1,
            NodeType::Quiz,
            false,
            UnlockRule::none().with_required_score(70.0).unwrap(),
        ),
        node(30, 2, NodeType::Scorm, true, UnlockRule::none()),
        node(
            40,
            3,
            NodeType::Quiz,
            false,
            UnlockRule::with_prerequisites([NodeId::new(10)])
                .with_required_score(60.0)
                .unwrap(),
        ),
    ];
    for n in &nodes {
        storage.courses.upsert_node(n).await.unwrap();
    }
}

fn node(id: u64, position: u32, node_type: NodeType, optional: bool, unlock: UnlockRule) -> LearningNode {
    LearningNode::new(
        NodeId::new(id),
        CourseId::new(COURSE),
        position,
        format!("Node {id}"),
        node_type,
        optional,
        unlock,
    )
    .unwrap()
}

fn service(storage: &Storage) -> CourseFlowService {
    CourseFlowService::new(storage).with_clock(fixed_clock())
}

#[tokio::test]
async fn fresh_user_can_only_open_the_first_node() {
    let storage = Storage::in_memory();
    seed_linear_course(&storage).await;
    let svc = service(&storage);
    let user = UserId::random();

    let state = svc
        .evaluate_course_unlock_state(user, CourseId::new(COURSE))
        .await
        .unwrap()
        .state;

    let first = state.decision_for(NodeId::new(10)).unwrap();
    assert!(first.can_access);
    assert_eq!(first.state, NodeState::Accessible);

    let quiz = state.decision_for(NodeId::new(20)).unwrap();
    assert!(!quiz.can_access);
    assert_eq!(quiz.reason, Some(LockReason::PreviousIncomplete));

    // Optional nodes are never gated.
    let optional = state.decision_for(NodeId::new(30)).unwrap();
    assert!(optional.can_access);

    assert!(!state.is_complete());
}

#[tokio::test]
async fn failed_quiz_stays_open_for_retake_but_blocks_successors() {
    let storage = Storage::in_memory();
    seed_linear_course(&storage).await;
    let svc = service(&storage);
    let user = UserId::random();

    svc.record_node_progress(user, NodeId::new(10), true, None)
        .await
        .unwrap();
    svc.record_node_progress(user, NodeId::new(20), true, Some(69.0))
        .await
        .unwrap();

    let state = svc
        .evaluate_course_unlock_state(user, CourseId::new(COURSE))
        .await
        .unwrap()
        .state;

    // 69 < 70: the quiz itself can be retaken, downstream stays shut.
    let quiz = state.decision_for(NodeId::new(20)).unwrap();
    assert!(quiz.can_access);

    let exam = state.decision_for(NodeId::new(40)).unwrap();
    assert!(!exam.can_access);
    assert_eq!(exam.reason, Some(LockReason::ScoreBelowThreshold));

    // A passing retake opens the rest.
    svc.record_node_progress(user, NodeId::new(20), true, Some(70.0))
        .await
        .unwrap();
    let state = svc
        .evaluate_course_unlock_state(user, CourseId::new(COURSE))
        .await
        .unwrap()
        .state;
    assert!(state.decision_for(NodeId::new(40)).unwrap().can_access);
}

#[tokio::test]
async fn check_node_access_appends_audit_entries_for_grants_and_denials() {
    let storage = Storage::in_memory();
    seed_linear_course(&storage).await;
    let svc = service(&storage);
    let user = UserId::random();

    let denied = svc.check_node_access(user, NodeId::new(20)).await.unwrap();
    assert!(!denied.granted());
    assert_eq!(
        denied.decision.reason,
        Some(LockReason::PreviousIncomplete)
    );

    let granted = svc.check_node_access(user, NodeId::new(10)).await.unwrap();
    assert!(granted.granted());
    assert_eq!(granted.course_id, CourseId::new(COURSE));

    let history = svc
        .get_unlock_history(user, CourseId::new(COURSE), 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    // Newest first; same timestamp falls back to insertion order.
    assert_eq!(history[0].node_id, NodeId::new(10));
    assert!(history[0].granted);
    assert_eq!(history[1].node_id, NodeId::new(20));
    assert_eq!(history[1].reason, Some(LockReason::PreviousIncomplete));
}

#[tokio::test]
async fn recording_progress_refreshes_the_stored_summary() {
    let storage = Storage::in_memory();
    seed_linear_course(&storage).await;
    let svc = service(&storage);
    let user = UserId::random();

    let summary = svc
        .record_node_progress(user, NodeId::new(10), true, None)
        .await
        .unwrap();

    // 3 required nodes, 1 done; the optional SCORM node is not counted.
    assert_eq!(summary.total_nodes(), 3);
    assert_eq!(summary.completed_nodes(), 1);
    assert!((summary.progress_percent() - 33.333_333).abs() < 1e-3);
    assert!(!summary.can_take_final_exam());

    let stored = svc
        .get_course_progress(user, CourseId::new(COURSE))
        .await
        .unwrap();
    assert_eq!(stored, summary);
}

#[tokio::test]
async fn final_exam_opens_once_everything_else_is_done() {
    let storage = Storage::in_memory();
    seed_linear_course(&storage).await;
    let svc = service(&storage);
    let user = UserId::random();

    svc.record_node_progress(user, NodeId::new(10), true, None)
        .await
        .unwrap();
    let summary = svc
        .record_node_progress(user, NodeId::new(20), true, Some(85.0))
        .await
        .unwrap();
    assert!(summary.can_take_final_exam());
    assert!(!summary.final_exam_passed());

    let summary = svc
        .record_node_progress(user, NodeId::new(40), true, Some(90.0))
        .await
        .unwrap();
    assert!(summary.final_exam_passed());
    assert_eq!(summary.completed_nodes(), 3);

    let state = svc
        .evaluate_course_unlock_state(user, CourseId::new(COURSE))
        .await
        .unwrap()
        .state;
    assert!(state.is_complete());
    assert_eq!(state.next_recommended(), None);
}

#[tokio::test]
async fn next_recommended_follows_declared_order() {
    let storage = Storage::in_memory();
    seed_linear_course(&storage).await;
    let svc = service(&storage);
    let user = UserId::random();

    assert_eq!(
        svc.get_next_recommended_node(user, CourseId::new(COURSE))
            .await
            .unwrap(),
        Some(NodeId::new(10))
    );

    svc.record_node_progress(user, NodeId::new(10), true, None)
        .await
        .unwrap();
    assert_eq!(
        svc.get_next_recommended_node(user, CourseId::new(COURSE))
            .await
            .unwrap(),
        Some(NodeId::new(20))
    );
}

#[tokio::test]
async fn unknown_course_and_node_report_not_found() {
    let storage = Storage::in_memory();
    seed_linear_course(&storage).await;
    let svc = service(&storage);
    let user = UserId::random();

    let err = svc
        .evaluate_course_unlock_state(user, CourseId::new(999))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::NotFound));

    let err = svc
        .check_node_access(user, NodeId::new(999))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::NotFound));
}

#[tokio::test]
async fn evaluation_returns_the_summary_it_persisted() {
    let storage = Storage::in_memory();
    seed_linear_course(&storage).await;
    let svc = service(&storage);
    let user = UserId::random();

    svc.record_node_progress(user, NodeId::new(10), true, None)
        .await
        .unwrap();

    let overview = svc
        .evaluate_course_unlock_state(user, CourseId::new(COURSE))
        .await
        .unwrap();

    // Decisions and summary come from the same rows in one call; no
    // follow-up progress read is needed to assemble a response.
    assert!(overview.state.decision_for(NodeId::new(20)).unwrap().can_access);
    assert_eq!(overview.summary.completed_nodes(), 1);
    assert_eq!(overview.summary.total_nodes(), 3);

    let stored = storage
        .summaries
        .get_summary(user, CourseId::new(COURSE))
        .await
        .unwrap()
        .expect("summary row");
    assert_eq!(stored, overview.summary);
}

/// Audit sink that rejects every append, for exercising the
/// fire-and-forget path.
struct RejectingUnlockLog;

#[async_trait::async_trait]
impl UnlockLogRepository for RejectingUnlockLog {
    async fn append_log(&self, _record: UnlockLogRecord) -> Result<i64, StorageError> {
        Err(StorageError::Connection("audit sink down".into()))
    }

    async fn logs_for_course(
        &self,
        _user_id: UserId,
        _course_id: CourseId,
        _limit: u32,
    ) -> Result<Vec<UnlockLogRecord>, StorageError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn access_check_survives_a_failing_audit_sink() {
    let mut storage = Storage::in_memory();
    seed_linear_course(&storage).await;
    storage.unlock_logs = Arc::new(RejectingUnlockLog);
    let svc = service(&storage);
    let user = UserId::random();

    // The append fails, the decision still comes back.
    let granted = svc.check_node_access(user, NodeId::new(10)).await.unwrap();
    assert!(granted.granted());

    let denied = svc.check_node_access(user, NodeId::new(20)).await.unwrap();
    assert!(!denied.granted());
}

#[tokio::test]
async fn out_of_range_scores_are_rejected_before_storage() {
    let storage = Storage::in_memory();
    seed_linear_course(&storage).await;
    let svc = service(&storage);
    let user = UserId::random();

    let err = svc
        .record_node_progress(user, NodeId::new(20), true, Some(120.0))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::InvalidScore(_)));

    // Nothing was written for the node.
    assert!(
        storage
            .progress
            .get_progress(user, NodeId::new(20))
            .await
            .unwrap()
            .is_none()
    );
}
