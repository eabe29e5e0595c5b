use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    CourseGraph, CourseProgressSummary, LearningNode, NodeId, NodeProgress, NodeType, SummaryError,
    UserId,
};

//
// ─── DECISIONS ─────────────────────────────────────────────────────────────────
//

/// Why a node is currently inaccessible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockReason {
    /// The sequential predecessor has not been completed.
    PreviousIncomplete,
    /// An explicit prerequisite node has not been completed.
    PrerequisiteMissing,
    /// The sequential predecessor was completed, but its recorded score is
    /// below its required threshold.
    ScoreBelowThreshold,
}

impl LockReason {
    /// Stable code used in audit logs and API payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LockReason::PreviousIncomplete => "PREVIOUS_INCOMPLETE",
            LockReason::PrerequisiteMissing => "PREREQUISITE_MISSING",
            LockReason::ScoreBelowThreshold => "SCORE_BELOW_THRESHOLD",
        }
    }
}

/// Derived lifecycle state of a node for one user.
///
/// Transitions are driven entirely by external completion events updating
/// `NodeProgress`; this is a snapshot computed from stored facts, not a
/// state machine held anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    Locked,
    Accessible,
    InProgress,
    Completed,
}

impl NodeState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Locked => "LOCKED",
            NodeState::Accessible => "ACCESSIBLE",
            NodeState::InProgress => "IN_PROGRESS",
            NodeState::Completed => "COMPLETED",
        }
    }
}

/// Accessibility verdict for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDecision {
    pub node_id: NodeId,
    pub can_access: bool,
    pub reason: Option<LockReason>,
    pub state: NodeState,
}

/// Evaluator output: one decision per node, in declared course order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockState {
    decisions: Vec<NodeDecision>,
    is_complete: bool,
}

impl UnlockState {
    /// Decisions in declared course order.
    #[must_use]
    pub fn decisions(&self) -> &[NodeDecision] {
        &self.decisions
    }

    /// Whether every required node of the course is completed.
    ///
    /// Trivially true for an empty course.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// Look up the decision for a specific node.
    #[must_use]
    pub fn decision_for(&self, node_id: NodeId) -> Option<&NodeDecision> {
        self.decisions.iter().find(|d| d.node_id == node_id)
    }

    /// First accessible, not-yet-completed node in order; `None` when the
    /// course is fully complete or nothing is reachable.
    #[must_use]
    pub fn next_recommended(&self) -> Option<NodeId> {
        self.decisions
            .iter()
            .find(|d| d.can_access && d.state != NodeState::Completed)
            .map(|d| d.node_id)
    }
}

//
// ─── EVALUATION ────────────────────────────────────────────────────────────────
//

/// Whether a progress row counts as "satisfied" for chain propagation:
/// completed, with any score requirement met.
fn is_satisfied(node: &LearningNode, row: Option<&NodeProgress>) -> bool {
    row.is_some_and(|r| r.completed && r.meets_score(node.required_score()))
}

/// Compute per-node accessibility for one user across a course.
///
/// Pure: reads the graph and the progress map, touches nothing else.
/// Missing progress rows are treated as "not completed", never an error.
///
/// The walk visits nodes exactly once in declared order, so cyclic or
/// forward explicit prerequisites cannot loop: a prerequisite counts only
/// if it names a node at a strictly earlier position whose progress row is
/// completed. Anything else (unknown id, same or later position) is simply
/// unsatisfied.
#[must_use]
pub fn evaluate(graph: &CourseGraph, progress: &HashMap<NodeId, NodeProgress>) -> UnlockState {
    let nodes = graph.nodes();

    let index_of: HashMap<NodeId, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id(), i))
        .collect();

    let mut decisions = Vec::with_capacity(nodes.len());
    let mut is_complete = true;

    // Seeded true: the first node is accessible unless it declares
    // explicit prerequisites.
    let mut prev_satisfied = true;
    // Set when the predecessor completed its attempt but failed the score
    // gate, so the denial reason can distinguish the two cases.
    let mut prev_failed_score = false;

    for (i, node) in nodes.iter().enumerate() {
        let row = progress.get(&node.id());
        let completed = row.is_some_and(|r| r.completed);
        let satisfied = is_satisfied(node, row);

        let prereqs_met = node.unlock().prerequisites().iter().all(|p| {
            index_of.get(p).is_some_and(|&j| j < i)
                && progress.get(p).is_some_and(|r| r.completed)
        });

        let (can_access, reason) = if node.is_optional() {
            (true, None)
        } else if !prev_satisfied {
            let reason = if prev_failed_score {
                LockReason::ScoreBelowThreshold
            } else {
                LockReason::PreviousIncomplete
            };
            (false, Some(reason))
        } else if !prereqs_met {
            (false, Some(LockReason::PrerequisiteMissing))
        } else {
            (true, None)
        };

        let state = if satisfied {
            NodeState::Completed
        } else if can_access && row.is_some() {
            NodeState::InProgress
        } else if can_access {
            NodeState::Accessible
        } else {
            NodeState::Locked
        };

        if !node.is_optional() && !completed {
            is_complete = false;
        }

        decisions.push(NodeDecision {
            node_id: node.id(),
            can_access,
            reason,
            state,
        });

        if node.is_optional() {
            // Optional nodes propagate as satisfied regardless of
            // completion; they never block the chain.
            prev_satisfied = true;
            prev_failed_score = false;
        } else {
            prev_satisfied = satisfied;
            prev_failed_score = completed && !satisfied;
        }
    }

    UnlockState {
        decisions,
        is_complete,
    }
}

//
// ─── SUMMARY COMPUTATION ───────────────────────────────────────────────────────
//

/// The course's final exam: the last required quiz node in declared order.
#[must_use]
pub fn final_exam_node(graph: &CourseGraph) -> Option<&LearningNode> {
    graph
        .nodes()
        .iter()
        .rev()
        .find(|n| !n.is_optional() && n.node_type() == NodeType::Quiz)
}

/// Derive a fresh `CourseProgressSummary` from graph and progress.
///
/// Totals count required nodes only; a completed row counts toward the
/// total whether or not its score met the threshold. The certificate flag
/// is carried over from the previous summary (issuance is an external
/// event this engine only records).
///
/// # Errors
///
/// Returns `SummaryError` if the derived counts are inconsistent, which
/// would indicate a bug in this function rather than bad input.
#[allow(clippy::cast_possible_truncation)]
pub fn summarize(
    graph: &CourseGraph,
    progress: &HashMap<NodeId, NodeProgress>,
    previous: Option<&CourseProgressSummary>,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<CourseProgressSummary, SummaryError> {
    let required: Vec<&LearningNode> =
        graph.nodes().iter().filter(|n| !n.is_optional()).collect();

    let completed_count = required
        .iter()
        .filter(|n| progress.get(&n.id()).is_some_and(|r| r.completed))
        .count();

    let exam = final_exam_node(graph);

    let can_take_final_exam = exam.is_some_and(|exam| {
        required
            .iter()
            .filter(|n| n.id() != exam.id())
            .all(|n| progress.get(&n.id()).is_some_and(|r| r.completed))
    });

    let final_exam_passed = exam.is_some_and(|exam| is_satisfied(exam, progress.get(&exam.id())));

    let certificate_issued = previous.is_some_and(CourseProgressSummary::certificate_issued);

    CourseProgressSummary::from_counts(
        user_id,
        graph.course_id(),
        required.len() as u32,
        completed_count as u32,
        can_take_final_exam,
        final_exam_passed,
        certificate_issued,
        now,
    )
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Course, CourseId, UnlockRule};
    use crate::time::fixed_now;

    fn node(id: u64, position: u32, node_type: NodeType, optional: bool) -> LearningNode {
        LearningNode::new(
            NodeId::new(id),
            CourseId::new(1),
            position,
            format!("Node {id}"),
            node_type,
            optional,
            UnlockRule::none(),
        )
        .unwrap()
    }

    fn quiz_with_threshold(id: u64, position: u32, threshold: f64) -> LearningNode {
        LearningNode::new(
            NodeId::new(id),
            CourseId::new(1),
            position,
            format!("Quiz {id}"),
            NodeType::Quiz,
            false,
            UnlockRule::none().with_required_score(threshold).unwrap(),
        )
        .unwrap()
    }

    fn graph(nodes: Vec<LearningNode>) -> CourseGraph {
        let course = Course::new(CourseId::new(1), "Test", fixed_now()).unwrap();
        CourseGraph::new(course, nodes).unwrap()
    }

    fn completed(user: UserId, id: u64, score: Option<f64>) -> (NodeId, NodeProgress) {
        (
            NodeId::new(id),
            NodeProgress::completed(user, NodeId::new(id), score, fixed_now()),
        )
    }

    fn started(user: UserId, id: u64) -> (NodeId, NodeProgress) {
        (
            NodeId::new(id),
            NodeProgress::started(user, NodeId::new(id), fixed_now()),
        )
    }

    #[test]
    fn sequential_course_unlocks_one_at_a_time() {
        let user = UserId::random();
        let g = graph(vec![
            node(1, 0, NodeType::Video, false),
            node(2, 1, NodeType::Video, false),
            node(3, 2, NodeType::Video, false),
        ]);

        let state = evaluate(&g, &HashMap::new());
        assert!(state.decision_for(NodeId::new(1)).unwrap().can_access);
        assert!(!state.decision_for(NodeId::new(2)).unwrap().can_access);
        assert!(!state.decision_for(NodeId::new(3)).unwrap().can_access);

        let progress = HashMap::from([completed(user, 1, None)]);
        let state = evaluate(&g, &progress);

        let second = state.decision_for(NodeId::new(2)).unwrap();
        assert!(second.can_access);
        assert_eq!(second.state, NodeState::Accessible);

        let third = state.decision_for(NodeId::new(3)).unwrap();
        assert!(!third.can_access);
        assert_eq!(third.reason, Some(LockReason::PreviousIncomplete));
        assert_eq!(third.state, NodeState::Locked);
        assert!(!state.is_complete());
    }

    #[test]
    fn node_is_accessible_iff_all_predecessors_completed() {
        let user = UserId::random();
        let nodes: Vec<LearningNode> = (0..5)
            .map(|i| node(i + 1, u32::try_from(i).unwrap(), NodeType::Video, false))
            .collect();
        let g = graph(nodes);

        for boundary in 0..5u64 {
            let progress: HashMap<NodeId, NodeProgress> = (1..=boundary)
                .map(|id| completed(user, id, None))
                .collect();
            let state = evaluate(&g, &progress);

            for (i, decision) in state.decisions().iter().enumerate() {
                let expected = (i as u64) <= boundary;
                assert_eq!(
                    decision.can_access, expected,
                    "node index {i} with {boundary} completed"
                );
            }
        }
    }

    #[test]
    fn optional_node_is_always_accessible_and_never_blocks() {
        let g = graph(vec![
            node(1, 0, NodeType::Video, false),
            node(2, 1, NodeType::Video, true),
            node(3, 2, NodeType::Video, false),
        ]);

        let state = evaluate(&g, &HashMap::new());
        let optional = state.decision_for(NodeId::new(2)).unwrap();
        assert!(optional.can_access);
        assert_eq!(optional.state, NodeState::Accessible);

        // The optional node propagates as satisfied even while untouched.
        assert!(state.decision_for(NodeId::new(3)).unwrap().can_access);
    }

    #[test]
    fn optional_nodes_do_not_count_toward_completion() {
        let user = UserId::random();
        let g = graph(vec![
            node(1, 0, NodeType::Video, false),
            node(2, 1, NodeType::Video, true),
        ]);

        let progress = HashMap::from([completed(user, 1, None)]);
        let state = evaluate(&g, &progress);
        assert!(state.is_complete());
    }

    #[test]
    fn quiz_below_threshold_blocks_successor_with_score_reason() {
        let user = UserId::random();
        let g = graph(vec![
            quiz_with_threshold(1, 0, 70.0),
            node(2, 1, NodeType::Video, false),
        ]);

        let progress = HashMap::from([completed(user, 1, Some(69.0))]);
        let state = evaluate(&g, &progress);

        // The failed quiz itself stays accessible for a retake.
        let quiz = state.decision_for(NodeId::new(1)).unwrap();
        assert!(quiz.can_access);
        assert_eq!(quiz.state, NodeState::InProgress);

        let next = state.decision_for(NodeId::new(2)).unwrap();
        assert!(!next.can_access);
        assert_eq!(next.reason, Some(LockReason::ScoreBelowThreshold));

        // Reaching the threshold unblocks it.
        let progress = HashMap::from([completed(user, 1, Some(70.0))]);
        let state = evaluate(&g, &progress);
        assert_eq!(
            state.decision_for(NodeId::new(1)).unwrap().state,
            NodeState::Completed
        );
        assert!(state.decision_for(NodeId::new(2)).unwrap().can_access);
    }

    #[test]
    fn explicit_prerequisite_gates_access() {
        let user = UserId::random();
        let gated = LearningNode::new(
            NodeId::new(3),
            CourseId::new(1),
            2,
            "Gated",
            NodeType::Video,
            false,
            UnlockRule::with_prerequisites([NodeId::new(1)]),
        )
        .unwrap();
        let g = graph(vec![
            node(1, 0, NodeType::Video, false),
            node(2, 1, NodeType::Video, true),
            gated,
        ]);

        let state = evaluate(&g, &HashMap::new());
        let decision = state.decision_for(NodeId::new(3)).unwrap();
        assert!(!decision.can_access);
        assert_eq!(decision.reason, Some(LockReason::PrerequisiteMissing));

        let progress = HashMap::from([completed(user, 1, None)]);
        let state = evaluate(&g, &progress);
        assert!(state.decision_for(NodeId::new(3)).unwrap().can_access);
    }

    #[test]
    fn first_node_with_prerequisites_is_not_accessible() {
        let first = LearningNode::new(
            NodeId::new(1),
            CourseId::new(1),
            0,
            "First",
            NodeType::Video,
            false,
            UnlockRule::with_prerequisites([NodeId::new(2)]),
        )
        .unwrap();
        let g = graph(vec![first, node(2, 1, NodeType::Video, false)]);

        let decision = evaluate(&g, &HashMap::new());
        let first = decision.decision_for(NodeId::new(1)).unwrap();
        assert!(!first.can_access);
        assert_eq!(first.reason, Some(LockReason::PrerequisiteMissing));
    }

    #[test]
    fn forward_prerequisite_is_never_satisfied() {
        let user = UserId::random();
        let gated = LearningNode::new(
            NodeId::new(1),
            CourseId::new(1),
            0,
            "Gated",
            NodeType::Video,
            false,
            UnlockRule::with_prerequisites([NodeId::new(2)]),
        )
        .unwrap();
        let g = graph(vec![gated, node(2, 1, NodeType::Video, false)]);

        // Even with the forward-referenced node marked completed, the
        // reference resolves against declared order and stays unsatisfied.
        let progress = HashMap::from([completed(user, 2, None)]);
        let state = evaluate(&g, &progress);
        let decision = state.decision_for(NodeId::new(1)).unwrap();
        assert!(!decision.can_access);
        assert_eq!(decision.reason, Some(LockReason::PrerequisiteMissing));
    }

    #[test]
    fn mutual_prerequisites_terminate_without_recursion() {
        let a = LearningNode::new(
            NodeId::new(1),
            CourseId::new(1),
            0,
            "A",
            NodeType::Video,
            false,
            UnlockRule::with_prerequisites([NodeId::new(2)]),
        )
        .unwrap();
        let b = LearningNode::new(
            NodeId::new(2),
            CourseId::new(1),
            1,
            "B",
            NodeType::Video,
            false,
            UnlockRule::with_prerequisites([NodeId::new(1)]),
        )
        .unwrap();

        let state = evaluate(&graph(vec![a, b]), &HashMap::new());
        assert!(!state.decision_for(NodeId::new(1)).unwrap().can_access);
        assert!(!state.decision_for(NodeId::new(2)).unwrap().can_access);
    }

    #[test]
    fn unknown_prerequisite_is_never_satisfied() {
        let gated = LearningNode::new(
            NodeId::new(1),
            CourseId::new(1),
            0,
            "Gated",
            NodeType::Video,
            false,
            UnlockRule::with_prerequisites([NodeId::new(99)]),
        )
        .unwrap();

        let state = evaluate(&graph(vec![gated]), &HashMap::new());
        assert_eq!(
            state.decision_for(NodeId::new(1)).unwrap().reason,
            Some(LockReason::PrerequisiteMissing)
        );
    }

    #[test]
    fn empty_course_is_trivially_complete() {
        let g = graph(Vec::new());
        let state = evaluate(&g, &HashMap::new());

        assert!(state.decisions().is_empty());
        assert!(state.is_complete());
        assert_eq!(state.next_recommended(), None);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let user = UserId::random();
        let g = graph(vec![
            node(1, 0, NodeType::Video, false),
            quiz_with_threshold(2, 1, 50.0),
            node(3, 2, NodeType::Scorm, false),
        ]);
        let progress = HashMap::from([completed(user, 1, None), completed(user, 2, Some(40.0))]);

        assert_eq!(evaluate(&g, &progress), evaluate(&g, &progress));
    }

    #[test]
    fn next_recommended_is_first_accessible_incomplete_node() {
        let user = UserId::random();
        let g = graph(vec![
            node(1, 0, NodeType::Video, false),
            node(2, 1, NodeType::Video, false),
            node(3, 2, NodeType::Video, false),
        ]);

        let progress = HashMap::from([completed(user, 1, None)]);
        let state = evaluate(&g, &progress);
        assert_eq!(state.next_recommended(), Some(NodeId::new(2)));

        let progress: HashMap<NodeId, NodeProgress> =
            (1..=3).map(|id| completed(user, id, None)).collect();
        let state = evaluate(&g, &progress);
        assert!(state.is_complete());
        assert_eq!(state.next_recommended(), None);
    }

    #[test]
    fn in_progress_state_requires_a_progress_row() {
        let user = UserId::random();
        let g = graph(vec![
            node(1, 0, NodeType::Video, false),
            node(2, 1, NodeType::Video, false),
        ]);

        let progress = HashMap::from([started(user, 1)]);
        let state = evaluate(&g, &progress);
        assert_eq!(
            state.decision_for(NodeId::new(1)).unwrap().state,
            NodeState::InProgress
        );
        assert_eq!(
            state.decision_for(NodeId::new(2)).unwrap().state,
            NodeState::Locked
        );
    }

    // ── summary ──

    #[test]
    fn summary_counts_required_nodes_only() {
        let user = UserId::random();
        let g = graph(vec![
            node(1, 0, NodeType::Video, false),
            node(2, 1, NodeType::Video, true),
            node(3, 2, NodeType::Video, false),
        ]);
        let progress = HashMap::from([completed(user, 1, None), completed(user, 2, None)]);

        let summary = summarize(&g, &progress, None, user, fixed_now()).unwrap();
        assert_eq!(summary.total_nodes(), 2);
        assert_eq!(summary.completed_nodes(), 1);
        assert_eq!(summary.progress_percent(), 50.0);
    }

    #[test]
    fn three_node_scenario_reports_a_third_complete() {
        let user = UserId::random();
        let g = graph(vec![
            node(1, 0, NodeType::Video, false),
            node(2, 1, NodeType::Video, false),
            node(3, 2, NodeType::Video, false),
        ]);
        let progress = HashMap::from([completed(user, 1, None)]);

        let summary = summarize(&g, &progress, None, user, fixed_now()).unwrap();
        assert_eq!(summary.completed_nodes(), 1);
        assert!((summary.progress_percent() - 33.333_333).abs() < 0.001);
    }

    #[test]
    fn empty_course_summary_has_zero_percent_and_no_exam() {
        let user = UserId::random();
        let g = graph(Vec::new());

        let summary = summarize(&g, &HashMap::new(), None, user, fixed_now()).unwrap();
        assert_eq!(summary.progress_percent(), 0.0);
        assert!(!summary.can_take_final_exam());
        assert!(!summary.final_exam_passed());
    }

    #[test]
    fn final_exam_gating_and_passing() {
        let user = UserId::random();
        let g = graph(vec![
            node(1, 0, NodeType::Video, false),
            node(2, 1, NodeType::Video, false),
            quiz_with_threshold(3, 2, 70.0),
        ]);

        let progress = HashMap::from([completed(user, 1, None)]);
        let summary = summarize(&g, &progress, None, user, fixed_now()).unwrap();
        assert!(!summary.can_take_final_exam());

        let progress = HashMap::from([completed(user, 1, None), completed(user, 2, None)]);
        let summary = summarize(&g, &progress, None, user, fixed_now()).unwrap();
        assert!(summary.can_take_final_exam());
        assert!(!summary.final_exam_passed());

        let progress = HashMap::from([
            completed(user, 1, None),
            completed(user, 2, None),
            completed(user, 3, Some(85.0)),
        ]);
        let summary = summarize(&g, &progress, None, user, fixed_now()).unwrap();
        assert!(summary.final_exam_passed());
        assert_eq!(summary.progress_percent(), 100.0);
    }

    #[test]
    fn failed_exam_counts_completed_but_not_passed() {
        let user = UserId::random();
        let g = graph(vec![quiz_with_threshold(1, 0, 70.0)]);

        let progress = HashMap::from([completed(user, 1, Some(60.0))]);
        let summary = summarize(&g, &progress, None, user, fixed_now()).unwrap();

        // Completion and passing are independent facts.
        assert_eq!(summary.completed_nodes(), 1);
        assert_eq!(summary.progress_percent(), 100.0);
        assert!(!summary.final_exam_passed());
    }

    #[test]
    fn certificate_flag_survives_recompute() {
        let user = UserId::random();
        let g = graph(vec![node(1, 0, NodeType::Video, false)]);
        let progress = HashMap::from([completed(user, 1, None)]);

        let issued = CourseProgressSummary::from_counts(
            user,
            CourseId::new(1),
            1,
            1,
            false,
            false,
            true,
            fixed_now(),
        )
        .unwrap();

        let fresh = summarize(&g, &progress, Some(&issued), user, fixed_now()).unwrap();
        assert!(fresh.certificate_issued());

        let from_scratch = summarize(&g, &progress, None, user, fixed_now()).unwrap();
        assert!(!from_scratch.certificate_issued());
    }
}
