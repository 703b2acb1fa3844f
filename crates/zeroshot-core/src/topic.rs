//! Reserved topic names.
//!
//! Topics are plain strings on the wire; the constants here are the set the
//! engine itself produces or reacts to. Cluster configs are free to invent
//! additional topics for agent-to-agent flow.

/// A new task/issue was opened; the first message of every cluster.
pub const ISSUE_OPENED: &str = "ISSUE_OPENED";
/// A planner published its plan.
pub const PLAN_READY: &str = "PLAN_READY";
/// Incremental progress report from an implementation agent.
pub const WORKER_PROGRESS: &str = "WORKER_PROGRESS";
/// An implementation pass is ready for validation.
pub const IMPLEMENTATION_READY: &str = "IMPLEMENTATION_READY";
/// A validator published its verdict.
pub const VALIDATION_RESULT: &str = "VALIDATION_RESULT";
/// A debugging/investigation agent published its findings.
pub const INVESTIGATION_COMPLETE: &str = "INVESTIGATION_COMPLETE";
/// Derived working-memory snapshot, re-published on content change.
pub const STATE_SNAPSHOT: &str = "STATE_SNAPSHOT";
/// Terminal topic: the workflow is done.
pub const CLUSTER_COMPLETE: &str = "CLUSTER_COMPLETE";
/// Context-assembly accounting, published when the ledger switch is on.
pub const CONTEXT_METRICS: &str = "CONTEXT_METRICS";
/// Operator guidance addressed to the whole cluster.
pub const USER_GUIDANCE_CLUSTER: &str = "USER_GUIDANCE_CLUSTER";
/// Operator guidance addressed to a single agent.
pub const USER_GUIDANCE_AGENT: &str = "USER_GUIDANCE_AGENT";

/// All topics the engine treats as reserved.
pub const RESERVED_TOPICS: &[&str] = &[
    ISSUE_OPENED,
    PLAN_READY,
    WORKER_PROGRESS,
    IMPLEMENTATION_READY,
    VALIDATION_RESULT,
    INVESTIGATION_COMPLETE,
    STATE_SNAPSHOT,
    CLUSTER_COMPLETE,
    CONTEXT_METRICS,
    USER_GUIDANCE_CLUSTER,
    USER_GUIDANCE_AGENT,
];

/// Topics the state snapshotter folds into working memory.
pub const STATE_AFFECTING_TOPICS: &[&str] = &[
    ISSUE_OPENED,
    PLAN_READY,
    WORKER_PROGRESS,
    IMPLEMENTATION_READY,
    VALIDATION_RESULT,
    INVESTIGATION_COMPLETE,
];

/// Topics the engine produces on its own (never required to have an
/// agent-side producer in a well-formed config).
pub const SYSTEM_PRODUCED_TOPICS: &[&str] = &[
    ISSUE_OPENED,
    STATE_SNAPSHOT,
    CONTEXT_METRICS,
    USER_GUIDANCE_CLUSTER,
    USER_GUIDANCE_AGENT,
];

/// Whether `topic` is in the reserved set.
#[must_use]
pub fn is_reserved(topic: &str) -> bool {
    RESERVED_TOPICS.contains(&topic)
}

/// Whether the snapshotter folds `topic` into state.
#[must_use]
pub fn is_state_affecting(topic: &str) -> bool {
    STATE_AFFECTING_TOPICS.contains(&topic)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_topic_count() {
        assert_eq!(RESERVED_TOPICS.len(), 11);
    }

    #[test]
    fn state_affecting_is_reserved_subset() {
        for topic in STATE_AFFECTING_TOPICS {
            assert!(is_reserved(topic), "{topic} should be reserved");
        }
    }

    #[test]
    fn snapshot_is_not_state_affecting() {
        // Folding STATE_SNAPSHOT back into itself would loop forever.
        assert!(!is_state_affecting(STATE_SNAPSHOT));
    }

    #[test]
    fn custom_topics_are_not_reserved() {
        assert!(!is_reserved("MY_CUSTOM_TOPIC"));
        assert!(!is_state_affecting("MY_CUSTOM_TOPIC"));
    }
}
