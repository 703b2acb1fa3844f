//! Cluster and agent lifecycle states.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterState {
    /// Created but not yet wired up.
    Initializing,
    /// Agents subscribed and reacting to ledger events.
    Running,
    /// Terminal: completed or stopped by the operator.
    Stopped,
    /// Terminal: the cluster could not be started or continued.
    Failed,
}

impl ClusterState {
    /// Returns `true` for terminal states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl std::fmt::Display for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle state of a single agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Waiting for a trigger.
    Idle,
    /// A trigger arrived; predicate under evaluation.
    Evaluating,
    /// Assembling the prompt context.
    BuildingContext,
    /// The task runner is active.
    Executing,
    /// Terminal: max iterations reached or cluster stopped.
    Stopped,
    /// The last run failed; the agent returns to idle on the next trigger.
    Error,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Evaluating => write!(f, "evaluating"),
            Self::BuildingContext => write!(f, "building_context"),
            Self::Executing => write!(f, "executing"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(ClusterState::Stopped.is_terminal());
        assert!(ClusterState::Failed.is_terminal());
        assert!(!ClusterState::Running.is_terminal());
        assert!(!ClusterState::Initializing.is_terminal());
    }

    #[test]
    fn cluster_state_serde_strings() {
        assert_eq!(
            serde_json::to_string(&ClusterState::Running).unwrap(),
            "\"running\""
        );
        let back: ClusterState = serde_json::from_str("\"stopped\"").unwrap();
        assert_eq!(back, ClusterState::Stopped);
    }

    #[test]
    fn agent_state_serde_strings() {
        assert_eq!(
            serde_json::to_string(&AgentState::BuildingContext).unwrap(),
            "\"building_context\""
        );
    }

    #[test]
    fn display_matches_wire() {
        assert_eq!(AgentState::BuildingContext.to_string(), "building_context");
        assert_eq!(ClusterState::Initializing.to_string(), "initializing");
    }
}
