//! Error types for the runtime.
//!
//! Runtime errors stay scoped: a failed runner or hook is recorded on its
//! agent and never propagates to sibling agents or fails the cluster by
//! itself. Config and ledger errors pass through transparently.

use thiserror::Error;

/// Errors that can occur in the cluster execution engine.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Invalid configuration (validator output or unresolvable value).
    #[error(transparent)]
    Config(#[from] zeroshot_core::error::ConfigError),

    /// Ledger or bus failure.
    #[error(transparent)]
    Ledger(#[from] zeroshot_events::error::LedgerError),

    /// Context assembly failure.
    #[error(transparent)]
    Context(#[from] zeroshot_context::error::ContextError),

    /// Unknown cluster id.
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    /// The task runner reported a failure.
    #[error("runner failed for agent '{agent}': {message}")]
    Runner {
        /// Agent whose run failed.
        agent: String,
        /// Runner-reported failure.
        message: String,
    },

    /// The task runner exceeded the agent's timeout.
    #[error("runner timed out for agent '{agent}' after {millis}ms")]
    RunnerTimeout {
        /// Agent whose run timed out.
        agent: String,
        /// Configured timeout.
        millis: u64,
    },

    /// A post-completion hook failed.
    #[error("hook failed for agent '{agent}': {message}")]
    Hook {
        /// Agent whose hook failed.
        agent: String,
        /// What went wrong.
        message: String,
    },

    /// Cluster registry I/O failure.
    #[error("registry error: {0}")]
    Registry(String),

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for runtime results.
pub type Result<T> = std::result::Result<T, RuntimeError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_not_found_display() {
        let err = RuntimeError::ClusterNotFound("cl_123".into());
        assert_eq!(err.to_string(), "cluster not found: cl_123");
    }

    #[test]
    fn runner_timeout_display() {
        let err = RuntimeError::RunnerTimeout {
            agent: "worker".into(),
            millis: 600_000,
        };
        assert_eq!(
            err.to_string(),
            "runner timed out for agent 'worker' after 600000ms"
        );
    }

    #[test]
    fn config_error_passes_through() {
        let err: RuntimeError =
            zeroshot_core::error::ConfigError::UnknownSinceToken("x".into()).into();
        assert_eq!(err.to_string(), "unknown since token: x");
    }
}
