//! Error types for context assembly.

use thiserror::Error;

/// Errors raised while assembling an agent's context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A declarative value could not be resolved (unknown since token,
    /// unmatched prompt variant).
    #[error(transparent)]
    Config(#[from] zeroshot_core::error::ConfigError),

    /// The ledger failed underneath a source query.
    #[error(transparent)]
    Ledger(#[from] zeroshot_events::error::LedgerError),
}

/// Convenience type alias for context results.
pub type Result<T> = std::result::Result<T, ContextError>;
