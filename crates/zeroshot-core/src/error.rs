//! Error types for configuration handling.
//!
//! [`ConfigError`] is surfaced to callers at `start` time (from the
//! validator) or at runtime when a declarative value cannot be resolved
//! (an unknown `since` token, a malformed iteration pattern). Clusters are
//! never created from a config that fails validation.

use thiserror::Error;

/// Errors raised while parsing or validating cluster configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config JSON failed to deserialize.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Static validation found one or more errors.
    #[error("invalid config: {0}")]
    Invalid(String),

    /// A `since` anchor string was not recognized.
    #[error("unknown since token: {0}")]
    UnknownSinceToken(String),

    /// An iteration pattern (`"all"`, `"N"`, `"M-N"`, `"N+"`) failed to parse.
    #[error("invalid iteration pattern: {0}")]
    InvalidIterationPattern(String),

    /// Model rules have no catch-all and no rule matched the iteration.
    #[error("no model rule matched iteration {0}")]
    NoModelRuleMatch(u32),
}

/// Convenience type alias for config results.
pub type Result<T> = std::result::Result<T, ConfigError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
