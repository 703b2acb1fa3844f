//! Environment switches recognized by the engine.
//!
//! The only process-wide state the engine reads. Everything else is scoped
//! to an orchestrator instance.

use std::path::PathBuf;

/// `ZEROSHOT_CONTEXT_METRICS=1`: print context metrics to stdout after each
/// context build.
pub const CONTEXT_METRICS_STDOUT: &str = "ZEROSHOT_CONTEXT_METRICS";

/// `ZEROSHOT_CONTEXT_METRICS_LEDGER=1`: publish context metrics to the
/// ledger under `CONTEXT_METRICS`.
pub const CONTEXT_METRICS_LEDGER: &str = "ZEROSHOT_CONTEXT_METRICS_LEDGER";

/// `ZEROSHOT_SETTINGS_FILE`: settings override path consumed by
/// collaborators (the engine only exposes it).
pub const SETTINGS_FILE: &str = "ZEROSHOT_SETTINGS_FILE";

fn flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v == "1")
}

/// Whether metrics should be printed to stdout.
#[must_use]
pub fn metrics_to_stdout() -> bool {
    flag(CONTEXT_METRICS_STDOUT)
}

/// Whether metrics should be published to the ledger.
#[must_use]
pub fn metrics_to_ledger() -> bool {
    flag(CONTEXT_METRICS_LEDGER)
}

/// Settings override path, when set.
#[must_use]
pub fn settings_file() -> Option<PathBuf> {
    std::env::var_os(SETTINGS_FILE).map(PathBuf::from)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
