//! Context packs: prioritized prompt fragments.
//!
//! A pack is one fragment of an agent prompt with a priority, a stable
//! order, an optional compact variant, and a `preserve` flag marking it
//! last-to-truncate among required packs.

use crate::tokens::estimate_tokens;

pub use zeroshot_core::config::SourcePriority as PackPriority;

/// Numeric rank for queue sorting; lower sorts first.
#[must_use]
pub fn priority_rank(priority: PackPriority) -> u8 {
    match priority {
        PackPriority::Required => 0,
        PackPriority::High => 1,
        PackPriority::Medium => 2,
        PackPriority::Low => 3,
    }
}

/// One fragment of an agent prompt.
#[derive(Clone, Debug)]
pub struct ContextPack {
    /// Unique id within a build.
    pub id: String,
    /// Section tag (shown in decisions/metrics).
    pub section: String,
    /// Selection priority.
    pub priority: PackPriority,
    /// Stable tie-breaker; final rendering is in ascending `order`.
    pub order: u32,
    /// Among required packs, truncated last under the char guard.
    pub preserve: bool,
    full: String,
    compact: Option<String>,
}

impl ContextPack {
    /// Create a pack with a full variant only.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        section: impl Into<String>,
        priority: PackPriority,
        order: u32,
        full: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            section: section.into(),
            priority,
            order,
            preserve: false,
            full: full.into(),
            compact: None,
        }
    }

    /// Attach a compact variant, builder-style.
    #[must_use]
    pub fn with_compact(mut self, compact: impl Into<String>) -> Self {
        self.compact = Some(compact.into());
        self
    }

    /// Mark the pack preserve, builder-style.
    #[must_use]
    pub fn preserve(mut self) -> Self {
        self.preserve = true;
        self
    }

    /// The full rendering.
    #[must_use]
    pub fn render(&self) -> &str {
        &self.full
    }

    /// The compact rendering, when one exists.
    #[must_use]
    pub fn compact(&self) -> Option<&str> {
        self.compact.as_deref()
    }

    /// Token cost of the full variant.
    #[must_use]
    pub fn full_tokens(&self) -> u32 {
        estimate_tokens(&self.full)
    }

    /// Token cost of the compact variant, when one exists.
    #[must_use]
    pub fn compact_tokens(&self) -> Option<u32> {
        self.compact.as_deref().map(estimate_tokens)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
