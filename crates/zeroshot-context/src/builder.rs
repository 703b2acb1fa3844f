//! Budgeted context pack selection.
//!
//! The builder walks packs in priority order, fitting full or compact
//! variants under the token budget. Required packs are never dropped: if
//! one exceeds the remaining budget it is still included and the overage is
//! accounted. After selection, a hard character guard reduces the result in
//! three stages: compact optionals, drop optionals, truncate required packs
//! (`preserve` packs last, largest first).

use tracing::debug;

use crate::pack::{priority_rank, ContextPack, PackPriority};
use crate::tokens::estimate_tokens;

/// Hard default cap on final context length, in characters.
pub const DEFAULT_MAX_CHARS: usize = 500_000;

/// Appended to a pack body when the char guard slices it.
pub const TRUNCATION_MARKER: &str = "\n[truncated]";

/// Separator between rendered packs.
const PACK_SEPARATOR: &str = "\n\n";

/// Whether a pack made it into the final context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackStatus {
    /// Present in the final context.
    Included,
    /// Left out.
    Skipped,
}

/// Which variant of a pack was rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackVariant {
    /// The full rendering.
    Full,
    /// The compact rendering.
    Compact,
}

/// Per-pack outcome of a build.
#[derive(Clone, Debug)]
pub struct PackDecision {
    /// Pack id.
    pub id: String,
    /// Pack section tag.
    pub section: String,
    /// Included or skipped.
    pub status: PackStatus,
    /// Variant rendered (for included packs).
    pub variant: Option<PackVariant>,
    /// Final character count contributed.
    pub chars: usize,
    /// Final token estimate contributed.
    pub tokens: u32,
    /// Whether the char guard sliced the body.
    pub truncated: bool,
    /// Why a pack was skipped (`budget`, `char_guard`).
    pub reason: Option<String>,
}

/// Budget accounting for a build.
#[derive(Clone, Copy, Debug)]
pub struct BudgetReport {
    /// Configured token budget.
    pub max_tokens: u32,
    /// Token estimate of the final context.
    pub used_tokens: u32,
    /// Tokens by which required packs overflowed the budget.
    pub over_budget_tokens: u32,
    /// Budget left after selection (zero when over budget).
    pub remaining_tokens: u32,
}

/// Result of a build: the context string plus accounting.
#[derive(Clone, Debug)]
pub struct BuiltContext {
    /// The assembled context.
    pub text: String,
    /// Per-pack decisions, in input order.
    pub decisions: Vec<PackDecision>,
    /// Budget accounting.
    pub budget: BudgetReport,
}

/// Selects and renders packs under a token budget with a hard char guard.
#[derive(Clone, Copy, Debug)]
pub struct ContextPackBuilder {
    max_tokens: u32,
    max_chars: usize,
}

/// Working state for one pack during selection and reduction.
struct Slot {
    variant: Option<PackVariant>,
    text: String,
    truncated: bool,
    skip_reason: Option<&'static str>,
}

impl ContextPackBuilder {
    /// Create a builder with the default char guard.
    #[must_use]
    pub fn new(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    /// Override the char guard, builder-style.
    #[must_use]
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Run selection and reduction over `packs`.
    #[must_use]
    pub fn build(&self, packs: &[ContextPack]) -> BuiltContext {
        let mut slots = self.select(packs);
        self.apply_char_guard(packs, &mut slots);
        self.finish(packs, slots)
    }

    // ─── Selection ───────────────────────────────────────────────────────

    fn select(&self, packs: &[ContextPack]) -> Vec<Slot> {
        let mut slots: Vec<Slot> = packs
            .iter()
            .map(|_| Slot {
                variant: None,
                text: String::new(),
                truncated: false,
                skip_reason: None,
            })
            .collect();

        let mut queue: Vec<usize> = (0..packs.len()).collect();
        queue.sort_by_key(|&i| (priority_rank(packs[i].priority), packs[i].order, i));

        let mut remaining = i64::from(self.max_tokens);

        for &i in &queue {
            let pack = &packs[i];
            let full_tokens = i64::from(pack.full_tokens());
            let compact_tokens = pack.compact_tokens().map(i64::from);

            if pack.priority == PackPriority::Required {
                // Required packs are never dropped: full when it fits,
                // compact when it fits or is simply cheaper, else whichever
                // variant exists.
                let use_compact = match compact_tokens {
                    Some(ct) if full_tokens > remaining => ct <= remaining || ct < full_tokens,
                    _ => false,
                };
                let (variant, text, cost) = if use_compact {
                    (
                        PackVariant::Compact,
                        pack.compact().unwrap_or_default().to_string(),
                        compact_tokens.unwrap_or(0),
                    )
                } else {
                    (PackVariant::Full, pack.render().to_string(), full_tokens)
                };

                // Over-budget required packs clamp the remaining budget to
                // zero; the overage surfaces in the final budget report.
                remaining = (remaining - cost).max(0);
                slots[i].variant = Some(variant);
                slots[i].text = text;
            } else if full_tokens <= remaining {
                remaining -= full_tokens;
                slots[i].variant = Some(PackVariant::Full);
                slots[i].text = pack.render().to_string();
            } else if compact_tokens.is_some_and(|ct| ct <= remaining) {
                remaining -= compact_tokens.unwrap_or(0);
                slots[i].variant = Some(PackVariant::Compact);
                slots[i].text = pack.compact().unwrap_or_default().to_string();
            } else {
                slots[i].skip_reason = Some("budget");
                debug!(pack = %pack.id, "pack skipped: over token budget");
            }
        }

        slots
    }

    // ─── Char guard ──────────────────────────────────────────────────────

    fn apply_char_guard(&self, packs: &[ContextPack], slots: &mut [Slot]) {
        if total_chars(slots) <= self.max_chars {
            return;
        }

        // Stage 1: compact included optionals, highest priority / latest
        // order first.
        let mut candidates: Vec<usize> = (0..packs.len())
            .filter(|&i| {
                packs[i].priority != PackPriority::Required
                    && slots[i].variant == Some(PackVariant::Full)
                    && packs[i].compact().is_some()
            })
            .collect();
        candidates.sort_by_key(|&i| (priority_rank(packs[i].priority), std::cmp::Reverse(packs[i].order)));

        for &i in &candidates {
            if total_chars(slots) <= self.max_chars {
                return;
            }
            slots[i].variant = Some(PackVariant::Compact);
            slots[i].text = packs[i].compact().unwrap_or_default().to_string();
        }

        // Stage 2: drop optionals entirely, same order.
        let mut droppable: Vec<usize> = (0..packs.len())
            .filter(|&i| packs[i].priority != PackPriority::Required && slots[i].variant.is_some())
            .collect();
        droppable.sort_by_key(|&i| (priority_rank(packs[i].priority), std::cmp::Reverse(packs[i].order)));

        for &i in &droppable {
            if total_chars(slots) <= self.max_chars {
                return;
            }
            slots[i].variant = None;
            slots[i].text = String::new();
            slots[i].skip_reason = Some("char_guard");
        }

        // Stage 3: truncate required packs, preserve last, largest first.
        let mut required: Vec<usize> = (0..packs.len())
            .filter(|&i| packs[i].priority == PackPriority::Required && slots[i].variant.is_some())
            .collect();
        required.sort_by_key(|&i| (packs[i].preserve, std::cmp::Reverse(slots[i].text.len())));

        for &i in &required {
            let total = total_chars(slots);
            if total <= self.max_chars {
                return;
            }
            let overage = total - self.max_chars;
            truncate_slot(&mut slots[i], overage);
        }
    }

    // ─── Assembly ────────────────────────────────────────────────────────

    fn finish(&self, packs: &[ContextPack], slots: Vec<Slot>) -> BuiltContext {
        // Render in original `order`, not selection order.
        let mut render_order: Vec<usize> = (0..packs.len())
            .filter(|&i| slots[i].variant.is_some())
            .collect();
        render_order.sort_by_key(|&i| (packs[i].order, i));

        let text = render_order
            .iter()
            .map(|&i| slots[i].text.as_str())
            .collect::<Vec<_>>()
            .join(PACK_SEPARATOR);

        let decisions: Vec<PackDecision> = packs
            .iter()
            .zip(&slots)
            .map(|(pack, slot)| PackDecision {
                id: pack.id.clone(),
                section: pack.section.clone(),
                status: if slot.variant.is_some() {
                    PackStatus::Included
                } else {
                    PackStatus::Skipped
                },
                variant: slot.variant,
                chars: slot.text.len(),
                tokens: estimate_tokens(&slot.text),
                truncated: slot.truncated,
                reason: slot.skip_reason.map(str::to_string),
            })
            .collect();

        let used_tokens: u32 = decisions.iter().map(|d| d.tokens).sum();
        let budget = BudgetReport {
            max_tokens: self.max_tokens,
            used_tokens,
            over_budget_tokens: used_tokens.saturating_sub(self.max_tokens),
            remaining_tokens: self.max_tokens.saturating_sub(used_tokens),
        };

        BuiltContext {
            text,
            decisions,
            budget,
        }
    }
}

fn total_chars(slots: &[Slot]) -> usize {
    let included: Vec<&Slot> = slots.iter().filter(|s| s.variant.is_some()).collect();
    let body: usize = included.iter().map(|s| s.text.len()).sum();
    let separators = included.len().saturating_sub(1) * PACK_SEPARATOR.len();
    body + separators
}

/// Slice `slot.text` down by at least `overage` bytes (bounded at zero) and
/// append the truncation marker, respecting UTF-8 boundaries.
fn truncate_slot(slot: &mut Slot, overage: usize) {
    let current = slot.text.len();
    let mut keep = current
        .saturating_sub(overage)
        .saturating_sub(TRUNCATION_MARKER.len());
    while keep > 0 && !slot.text.is_char_boundary(keep) {
        keep -= 1;
    }
    slot.text.truncate(keep);
    slot.text.push_str(TRUNCATION_MARKER);
    slot.truncated = true;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::PackPriority;

    fn pack(id: &str, priority: PackPriority, order: u32, chars: usize) -> ContextPack {
        ContextPack::new(id, "test", priority, order, "x".repeat(chars))
    }

    #[test]
    fn everything_fits_under_generous_budget() {
        let packs = vec![
            pack("a", PackPriority::Required, 0, 40),
            pack("b", PackPriority::Medium, 1, 40),
        ];
        let built = ContextPackBuilder::new(1000).build(&packs);
        assert_eq!(built.text.len(), 40 + 2 + 40);
        assert!(built
            .decisions
            .iter()
            .all(|d| d.status == PackStatus::Included));
        assert_eq!(built.budget.used_tokens, 20);
    }

    #[test]
    fn optional_pack_skipped_when_over_budget() {
        let packs = vec![
            pack("required", PackPriority::Required, 0, 40), // 10 tokens
            pack("big", PackPriority::Low, 1, 4000),         // 1000 tokens
        ];
        let built = ContextPackBuilder::new(100).build(&packs);
        let big = &built.decisions[1];
        assert_eq!(big.status, PackStatus::Skipped);
        assert_eq!(big.reason.as_deref(), Some("budget"));
    }

    #[test]
    fn optional_pack_falls_back_to_compact() {
        let packs = vec![
            pack("required", PackPriority::Required, 0, 40),
            pack("big", PackPriority::Low, 1, 4000).with_compact("tiny"),
        ];
        let built = ContextPackBuilder::new(100).build(&packs);
        let big = &built.decisions[1];
        assert_eq!(big.status, PackStatus::Included);
        assert_eq!(big.variant, Some(PackVariant::Compact));
        assert!(built.text.contains("tiny"));
    }

    #[test]
    fn required_pack_never_dropped_even_over_budget() {
        let packs = vec![pack("huge", PackPriority::Required, 0, 4000)];
        let built = ContextPackBuilder::new(10).build(&packs);
        assert_eq!(built.decisions[0].status, PackStatus::Included);
        assert!(built.budget.over_budget_tokens > 0);
    }

    #[test]
    fn required_prefers_compact_when_full_does_not_fit() {
        let packs = vec![
            pack("first", PackPriority::Required, 0, 360), // 90 tokens
            pack("second", PackPriority::Required, 1, 400).with_compact("c".repeat(20)),
        ];
        let built = ContextPackBuilder::new(100).build(&packs);
        assert_eq!(built.decisions[1].variant, Some(PackVariant::Compact));
    }

    #[test]
    fn required_preservation_invariant() {
        // If the budget covers the compact variants of all required packs,
        // every required pack appears in the final context.
        let packs = vec![
            pack("r1", PackPriority::Required, 0, 4000).with_compact("a".repeat(40)),
            pack("r2", PackPriority::Required, 1, 4000).with_compact("b".repeat(40)),
            pack("trigger", PackPriority::Required, 2, 40),
        ];
        // compact sums: 10 + 10 + full trigger 10 = 30 tokens
        let built = ContextPackBuilder::new(40).build(&packs);
        for decision in &built.decisions {
            assert_eq!(decision.status, PackStatus::Included, "{}", decision.id);
        }
    }

    #[test]
    fn renders_in_original_order_not_selection_order() {
        let packs = vec![
            ContextPack::new("late-required", "s", PackPriority::Required, 5, "REQUIRED"),
            ContextPack::new("early-low", "s", PackPriority::Low, 1, "LOW"),
        ];
        let built = ContextPackBuilder::new(1000).build(&packs);
        let low_pos = built.text.find("LOW").unwrap();
        let required_pos = built.text.find("REQUIRED").unwrap();
        assert!(low_pos < required_pos, "order 1 renders before order 5");
    }

    #[test]
    fn char_guard_compacts_optionals_first() {
        let packs = vec![
            pack("required", PackPriority::Required, 0, 100),
            pack("opt", PackPriority::Medium, 1, 900).with_compact("small"),
        ];
        // Token budget is generous; only the char guard bites.
        let built = ContextPackBuilder::new(100_000)
            .with_max_chars(500)
            .build(&packs);
        assert!(built.text.len() <= 500);
        assert_eq!(built.decisions[1].variant, Some(PackVariant::Compact));
    }

    #[test]
    fn char_guard_drops_optionals_second() {
        let packs = vec![
            pack("required", PackPriority::Required, 0, 100),
            pack("opt", PackPriority::Medium, 1, 900), // no compact
        ];
        let built = ContextPackBuilder::new(100_000)
            .with_max_chars(500)
            .build(&packs);
        assert!(built.text.len() <= 500);
        assert_eq!(built.decisions[1].status, PackStatus::Skipped);
        assert_eq!(built.decisions[1].reason.as_deref(), Some("char_guard"));
    }

    #[test]
    fn char_guard_truncates_required_last() {
        let packs = vec![
            pack("big-required", PackPriority::Required, 0, 900),
            pack("trigger", PackPriority::Required, 1, 50).preserve(),
        ];
        let built = ContextPackBuilder::new(100_000)
            .with_max_chars(500)
            .build(&packs);
        assert!(built.text.len() <= 500, "final len {}", built.text.len());
        assert!(built.decisions[0].truncated);
        assert!(
            !built.decisions[1].truncated,
            "preserve pack survives when slicing the big one suffices"
        );
        assert!(built.text.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn char_guard_respects_utf8_boundaries() {
        let packs = vec![ContextPack::new(
            "unicode",
            "s",
            PackPriority::Required,
            0,
            "é".repeat(400),
        )];
        let built = ContextPackBuilder::new(100_000)
            .with_max_chars(100)
            .build(&packs);
        assert!(built.text.len() <= 100);
        // Would panic during truncate() if we sliced mid-codepoint.
    }

    #[test]
    fn empty_input() {
        let built = ContextPackBuilder::new(100).build(&[]);
        assert!(built.text.is_empty());
        assert!(built.decisions.is_empty());
        assert_eq!(built.budget.used_tokens, 0);
    }

    #[test]
    fn budget_report_accounts_used_and_remaining() {
        let packs = vec![pack("a", PackPriority::Required, 0, 40)];
        let built = ContextPackBuilder::new(100).build(&packs);
        assert_eq!(built.budget.used_tokens, 10);
        assert_eq!(built.budget.remaining_tokens, 90);
        assert_eq!(built.budget.over_budget_tokens, 0);
    }
}
