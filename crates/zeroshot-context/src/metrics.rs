//! Context-build accounting.
//!
//! A [`ContextMetrics`] record is produced for every context assembly.
//! Emission is opt-in via environment switches: printed to stdout, published
//! to the cluster ledger under `CONTEXT_METRICS`, both, or neither.

use serde::Serialize;

use zeroshot_core::message::{MessageContent, NewMessage};
use zeroshot_core::{env, topic};
use zeroshot_events::ledger::Ledger;

use crate::builder::{BuiltContext, PackStatus, PackVariant};

/// Per-pack line in the metrics record.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackMetric {
    /// Pack id.
    pub id: String,
    /// Section tag.
    pub section: String,
    /// `included` or `skipped`.
    pub status: &'static str,
    /// `full` / `compact`, absent when skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<&'static str>,
    /// Token estimate contributed.
    pub tokens: u32,
    /// Whether the char guard sliced the body.
    pub truncated: bool,
    /// Skip reason, when skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Accounting for one context build.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMetrics {
    /// Agent the context was built for.
    pub agent_id: String,
    /// Agent iteration at build time.
    pub iteration: u32,
    /// Configured token budget.
    pub max_tokens: u32,
    /// Token estimate of the final context.
    pub used_tokens: u32,
    /// Tokens by which required packs overflowed the budget.
    pub over_budget_tokens: u32,
    /// Final context length in characters.
    pub total_chars: usize,
    /// Packs included.
    pub packs_included: usize,
    /// Packs skipped.
    pub packs_skipped: usize,
    /// Per-pack breakdown.
    pub packs: Vec<PackMetric>,
}

impl ContextMetrics {
    /// Build metrics from a finished context.
    #[must_use]
    pub fn from_built(agent_id: &str, iteration: u32, built: &BuiltContext) -> Self {
        let packs: Vec<PackMetric> = built
            .decisions
            .iter()
            .map(|d| PackMetric {
                id: d.id.clone(),
                section: d.section.clone(),
                status: match d.status {
                    PackStatus::Included => "included",
                    PackStatus::Skipped => "skipped",
                },
                variant: d.variant.map(|v| match v {
                    PackVariant::Full => "full",
                    PackVariant::Compact => "compact",
                }),
                tokens: d.tokens,
                truncated: d.truncated,
                reason: d.reason.clone(),
            })
            .collect();

        let packs_included = packs.iter().filter(|p| p.status == "included").count();
        Self {
            agent_id: agent_id.to_string(),
            iteration,
            max_tokens: built.budget.max_tokens,
            used_tokens: built.budget.used_tokens,
            over_budget_tokens: built.budget.over_budget_tokens,
            total_chars: built.text.len(),
            packs_included,
            packs_skipped: packs.len() - packs_included,
            packs,
        }
    }

    /// Emit per the environment switches. Never fails the build: a ledger
    /// error here is logged and swallowed.
    pub fn emit(&self, ledger: &Ledger, cluster_id: &str) {
        if env::metrics_to_stdout() {
            match serde_json::to_string_pretty(self) {
                Ok(json) => println!("{json}"),
                Err(err) => tracing::warn!(%err, "failed to render context metrics"),
            }
        }
        if env::metrics_to_ledger() {
            let data = match serde_json::to_value(self) {
                Ok(data) => data,
                Err(err) => {
                    tracing::warn!(%err, "failed to serialize context metrics");
                    return;
                }
            };
            let msg = NewMessage::broadcast(
                cluster_id,
                topic::CONTEXT_METRICS,
                "system",
                MessageContent {
                    text: Some(format!(
                        "context build for {}#{}: {}/{} tokens",
                        self.agent_id, self.iteration, self.used_tokens, self.max_tokens
                    )),
                    data: Some(data),
                },
            );
            if let Err(err) = ledger.append(&msg) {
                tracing::warn!(%err, "failed to publish context metrics");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
