//! Agent context assembly.
//!
//! Composes the full prompt for one agent run: static sections (header,
//! instructions, output schemas, validator skips) plus one pack per
//! `contextStrategy` source, with the triggering message always last and
//! preserved. The assembled pack list is handed to [`ContextPackBuilder`]
//! for budgeted selection.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Map, Value};

use zeroshot_core::config::{
    AgentConfig, ContextSource, OutputFormat, SourcePriority, SourceStrategy,
};
use zeroshot_core::error::ConfigError;
use zeroshot_core::message::Message;
use zeroshot_core::model_rules::select_prompt;
use zeroshot_core::topic;
use zeroshot_events::ledger::{Ledger, MessageQuery, QueryOrder};

use crate::builder::{BuiltContext, ContextPackBuilder};
use crate::error::Result;
use crate::metrics::ContextMetrics;
use crate::pack::{ContextPack, PackPriority};

// Stable pack ordering: static sections, then sources, trigger always last.
const ORDER_HEADER: u32 = 0;
const ORDER_INSTRUCTIONS: u32 = 10;
const ORDER_OUTPUT_FORMAT: u32 = 20;
const ORDER_JSON_SCHEMA: u32 = 30;
const ORDER_VALIDATOR_SKIP: u32 = 40;
const ORDER_SOURCES_BASE: u32 = 100;
const ORDER_TRIGGER: u32 = 10_000;

/// Criteria status markers found in `VALIDATION_RESULT` payloads.
const STATUS_CANNOT_VALIDATE: &str = "CANNOT_VALIDATE";

/// Whether a criteria reason describes a platform/architecture mismatch.
///
/// Used in two places: the validator-skip section drops these reasons for
/// isolated agents, and the agent wrapper demotes them in fresh output.
#[must_use]
pub fn is_platform_mismatch(reason: &str) -> bool {
    platform_mismatch_regex().is_match(reason)
}

fn platform_mismatch_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)EBADPLATFORM|platform mismatch|unsupported platform|wrong platform|different architecture|cross-?arch",
        )
        .unwrap()
    })
}

/// Per-run inputs that change between iterations.
#[derive(Clone, Copy, Debug)]
pub struct BuildParams<'a> {
    /// Current iteration (1-based for the run being prepared).
    pub iteration: u32,
    /// The message that fired the trigger.
    pub triggering: &'a Message,
    /// End of the agent's previous task, epoch millis.
    pub last_task_end: Option<i64>,
    /// Start of the agent's previous run, epoch millis.
    pub last_agent_start: Option<i64>,
}

/// Assembles context packs for one agent and hands them to the pack builder.
pub struct AgentContextBuilder<'a> {
    ledger: &'a Ledger,
    agent: &'a AgentConfig,
    cluster_id: &'a str,
    /// Cluster creation time, epoch millis; the `cluster_start` anchor.
    cluster_start: i64,
}

impl<'a> AgentContextBuilder<'a> {
    /// Create a builder for one agent of one cluster.
    #[must_use]
    pub fn new(
        ledger: &'a Ledger,
        agent: &'a AgentConfig,
        cluster_id: &'a str,
        cluster_start: i64,
    ) -> Self {
        Self {
            ledger,
            agent,
            cluster_id,
            cluster_start,
        }
    }

    /// Assemble the context and its metrics. Metrics are emitted per the
    /// environment switches before returning.
    pub fn build(&self, params: &BuildParams<'_>) -> Result<(BuiltContext, ContextMetrics)> {
        let mut packs = Vec::new();

        packs.push(self.header_pack(params.iteration));
        packs.push(self.instructions_pack(params.iteration)?);
        if let Some(pack) = self.output_format_pack() {
            packs.push(pack);
        }
        if let Some(pack) = self.json_schema_pack() {
            packs.push(pack);
        }
        if let Some(pack) = self.validator_skip_pack()? {
            packs.push(pack);
        }
        self.push_source_packs(&mut packs, params)?;
        packs.push(triggering_pack(params.triggering));

        let max_tokens = self
            .agent
            .context_strategy
            .as_ref()
            .map_or(zeroshot_core::config::DEFAULT_MAX_TOKENS, |s| s.max_tokens);

        let built = ContextPackBuilder::new(max_tokens).build(&packs);
        let metrics = ContextMetrics::from_built(&self.agent.id, params.iteration, &built);
        metrics.emit(self.ledger, self.cluster_id);
        Ok((built, metrics))
    }

    // ─── Static sections ─────────────────────────────────────────────────

    fn header_pack(&self, iteration: u32) -> ContextPack {
        let mut text = format!(
            "# Agent: {}\nRole: {} | Iteration: {iteration}\n\n\
             ## Execution Rules\n\
             - You are running non-interactively. Never wait for user input or ask questions.\n\
             - Produce your complete result in a single response.\n\
             - Keep output terse and structured; do not narrate progress.",
            self.agent.id, self.agent.role
        );
        if !self.agent.is_isolated() {
            text.push_str(
                "\n- HARD RULE: do not run version-control operations of any kind \
                 (no commit, push, branch, merge, rebase, or worktree changes).",
            );
        }
        ContextPack::new("header", "header", PackPriority::Required, ORDER_HEADER, text)
    }

    fn instructions_pack(&self, iteration: u32) -> Result<ContextPack> {
        let prompt = self
            .agent
            .prompt
            .as_ref()
            .and_then(|spec| select_prompt(spec, iteration))
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "agent '{}' has no prompt variant matching iteration {iteration}",
                    self.agent.id
                ))
            })?;
        Ok(ContextPack::new(
            "instructions",
            "instructions",
            PackPriority::Required,
            ORDER_INSTRUCTIONS,
            format!("## Instructions\n{prompt}"),
        ))
    }

    fn output_format_pack(&self) -> Option<ContextPack> {
        let format = self.agent.output_format?;
        let text = match format {
            OutputFormat::Json => {
                "## Output Format\nRespond with a single JSON object and nothing else, \
                 no prose before or after it."
            }
            OutputFormat::Text => "## Output Format\nRespond in plain text.",
        };
        Some(ContextPack::new(
            "output-format",
            "output-format",
            PackPriority::Required,
            ORDER_OUTPUT_FORMAT,
            text,
        ))
    }

    fn json_schema_pack(&self) -> Option<ContextPack> {
        if self.agent.output_format != Some(OutputFormat::Json) {
            return None;
        }
        let schema = self.agent.json_schema.as_ref()?;
        let example = example_from_schema(schema);
        let text = format!(
            "## JSON Schema\nYour output must conform to this schema:\n```json\n{}\n```\n\n\
             Example of a conforming object:\n```json\n{}\n```",
            serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string()),
            serde_json::to_string_pretty(&example).unwrap_or_else(|_| example.to_string()),
        );
        Some(ContextPack::new(
            "json-schema",
            "json-schema",
            PackPriority::Required,
            ORDER_JSON_SCHEMA,
            text,
        ))
    }

    /// Validators get the list of criteria proven permanently unverifiable,
    /// so they stop burning iterations re-checking them.
    fn validator_skip_pack(&self) -> Result<Option<ContextPack>> {
        if self.agent.role != "validator" {
            return Ok(None);
        }

        let results = self.ledger.query(
            &MessageQuery::cluster(self.cluster_id).topic(topic::VALIDATION_RESULT),
        )?;

        // Chronological walk; the latest status per criteria id wins.
        let mut latest: Vec<(String, String, String)> = Vec::new();
        for msg in &results {
            let Some(criteria) = msg.data_at("criteria").and_then(Value::as_array) else {
                continue;
            };
            for criterion in criteria {
                let Some(id) = criterion.get("id").and_then(Value::as_str) else {
                    continue;
                };
                let status = criterion
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let reason = criterion
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                latest.retain(|(existing, _, _)| existing != id);
                latest.push((id.to_string(), status.to_string(), reason.to_string()));
            }
        }

        let mut lines = Vec::new();
        for (id, status, reason) in &latest {
            // CANNOT_VALIDATE_YET is temporary and never skipped.
            if status != STATUS_CANNOT_VALIDATE {
                continue;
            }
            // In an isolated environment, platform-mismatch reasons no
            // longer apply; drop them silently.
            if self.agent.is_isolated() && platform_mismatch_regex().is_match(reason) {
                continue;
            }
            lines.push(format!("- {id}: {reason}"));
        }

        if lines.is_empty() {
            return Ok(None);
        }

        let text = format!(
            "## Permanently Unverifiable Criteria (SKIP THESE)\n\
             These criteria cannot be validated in this environment. \
             Mark them CANNOT_VALIDATE without re-checking:\n{}",
            lines.join("\n")
        );
        Ok(Some(ContextPack::new(
            "validator-skip",
            "validator-skip",
            PackPriority::Required,
            ORDER_VALIDATOR_SKIP,
            text,
        )))
    }

    // ─── Dynamic source packs ────────────────────────────────────────────

    fn push_source_packs(
        &self,
        packs: &mut Vec<ContextPack>,
        params: &BuildParams<'_>,
    ) -> Result<()> {
        let Some(strategy) = &self.agent.context_strategy else {
            return Ok(());
        };

        for (index, source) in strategy.sources.iter().enumerate() {
            let priority = source_priority(source);
            let since = self.resolve_since(source.since.as_deref(), params)?;

            let full_msgs = self.select_messages(
                source,
                since,
                source.strategy.unwrap_or(SourceStrategy::Latest),
                source.effective_amount(),
            )?;

            let compact_strategy = source.compact_strategy.unwrap_or(match source.strategy {
                Some(SourceStrategy::All) | None => SourceStrategy::Latest,
                Some(base) => base,
            });
            let compact_amount = source.compact_amount.unwrap_or(1);
            let compact_msgs =
                self.select_messages(source, since, compact_strategy, Some(compact_amount))?;

            if full_msgs.is_empty() && priority != PackPriority::Required {
                continue;
            }

            let full = render_source(&source.topic, &full_msgs);
            let compact = render_source(&source.topic, &compact_msgs);

            #[allow(clippy::cast_possible_truncation)]
            let order = ORDER_SOURCES_BASE + index as u32;
            packs.push(
                ContextPack::new(
                    format!("source-{index}-{}", source.topic),
                    format!("source:{}", source.topic),
                    priority,
                    order,
                    full,
                )
                .with_compact(compact),
            );
        }
        Ok(())
    }

    fn resolve_since(
        &self,
        since: Option<&str>,
        params: &BuildParams<'_>,
    ) -> Result<Option<i64>> {
        let Some(token) = since else {
            return Ok(None);
        };
        let resolved = match token {
            "cluster_start" => self.cluster_start,
            "last_task_end" => params.last_task_end.unwrap_or(self.cluster_start),
            "last_agent_start" => params.last_agent_start.unwrap_or(self.cluster_start),
            other => chrono::DateTime::parse_from_rfc3339(other)
                .map(|dt| dt.timestamp_millis())
                .map_err(|_| ConfigError::UnknownSinceToken(other.to_string()))?,
        };
        Ok(Some(resolved))
    }

    fn select_messages(
        &self,
        source: &ContextSource,
        since: Option<i64>,
        strategy: SourceStrategy,
        amount: Option<u32>,
    ) -> Result<Vec<Message>> {
        let mut query = MessageQuery::cluster(self.cluster_id).topic(source.topic.clone());
        if let Some(sender) = &source.sender {
            query = query.sender(sender.clone());
        }
        if let Some(since) = since {
            query = query.since(since);
        }

        let messages = match strategy {
            SourceStrategy::Latest => {
                query = query.order(QueryOrder::Desc).limit(amount.unwrap_or(1));
                let mut msgs = self.ledger.query(&query)?;
                msgs.reverse();
                msgs
            }
            SourceStrategy::Oldest => {
                query = query.limit(amount.unwrap_or(1));
                self.ledger.query(&query)?
            }
            SourceStrategy::All => {
                if let Some(amount) = amount {
                    query = query.limit(amount);
                }
                self.ledger.query(&query)?
            }
        };
        Ok(messages)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

fn source_priority(source: &ContextSource) -> PackPriority {
    if let Some(priority) = source.priority {
        return priority;
    }
    match source.topic.as_str() {
        topic::STATE_SNAPSHOT | topic::ISSUE_OPENED | topic::PLAN_READY => SourcePriority::Required,
        topic::VALIDATION_RESULT | topic::IMPLEMENTATION_READY => SourcePriority::High,
        _ => SourcePriority::Medium,
    }
}

fn render_source(topic: &str, messages: &[Message]) -> String {
    if messages.is_empty() {
        return format!("## {topic}\n(no messages yet)");
    }
    let mut out = format!("## {topic}");
    for msg in messages {
        out.push_str("\n\n");
        out.push_str(&render_message(msg));
    }
    out
}

fn render_message(msg: &Message) -> String {
    let when = chrono::DateTime::from_timestamp_millis(msg.timestamp)
        .map_or_else(|| msg.timestamp.to_string(), |dt| dt.to_rfc3339());
    let mut out = format!("[{when}] {} -> {} (#{})", msg.sender, msg.receiver, msg.id);
    if let Some(text) = &msg.content.text {
        if !text.is_empty() {
            out.push('\n');
            out.push_str(text);
        }
    }
    if let Some(data) = &msg.content.data {
        out.push_str("\ndata: ");
        out.push_str(&serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string()));
    }
    out
}

fn triggering_pack(triggering: &Message) -> ContextPack {
    ContextPack::new(
        "triggering-message",
        "trigger",
        PackPriority::Required,
        ORDER_TRIGGER,
        format!("## Triggering Message\n{}", render_message(triggering)),
    )
    .preserve()
}

/// Generate an example object that would satisfy `schema`.
///
/// Best-effort: enough for the model to see the expected shape. Recognizes
/// `type`, `properties`, `items`, `enum`, and `default`.
fn example_from_schema(schema: &Value) -> Value {
    if let Some(default) = schema.get("default") {
        return default.clone();
    }
    if let Some(first) = schema.get("enum").and_then(Value::as_array).and_then(|a| a.first()) {
        return first.clone();
    }
    match schema.get("type").and_then(Value::as_str) {
        Some("object") => {
            let mut map = Map::new();
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                for (key, subschema) in props {
                    let _ = map.insert(key.clone(), example_from_schema(subschema));
                }
            }
            Value::Object(map)
        }
        Some("array") => {
            let item = schema.get("items").map_or(Value::Null, example_from_schema);
            json!([item])
        }
        Some("string") => json!("example"),
        Some("number") => json!(0.5),
        Some("integer") => json!(0),
        Some("boolean") => json!(true),
        Some("null") => Value::Null,
        _ => Value::Null,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
