//! Declarative cluster configuration.
//!
//! The cluster config is the primary input: a JSON document describing the
//! agent graph: who listens to which topics, what prompt each agent runs,
//! and what happens when an agent finishes. All wire names are camelCase.
//!
//! [`ContextSource`] is a forward-compat boundary: unknown keys are rejected
//! at deserialization rather than silently ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default token budget for a context strategy.
pub const DEFAULT_MAX_TOKENS: u32 = 100_000;

/// Maximum nesting depth for sub-cluster agents.
pub const MAX_SUBCLUSTER_DEPTH: usize = 5;

/// Top-level cluster configuration: the agent graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// Agents participating in the workflow.
    pub agents: Vec<AgentConfig>,
}

impl ClusterConfig {
    /// Parse a config from JSON text.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// One declaratively configured agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Unique agent id within the cluster.
    pub id: String,
    /// Informational role grouping (`implementation`, `validator`, …).
    pub role: String,
    /// Baseline model level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_level: Option<ModelLevel>,
    /// Per-iteration model overrides; first matching rule wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_rules: Option<Vec<ModelRule>>,
    /// Topics of interest and what to do when they fire.
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    /// Which ledger messages feed the agent's prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_strategy: Option<ContextStrategy>,
    /// The agent's instructions (absent for sub-cluster agents).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptSpec>,
    /// `"subcluster"` marks an agent whose body is an inner cluster.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AgentKind>,
    /// Inner cluster config for sub-cluster agents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Box<ClusterConfig>>,
    /// Expected output shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,
    /// JSON schema for `outputFormat: "json"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<Value>,
    /// Post-completion hooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<HooksConfig>,
    /// Cap on total executions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    /// Per-run timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Isolation environment the runner executes in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation: Option<IsolationMode>,
}

impl AgentConfig {
    /// Returns `true` when the agent runs in an isolated worktree/container.
    #[must_use]
    pub fn is_isolated(&self) -> bool {
        self.isolation.is_some()
    }

    /// Returns `true` for sub-cluster agents.
    #[must_use]
    pub fn is_subcluster(&self) -> bool {
        matches!(self.kind, Some(AgentKind::Subcluster))
    }
}

/// Agent body kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// The agent's body is an inner cluster config.
    Subcluster,
}

/// Isolation environment for the task runner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    /// A dedicated VCS worktree.
    Worktree,
    /// A container sandbox.
    Container,
}

/// Expected output shape of an agent run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Free-form text.
    Text,
    /// A single JSON object (optionally schema-constrained).
    Json,
}

/// Baseline model capability level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelLevel {
    /// Fastest/cheapest tier.
    Level1,
    /// Mid tier.
    Level2,
    /// Strongest tier.
    Level3,
}

/// One per-iteration model override.
///
/// `iterations` is a pattern: `"all"`, `"N"`, `"M-N"`, or `"N+"`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRule {
    /// Iteration pattern.
    pub iterations: String,
    /// Model name to use when the pattern matches.
    pub model: String,
}

/// Agent instructions: either a direct string or iteration-selected variants.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptSpec {
    /// One prompt for every iteration.
    Text(String),
    /// Iteration-pattern-selected variants; first matching wins.
    Variants(Vec<PromptVariant>),
}

/// One iteration-selected prompt variant.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptVariant {
    /// Iteration pattern (same dialect as [`ModelRule::iterations`]).
    pub iterations: String,
    /// Prompt text for matching iterations.
    pub text: String,
}

/// A `{topic, action, logic?}` rule telling an agent when to act.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    /// Topic of interest.
    pub topic: String,
    /// What to do when the topic fires.
    #[serde(default)]
    pub action: TriggerAction,
    /// Optional predicate; the trigger only fires when it evaluates truthy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<Predicate>,
}

/// Trigger action.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerAction {
    /// Run the agent's task.
    #[default]
    ExecuteTask,
    /// Request a graceful cluster stop; no task runs.
    StopCluster,
}

/// Post-completion hook set.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HooksConfig {
    /// Applied after a successful run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_complete: Option<HookConfig>,
}

/// An `{action, config}` rule applied after an agent succeeds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookConfig {
    /// What to do.
    pub action: HookAction,
    /// Action parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<HookActionConfig>,
}

/// Hook action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookAction {
    /// Publish the agent's output under a configured topic.
    PublishMessage,
    /// Transition the cluster to stopped.
    StopCluster,
}

/// Parameters for a hook action.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookActionConfig {
    /// Topic to publish under (for `publish_message`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Context strategy
// ─────────────────────────────────────────────────────────────────────────────

/// Which ledger messages to pull into an agent's prompt, under a budget.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStrategy {
    /// Ordered source list.
    pub sources: Vec<ContextSource>,
    /// Token budget for the assembled context.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

/// One ledger source feeding a context pack.
///
/// Unknown keys are rejected; this record is the forward-compat boundary
/// for the wide set of optional strategy options.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContextSource {
    /// Topic to query.
    pub topic: String,
    /// Restrict to a sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Lower time bound: `cluster_start`, `last_task_end`,
    /// `last_agent_start`, or an ISO timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    /// Selection strategy for the full variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SourceStrategy>,
    /// Message cap for the full variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
    /// Deprecated alias for `amount`; `amount` wins when both are set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Message cap for the compact variant (default 1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compact_amount: Option<u32>,
    /// Selection strategy for the compact variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compact_strategy: Option<SourceStrategy>,
    /// Pack priority override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<SourcePriority>,
}

impl ContextSource {
    /// Effective message cap: `amount` wins over the deprecated `limit`.
    #[must_use]
    pub fn effective_amount(&self) -> Option<u32> {
        if self.amount.is_some() {
            self.amount
        } else {
            if self.limit.is_some() {
                tracing::warn!(
                    topic = %self.topic,
                    "context source uses deprecated `limit`; prefer `amount`"
                );
            }
            self.limit
        }
    }
}

/// Message selection strategy for a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStrategy {
    /// Most recent N, rendered in chronological order.
    Latest,
    /// Oldest N.
    Oldest,
    /// Every matching message.
    All,
}

/// Pack priority for a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourcePriority {
    /// Never dropped.
    Required,
    /// Dropped last among optionals.
    High,
    /// Default.
    Medium,
    /// Dropped first.
    Low,
}

// ─────────────────────────────────────────────────────────────────────────────
// Trigger predicates
// ─────────────────────────────────────────────────────────────────────────────

/// Declarative trigger predicate.
///
/// A condition tree evaluated against the triggering message, the cluster's
/// ledger, and the agent roster. Evaluation errors are treated as falsy:
/// a broken predicate never fires a task.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum Predicate {
    /// Every child must hold.
    All {
        /// Conjuncts.
        all: Vec<Predicate>,
    },
    /// At least one child must hold.
    Any {
        /// Disjuncts.
        any: Vec<Predicate>,
    },
    /// Negation.
    Not {
        /// Inverted child.
        not: Box<Predicate>,
    },
    /// A dotted path into the triggering message's `content.data` equals a
    /// value. `"true"`/`"false"` strings compare equal to booleans.
    MessageEquals {
        /// `{path, value}` condition.
        message_equals: PathEquals,
    },
    /// A dotted path into the triggering message's `content.data` exists.
    MessageExists {
        /// `{path}` condition.
        message_exists: PathExists,
    },
    /// Condition on the most recent ledger message matching a filter.
    LedgerFindLast {
        /// Filter plus path condition.
        ledger_find_last: LedgerCondition,
    },
    /// At least `min` ledger messages match a filter.
    LedgerCountAtLeast {
        /// Filter plus minimum.
        ledger_count_at_least: LedgerCount,
    },
    /// At least `min` agents carry a role.
    AgentsByRoleAtLeast {
        /// Role plus minimum.
        agents_by_role_at_least: RoleCount,
    },
    /// Constant.
    Const {
        /// The constant value.
        value: bool,
    },
}

/// `{path, value}`: equality at a dotted data path.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathEquals {
    /// Dotted path into `content.data`.
    pub path: String,
    /// Expected value.
    pub value: Value,
}

/// `{path}`: existence at a dotted data path.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathExists {
    /// Dotted path into `content.data`.
    pub path: String,
}

/// Ledger find-last condition.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerCondition {
    /// Topic filter.
    pub topic: String,
    /// Sender filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Dotted path into the found message's `content.data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// The value at `path` must equal this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<Value>,
    /// When `true` with no `equals`, the condition holds if a matching
    /// message (and, when `path` is set, the path) exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
}

/// Ledger count condition.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerCount {
    /// Topic filter.
    pub topic: String,
    /// Sender filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Minimum number of matches.
    pub min: u32,
}

/// Role-count condition.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCount {
    /// Role to count.
    pub role: String,
    /// Minimum number of agents.
    pub min: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
