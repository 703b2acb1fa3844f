//! Static config validation.
//!
//! Runs before a cluster starts. Structural problems (missing fields,
//! duplicate ids), model-rule problems (no catch-all), and message-flow
//! problems (orphan topics, missing completion handler) are errors; the
//! cluster is not created. Suspicious-but-legal shapes are warnings.

use std::collections::{HashMap, HashSet};

use crate::config::{
    AgentConfig, ClusterConfig, HookAction, OutputFormat, Predicate, PromptSpec, TriggerAction,
    MAX_SUBCLUSTER_DEPTH,
};
use crate::model_rules::{has_catch_all, IterationPattern};
use crate::topic;

/// Outcome of validating a cluster config.
#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    /// Fatal problems; the cluster must not start.
    pub errors: Vec<String>,
    /// Suspicious shapes worth surfacing.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Returns `true` when there are no errors (warnings permitted).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

/// Validate a cluster config.
#[must_use]
pub fn validate_config(config: &ClusterConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_level(config, 0, &mut report);
    if !config.agents.is_empty() {
        validate_flow(config, &mut report);
    }
    report
}

// ─────────────────────────────────────────────────────────────────────────────
// Structural checks (recursive over subclusters)
// ─────────────────────────────────────────────────────────────────────────────

fn validate_level(config: &ClusterConfig, depth: usize, report: &mut ValidationReport) {
    if depth > MAX_SUBCLUSTER_DEPTH {
        report.error(format!(
            "subcluster nesting exceeds maximum depth of {MAX_SUBCLUSTER_DEPTH}"
        ));
        return;
    }

    if config.agents.is_empty() {
        report.error("config has no agents");
    }

    let mut seen = HashSet::new();
    for agent in &config.agents {
        validate_agent(agent, report);
        if !agent.id.is_empty() && !seen.insert(agent.id.as_str()) {
            report.error(format!("duplicate agent id '{}'", agent.id));
        }
        if let Some(inner) = &agent.config {
            if agent.is_subcluster() {
                validate_level(inner, depth + 1, report);
            }
        }
    }
}

fn validate_agent(agent: &AgentConfig, report: &mut ValidationReport) {
    let label = if agent.id.is_empty() {
        "<unnamed>"
    } else {
        agent.id.as_str()
    };

    if agent.id.is_empty() {
        report.error("agent is missing an id");
    }
    if agent.role.is_empty() {
        report.error(format!("agent '{label}' is missing a role"));
    }
    if agent.triggers.is_empty() {
        report.error(format!("agent '{label}' has no triggers"));
    }

    let executes = agent
        .triggers
        .iter()
        .any(|t| t.action == TriggerAction::ExecuteTask);

    if agent.is_subcluster() {
        if agent.config.is_none() {
            report.error(format!(
                "subcluster agent '{label}' is missing an inner config"
            ));
        }
        if agent.prompt.is_some() {
            report.error(format!(
                "subcluster agent '{label}' must not carry a prompt"
            ));
        }
    } else if executes && agent.prompt.is_none() {
        report.error(format!(
            "agent '{label}' executes tasks but has no prompt"
        ));
    }

    if let Some(rules) = &agent.model_rules {
        for rule in rules {
            if IterationPattern::parse(&rule.iterations).is_err() {
                report.error(format!(
                    "agent '{label}' model rule has invalid iteration pattern '{}'",
                    rule.iterations
                ));
            }
        }
        if !has_catch_all(rules) {
            report.error(format!(
                "agent '{label}' model rules have no catch-all (add an 'all' rule)"
            ));
        }
    }

    if let Some(PromptSpec::Variants(variants)) = &agent.prompt {
        for variant in variants {
            if IterationPattern::parse(&variant.iterations).is_err() {
                report.error(format!(
                    "agent '{label}' prompt variant has invalid iteration pattern '{}'",
                    variant.iterations
                ));
            }
        }
    }

    if let Some(max) = agent.max_iterations {
        if max >= 100 {
            report.warn(format!(
                "agent '{label}' maxIterations is very high ({max}); recommended < 50"
            ));
        }
    }

    if agent.output_format == Some(OutputFormat::Json) && agent.json_schema.is_none() {
        report.warn(format!(
            "agent '{label}' declares json output without a jsonSchema"
        ));
    }

    if let Some(strategy) = &agent.context_strategy {
        for source in &strategy.sources {
            if source.limit.is_some() && source.amount.is_none() {
                report.warn(format!(
                    "agent '{label}' source '{}' uses deprecated `limit`; prefer `amount`",
                    source.topic
                ));
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message-flow checks (top level only)
// ─────────────────────────────────────────────────────────────────────────────

fn validate_flow(config: &ClusterConfig, report: &mut ValidationReport) {
    let roles: HashSet<&str> = config.agents.iter().map(|a| a.role.as_str()).collect();

    // Topic → producing agents (via publish_message hooks).
    let mut produced: HashMap<&str, Vec<&str>> = HashMap::new();
    for agent in &config.agents {
        if let Some(topic) = hook_topic(agent) {
            produced.entry(topic).or_default().push(&agent.id);
        }
    }

    // ISSUE_OPENED must have a consumer or nothing ever runs.
    let issue_consumed = config.agents.iter().any(|a| {
        a.triggers.iter().any(|t| t.topic == topic::ISSUE_OPENED)
    });
    if !issue_consumed {
        report.error("no agent consumes ISSUE_OPENED; the cluster would never start working");
    }

    // Exactly one stop_cluster handler.
    let stop_handlers: Vec<&str> = config
        .agents
        .iter()
        .filter(|a| {
            a.triggers
                .iter()
                .any(|t| t.action == TriggerAction::StopCluster)
        })
        .map(|a| a.id.as_str())
        .collect();
    match stop_handlers.len() {
        0 => report.error("no agent has a stop_cluster trigger; the cluster can never complete"),
        1 => {}
        _ => report.error(format!(
            "multiple stop_cluster handlers: {}",
            stop_handlers.join(", ")
        )),
    }

    for agent in &config.agents {
        for trigger in &agent.triggers {
            // Triggered topics must be produced by someone (or by the engine).
            if !topic::SYSTEM_PRODUCED_TOPICS.contains(&trigger.topic.as_str())
                && !produced.contains_key(trigger.topic.as_str())
            {
                report.error(format!(
                    "agent '{}' triggers on '{}' which nothing produces",
                    agent.id, trigger.topic
                ));
            }

            // Self-trigger without an escape predicate loops forever.
            if hook_topic(agent) == Some(trigger.topic.as_str()) && trigger.logic.is_none() {
                report.error(format!(
                    "agent '{}' triggers on its own output topic '{}' without an escape predicate",
                    agent.id, trigger.topic
                ));
            }

            if let Some(logic) = &trigger.logic {
                check_predicate_roles(logic, &roles, &agent.id, report);
            }
        }
    }

    // A validator that rejects must be able to cause a retry.
    let validation_produced = produced.contains_key(topic::VALIDATION_RESULT);
    let validation_consumed = config.agents.iter().any(|a| {
        a.triggers
            .iter()
            .any(|t| t.topic == topic::VALIDATION_RESULT)
    });
    if validation_produced && !validation_consumed {
        report.error(
            "VALIDATION_RESULT is produced but nothing re-triggers on it; \
             rejections would dead-end the cluster",
        );
    }

    detect_cycles(config, &produced, report);
}

fn hook_topic(agent: &AgentConfig) -> Option<&str> {
    let hook = agent.hooks.as_ref()?.on_complete.as_ref()?;
    if hook.action != HookAction::PublishMessage {
        return None;
    }
    hook.config.as_ref()?.topic.as_deref()
}

fn check_predicate_roles(
    predicate: &Predicate,
    roles: &HashSet<&str>,
    agent_id: &str,
    report: &mut ValidationReport,
) {
    match predicate {
        Predicate::All { all } => {
            for p in all {
                check_predicate_roles(p, roles, agent_id, report);
            }
        }
        Predicate::Any { any } => {
            for p in any {
                check_predicate_roles(p, roles, agent_id, report);
            }
        }
        Predicate::Not { not } => check_predicate_roles(not, roles, agent_id, report),
        Predicate::AgentsByRoleAtLeast {
            agents_by_role_at_least,
        } => {
            if !roles.contains(agents_by_role_at_least.role.as_str()) {
                report.warn(format!(
                    "agent '{agent_id}' predicate references role '{}' which no agent has",
                    agents_by_role_at_least.role
                ));
            }
        }
        _ => {}
    }
}

/// Warn about cycles in the produce/consume graph with no escape predicate.
///
/// A guard anywhere on a cycle is an escape, so only unguarded edges
/// participate: a cycle in the unguarded subgraph is a cycle nothing can
/// break out of.
fn detect_cycles(
    config: &ClusterConfig,
    produced: &HashMap<&str, Vec<&str>>,
    report: &mut ValidationReport,
) {
    let index: HashMap<&str, usize> = config
        .agents
        .iter()
        .enumerate()
        .map(|(i, a)| (a.id.as_str(), i))
        .collect();

    // Edges: producer agent -> consumer agent, unguarded triggers only.
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); config.agents.len()];
    for (consumer_idx, agent) in config.agents.iter().enumerate() {
        for trigger in &agent.triggers {
            if trigger.action != TriggerAction::ExecuteTask || trigger.logic.is_some() {
                continue;
            }
            if let Some(producers) = produced.get(trigger.topic.as_str()) {
                for producer in producers {
                    if let Some(&producer_idx) = index.get(producer) {
                        edges[producer_idx].push(consumer_idx);
                    }
                }
            }
        }
    }

    let n = config.agents.len();
    let mut color = vec![Color::White; n];
    for start in 0..n {
        if color[start] == Color::White {
            visit(start, &edges, &mut color, config, report);
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Three-color DFS; a gray successor closes an unguarded cycle.
fn visit(
    node: usize,
    edges: &[Vec<usize>],
    color: &mut [Color],
    config: &ClusterConfig,
    report: &mut ValidationReport,
) {
    color[node] = Color::Gray;
    for &next in &edges[node] {
        match color[next] {
            Color::Gray => report.warn(format!(
                "circular dependency through agent '{}' has no escape predicate",
                config.agents[next].id
            )),
            Color::White => visit(next, edges, color, config, report),
            Color::Black => {}
        }
    }
    color[node] = Color::Black;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
