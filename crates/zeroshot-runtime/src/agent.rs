//! The agent wrapper: lifecycle of one configured agent.
//!
//! An agent sits idle until a bus delivery matches one of its triggers.
//! Trigger evaluation happens on the dispatch path (cheap: predicate over
//! the ledger); the run itself (context assembly, the task runner, hooks)
//! is moved onto a spawned tokio task so subscribers never block fan-out.
//!
//! Iterations are serialized through an `is_running` flag: a trigger that
//! arrives while a run is in flight is skipped, not queued.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use zeroshot_context::agent_builder::{AgentContextBuilder, BuildParams};
use zeroshot_context::is_platform_mismatch;
use zeroshot_core::config::{AgentConfig, ModelLevel, OutputFormat, TriggerAction};
use zeroshot_core::message::Message;
use zeroshot_core::model_rules::resolve_model;
use zeroshot_core::state::AgentState;

use crate::cluster::ClusterCore;
use crate::hooks;
use crate::predicate::{evaluate, PredicateContext};
use crate::runner::{TaskRequest, TaskRunner};

/// Status snapshot for one agent.
#[derive(Clone, Debug)]
pub struct AgentStatus {
    /// Agent id.
    pub id: String,
    /// Agent role.
    pub role: String,
    /// Current lifecycle state.
    pub state: AgentState,
    /// Completed executions.
    pub iteration: u32,
    /// Start of the most recent run, epoch millis (`since` anchor).
    pub last_agent_start: Option<i64>,
    /// Most recent failure, if any.
    pub last_error: Option<String>,
}

/// Runtime wrapper around one configured agent.
pub struct AgentWrapper {
    config: AgentConfig,
    core: Arc<ClusterCore>,
    runner: Arc<dyn TaskRunner>,
    runtime: tokio::runtime::Handle,
    /// Self-reference for spawning runs from the dispatch path.
    weak: Weak<AgentWrapper>,
    state: Mutex<AgentState>,
    iteration: AtomicU32,
    is_running: AtomicBool,
    last_task_end: Mutex<Option<i64>>,
    last_agent_start: Mutex<Option<i64>>,
    last_error: Mutex<Option<String>>,
}

/// Resets the running flag when a run finishes, even on panic.
struct RunFlagGuard(Arc<AgentWrapper>);

impl Drop for RunFlagGuard {
    fn drop(&mut self) {
        self.0.is_running.store(false, Ordering::SeqCst);
    }
}

impl AgentWrapper {
    /// Create a wrapper. Must be called within a tokio runtime; runs are
    /// spawned onto the current handle.
    #[must_use]
    pub fn new(
        config: AgentConfig,
        core: Arc<ClusterCore>,
        runner: Arc<dyn TaskRunner>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            config,
            core,
            runner,
            runtime: tokio::runtime::Handle::current(),
            weak: weak.clone(),
            state: Mutex::new(AgentState::Idle),
            iteration: AtomicU32::new(0),
            is_running: AtomicBool::new(false),
            last_task_end: Mutex::new(None),
            last_agent_start: Mutex::new(None),
            last_error: Mutex::new(None),
        })
    }

    /// Agent id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AgentState {
        *self.state.lock()
    }

    /// Completed executions.
    #[must_use]
    pub fn iteration(&self) -> u32 {
        self.iteration.load(Ordering::SeqCst)
    }

    /// The previous run's start time, if any (epoch millis).
    #[must_use]
    pub fn last_agent_start(&self) -> Option<i64> {
        *self.last_agent_start.lock()
    }

    /// Status snapshot.
    #[must_use]
    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            id: self.config.id.clone(),
            role: self.config.role.clone(),
            state: self.state(),
            iteration: self.iteration(),
            last_agent_start: self.last_agent_start(),
            last_error: self.last_error.lock().clone(),
        }
    }

    /// Bus delivery entry point. Runs on the publisher's dispatch path;
    /// everything heavier than trigger evaluation is spawned.
    pub fn on_message(&self, msg: &Message) {
        if msg.cluster_id != self.core.id.as_str() || self.core.is_stopping() {
            return;
        }
        if self.state() == AgentState::Stopped {
            return;
        }

        for trigger in &self.config.triggers {
            if trigger.topic != msg.topic {
                continue;
            }

            self.set_state(AgentState::Evaluating);
            if let Some(logic) = &trigger.logic {
                let ctx = PredicateContext {
                    ledger: &self.core.ledger,
                    cluster_id: self.core.id.as_str(),
                    message: msg,
                    roles: &self.core.roles,
                };
                if !evaluate(logic, &ctx) {
                    debug!(agent = %self.config.id, topic = %msg.topic, "trigger predicate false");
                    self.set_state(AgentState::Idle);
                    continue;
                }
            }

            if trigger.action == TriggerAction::StopCluster {
                info!(agent = %self.config.id, topic = %msg.topic, "stop_cluster trigger fired");
                self.set_state(AgentState::Idle);
                let _ = self.core.request_stop();
                return;
            }

            // Iterations are serialized: skip if a run is in flight.
            if self
                .is_running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                debug!(agent = %self.config.id, "trigger skipped: run already in flight");
                return;
            }

            let Some(this) = self.weak.upgrade() else {
                self.is_running.store(false, Ordering::SeqCst);
                return;
            };
            let triggering = msg.clone();
            let _ = self.runtime.spawn(async move {
                this.execute(triggering).await;
            });
            return;
        }

        if self.state() == AgentState::Evaluating {
            self.set_state(AgentState::Idle);
        }
    }

    /// One full iteration: build context, run, apply hooks.
    async fn execute(self: Arc<Self>, triggering: Message) {
        let _guard = RunFlagGuard(Arc::clone(&self));
        let iteration = self.iteration.load(Ordering::SeqCst) + 1;

        self.set_state(AgentState::BuildingContext);
        let previous_start = {
            let mut start = self.last_agent_start.lock();
            start.replace(now_ms())
        };

        let built = {
            let builder = AgentContextBuilder::new(
                &self.core.ledger,
                &self.config,
                self.core.id.as_str(),
                self.core.created_at,
            );
            let params = BuildParams {
                iteration,
                triggering: &triggering,
                last_task_end: *self.last_task_end.lock(),
                last_agent_start: previous_start,
            };
            builder.build(&params)
        };
        let (context, _metrics) = match built {
            Ok(built) => built,
            Err(err) => {
                self.fail(format!("context assembly failed: {err}"));
                return;
            }
        };

        let model = match self.resolve_model(iteration) {
            Ok(model) => model,
            Err(err) => {
                self.fail(format!("model resolution failed: {err}"));
                return;
            }
        };

        let request = TaskRequest {
            context: context.text,
            agent_id: self.config.id.clone(),
            model,
            output_format: self.config.output_format,
            json_schema: self.config.json_schema.clone(),
            cwd: None,
            isolation: self.config.isolation,
        };

        self.set_state(AgentState::Executing);
        info!(agent = %self.config.id, iteration, "task started");

        let run = self.runner.run(request);
        let outcome = match self.config.timeout {
            Some(millis) => {
                let bounded = tokio::time::timeout(std::time::Duration::from_millis(millis), run);
                tokio::select! {
                    () = self.core.kill_token().cancelled() => None,
                    result = bounded => Some(result.map_err(|_| millis)),
                }
            }
            None => tokio::select! {
                () = self.core.kill_token().cancelled() => None,
                result = run => Some(Ok(result)),
            },
        };

        let result = match outcome {
            None => {
                info!(agent = %self.config.id, "run aborted by kill");
                self.set_state(AgentState::Stopped);
                return;
            }
            Some(Err(millis)) => {
                self.fail(format!("runner timed out after {millis}ms"));
                return;
            }
            Some(Ok(result)) => result,
        };

        if !result.success {
            self.fail(format!(
                "runner failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            ));
            return;
        }

        let data = self.parse_output(&result.output);

        // A kill that lands between run completion and hook application
        // skips the pending publication.
        if self.core.kill_token().is_cancelled() {
            self.set_state(AgentState::Stopped);
            return;
        }

        if let Err(err) = hooks::apply_on_complete(&self.core, &self.config, &result.output, data)
        {
            warn!(agent = %self.config.id, %err, "onComplete hook failed");
        }

        let completed = self.iteration.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_task_end.lock() = Some(now_ms());
        *self.last_error.lock() = None;

        if self
            .config
            .max_iterations
            .is_some_and(|max| completed >= max)
        {
            info!(agent = %self.config.id, completed, "max iterations reached");
            self.set_state(AgentState::Stopped);
        } else {
            self.set_state(AgentState::Idle);
        }
        info!(agent = %self.config.id, iteration = completed, "task finished");
    }

    fn resolve_model(&self, iteration: u32) -> zeroshot_core::error::Result<String> {
        if let Some(rules) = &self.config.model_rules {
            return resolve_model(rules, iteration).map(ToString::to_string);
        }
        Ok(match self.config.model_level {
            Some(ModelLevel::Level1) => "level1".to_string(),
            Some(ModelLevel::Level3) => "level3".to_string(),
            Some(ModelLevel::Level2) | None => "level2".to_string(),
        })
    }

    /// Parse JSON output when configured; demote platform-mismatch
    /// `CANNOT_VALIDATE` criteria for isolated agents.
    fn parse_output(&self, output: &str) -> Option<Value> {
        if self.config.output_format != Some(OutputFormat::Json) {
            return None;
        }
        let mut data: Value = match serde_json::from_str(output.trim()) {
            Ok(data) => data,
            Err(err) => {
                warn!(agent = %self.config.id, %err, "json output did not parse");
                return None;
            }
        };

        if self.config.is_isolated() {
            demote_platform_criteria(&mut data);
        }
        Some(data)
    }

    fn fail(&self, message: String) {
        warn!(agent = %self.config.id, %message, "run failed");
        *self.last_error.lock() = Some(message);
        self.set_state(AgentState::Error);
    }

    fn set_state(&self, state: AgentState) {
        *self.state.lock() = state;
    }
}

/// In an isolated environment a platform mismatch is no longer permanent:
/// rewrite `CANNOT_VALIDATE` to `CANNOT_VALIDATE_YET` in place.
fn demote_platform_criteria(data: &mut Value) {
    let Some(criteria) = data.get_mut("criteria").and_then(Value::as_array_mut) else {
        return;
    };
    for criterion in criteria {
        let is_permanent = criterion.get("status").and_then(Value::as_str)
            == Some("CANNOT_VALIDATE");
        let mismatched = criterion
            .get("reason")
            .and_then(Value::as_str)
            .is_some_and(is_platform_mismatch);
        if is_permanent && mismatched {
            if let Some(status) = criterion.get_mut("status") {
                *status = Value::String("CANNOT_VALIDATE_YET".into());
            }
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{MockTaskRunner, TaskResult};
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;
    use zeroshot_core::ids::ClusterId;
    use zeroshot_core::message::{MessageContent, NewMessage};
    use zeroshot_core::state::ClusterState;
    use zeroshot_events::bus::MessageBus;
    use zeroshot_events::ledger::{Ledger, MessageQuery};

    fn core() -> Arc<ClusterCore> {
        let ledger = Arc::new(Ledger::in_memory().unwrap());
        let bus = Arc::new(MessageBus::new(ledger.clone()));
        let core = ClusterCore::new(ClusterId::from("c1"), 0, ledger, bus, HashMap::new());
        core.set_state(ClusterState::Running);
        core
    }

    fn agent_config(v: serde_json::Value) -> AgentConfig {
        serde_json::from_value(v).unwrap()
    }

    fn issue(core: &ClusterCore) -> Message {
        core.bus
            .publish(&NewMessage::broadcast(
                "c1",
                "ISSUE_OPENED",
                "user",
                MessageContent::text("do it"),
            ))
            .unwrap()
    }

    async fn wait_idle(wrapper: &AgentWrapper) {
        for _ in 0..200 {
            if !matches!(
                wrapper.state(),
                AgentState::BuildingContext | AgentState::Executing | AgentState::Evaluating
            ) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("agent never settled; state = {:?}", wrapper.state());
    }

    #[tokio::test]
    async fn trigger_runs_task_and_applies_hook() {
        let core = core();
        let runner = Arc::new(MockTaskRunner::new().with_result(TaskResult::ok("all done")));
        let wrapper = AgentWrapper::new(
            agent_config(json!({
                "id": "worker", "role": "implementation", "prompt": "work",
                "triggers": [{"topic": "ISSUE_OPENED"}],
                "hooks": {"onComplete": {"action": "publish_message", "config": {"topic": "CLUSTER_COMPLETE"}}}
            })),
            core.clone(),
            runner.clone(),
        );

        let msg = issue(&core);
        wrapper.on_message(&msg);
        wait_idle(&wrapper).await;

        assert_eq!(wrapper.iteration(), 1);
        assert_eq!(runner.run_count(), 1);
        let published = core
            .bus
            .find_last(&MessageQuery::cluster("c1").topic("CLUSTER_COMPLETE"))
            .unwrap()
            .unwrap();
        assert_eq!(published.sender, "worker");
        assert_eq!(published.content.text.as_deref(), Some("all done"));
    }

    #[tokio::test]
    async fn non_matching_topic_does_nothing() {
        let core = core();
        let runner = Arc::new(MockTaskRunner::new());
        let wrapper = AgentWrapper::new(
            agent_config(json!({
                "id": "worker", "role": "implementation", "prompt": "work",
                "triggers": [{"topic": "PLAN_READY"}]
            })),
            core.clone(),
            runner.clone(),
        );

        let msg = issue(&core);
        wrapper.on_message(&msg);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runner.run_count(), 0);
        assert_eq!(wrapper.state(), AgentState::Idle);
    }

    #[tokio::test]
    async fn false_predicate_prevents_run() {
        // Trigger isolation: a falsy predicate must not invoke the runner.
        let core = core();
        let runner = Arc::new(MockTaskRunner::new());
        let wrapper = AgentWrapper::new(
            agent_config(json!({
                "id": "worker", "role": "implementation", "prompt": "work",
                "triggers": [{
                    "topic": "ISSUE_OPENED",
                    "logic": {"messageEquals": {"path": "nonexistent", "value": true}}
                }]
            })),
            core.clone(),
            runner.clone(),
        );

        let msg = issue(&core);
        wrapper.on_message(&msg);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runner.run_count(), 0);
        assert_eq!(wrapper.state(), AgentState::Idle);
    }

    #[tokio::test]
    async fn stop_cluster_trigger_stops_without_running() {
        let core = core();
        let runner = Arc::new(MockTaskRunner::new());
        let wrapper = AgentWrapper::new(
            agent_config(json!({
                "id": "completion", "role": "orchestrator",
                "triggers": [{"topic": "CLUSTER_COMPLETE", "action": "stop_cluster"}]
            })),
            core.clone(),
            runner.clone(),
        );

        let msg = core
            .bus
            .publish(&NewMessage::broadcast(
                "c1",
                "CLUSTER_COMPLETE",
                "worker",
                MessageContent::default(),
            ))
            .unwrap();
        wrapper.on_message(&msg);

        assert_eq!(core.state(), ClusterState::Stopped);
        assert_eq!(runner.run_count(), 0);
    }

    #[tokio::test]
    async fn failed_run_publishes_nothing() {
        let core = core();
        let runner = Arc::new(MockTaskRunner::new().with_result(TaskResult::failed("boom")));
        let wrapper = AgentWrapper::new(
            agent_config(json!({
                "id": "worker", "role": "implementation", "prompt": "work",
                "triggers": [{"topic": "ISSUE_OPENED"}],
                "hooks": {"onComplete": {"action": "publish_message", "config": {"topic": "NEVER"}}}
            })),
            core.clone(),
            runner.clone(),
        );

        let before = core.ledger.count("c1").unwrap();
        let msg = issue(&core);
        wrapper.on_message(&msg);
        wait_idle(&wrapper).await;

        assert_eq!(wrapper.state(), AgentState::Error);
        assert_eq!(wrapper.iteration(), 0);
        assert!(wrapper.status().last_error.unwrap().contains("boom"));
        // Only the triggering message itself was appended.
        assert_eq!(core.ledger.count("c1").unwrap(), before + 1);
    }

    #[tokio::test]
    async fn timeout_is_failure_with_dedicated_reason() {
        let core = core();
        let runner = Arc::new(
            MockTaskRunner::new()
                .with_delay(Duration::from_millis(200))
                .with_result(TaskResult::ok("too late")),
        );
        let wrapper = AgentWrapper::new(
            agent_config(json!({
                "id": "worker", "role": "implementation", "prompt": "work",
                "timeout": 20,
                "triggers": [{"topic": "ISSUE_OPENED"}]
            })),
            core.clone(),
            runner,
        );

        let msg = issue(&core);
        wrapper.on_message(&msg);
        wait_idle(&wrapper).await;

        assert_eq!(wrapper.state(), AgentState::Error);
        assert!(wrapper.status().last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn max_iterations_stops_agent() {
        let core = core();
        let runner = Arc::new(MockTaskRunner::new());
        let wrapper = AgentWrapper::new(
            agent_config(json!({
                "id": "worker", "role": "implementation", "prompt": "work",
                "maxIterations": 1,
                "triggers": [{"topic": "ISSUE_OPENED"}]
            })),
            core.clone(),
            runner.clone(),
        );

        let msg = issue(&core);
        wrapper.on_message(&msg);
        wait_idle(&wrapper).await;
        assert_eq!(wrapper.state(), AgentState::Stopped);

        // A further trigger is ignored outright.
        let msg2 = issue(&core);
        wrapper.on_message(&msg2);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runner.run_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_trigger_skipped_while_running() {
        let core = core();
        let runner = Arc::new(
            MockTaskRunner::new()
                .with_delay(Duration::from_millis(60))
                .with_result(TaskResult::ok("slow"))
                .with_result(TaskResult::ok("second")),
        );
        let wrapper = AgentWrapper::new(
            agent_config(json!({
                "id": "worker", "role": "implementation", "prompt": "work",
                "triggers": [{"topic": "ISSUE_OPENED"}]
            })),
            core.clone(),
            runner.clone(),
        );

        let msg = issue(&core);
        wrapper.on_message(&msg);
        tokio::time::sleep(Duration::from_millis(10)).await;
        // Second trigger lands mid-run and is skipped.
        let msg2 = issue(&core);
        wrapper.on_message(&msg2);
        wait_idle(&wrapper).await;

        assert_eq!(wrapper.iteration(), 1);
        assert_eq!(runner.run_count(), 1);
    }

    #[tokio::test]
    async fn model_rules_pick_by_iteration() {
        let core = core();
        let runner = Arc::new(MockTaskRunner::new());
        let wrapper = AgentWrapper::new(
            agent_config(json!({
                "id": "worker", "role": "implementation", "prompt": "work",
                "modelRules": [
                    {"iterations": "1", "model": "sonnet"},
                    {"iterations": "all", "model": "opus"}
                ],
                "triggers": [{"topic": "ISSUE_OPENED"}]
            })),
            core.clone(),
            runner.clone(),
        );

        let msg = issue(&core);
        wrapper.on_message(&msg);
        wait_idle(&wrapper).await;
        let msg2 = issue(&core);
        wrapper.on_message(&msg2);
        wait_idle(&wrapper).await;

        let requests = runner.requests();
        assert_eq!(requests[0].model, "sonnet");
        assert_eq!(requests[1].model, "opus");
    }

    #[tokio::test]
    async fn isolated_agent_demotes_platform_criteria() {
        let core = core();
        let output = json!({
            "approved": false,
            "criteria": [
                {"id": "AC1", "status": "CANNOT_VALIDATE", "reason": "EBADPLATFORM @esbuild/linux-x64"},
                {"id": "AC2", "status": "CANNOT_VALIDATE", "reason": "kubectl not installed"}
            ]
        })
        .to_string();
        let runner = Arc::new(MockTaskRunner::new().with_result(TaskResult::ok(output)));
        let wrapper = AgentWrapper::new(
            agent_config(json!({
                "id": "validator", "role": "validator", "prompt": "check",
                "outputFormat": "json", "isolation": "container",
                "triggers": [{"topic": "ISSUE_OPENED"}],
                "hooks": {"onComplete": {"action": "publish_message", "config": {"topic": "VALIDATION_RESULT"}}}
            })),
            core.clone(),
            runner,
        );

        let msg = issue(&core);
        wrapper.on_message(&msg);
        wait_idle(&wrapper).await;

        let published = core
            .bus
            .find_last(&MessageQuery::cluster("c1").topic("VALIDATION_RESULT"))
            .unwrap()
            .unwrap();
        let criteria = published.content.data.unwrap()["criteria"].clone();
        assert_eq!(criteria[0]["status"], "CANNOT_VALIDATE_YET", "platform demoted");
        assert_eq!(criteria[1]["status"], "CANNOT_VALIDATE", "real failure kept");
    }

    #[tokio::test]
    async fn kill_skips_pending_hook() {
        let core = core();
        let runner = Arc::new(
            MockTaskRunner::new()
                .with_delay(Duration::from_millis(100))
                .with_result(TaskResult::ok("late output")),
        );
        let wrapper = AgentWrapper::new(
            agent_config(json!({
                "id": "worker", "role": "implementation", "prompt": "work",
                "triggers": [{"topic": "ISSUE_OPENED"}],
                "hooks": {"onComplete": {"action": "publish_message", "config": {"topic": "SHOULD_NOT_APPEAR"}}}
            })),
            core.clone(),
            runner,
        );

        let msg = issue(&core);
        wrapper.on_message(&msg);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = core.kill();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let hooked = core
            .bus
            .find_last(&MessageQuery::cluster("c1").topic("SHOULD_NOT_APPEAR"))
            .unwrap();
        assert!(hooked.is_none(), "kill skips the pending publication");
        assert_eq!(wrapper.state(), AgentState::Stopped);
    }
}
