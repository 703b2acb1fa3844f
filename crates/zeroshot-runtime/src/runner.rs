//! The task runner seam.
//!
//! [`TaskRunner`] is the sole boundary between the engine and external
//! provider CLIs. Anything implementing `run` is a runner; the engine never
//! inspects what sits behind it. [`MockTaskRunner`] is the reference
//! implementation used by the test suites; it replays a scripted sequence
//! of results and records every request it receives.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use zeroshot_core::config::{IsolationMode, OutputFormat};

/// One request handed to a runner.
#[derive(Clone, Debug)]
pub struct TaskRequest {
    /// The assembled context (the prompt).
    pub context: String,
    /// Agent this run belongs to.
    pub agent_id: String,
    /// Resolved model name.
    pub model: String,
    /// Expected output shape, when declared.
    pub output_format: Option<OutputFormat>,
    /// JSON schema for `json` output, when declared.
    pub json_schema: Option<Value>,
    /// Working directory for the provider process.
    pub cwd: Option<PathBuf>,
    /// Isolation environment, when declared.
    pub isolation: Option<IsolationMode>,
}

/// Outcome of a runner invocation.
#[derive(Clone, Debug)]
pub struct TaskResult {
    /// Whether the task completed successfully.
    pub success: bool,
    /// The task's output (stdout, or the model's final message).
    pub output: String,
    /// Failure description when `success` is false.
    pub error: Option<String>,
    /// Provider-side task identifier, when one exists.
    pub task_id: Option<String>,
}

impl TaskResult {
    /// A successful result with the given output.
    #[must_use]
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            task_id: None,
        }
    }

    /// A failed result with the given error.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            task_id: None,
        }
    }
}

/// The seam to external providers. Implementations may block internally;
/// the engine awaits completion and applies the agent's timeout around the
/// whole call.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Execute one task and return its result.
    async fn run(&self, request: TaskRequest) -> TaskResult;
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock runner
// ─────────────────────────────────────────────────────────────────────────────

/// Scripted runner for tests: replays queued results in order and records
/// every request. When the script is exhausted it returns the default
/// result (`success=true`, output `{}`).
#[derive(Default)]
pub struct MockTaskRunner {
    script: Mutex<VecDeque<TaskResult>>,
    requests: Mutex<Vec<TaskRequest>>,
    delay: Option<Duration>,
}

impl MockTaskRunner {
    /// A runner with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result, builder-style.
    #[must_use]
    pub fn with_result(self, result: TaskResult) -> Self {
        self.script.lock().push_back(result);
        self
    }

    /// Make every run take `delay` before returning (timeout tests).
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a result after construction.
    pub fn push_result(&self, result: TaskResult) {
        self.script.lock().push_back(result);
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<TaskRequest> {
        self.requests.lock().clone()
    }

    /// Number of runs performed.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl TaskRunner for MockTaskRunner {
    async fn run(&self, request: TaskRequest) -> TaskResult {
        self.requests.lock().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| TaskResult::ok("{}"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn request(agent: &str) -> TaskRequest {
        TaskRequest {
            context: "ctx".into(),
            agent_id: agent.into(),
            model: "level2".into(),
            output_format: None,
            json_schema: None,
            cwd: None,
            isolation: None,
        }
    }

    #[tokio::test]
    async fn replays_script_in_order() {
        let runner = MockTaskRunner::new()
            .with_result(TaskResult::ok("first"))
            .with_result(TaskResult::failed("second failed"));

        let r1 = runner.run(request("a")).await;
        assert!(r1.success);
        assert_eq!(r1.output, "first");

        let r2 = runner.run(request("a")).await;
        assert!(!r2.success);
        assert_eq!(r2.error.as_deref(), Some("second failed"));
    }

    #[tokio::test]
    async fn exhausted_script_returns_default() {
        let runner = MockTaskRunner::new();
        let result = runner.run(request("a")).await;
        assert!(result.success);
        assert_eq!(result.output, "{}");
    }

    #[tokio::test]
    async fn records_requests() {
        let runner = MockTaskRunner::new();
        let _ = runner.run(request("worker")).await;
        let _ = runner.run(request("validator")).await;

        let requests = runner.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].agent_id, "worker");
        assert_eq!(requests[1].agent_id, "validator");
        assert_eq!(runner.run_count(), 2);
    }
}
