//! Derived working-memory state.
//!
//! [`WorkingState`] is the compact structured summary the snapshotter folds
//! state-affecting messages into. Every section is bounded: list lengths
//! and field sizes are capped at fold time so the snapshot stays small no
//! matter how noisy the source messages are. Empty sections are pruned from
//! the wire form via `skip_serializing_if`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use zeroshot_core::message::Message;
use zeroshot_core::normalize::normalize_boolean_opt;
use zeroshot_core::topic;

/// Snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

// Field-size and list-length caps.
const MAX_TEXT_CHARS: usize = 2_000;
const MAX_PLAN_CHARS: usize = 4_000;
const MAX_TITLE_CHARS: usize = 200;
const MAX_CRITERIA: usize = 10;
const MAX_ERRORS: usize = 10;
const MAX_STEPS: usize = 8;
const MAX_FILES: usize = 20;

/// The task being worked on (from `ISSUE_OPENED`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    /// Raw task text, capped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Issue/task title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Issue number when sourced from a tracker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_number: Option<i64>,
    /// Where the task came from (`issue`, `text`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// The current plan (from `PLAN_READY`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanState {
    /// One-paragraph summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Acceptance criteria list.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub acceptance_criteria: Vec<String>,
    /// Files the plan expects to touch.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub files_affected: Vec<String>,
    /// Truncated plan body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_text: Option<String>,
}

/// Implementation progress (from `WORKER_PROGRESS` / `IMPLEMENTATION_READY`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    /// Whether the work is ready for validation.
    pub can_validate: bool,
    /// Percent complete, 0–100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_complete: Option<u32>,
    /// Current blockers.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub blockers: Vec<String>,
    /// Planned next steps.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub next_steps: Vec<String>,
    /// Last progress summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// One criterion verdict inside a validation result.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionResult {
    /// Criterion id (e.g. `AC2`).
    pub id: String,
    /// Verdict (`PASS`, `FAIL`, `CANNOT_VALIDATE`, `CANNOT_VALIDATE_YET`).
    pub status: String,
    /// Why, when not a pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Supporting evidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// Validator verdict (from `VALIDATION_RESULT`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationState {
    /// Whether the validator approved.
    pub approved: bool,
    /// Error list on rejection.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
    /// Per-criterion verdicts, capped.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub criteria: Vec<CriterionResult>,
}

/// Debugging findings (from `INVESTIGATION_COMPLETE`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugState {
    /// Proposed fix plan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_plan: Option<String>,
    /// What success looks like.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub success_criteria: Vec<String>,
    /// Identified root causes.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub root_causes: Vec<String>,
}

/// The full derived state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingState {
    /// Schema version.
    pub version: u32,
    /// Current task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskState>,
    /// Current plan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanState>,
    /// Implementation progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressState>,
    /// Latest validation verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationState>,
    /// Latest investigation findings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugState>,
}

impl Default for WorkingState {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            task: None,
            plan: None,
            progress: None,
            validation: None,
            debug: None,
        }
    }
}

impl WorkingState {
    /// Whether every section is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.task.is_none()
            && self.plan.is_none()
            && self.progress.is_none()
            && self.validation.is_none()
            && self.debug.is_none()
    }

    /// Fold one state-affecting message into the state.
    ///
    /// Returns `true` when the message's topic is one this state tracks
    /// (the section is replaced wholesale).
    pub fn fold(&mut self, msg: &Message) -> bool {
        match msg.topic.as_str() {
            topic::ISSUE_OPENED => {
                self.task = Some(fold_task(msg));
                true
            }
            topic::PLAN_READY => {
                self.plan = Some(fold_plan(msg));
                true
            }
            topic::WORKER_PROGRESS | topic::IMPLEMENTATION_READY => {
                self.progress = Some(fold_progress(msg));
                true
            }
            topic::VALIDATION_RESULT => {
                self.validation = Some(fold_validation(msg));
                true
            }
            topic::INVESTIGATION_COMPLETE => {
                self.debug = Some(fold_debug(msg));
                true
            }
            _ => false,
        }
    }

    /// Short multi-line human summary for `content.text`.
    #[must_use]
    pub fn summary_text(&self) -> String {
        let mut lines = vec![format!("cluster state v{}", self.version)];
        if let Some(task) = &self.task {
            let title = task
                .title
                .as_deref()
                .or(task.text.as_deref())
                .unwrap_or("(untitled)");
            lines.push(format!("task: {}", first_line(title, 120)));
        }
        if let Some(plan) = &self.plan {
            let summary = plan.summary.as_deref().unwrap_or("(no summary)");
            lines.push(format!(
                "plan: {} ({} criteria)",
                first_line(summary, 120),
                plan.acceptance_criteria.len()
            ));
        }
        if let Some(progress) = &self.progress {
            lines.push(format!(
                "progress: {}% complete, can_validate={}",
                progress.percent_complete.unwrap_or(0),
                progress.can_validate
            ));
        }
        if let Some(validation) = &self.validation {
            lines.push(format!(
                "validation: approved={}, {} errors",
                validation.approved,
                validation.errors.len()
            ));
        }
        if let Some(debug) = &self.debug {
            lines.push(format!(
                "debug: {} root causes identified",
                debug.root_causes.len()
            ));
        }
        lines.join("\n")
    }

    /// Content hash over the canonical JSON form.
    #[must_use]
    pub fn content_hash(&self) -> [u8; 32] {
        let json = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&json);
        hasher.finalize().into()
    }
}

/// Constant-time hash comparison, so duplicate-content checks cost the same
/// whether they match early or late.
#[must_use]
pub fn hashes_equal(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

// ─────────────────────────────────────────────────────────────────────────────
// Folding
// ─────────────────────────────────────────────────────────────────────────────

fn fold_task(msg: &Message) -> TaskState {
    TaskState {
        text: msg
            .content
            .text
            .as_deref()
            .map(|t| cap_string(t, MAX_TEXT_CHARS)),
        title: data_str(msg, "title").map(|t| cap_string(&t, MAX_TITLE_CHARS)),
        issue_number: msg.data_at("issueNumber").and_then(Value::as_i64),
        source: msg
            .metadata
            .as_ref()
            .and_then(|m| m.get("source"))
            .and_then(Value::as_str)
            .map(ToString::to_string),
    }
}

fn fold_plan(msg: &Message) -> PlanState {
    PlanState {
        summary: data_str(msg, "summary").map(|s| cap_string(&s, MAX_TEXT_CHARS)),
        acceptance_criteria: data_str_list(msg, "acceptanceCriteria", MAX_CRITERIA),
        files_affected: data_str_list(msg, "filesAffected", MAX_FILES),
        plan_text: msg
            .content
            .text
            .as_deref()
            .map(|t| cap_string(t, MAX_PLAN_CHARS)),
    }
}

fn fold_progress(msg: &Message) -> ProgressState {
    let status = msg.data_at("completionStatus");
    let get = |key: &str| status.and_then(|s| s.get(key));
    ProgressState {
        can_validate: normalize_boolean_opt(get("canValidate")),
        percent_complete: get("percentComplete")
            .and_then(Value::as_u64)
            .map(|p| u32::try_from(p.min(100)).unwrap_or(100)),
        blockers: value_str_list(get("blockers"), MAX_STEPS),
        next_steps: value_str_list(get("nextSteps"), MAX_STEPS),
        summary: get("summary")
            .and_then(Value::as_str)
            .or(msg.content.text.as_deref())
            .map(|s| cap_string(s, MAX_TEXT_CHARS)),
    }
}

fn fold_validation(msg: &Message) -> ValidationState {
    let criteria = msg
        .data_at("criteria")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .take(MAX_CRITERIA)
                .map(|entry| CriterionResult {
                    id: entry
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    status: entry
                        .get("status")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    reason: entry
                        .get("reason")
                        .and_then(Value::as_str)
                        .filter(|r| !r.is_empty())
                        .map(|r| cap_string(r, MAX_TEXT_CHARS)),
                    evidence: entry
                        .get("evidence")
                        .and_then(Value::as_str)
                        .filter(|e| !e.is_empty())
                        .map(|e| cap_string(e, MAX_TEXT_CHARS)),
                })
                .collect()
        })
        .unwrap_or_default();

    ValidationState {
        approved: normalize_boolean_opt(msg.data_at("approved")),
        errors: data_str_list(msg, "errors", MAX_ERRORS),
        criteria,
    }
}

fn fold_debug(msg: &Message) -> DebugState {
    DebugState {
        fix_plan: data_str(msg, "fixPlan").map(|f| cap_string(&f, MAX_PLAN_CHARS)),
        success_criteria: data_str_list(msg, "successCriteria", MAX_CRITERIA),
        root_causes: data_str_list(msg, "rootCauses", MAX_CRITERIA),
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn data_str(msg: &Message, key: &str) -> Option<String> {
    msg.data_at(key)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn data_str_list(msg: &Message, key: &str, cap: usize) -> Vec<String> {
    value_str_list(msg.data_at(key), cap)
}

fn value_str_list(value: Option<&Value>, cap: usize) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .take(cap)
                .map(|s| cap_string(s, MAX_TEXT_CHARS))
                .collect()
        })
        .unwrap_or_default()
}

fn cap_string(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

fn first_line(s: &str, max: usize) -> String {
    cap_string(s.lines().next().unwrap_or(""), max)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
