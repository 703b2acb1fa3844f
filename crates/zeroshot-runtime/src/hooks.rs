//! Post-completion hooks.
//!
//! After a successful run, an agent's `onComplete` hook either publishes the
//! task output under a configured topic or requests a cluster stop. Hook
//! failures are reported to the caller, which logs them; a broken hook
//! never takes the agent down with it.

use serde_json::Value;

use zeroshot_core::config::{AgentConfig, HookAction};
use zeroshot_core::message::{MessageContent, NewMessage};

use crate::cluster::ClusterCore;
use crate::error::{Result, RuntimeError};

/// Apply the agent's `onComplete` hook, if any.
///
/// `output` is the raw task output; `data` is the parsed JSON form when the
/// agent declared `outputFormat: "json"` and parsing succeeded.
pub fn apply_on_complete(
    core: &ClusterCore,
    agent: &AgentConfig,
    output: &str,
    data: Option<Value>,
) -> Result<()> {
    let Some(hook) = agent.hooks.as_ref().and_then(|h| h.on_complete.as_ref()) else {
        return Ok(());
    };

    match hook.action {
        HookAction::StopCluster => {
            let _ = core.request_stop();
            Ok(())
        }
        HookAction::PublishMessage => {
            let topic = hook
                .config
                .as_ref()
                .and_then(|c| c.topic.clone())
                .ok_or_else(|| RuntimeError::Hook {
                    agent: agent.id.clone(),
                    message: "publish_message hook has no topic configured".into(),
                })?;

            let text = if output.is_empty() {
                None
            } else {
                Some(output.to_string())
            };
            let msg = NewMessage::broadcast(
                core.id.as_str(),
                topic,
                agent.id.clone(),
                MessageContent { text, data },
            );
            let _ = core.bus.publish(&msg).map_err(|e| RuntimeError::Hook {
                agent: agent.id.clone(),
                message: format!("publish failed: {e}"),
            })?;
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
