//! Markdown transcript export.
//!
//! Renders a cluster's full ledger as a readable document: one entry per
//! message in append order, with long bodies elided.

use zeroshot_core::message::Message;

const MAX_BODY_CHARS: usize = 2_000;

/// Render a message sequence as a markdown transcript.
#[must_use]
pub fn to_markdown(cluster_id: &str, messages: &[Message]) -> String {
    let mut out = format!("# Cluster {cluster_id}\n\n{} messages\n", messages.len());

    for msg in messages {
        let when = chrono::DateTime::from_timestamp_millis(msg.timestamp)
            .map_or_else(|| msg.timestamp.to_string(), |dt| dt.to_rfc3339());
        out.push_str(&format!(
            "\n## #{} {} \n\n*{} → {} at {}*\n",
            msg.id, msg.topic, msg.sender, msg.receiver, when
        ));

        if let Some(text) = &msg.content.text {
            if !text.is_empty() {
                out.push('\n');
                out.push_str(&elide(text));
                out.push('\n');
            }
        }
        if let Some(data) = &msg.content.data {
            let json =
                serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
            out.push_str("\n```json\n");
            out.push_str(&elide(&json));
            out.push_str("\n```\n");
        }
    }
    out
}

fn elide(text: &str) -> String {
    if text.len() <= MAX_BODY_CHARS {
        return text.to_string();
    }
    let mut end = MAX_BODY_CHARS;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n… ({} chars elided)", &text[..end], text.len() - end)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use zeroshot_core::message::MessageContent;

    fn msg(id: i64, topic: &str, text: Option<&str>, data: Option<serde_json::Value>) -> Message {
        Message {
            id,
            timestamp: 1_700_000_000_000,
            cluster_id: "c1".into(),
            topic: topic.into(),
            sender: "worker".into(),
            receiver: "broadcast".into(),
            content: MessageContent {
                text: text.map(ToString::to_string),
                data,
            },
            metadata: None,
        }
    }

    #[test]
    fn renders_headers_and_bodies() {
        let messages = vec![
            msg(1, "ISSUE_OPENED", Some("do the thing"), None),
            msg(2, "PLAN_READY", None, Some(json!({"summary": "plan"}))),
        ];
        let md = to_markdown("cl_x", &messages);

        assert!(md.starts_with("# Cluster cl_x"));
        assert!(md.contains("2 messages"));
        assert!(md.contains("## #1 ISSUE_OPENED"));
        assert!(md.contains("do the thing"));
        assert!(md.contains("## #2 PLAN_READY"));
        assert!(md.contains("\"summary\": \"plan\""));
    }

    #[test]
    fn long_bodies_are_elided() {
        let messages = vec![msg(1, "T", Some(&"x".repeat(5_000)), None)];
        let md = to_markdown("cl_x", &messages);
        assert!(md.contains("chars elided"));
        assert!(md.len() < 5_000);
    }

    #[test]
    fn empty_ledger_renders() {
        let md = to_markdown("cl_x", &[]);
        assert!(md.contains("0 messages"));
    }
}
