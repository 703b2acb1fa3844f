//! Background polling for new ledger messages.
//!
//! [`poll_for_messages`] spawns a tokio task that delivers messages strictly
//! after the highest id already seen. The initial pass may emit up to
//! `backlog` historical messages; after that, only new appends flow through.
//! The returned [`PollHandle`] stops the task when dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use zeroshot_core::message::Message;

use crate::ledger::{Ledger, MessageQuery, QueryOrder};

/// Handle to a running poll task; cancels on drop.
pub struct PollHandle {
    token: CancellationToken,
    join: Option<tokio::task::JoinHandle<()>>,
}

impl PollHandle {
    /// Stop the poll task and wait for it to finish.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Stream new messages for `cluster_id` to `on_message`.
///
/// The first pass delivers up to `backlog` of the most recent existing
/// messages (chronologically), then sets the watermark to the current
/// maximum id. Each subsequent tick delivers messages with ids strictly
/// above the watermark. Query failures are logged and retried on the next
/// tick; the task only exits through its handle.
pub fn poll_for_messages(
    ledger: Arc<Ledger>,
    cluster_id: impl Into<String>,
    on_message: impl Fn(Message) + Send + 'static,
    interval: Duration,
    backlog: u32,
) -> PollHandle {
    let cluster_id = cluster_id.into();
    let token = CancellationToken::new();
    let task_token = token.clone();

    let join = tokio::spawn(async move {
        let mut watermark = match initial_pass(&ledger, &cluster_id, backlog, &on_message) {
            Ok(mark) => mark,
            Err(err) => {
                warn!(%cluster_id, %err, "poll bootstrap failed; starting from id 0");
                0
            }
        };

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = task_token.cancelled() => {
                    debug!(%cluster_id, "poll task cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let mut query = MessageQuery::cluster(cluster_id.clone());
                    query.after_id = Some(watermark);
                    match ledger.query(&query) {
                        Ok(messages) => {
                            for msg in messages {
                                watermark = watermark.max(msg.id);
                                on_message(msg);
                            }
                        }
                        Err(err) => {
                            if ledger.is_closed() {
                                debug!(%cluster_id, "ledger closed; poll task exiting");
                                break;
                            }
                            warn!(%cluster_id, %err, "poll query failed; retrying next tick");
                        }
                    }
                }
            }
        }
    });

    PollHandle {
        token,
        join: Some(join),
    }
}

fn initial_pass(
    ledger: &Ledger,
    cluster_id: &str,
    backlog: u32,
    on_message: &impl Fn(Message),
) -> crate::error::Result<i64> {
    let mut watermark = ledger.max_id(cluster_id)?;
    if backlog == 0 {
        return Ok(watermark);
    }

    let mut recent = ledger.query(
        &MessageQuery::cluster(cluster_id)
            .order(QueryOrder::Desc)
            .limit(backlog),
    )?;
    recent.reverse();
    for msg in recent {
        watermark = watermark.max(msg.id);
        on_message(msg);
    }
    Ok(watermark)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
