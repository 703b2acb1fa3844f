//! The state snapshotter.
//!
//! Subscribes to the state-affecting topics, folds each delivery into a
//! [`WorkingState`], and re-publishes under `STATE_SNAPSHOT` whenever the
//! state's content hash changes. Bootstrap either loads the latest existing
//! snapshot or reconstructs state by replaying the most recent message of
//! each subscribed topic in timestamp order.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use zeroshot_core::message::{Message, MessageContent, NewMessage};
use zeroshot_core::topic;
use zeroshot_events::bus::{MessageBus, Subscription};
use zeroshot_events::ledger::MessageQuery;

use crate::error::Result;
use crate::snapshot::{hashes_equal, WorkingState};

/// Sender name on every published snapshot.
pub const SNAPSHOTTER_SENDER: &str = "state-snapshotter";

/// Folds state-affecting messages into durable working memory.
pub struct StateSnapshotter {
    bus: Arc<MessageBus>,
    cluster_id: String,
    /// Self-reference for the bus subscription closure.
    weak: Weak<StateSnapshotter>,
    state: Mutex<WorkingState>,
    last_hash: Mutex<Option<[u8; 32]>>,
    subscription: Mutex<Option<Subscription>>,
}

impl StateSnapshotter {
    /// Create a snapshotter for one cluster. Call [`start`] to activate it.
    ///
    /// [`start`]: StateSnapshotter::start
    #[must_use]
    pub fn new(bus: Arc<MessageBus>, cluster_id: impl Into<String>) -> Arc<Self> {
        let cluster_id = cluster_id.into();
        Arc::new_cyclic(|weak| Self {
            bus,
            cluster_id,
            weak: weak.clone(),
            state: Mutex::new(WorkingState::default()),
            last_hash: Mutex::new(None),
            subscription: Mutex::new(None),
        })
    }

    /// Bootstrap from the ledger, then subscribe for live folding.
    ///
    /// Bootstrap rules:
    /// - an existing `STATE_SNAPSHOT` is loaded verbatim (no republish);
    /// - otherwise the most recent message per subscribed topic is replayed
    ///   in timestamp order and, if anything folded, one snapshot is
    ///   published.
    pub fn start(&self) -> Result<()> {
        self.bootstrap()?;

        // The closure holds a weak reference: the bus must not keep a
        // dropped snapshotter alive.
        let weak = self.weak.clone();
        let subscription = self
            .bus
            .subscribe_topics(topic::STATE_AFFECTING_TOPICS, move |msg| {
                if let Some(this) = weak.upgrade() {
                    this.handle(msg);
                }
            });
        *self.subscription.lock() = Some(subscription);
        Ok(())
    }

    /// Stop folding; the last published snapshot remains on the ledger.
    pub fn stop(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
        }
    }

    /// A copy of the current state.
    #[must_use]
    pub fn state(&self) -> WorkingState {
        self.state.lock().clone()
    }

    fn bootstrap(&self) -> Result<()> {
        let existing = self.bus.find_last(
            &MessageQuery::cluster(self.cluster_id.clone()).topic(topic::STATE_SNAPSHOT),
        )?;

        if let Some(snapshot_msg) = existing {
            if let Some(data) = &snapshot_msg.content.data {
                match serde_json::from_value::<WorkingState>(data.clone()) {
                    Ok(state) => {
                        *self.last_hash.lock() = Some(state.content_hash());
                        *self.state.lock() = state;
                        debug!(cluster = %self.cluster_id, "loaded existing state snapshot");
                        return Ok(());
                    }
                    Err(err) => {
                        warn!(
                            cluster = %self.cluster_id,
                            %err,
                            "existing snapshot is unreadable; reconstructing from topics"
                        );
                    }
                }
            }
        }

        // Replay the most recent message of each subscribed topic, applied
        // in timestamp order.
        let mut replay: Vec<Message> = Vec::new();
        for t in topic::STATE_AFFECTING_TOPICS {
            if let Some(msg) = self
                .bus
                .find_last(&MessageQuery::cluster(self.cluster_id.clone()).topic(*t))?
            {
                replay.push(msg);
            }
        }
        replay.sort_by_key(|m| (m.timestamp, m.id));

        if replay.is_empty() {
            return Ok(());
        }

        {
            let mut state = self.state.lock();
            for msg in &replay {
                let _ = state.fold(msg);
            }
        }
        info!(
            cluster = %self.cluster_id,
            replayed = replay.len(),
            "reconstructed state from topic history"
        );
        self.publish_snapshot();
        Ok(())
    }

    fn handle(&self, msg: &Message) {
        if msg.cluster_id != self.cluster_id {
            return;
        }

        let changed = {
            let mut state = self.state.lock();
            if !state.fold(msg) {
                return;
            }
            let new_hash = state.content_hash();
            let mut last = self.last_hash.lock();
            match last.as_ref() {
                Some(previous) if hashes_equal(previous, &new_hash) => false,
                _ => {
                    *last = Some(new_hash);
                    true
                }
            }
        };

        if changed {
            self.publish_snapshot();
        } else {
            debug!(
                cluster = %self.cluster_id,
                topic = %msg.topic,
                "state unchanged; snapshot publication suppressed"
            );
        }
    }

    fn publish_snapshot(&self) {
        let (text, data, hash) = {
            let state = self.state.lock();
            let data = match serde_json::to_value(&*state) {
                Ok(data) => data,
                Err(err) => {
                    warn!(cluster = %self.cluster_id, %err, "failed to serialize state");
                    return;
                }
            };
            (state.summary_text(), data, state.content_hash())
        };

        let msg = NewMessage::broadcast(
            self.cluster_id.clone(),
            topic::STATE_SNAPSHOT,
            SNAPSHOTTER_SENDER,
            MessageContent {
                text: Some(text),
                data: Some(data),
            },
        );
        match self.bus.publish(&msg) {
            Ok(stored) => {
                *self.last_hash.lock() = Some(hash);
                debug!(cluster = %self.cluster_id, id = stored.id, "published state snapshot");
            }
            Err(err) => {
                warn!(cluster = %self.cluster_id, %err, "failed to publish state snapshot");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
