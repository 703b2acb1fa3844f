//! In-process pub/sub layered above the ledger.
//!
//! `publish` validates the message, persists it through the [`Ledger`], then
//! fans out synchronously to subscribers in registration order. Fan-out
//! snapshots the subscriber list before iterating, so a subscriber may
//! publish again (re-entrancy) or unsubscribe mid-dispatch without
//! invalidating the iteration. A panicking subscriber is logged and must
//! never prevent delivery to its siblings.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use zeroshot_core::message::{Message, NewMessage};

use crate::error::{LedgerError, Result};
use crate::ledger::{Ledger, MessageQuery};

/// Subscriber callback.
pub type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

struct Subscriber {
    id: u64,
    /// `None` subscribes to every topic.
    topics: Option<Vec<String>>,
    handler: Handler,
}

type SubscriberList = Arc<Mutex<Vec<Subscriber>>>;

/// In-process pub/sub message bus for one cluster.
pub struct MessageBus {
    ledger: Arc<Ledger>,
    subscribers: SubscriberList,
    next_id: AtomicU64,
}

impl MessageBus {
    /// Create a bus over a ledger.
    #[must_use]
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// The underlying ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Validate, persist, and fan out a message.
    ///
    /// Returns the stored form (with id and timestamp assigned). Fails with
    /// [`LedgerError::Validation`] before any append when a required field
    /// is missing.
    pub fn publish(&self, msg: &NewMessage) -> Result<Message> {
        validate(msg)?;
        let stored = self.ledger.append(msg)?;
        self.dispatch(&stored);
        Ok(stored)
    }

    fn dispatch(&self, stored: &Message) {
        // Snapshot under the lock, dispatch outside it: a subscriber may
        // re-enter publish or unsubscribe without deadlocking.
        let snapshot: Vec<(u64, Option<Vec<String>>, Handler)> = {
            let subscribers = self.subscribers.lock();
            subscribers
                .iter()
                .map(|s| (s.id, s.topics.clone(), s.handler.clone()))
                .collect()
        };

        for (id, topics, handler) in snapshot {
            if let Some(topics) = &topics {
                if !topics.iter().any(|t| t == &stored.topic) {
                    continue;
                }
            }
            let result = catch_unwind(AssertUnwindSafe(|| handler(stored)));
            if result.is_err() {
                warn!(
                    subscriber = id,
                    topic = %stored.topic,
                    "subscriber panicked during fan-out; continuing with siblings"
                );
            }
        }
    }

    /// Subscribe to every published message.
    pub fn subscribe(&self, handler: impl Fn(&Message) + Send + Sync + 'static) -> Subscription {
        self.add(None, Arc::new(handler))
    }

    /// Subscribe to a single topic.
    pub fn subscribe_topic(
        &self,
        topic: impl Into<String>,
        handler: impl Fn(&Message) + Send + Sync + 'static,
    ) -> Subscription {
        self.add(Some(vec![topic.into()]), Arc::new(handler))
    }

    /// Subscribe to a set of topics.
    pub fn subscribe_topics(
        &self,
        topics: &[&str],
        handler: impl Fn(&Message) + Send + Sync + 'static,
    ) -> Subscription {
        let topics = topics.iter().map(|&t| t.to_string()).collect();
        self.add(Some(topics), Arc::new(handler))
    }

    fn add(&self, topics: Option<Vec<String>>, handler: Handler) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push(Subscriber {
            id,
            topics,
            handler,
        });
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Pass-through ledger query.
    pub fn query(&self, query: &MessageQuery) -> Result<Vec<Message>> {
        self.ledger.query(query)
    }

    /// Pass-through ledger find-last.
    pub fn find_last(&self, query: &MessageQuery) -> Result<Option<Message>> {
        self.ledger.find_last(query)
    }

    /// Current subscriber count (diagnostics).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// RAII handle for a bus subscription; dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    subscribers: std::sync::Weak<Mutex<Vec<Subscriber>>>,
}

impl Subscription {
    /// Remove the subscription explicitly (equivalent to dropping).
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.lock().retain(|s| s.id != self.id);
        }
    }
}

fn validate(msg: &NewMessage) -> Result<()> {
    if msg.cluster_id.is_empty() {
        return Err(LedgerError::Validation("clusterId is required".into()));
    }
    if msg.topic.is_empty() {
        return Err(LedgerError::Validation("topic is required".into()));
    }
    if msg.sender.is_empty() {
        return Err(LedgerError::Validation("sender is required".into()));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use zeroshot_core::message::MessageContent;

    fn bus() -> MessageBus {
        MessageBus::new(Arc::new(Ledger::in_memory().unwrap()))
    }

    fn make(topic: &str) -> NewMessage {
        NewMessage::broadcast("c1", topic, "tester", MessageContent::text("hi"))
    }

    #[test]
    fn publish_persists_and_returns_stored_form() {
        let bus = bus();
        let stored = bus.publish(&make("ISSUE_OPENED")).unwrap();
        assert!(stored.id > 0);

        let rows = bus.query(&MessageQuery::cluster("c1")).unwrap();
        assert_eq!(rows, vec![stored]);
    }

    #[test]
    fn missing_fields_fail_validation_without_append() {
        let bus = bus();
        let mut msg = make("T");
        msg.topic = String::new();
        assert!(matches!(
            bus.publish(&msg),
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(bus.ledger().count("c1").unwrap(), 0);
    }

    #[test]
    fn subscribers_receive_in_registration_order() {
        let bus = bus();
        let seen = Arc::new(PlMutex::new(Vec::new()));

        let s1 = {
            let seen = seen.clone();
            bus.subscribe(move |_| seen.lock().push("first"))
        };
        let s2 = {
            let seen = seen.clone();
            bus.subscribe(move |_| seen.lock().push("second"))
        };

        let _ = bus.publish(&make("T")).unwrap();
        assert_eq!(*seen.lock(), vec!["first", "second"]);
        drop((s1, s2));
    }

    #[test]
    fn topic_subscription_filters() {
        let bus = bus();
        let hits = Arc::new(AtomicU64::new(0));

        let _sub = {
            let hits = hits.clone();
            bus.subscribe_topic("PLAN_READY", move |_| {
                let _ = hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        let _ = bus.publish(&make("ISSUE_OPENED")).unwrap();
        let _ = bus.publish(&make("PLAN_READY")).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn multi_topic_subscription() {
        let bus = bus();
        let hits = Arc::new(AtomicU64::new(0));

        let _sub = {
            let hits = hits.clone();
            bus.subscribe_topics(&["A", "B"], move |_| {
                let _ = hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        let _ = bus.publish(&make("A")).unwrap();
        let _ = bus.publish(&make("B")).unwrap();
        let _ = bus.publish(&make("C")).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn drop_unsubscribes() {
        let bus = bus();
        let hits = Arc::new(AtomicU64::new(0));

        {
            let hits = hits.clone();
            let _sub = bus.subscribe(move |_| {
                let _ = hits.fetch_add(1, Ordering::SeqCst);
            });
            let _ = bus.publish(&make("T")).unwrap();
        }
        let _ = bus.publish(&make("T")).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn panicking_subscriber_does_not_break_siblings() {
        let bus = bus();
        let hits = Arc::new(AtomicU64::new(0));

        let _bad = bus.subscribe(|_| panic!("boom"));
        let _good = {
            let hits = hits.clone();
            bus.subscribe(move |_| {
                let _ = hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        let stored = bus.publish(&make("T")).unwrap();
        assert!(stored.id > 0, "publisher survives the panic");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reentrant_publish_from_subscriber() {
        let bus = Arc::new(bus());

        let inner = bus.clone();
        let _sub = bus.subscribe_topic("OUTER", move |_| {
            let _ = inner
                .publish(&NewMessage::broadcast(
                    "c1",
                    "INNER",
                    "subscriber",
                    MessageContent::default(),
                ))
                .unwrap();
        });

        let _ = bus.publish(&make("OUTER")).unwrap();
        let rows = bus.query(&MessageQuery::cluster("c1")).unwrap();
        let topics: Vec<&str> = rows.iter().map(|m| m.topic.as_str()).collect();
        assert_eq!(topics, vec!["OUTER", "INNER"]);
    }

    #[test]
    fn subscribers_see_topic_in_append_order() {
        let bus = bus();
        let seen = Arc::new(PlMutex::new(Vec::new()));

        let _sub = {
            let seen = seen.clone();
            bus.subscribe_topic("T", move |m| seen.lock().push(m.id))
        };

        let a = bus.publish(&make("T")).unwrap();
        let b = bus.publish(&make("T")).unwrap();
        assert_eq!(*seen.lock(), vec![a.id, b.id]);
    }
}
