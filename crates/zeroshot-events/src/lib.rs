//! # zeroshot-events
//!
//! Durable message ledger with `SQLite` backend, plus the in-process
//! message bus layered above it.
//!
//! - **Ledger**: append-only per-cluster message log; append assigns a
//!   monotonic id and timestamp; queries filter by cluster/topic/sender/time
//! - **`SQLite` backend**: `rusqlite` behind an `r2d2` pool, WAL mode,
//!   version-tracked migrations
//! - **MessageBus**: validate → persist → synchronous fan-out to topic
//!   subscribers, re-entrancy safe, subscriber failures isolated
//! - **Poller**: background task streaming new messages past a watermark

#![deny(unsafe_code)]

pub mod bus;
pub mod connection;
pub mod error;
pub mod ledger;
pub mod migrations;
pub mod poller;
pub mod repository;

pub use bus::{MessageBus, Subscription};
pub use connection::{new_file, new_in_memory, ConnectionConfig, ConnectionPool};
pub use error::{LedgerError, Result};
pub use ledger::{Ledger, MessageQuery, QueryOrder};
pub use migrations::run_migrations;
pub use poller::{poll_for_messages, PollHandle};
