//! The per-cluster ledger: durable, ordered, append-only message storage.
//!
//! One database file per cluster. Appends run inside a transaction so id
//! assignment is total-order within the database even with concurrent
//! appenders. Reads go through the same pool and therefore see every append
//! that completed before them.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use zeroshot_core::message::{Message, NewMessage};

use crate::connection::{new_file, new_in_memory, ConnectionConfig, ConnectionPool};
use crate::error::{LedgerError, Result};
use crate::migrations::run_migrations;
use crate::repository::MessageRepo;

pub use crate::repository::{MessageQuery, QueryOrder};

/// Durable append-only message log for one cluster.
pub struct Ledger {
    pool: ConnectionPool,
    closed: AtomicBool,
}

impl Ledger {
    /// Open (creating if needed) a file-backed ledger and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let path_str = path.to_string_lossy();
        let pool = new_file(&path_str, &ConnectionConfig::default())?;
        {
            let conn = pool.get()?;
            let _ = run_migrations(&conn)?;
        }
        Ok(Self {
            pool,
            closed: AtomicBool::new(false),
        })
    }

    /// Open an in-memory ledger (for testing).
    pub fn in_memory() -> Result<Self> {
        let pool = new_in_memory(&ConnectionConfig::default())?;
        {
            let conn = pool.get()?;
            let _ = run_migrations(&conn)?;
        }
        Ok(Self {
            pool,
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LedgerError::Closed);
        }
        Ok(())
    }

    /// Persist a message, assigning its id and (when absent) timestamp.
    ///
    /// Returns the stored form. The append runs in a transaction; concurrent
    /// appenders serialize on the database write lock, so ids are assigned
    /// in total order.
    pub fn append(&self, msg: &NewMessage) -> Result<Message> {
        self.check_open()?;
        let timestamp = msg
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        let conn = self.pool.get()?;
        let tx = conn.unchecked_transaction()?;
        let id = MessageRepo::insert(&tx, msg, timestamp)?;
        tx.commit()?;

        MessageRepo::get_by_id(&conn, id)?.ok_or_else(|| {
            LedgerError::Validation(format!("appended message {id} vanished before read-back"))
        })
    }

    /// Query messages matching all non-null filters.
    pub fn query(&self, query: &MessageQuery) -> Result<Vec<Message>> {
        self.check_open()?;
        let conn = self.pool.get()?;
        MessageRepo::query(&conn, query)
    }

    /// The most recent message matching the filters, or `None`.
    pub fn find_last(&self, query: &MessageQuery) -> Result<Option<Message>> {
        self.check_open()?;
        let conn = self.pool.get()?;
        MessageRepo::find_last(&conn, query)
    }

    /// Number of messages stored for `cluster_id`.
    pub fn count(&self, cluster_id: &str) -> Result<i64> {
        self.check_open()?;
        let conn = self.pool.get()?;
        MessageRepo::count(&conn, cluster_id)
    }

    /// Highest assigned id for `cluster_id`, or 0 when empty.
    pub fn max_id(&self, cluster_id: &str) -> Result<i64> {
        self.check_open()?;
        let conn = self.pool.get()?;
        MessageRepo::max_id(&conn, cluster_id)
    }

    /// Close the ledger. Idempotent; subsequent operations fail with
    /// [`LedgerError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
