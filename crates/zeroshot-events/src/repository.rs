//! Message repository — low-level log operations.
//!
//! The message log is append-only: the only write path is `insert`, and no
//! update or delete statement exists anywhere in this crate. The repository
//! is stateless — every method takes `&Connection`.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use zeroshot_core::message::{Message, MessageContent, NewMessage};

use crate::error::Result;

/// Sort order for queries, applied to `(timestamp, id)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueryOrder {
    /// Chronological.
    #[default]
    Asc,
    /// Most recent first.
    Desc,
}

impl QueryOrder {
    fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Filter set for querying the log. All non-`None` filters must match.
#[derive(Clone, Debug, Default)]
pub struct MessageQuery {
    /// Owning cluster (required).
    pub cluster_id: String,
    /// Topic filter.
    pub topic: Option<String>,
    /// Sender filter.
    pub sender: Option<String>,
    /// Inclusive lower bound on `timestamp` (epoch millis).
    pub since: Option<i64>,
    /// Only messages with `id` strictly greater than this (poller watermark).
    pub after_id: Option<i64>,
    /// Hard cap on the number of rows returned.
    pub limit: Option<u32>,
    /// Sort order.
    pub order: QueryOrder,
}

impl MessageQuery {
    /// Query for every message of a cluster, chronological.
    #[must_use]
    pub fn cluster(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            ..Self::default()
        }
    }

    /// Restrict to a topic, builder-style.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Restrict to a sender, builder-style.
    #[must_use]
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Set the inclusive time lower bound, builder-style.
    #[must_use]
    pub fn since(mut self, since: i64) -> Self {
        self.since = Some(since);
        self
    }

    /// Cap the result count, builder-style.
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the sort order, builder-style.
    #[must_use]
    pub fn order(mut self, order: QueryOrder) -> Self {
        self.order = order;
        self
    }
}

const COLUMNS: &str = "id, cluster_id, topic, sender, receiver, timestamp, content, metadata";

/// Message repository — stateless, every method takes `&Connection`.
pub struct MessageRepo;

impl MessageRepo {
    /// Insert a message, returning the assigned rowid.
    ///
    /// `timestamp` must already be resolved by the caller (the ledger
    /// assigns it when the incoming message has none).
    pub fn insert(conn: &Connection, msg: &NewMessage, timestamp: i64) -> Result<i64> {
        let content = serde_json::to_string(&msg.content)?;
        let metadata = msg
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let _ = conn.execute(
            "INSERT INTO messages (cluster_id, topic, sender, receiver, timestamp, content, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                msg.cluster_id,
                msg.topic,
                msg.sender,
                msg.receiver,
                timestamp,
                content,
                metadata,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get a single message by id.
    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Message>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Query messages matching all non-null filters, ordered by
    /// `(timestamp, id)`.
    pub fn query(conn: &Connection, query: &MessageQuery) -> Result<Vec<Message>> {
        let mut sql = format!("SELECT {COLUMNS} FROM messages WHERE cluster_id = ?1");
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(query.cluster_id.clone())];

        if let Some(topic) = &query.topic {
            params.push(Box::new(topic.clone()));
            push_filter(&mut sql, &format!("topic = ?{}", params.len()));
        }
        if let Some(sender) = &query.sender {
            params.push(Box::new(sender.clone()));
            push_filter(&mut sql, &format!("sender = ?{}", params.len()));
        }
        if let Some(since) = query.since {
            params.push(Box::new(since));
            push_filter(&mut sql, &format!("timestamp >= ?{}", params.len()));
        }
        if let Some(after_id) = query.after_id {
            params.push(Box::new(after_id));
            push_filter(&mut sql, &format!("id > ?{}", params.len()));
        }

        let order = query.order.sql();
        sql.push_str(&format!(" ORDER BY timestamp {order}, id {order}"));
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(Box::as_ref).collect();
        let rows = stmt
            .query_map(params_refs.as_slice(), map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The most recent message matching the filters, or `None`.
    pub fn find_last(conn: &Connection, query: &MessageQuery) -> Result<Option<Message>> {
        let narrowed = MessageQuery {
            order: QueryOrder::Desc,
            limit: Some(1),
            ..query.clone()
        };
        Ok(Self::query(conn, &narrowed)?.into_iter().next())
    }

    /// Count messages in a cluster.
    pub fn count(conn: &Connection, cluster_id: &str) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE cluster_id = ?1",
            params![cluster_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Highest assigned id for a cluster, or 0 when empty.
    pub fn max_id(conn: &Connection, cluster_id: &str) -> Result<i64> {
        let max: Option<i64> = conn
            .query_row(
                "SELECT MAX(id) FROM messages WHERE cluster_id = ?1",
                params![cluster_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(max.unwrap_or(0))
    }
}

fn push_filter(sql: &mut String, clause: &str) {
    sql.push_str(" AND ");
    sql.push_str(clause);
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let content_str: String = row.get(6)?;
    let content: MessageContent = serde_json::from_str(&content_str).unwrap_or_default();
    let metadata: Option<String> = row.get(7)?;
    let metadata = metadata.and_then(|m| serde_json::from_str::<Value>(&m).ok());

    Ok(Message {
        id: row.get(0)?,
        cluster_id: row.get(1)?,
        topic: row.get(2)?,
        sender: row.get(3)?,
        receiver: row.get(4)?,
        timestamp: row.get(5)?,
        content,
        metadata,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
