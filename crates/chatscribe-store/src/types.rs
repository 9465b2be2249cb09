//! Row types returned by the read paths.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A stored target, flattened for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetRow {
    pub id: i64,
    pub handle: String,
    pub platform: String,
}

/// One stored chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatEntry {
    pub id: i64,
    /// Handle of the chat room the message was posted in.
    pub target: String,
    pub author: String,
    pub body: String,
    pub observed_at: DateTime<Utc>,
}

/// Store-level statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub identities: i64,
    pub targets: i64,
    pub chat_messages: i64,
    pub viewer_appearances: i64,
    pub db_path: String,
}
