//! Persistence collaborator consumed by the target processors.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Identity, Platform, Target};

/// Storage operations the extraction engine needs.
///
/// Implementations must make both upserts atomic get-or-create operations:
/// concurrent calls with the same natural key return the same row and never
/// fail because another caller created it first.
pub trait Persistence: Send + Sync {
    /// Get or create the identity for a (normalized) handle.
    fn upsert_identity(&self, handle: &str) -> Result<Identity>;

    /// Get or create the target for a handle on a platform.
    fn upsert_target(&self, handle: &str, platform: Platform) -> Result<Target>;

    /// Append one chat message. Returns the new row id.
    fn append_chat_record(
        &self,
        target: &Target,
        identity: &Identity,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<i64>;

    /// Append one viewer appearance. Returns the new row id.
    fn append_viewer_snapshot(
        &self,
        identity: &Identity,
        target: &Target,
        at: DateTime<Utc>,
    ) -> Result<i64>;
}
