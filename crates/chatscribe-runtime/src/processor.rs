//! Target processor: drain one record stream into persistence.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info};

use crate::stream::RecordStream;
use chatscribe_core::{ChatLine, Persistence, Result, Target, ViewerSighting};

/// How a record kind is written to persistence.
pub trait PersistRecord: Send + 'static {
    fn persist(&self, store: &dyn Persistence, target: &Target) -> Result<()>;
}

impl PersistRecord for ChatLine {
    fn persist(&self, store: &dyn Persistence, target: &Target) -> Result<()> {
        let author = store.upsert_identity(&self.author)?;
        store.append_chat_record(target, &author, &self.body, self.observed_at)?;
        info!("{} {}: {}", target.handle(), author.handle, self.body);
        Ok(())
    }
}

impl PersistRecord for ViewerSighting {
    fn persist(&self, store: &dyn Persistence, target: &Target) -> Result<()> {
        let viewer = store.upsert_identity(&self.handle)?;
        store.append_viewer_snapshot(&viewer, target, self.observed_at)?;
        info!("{} viewer {}", target.handle(), viewer.handle);
        Ok(())
    }
}

/// Consumes the records of one target, strictly in stream order.
pub struct TargetProcessor {
    target: Target,
    store: Arc<dyn Persistence>,
}

impl TargetProcessor {
    pub fn new(target: Target, store: Arc<dyn Persistence>) -> Self {
        Self { target, store }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Persist every record until the stream ends. The first error, from the
    /// stream or from persistence, ends processing. Returns the number of
    /// records persisted.
    pub async fn run<R: PersistRecord>(&self, mut records: RecordStream<R>) -> Result<usize> {
        let mut persisted = 0;
        while let Some(record) = records.next().await {
            record?.persist(self.store.as_ref(), &self.target)?;
            persisted += 1;
        }
        debug!("{}: {} records persisted", self.target, persisted);
        Ok(persisted)
    }
}
