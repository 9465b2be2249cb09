//! Fleet orchestrator: one processor per target, all running concurrently.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info};

use crate::chat::ChatSource;
use crate::limiter::RequestLimiter;
use crate::processor::TargetProcessor;
use crate::signals;
use crate::stream::record_stream;
use crate::types::*;
use crate::viewers::ViewerSnapshotSource;
use chatscribe_core::{
    normalize_handle, Browser, CancellationSignal, Error, Persistence, Platform, Result,
    ScraperConfig, Target,
};
use chatscribe_store::SqliteStore;

/// Runs target processors on a shared browser, store, limiter and
/// cancellation signal. A failing target never affects the others.
pub struct FleetOrchestrator {
    browser: Arc<dyn Browser>,
    store: Arc<dyn Persistence>,
    limiter: RequestLimiter,
    cancel: CancellationSignal,
    settings: StreamSettings,
}

impl FleetOrchestrator {
    pub fn new(
        browser: Arc<dyn Browser>,
        store: Arc<dyn Persistence>,
        limiter: RequestLimiter,
        cancel: CancellationSignal,
        settings: StreamSettings,
    ) -> Self {
        Self {
            browser,
            store,
            limiter,
            cancel,
            settings,
        }
    }

    /// Resolve configured handles to stored targets. Blank and duplicate
    /// handles are dropped.
    pub fn ensure_targets(&self, handles: &[String], platform: Platform) -> Result<Vec<Target>> {
        let mut targets: Vec<Target> = Vec::with_capacity(handles.len());
        for handle in handles {
            let handle = normalize_handle(handle);
            if handle.is_empty() || targets.iter().any(|t| t.handle() == handle) {
                continue;
            }
            targets.push(self.store.upsert_target(&handle, platform)?);
        }
        Ok(targets)
    }

    /// Process every target concurrently and wait for all of them.
    pub async fn run(&self, targets: Vec<Target>, kind: TaskKind) -> FleetReport {
        info!("Processing {} targets ({:?})", targets.len(), kind);
        let outcomes = join_all(targets.into_iter().map(|target| async move {
            let result = self.run_target(target.clone(), kind).await;
            match &result {
                Ok(count) => debug!("{}: finished with {} records", target, count),
                Err(e) => error!("{}: {}", target, e),
            }
            TargetOutcome { target, result }
        }))
        .await;
        FleetReport { outcomes }
    }

    /// Process a single target until its stream ends.
    pub async fn run_target(&self, target: Target, kind: TaskKind) -> Result<usize> {
        let processor = TargetProcessor::new(target.clone(), self.store.clone());
        let pause = self.settings.yield_pause;
        match kind {
            TaskKind::Chat => {
                let source = ChatSource::new(self.browser.clone(), self.limiter.clone(), target);
                processor
                    .run(record_stream(source, self.cancel.clone(), pause))
                    .await
            }
            TaskKind::ViewerSnapshot => {
                let source = ViewerSnapshotSource::new(
                    self.browser.clone(),
                    self.limiter.clone(),
                    target,
                    &self.settings,
                );
                processor
                    .run(record_stream(source, self.cancel.clone(), pause))
                    .await
            }
        }
    }
}

/// Run the configured targets to completion: open the store, install the
/// signal handlers, process every target, then release the store.
pub async fn run_fleet(
    config: &ScraperConfig,
    kind: TaskKind,
    browser: Arc<dyn Browser>,
    cancel: CancellationSignal,
) -> Result<FleetReport> {
    let listener = signals::install(cancel.clone())?;
    let store = Arc::new(SqliteStore::open(&config.db_path)?);

    let report = {
        let orchestrator = FleetOrchestrator::new(
            browser,
            store.clone(),
            RequestLimiter::new(config.concurrency),
            cancel,
            StreamSettings::from_config(config),
        );
        let targets = orchestrator.ensure_targets(&config.chats, config.platform);
        match targets {
            Ok(targets) => Ok(orchestrator.run(targets, kind).await),
            Err(e) => Err(e),
        }
    };
    listener.abort();

    match Arc::try_unwrap(store) {
        Ok(store) => store.close()?,
        Err(_) => return Err(Error::Internal("store still in use after run".into())),
    }
    report
}
