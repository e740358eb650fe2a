//! Batch scheduling: bounded fan-out of per-tag probes.
//!
//! One task per row under a semaphore; a failing task never takes the batch
//! down with it. Collection order is arrival order and deliberately
//! unspecified. Cancelling the caller's token stops in-flight probes at
//! their next suspension point and whatever completed is still returned.

use crate::error::ProbeError;
use crate::probe::ProbeEngine;
use sbp_types::{Outbound, ProbeResult};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Reachability-only probes are cheap; geolocation services throttle.
pub const DEFAULT_REACH_CONCURRENCY: usize = 50;
pub const DEFAULT_ENRICH_CONCURRENCY: usize = 10;

impl ProbeEngine {
    /// Probe every non-synthetic row. `concurrency = 0` picks the default
    /// for the selected pipeline. Each completed result is persisted.
    pub async fn test_all(
        &self,
        concurrency: usize,
        with_landing: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProbeResult>, ProbeError> {
        let rows = self
            .store()
            .list_probeable()
            .await
            .map_err(|e| ProbeError::Persist(e.to_string()))?;
        Ok(self.run_batch(rows, concurrency, with_landing, cancel).await)
    }

    /// Probe the given tags; unknown tags are silently dropped.
    pub async fn test_selected(
        &self,
        tags: &[String],
        concurrency: usize,
        with_landing: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProbeResult>, ProbeError> {
        let rows = self
            .store()
            .list_by_tags(tags)
            .await
            .map_err(|e| ProbeError::Persist(e.to_string()))?;
        Ok(self.run_batch(rows, concurrency, with_landing, cancel).await)
    }

    async fn run_batch(
        &self,
        rows: Vec<Outbound>,
        concurrency: usize,
        with_landing: bool,
        cancel: &CancellationToken,
    ) -> Vec<ProbeResult> {
        let concurrency = match concurrency {
            0 if with_landing => DEFAULT_ENRICH_CONCURRENCY,
            0 => DEFAULT_REACH_CONCURRENCY,
            n => n,
        };
        let sem = Arc::new(Semaphore::new(concurrency));
        let mut set = JoinSet::new();

        for ob in rows {
            // synthetic rows never reach this point; the store filters them
            debug_assert!(!ob.kind.is_synthetic());
            let engine = self.clone();
            let sem = sem.clone();
            let cancel = cancel.clone();
            set.spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return None;
                };
                if cancel.is_cancelled() {
                    return None;
                }
                let outcome = if with_landing {
                    engine.test_outbound_with_landing(&ob.tag, &cancel).await
                } else {
                    engine.test_outbound(&ob.tag).await
                };
                match outcome {
                    Ok(result) => {
                        engine.save_result(&result).await;
                        Some(result)
                    }
                    Err(e) => {
                        // row vanished or the store hiccuped; the batch goes on
                        warn!(tag = %ob.tag, error = %e, "probe task failed");
                        None
                    }
                }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(e) => debug!(error = %e, "probe task panicked or was aborted"),
            }
        }
        results
    }
}
