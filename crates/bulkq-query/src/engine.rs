//! Fan-out coordinator

use std::sync::Arc;
use std::time::Instant;

use bulkq_core::Target;
use bulkq_drivers::DriverRegistry;

use crate::aggregate::{AggregateResult, fold_outcomes};
use crate::error::{TargetError, TargetFailure};
use crate::executor::{TargetOutcome, execute_target, statement_timeout};
use crate::splitter::split;

/// Runs a script against many targets concurrently
#[derive(Clone)]
pub struct BulkQueryEngine {
    registry: Arc<DriverRegistry>,
}

impl BulkQueryEngine {
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }

    /// Run `script` against every target and reconcile the results.
    ///
    /// Each target runs on its own task with no limit on concurrency. The
    /// call waits for every target, then folds outcomes in the order of
    /// `targets`. Per-target problems are reported in
    /// [`AggregateResult::messages`]; a script holding only blank batches
    /// connects to each target and returns no rows.
    #[tracing::instrument(skip_all, fields(targets = targets.len(), timeout_secs = timeout_secs))]
    pub async fn bulk_query(
        &self,
        targets: &[Target],
        script: &str,
        timeout_secs: u64,
    ) -> AggregateResult {
        let start = Instant::now();
        let batches = Arc::new(split(script));
        let timeout = statement_timeout(timeout_secs);

        tracing::info!(
            target_count = targets.len(),
            batch_count = batches.len(),
            noop = batches.is_noop(),
            "dispatching bulk query"
        );

        let handles: Vec<_> = targets
            .iter()
            .cloned()
            .map(|target| {
                let registry = self.registry.clone();
                let batches = batches.clone();
                tokio::spawn(async move {
                    execute_target(&registry, &target, &batches, timeout).await
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (target, handle) in targets.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(label = %target, error = %e, "target task failed");
                    TargetOutcome::Failure(TargetFailure::new(
                        target,
                        TargetError::Aborted(e.to_string()),
                    ))
                }
            };
            outcomes.push(outcome);
        }

        let aggregate = fold_outcomes(targets, outcomes);
        tracing::info!(
            row_count = aggregate.row_count(),
            message_count = aggregate.messages.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "bulk query completed"
        );

        aggregate
    }
}

impl std::fmt::Debug for BulkQueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkQueryEngine")
            .field("drivers", &self.registry.list())
            .finish()
    }
}
