//! Concurrent replicate execution.

use anyhow::{Context, Result};
use std::sync::Arc;
use tesim_world::{ReplicateJob, ReplicateResult};
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Run every job on the blocking pool, at most `max_concurrent` at a time.
/// Results come back ordered by replicate id.
pub async fn run_replicates(
    jobs: Vec<ReplicateJob>,
    max_concurrent: usize,
) -> Result<Vec<ReplicateResult>> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    info!(replicates = jobs.len(), max_concurrent, "Running replicates");

    let handles: Vec<_> = jobs
        .into_iter()
        .map(|job| {
            let semaphore = semaphore.clone();
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await?;
                let (replicate_id, seed) = (job.replicate_id, job.seed);
                debug!(replicate_id, seed, "Replicate started");

                tokio::task::spawn_blocking(move || job.execute())
                    .await?
                    .with_context(|| format!("replicate {} (seed {}) failed", replicate_id, seed))
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for joined in futures::future::join_all(handles).await {
        let result = joined??;
        info!(
            replicate_id = result.replicate_id,
            seed = result.seed,
            final_width = result.result.final_width,
            skipped_rounds = result.result.skipped_rounds.len(),
            "Replicate finished"
        );
        results.push(result);
    }

    results.sort_by_key(|r| r.replicate_id);
    Ok(results)
}
