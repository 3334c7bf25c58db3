//! Bounded worker pool fanning rewrite jobs out across tokio tasks.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::compaction::{
    error::CompactionError,
    executor::{CompactionExecutor, RewriteResult},
    planner::CompactionUnit,
};

/// Execute `units` with at most `parallelism` jobs in flight.
///
/// Units are independent, so they are queued on an MPMC channel and drained
/// by a fixed set of workers; completion order is arbitrary. The first
/// failure aborts the remaining workers and drops the queue, and every join
/// handle is awaited before returning so no background work survives the
/// call on either path.
pub(crate) async fn run_units(
    units: Vec<CompactionUnit>,
    executor: Arc<CompactionExecutor>,
    parallelism: usize,
) -> Result<Vec<RewriteResult>, CompactionError> {
    if units.is_empty() {
        return Ok(Vec::new());
    }
    let workers = parallelism.max(1).min(units.len());
    debug!(units = units.len(), workers, "scheduling compaction units");

    let (task_tx, task_rx) = flume::unbounded::<CompactionUnit>();
    for unit in units {
        task_tx
            .send(unit)
            .map_err(|_| CompactionError::ChannelClose)?;
    }
    drop(task_tx);

    let mut pool: JoinSet<Result<Vec<RewriteResult>, CompactionError>> = JoinSet::new();
    for _ in 0..workers {
        let task_rx = task_rx.clone();
        let executor = executor.clone();
        pool.spawn(async move {
            let mut outputs = Vec::new();
            while let Ok(unit) = task_rx.recv_async().await {
                outputs.push(executor.execute(unit).await?);
            }
            Ok(outputs)
        });
    }
    drop(task_rx);

    let mut results = Vec::new();
    let mut failure: Option<CompactionError> = None;
    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(Ok(outputs)) => results.extend(outputs),
            Ok(Err(err)) => {
                if failure.is_none() {
                    error!(error = %err, "compaction job failed; aborting remaining units");
                    failure = Some(err);
                    pool.abort_all();
                }
            }
            Err(join_err) if join_err.is_cancelled() => {}
            Err(join_err) => {
                if failure.is_none() {
                    failure = Some(CompactionError::Scheduling(join_err));
                    pool.abort_all();
                }
            }
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(results),
    }
}
