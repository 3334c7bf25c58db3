//! Optimistic-concurrency commit of a finished rewrite.

use tracing::{info, warn};

use crate::{
    compaction::{error::CompactionError, executor::RewriteResult, OptimizeMetrics},
    version::{
        edit::VersionEdit,
        set::{CommitOutcome, VersionSet},
        VersionRef,
    },
};

/// Commit protocol states. Kept explicit so the bounded retry loop below
/// stays auditable against the protocol: Validating -> Committing ->
/// {Committed | Superseded -> Retrying -> Validating | Failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommitState {
    Validating,
    Committing,
    Retrying,
}

/// Publishes the remove/add actions of successful rewrite jobs as one
/// atomic transaction against the version log.
pub(crate) struct CommitCoordinator<'a> {
    version_set: &'a VersionSet,
    max_retries: usize,
}

impl<'a> CommitCoordinator<'a> {
    pub(crate) fn new(version_set: &'a VersionSet, max_retries: usize) -> Self {
        Self {
            version_set,
            max_retries,
        }
    }

    /// Commit `results` read at snapshot `read`.
    ///
    /// Validation confirms every file this transaction removes is still
    /// live in the snapshot being committed against; a file removed by a
    /// concurrent transaction is a conflict. When another writer claims the
    /// version slot first, the coordinator re-reads the fresher snapshot,
    /// re-validates and retries, up to `max_retries` attempts past the
    /// first. On failure the table is left at its last committed version.
    pub(crate) async fn commit(
        &self,
        read: VersionRef,
        results: &[RewriteResult],
    ) -> Result<OptimizeMetrics, CompactionError> {
        let mut removed_paths: Vec<&str> = results
            .iter()
            .flat_map(|result| result.unit.inputs.iter())
            .map(|input| input.path())
            .collect();
        removed_paths.sort_unstable();
        let files_removed = removed_paths.len();
        let files_added = results.len();

        let mut snapshot = read;
        let mut attempts = 0usize;
        let mut state = CommitState::Validating;
        loop {
            match state {
                CommitState::Validating => {
                    let stale: Vec<String> = removed_paths
                        .iter()
                        .filter(|path| !snapshot.contains(path))
                        .map(|path| path.to_string())
                        .collect();
                    if stale.is_empty() {
                        state = CommitState::Committing;
                    } else {
                        for path in &stale {
                            if let Some(version) = snapshot.removed_at(path) {
                                warn!(
                                    path = %path,
                                    version,
                                    "input already removed by a concurrent transaction"
                                );
                            }
                        }
                        return Err(CompactionError::CommitConflict {
                            attempts,
                            paths: stale,
                        });
                    }
                }
                CommitState::Committing => {
                    let edits = build_edits(results, snapshot.version() + 1);
                    match self.version_set.commit(snapshot.version(), edits).await? {
                        CommitOutcome::Committed(next) => {
                            info!(
                                version = next.version(),
                                files_removed, files_added, attempts, "optimize committed"
                            );
                            return Ok(OptimizeMetrics {
                                version: next.version(),
                                files_removed,
                                files_added,
                            });
                        }
                        CommitOutcome::Superseded(current) => {
                            warn!(
                                read_version = snapshot.version(),
                                current_version = current.version(),
                                "commit superseded by a concurrent writer"
                            );
                            snapshot = current;
                            state = CommitState::Retrying;
                        }
                    }
                }
                CommitState::Retrying => {
                    attempts += 1;
                    if attempts > self.max_retries {
                        return Err(CompactionError::CommitConflict {
                            attempts,
                            paths: removed_paths.iter().map(|path| path.to_string()).collect(),
                        });
                    }
                    state = CommitState::Validating;
                }
            }
        }
    }
}

/// Remove actions for every input, then add actions for every output, both
/// path-sorted so an edit batch is deterministic for a given rewrite.
fn build_edits(results: &[RewriteResult], version: u64) -> Vec<VersionEdit> {
    let mut removes: Vec<VersionEdit> = results
        .iter()
        .flat_map(|result| result.unit.inputs.iter())
        .map(|input| VersionEdit::Remove {
            path: input.path().to_string(),
            version,
        })
        .collect();
    removes.sort_by(|a, b| match (a, b) {
        (VersionEdit::Remove { path: a, .. }, VersionEdit::Remove { path: b, .. }) => a.cmp(b),
        _ => std::cmp::Ordering::Equal,
    });

    let mut adds: Vec<&RewriteResult> = results.iter().collect();
    adds.sort_by(|a, b| a.output.path().cmp(b.output.path()));

    removes
        .into_iter()
        .chain(adds.into_iter().map(|result| VersionEdit::Add {
            entry: result.output.clone(),
        }))
        .collect()
}
