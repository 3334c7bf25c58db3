//! Bin packing of a partition's files into size-bounded compaction units.

use std::collections::BTreeMap;

use crate::{partition::PartitionKey, version::FileEntry};

/// A group of input files to be rewritten into one output file, or a single
/// file that is already at target size and must be left alone.
#[derive(Debug, Clone)]
pub(crate) struct CompactionUnit {
    pub(crate) partition: PartitionKey,
    pub(crate) inputs: Vec<FileEntry>,
    /// Set when rewriting this unit would not improve the layout; such
    /// units are excluded from execution.
    pub(crate) already_optimal: bool,
}

impl CompactionUnit {
    fn rewrite(partition: PartitionKey, inputs: Vec<FileEntry>) -> Self {
        Self {
            partition,
            inputs,
            already_optimal: false,
        }
    }

    fn optimal(partition: PartitionKey, input: FileEntry) -> Self {
        Self {
            partition,
            inputs: vec![input],
            already_optimal: true,
        }
    }

    #[cfg(test)]
    pub(crate) fn input_size(&self) -> u64 {
        self.inputs.iter().map(FileEntry::size).sum()
    }
}

/// Plan every selected partition. Partitions are visited in key order and
/// files within a partition in path order, so the plan is deterministic for
/// a given snapshot.
pub(crate) fn plan(
    selected: BTreeMap<PartitionKey, Vec<FileEntry>>,
    target_file_size: u64,
) -> Vec<CompactionUnit> {
    let mut units = Vec::new();
    for (partition, files) in selected {
        units.extend(plan_partition(partition, files, target_file_size));
    }
    units
}

/// Pack one partition's files into units.
///
/// Files at or above the target are each their own `already_optimal` unit.
/// The remaining small files accumulate greedily in path order; a unit is
/// closed when the next file would push it past the target. A lone small
/// file in an otherwise-empty partition is left untouched, while a
/// single-small-file unit in a partition that holds other files is still
/// rewritten.
pub(crate) fn plan_partition(
    partition: PartitionKey,
    mut files: Vec<FileEntry>,
    target_file_size: u64,
) -> Vec<CompactionUnit> {
    files.sort_by(|a, b| a.path().cmp(b.path()));
    let partition_files = files.len();

    let mut units = Vec::new();
    let mut bin: Vec<FileEntry> = Vec::new();
    let mut bin_size = 0u64;
    for file in files {
        if file.size() >= target_file_size {
            units.push(CompactionUnit::optimal(partition.clone(), file));
            continue;
        }
        if !bin.is_empty() && bin_size + file.size() > target_file_size {
            units.push(CompactionUnit::rewrite(
                partition.clone(),
                std::mem::take(&mut bin),
            ));
            bin_size = 0;
        }
        bin_size += file.size();
        bin.push(file);
    }
    if !bin.is_empty() {
        if bin.len() == 1 && partition_files == 1 {
            // Rewriting a partition's only file to itself gains nothing.
            let file = bin.remove(0);
            units.push(CompactionUnit::optimal(partition.clone(), file));
        } else {
            units.push(CompactionUnit::rewrite(partition.clone(), bin));
        }
    }
    units
}
