//! Batch accumulation: group patches into size-bounded atomic write units.

use crate::models::{Batch, PatchEntry};

/// Split patches into consecutive batches of at most `max_batch_size`.
///
/// Empty patches are dropped rather than enqueued as no-op writes. Input
/// order is preserved and only the last batch may be partially filled. A
/// `max_batch_size` of zero is treated as one.
pub fn accumulate<I>(entries: I, max_batch_size: usize) -> Vec<Batch>
where
    I: IntoIterator<Item = PatchEntry>,
{
    let max_batch_size = max_batch_size.max(1);
    let mut batches: Vec<Batch> = Vec::new();
    let mut current: Vec<PatchEntry> = Vec::with_capacity(max_batch_size);

    for entry in entries.into_iter().filter(|e| !e.patch.is_empty()) {
        current.push(entry);
        if current.len() == max_batch_size {
            let index = batches.len();
            batches.push(Batch {
                index,
                entries: std::mem::replace(&mut current, Vec::with_capacity(max_batch_size)),
            });
        }
    }

    if !current.is_empty() {
        let index = batches.len();
        batches.push(Batch {
            index,
            entries: current,
        });
    }

    batches
}
