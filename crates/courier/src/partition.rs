use crate::{Error, Result};

/// The slice of work assigned to one worker for one dispatch cycle.
pub type Partition<T = crate::WorkItem> = Vec<T>;

/// Splits `items` across `num_workers` partitions using round-robin
/// assignment.
///
/// Item `i` lands in partition `i % num_workers`, and each partition keeps the
/// relative order of its items, e.g. `1..=7` over 3 workers becomes
/// `[[1, 4, 7], [2, 5], [3, 6]]`. The result always has exactly `num_workers`
/// entries; an empty input yields empty partitions.
///
/// # Errors
///
/// Returns [`Error::InvalidConfiguration`] if `num_workers` is zero.
pub fn partition<T>(items: Vec<T>, num_workers: usize) -> Result<Vec<Partition<T>>> {
    if num_workers == 0 {
        return Err(Error::invalid_configuration(
            "worker count must be greater than 0",
        ));
    }

    let per_worker = items.len().div_ceil(num_workers);
    let mut partitions: Vec<Partition<T>> = (0..num_workers)
        .map(|_| Vec::with_capacity(per_worker))
        .collect();

    for (i, item) in items.into_iter().enumerate() {
        partitions[i % num_workers].push(item);
    }

    Ok(partitions)
}
