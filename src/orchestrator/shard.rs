//! Module distribution across shards.
//!
//! Modules are dealt round-robin: shard `k` of `N` takes candidates
//! `k, k + N, k + 2N, ...`. When there are fewer candidates than shards,
//! only the first `candidates` shards receive work.
//!
//! Every shard computes its own assignment from the same sorted candidate
//! list. The union of all assignments is the candidate list, and no module
//! lands in two shards.
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`assignment`](ShardScheduler::assignment) | One shard's modules |
//! | [`partition`](ShardScheduler::partition) | Every shard's modules at once |
//! | [`effective_shards`](ShardScheduler::effective_shards) | Shards that get any work |
//!
//! # Example
//!
//! ```
//! use compat_harness::orchestrator::ShardScheduler;
//!
//! let scheduler = ShardScheduler::new(2);
//! let modules = vec!["a", "b", "c", "d", "e"];
//! assert_eq!(scheduler.assignment(&modules, 0), vec!["a", "c", "e"]);
//! assert_eq!(scheduler.assignment(&modules, 1), vec!["b", "d"]);
//! ```

/// Splits an ordered candidate list between a fixed number of shards.
///
/// The scheduler only deals out positions; it knows nothing about devices
/// or modules. The orchestrator pairs shard `k` with its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardScheduler {
    total_shards: usize,
}

impl ShardScheduler {
    /// Creates a scheduler for `total_shards` shards.
    ///
    /// # Arguments
    ///
    /// * `total_shards` - Number of shards in the invocation. Minimum is 1
    ///   (0 is treated as an unsharded run).
    ///
    /// # Example
    ///
    /// ```
    /// use compat_harness::orchestrator::ShardScheduler;
    ///
    /// assert_eq!(ShardScheduler::new(0).total_shards(), 1);
    /// assert_eq!(ShardScheduler::new(3).total_shards(), 3);
    /// ```
    pub fn new(total_shards: usize) -> Self {
        Self {
            total_shards: total_shards.max(1),
        }
    }

    /// Returns the configured shard count.
    pub fn total_shards(&self) -> usize {
        self.total_shards
    }

    /// Number of shards that receive at least one candidate.
    ///
    /// This is `min(total_shards, candidates)`, and it is the round-robin
    /// stride.
    pub fn effective_shards(&self, candidates: usize) -> usize {
        self.total_shards.min(candidates)
    }

    /// The candidates assigned to shard `index`.
    ///
    /// # Arguments
    ///
    /// * `candidates` - Every candidate of the invocation, in the same order
    ///   on every shard.
    /// * `index` - This shard's index, `0..total_shards`.
    ///
    /// # Returns
    ///
    /// Candidates `index, index + E, index + 2E, ...` where `E` is
    /// [`effective_shards`](Self::effective_shards). Empty when `index` is
    /// at or past `E`.
    ///
    /// # Example
    ///
    /// ```
    /// use compat_harness::orchestrator::ShardScheduler;
    ///
    /// let scheduler = ShardScheduler::new(4);
    /// assert_eq!(scheduler.assignment(&[1, 2], 1), vec![2]);
    /// assert!(scheduler.assignment(&[1, 2], 3).is_empty());
    /// ```
    pub fn assignment<T: Clone>(&self, candidates: &[T], index: usize) -> Vec<T> {
        let effective = self.effective_shards(candidates.len());
        if index >= effective {
            return Vec::new();
        }
        candidates
            .iter()
            .skip(index)
            .step_by(effective)
            .cloned()
            .collect()
    }

    /// Every shard's assignment, indexed by shard. Always `total_shards`
    /// entries; shards past the effective count are empty.
    pub fn partition<T: Clone>(&self, candidates: &[T]) -> Vec<Vec<T>> {
        (0..self.total_shards)
            .map(|index| self.assignment(candidates, index))
            .collect()
    }
}
