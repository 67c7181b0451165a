//! Benchmark simulators: orchestrate timed scenarios against one backend,
//! enforce the state machine across insertion, update, and deletion phases,
//! and run the concurrency and transaction tests.

pub mod mongodb;
pub mod postgres;
pub mod state;
pub mod timing;
pub mod workload;

use std::time::Duration;

use async_trait::async_trait;

pub use mongodb::MongoSimulator;
pub use postgres::PostgresSimulator;
pub use state::{Action, SimulatorState};
pub use timing::ScenarioResult;

use crate::data::RawRecord;
use crate::error::SimulatorError;

/// A non-positive `bulk_size` (canonically -1) means the whole set in one
/// batch.
pub fn resolve_bulk_size(bulk_size: i64, total: usize) -> usize {
    if bulk_size <= 0 {
        total.max(1)
    } else {
        bulk_size as usize
    }
}

/// Contiguous, non-overlapping chunks in input order; the last chunk may be
/// shorter.
pub fn batches<T>(items: &[T], bulk_size: i64) -> std::slice::Chunks<'_, T> {
    items.chunks(resolve_bulk_size(bulk_size, items.len()))
}

/// One backend's benchmark surface. Implementations own their handler 1:1
/// and keep a run history of every completed scenario result.
#[async_trait]
pub trait Simulator {
    fn name(&self) -> &'static str;

    fn state(&self) -> &SimulatorState;

    fn history(&self) -> &[ScenarioResult];

    /// Destructive full reset: drop and recreate the database and the
    /// reviews table/collection, and zero the state counters.
    async fn setup(&mut self) -> Result<(), SimulatorError>;

    /// Reinitialize storage only when it is not empty; zero the counters.
    async fn ensure_empty(&mut self) -> Result<(), SimulatorError>;

    async fn test_insertion(
        &mut self,
        records: &[RawRecord],
    ) -> Result<ScenarioResult, SimulatorError>;

    async fn test_insertion_many(
        &mut self,
        records: &[RawRecord],
        bulk_size: i64,
    ) -> Result<ScenarioResult, SimulatorError>;

    async fn test_update_one(&mut self) -> Result<ScenarioResult, SimulatorError>;

    async fn test_update_many(&mut self, bulk_size: i64) -> Result<ScenarioResult, SimulatorError>;

    async fn test_delete_one(&mut self) -> Result<ScenarioResult, SimulatorError>;

    async fn test_delete_many(&mut self, bulk_size: i64) -> Result<ScenarioResult, SimulatorError>;

    /// Time an equality query on `field` before and after creating its
    /// single-field and `(field, user_id)` compound indexes. Returns
    /// (without-index, with-index) durations.
    async fn test_index_performance(
        &mut self,
        field: &str,
    ) -> Result<(Duration, Duration), SimulatorError>;

    /// Execute exactly `num_operations` independent tasks on a pool bounded
    /// by `concurrency_level`, waiting for all of them before reporting the
    /// elapsed time. A failing task never aborts its siblings.
    async fn test_concurrent_operations(
        &mut self,
        concurrency_level: usize,
        num_operations: usize,
    ) -> Result<Duration, SimulatorError>;

    /// Batch insert plus conditional score bump as one atomic unit; with
    /// `simulate_error` a synthetic failure after the update step forces the
    /// rollback path. The simulated error is absorbed here, not returned.
    async fn test_transaction_operations(
        &mut self,
        records: &[RawRecord],
        simulate_error: bool,
    ) -> Result<Duration, SimulatorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_cover_the_input_exactly() {
        let items: Vec<u32> = (0..10).collect();
        for bulk_size in [1i64, 2, 3, 4, 5, 7, 10, 11, -1] {
            let chunks: Vec<&[u32]> = batches(&items, bulk_size).collect();
            let total: usize = chunks.iter().map(|c| c.len()).sum();
            assert_eq!(total, items.len(), "bulk_size = {bulk_size}");
            let rebuilt: Vec<u32> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
            assert_eq!(rebuilt, items, "bulk_size = {bulk_size}");
        }
    }

    #[test]
    fn uneven_split_leaves_short_last_chunk() {
        let items: Vec<u32> = (0..10).collect();
        let chunks: Vec<&[u32]> = batches(&items, 3).collect();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[3], &[9]);
    }

    #[test]
    fn negative_bulk_size_means_one_batch() {
        let items: Vec<u32> = (0..10).collect();
        let chunks: Vec<&[u32]> = batches(&items, -1).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 10);
    }

    #[test]
    fn empty_input_yields_no_batches() {
        let items: Vec<u32> = Vec::new();
        assert_eq!(batches(&items, -1).count(), 0);
        assert_eq!(batches(&items, 5).count(), 0);
    }
}
