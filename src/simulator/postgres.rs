//! PostgreSQL benchmark simulator.
//!
//! Handler errors inside a scenario loop are logged and degrade the single
//! call to a no-op; the counters only ever reflect work the backend
//! confirmed. State-invariant violations always propagate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Semaphore;

use super::state::{Action, SimulatorState};
use super::timing::ScenarioResult;
use super::workload::{generate_task_mix, synthetic_review, TaskKind};
use super::{batches, Simulator};
use crate::config::DatabaseConfig;
use crate::data::{RawRecord, Review};
use crate::databases::{ConnectionPolicy, PostgresHandler};
use crate::error::SimulatorError;

pub struct PostgresSimulator {
    handler: Arc<PostgresHandler>,
    state: SimulatorState,
    history: Vec<ScenarioResult>,
}

impl PostgresSimulator {
    pub fn new(config: DatabaseConfig, policy: ConnectionPolicy, total_records: u64) -> Self {
        PostgresSimulator {
            handler: Arc::new(PostgresHandler::new(config, policy)),
            state: SimulatorState::new(total_records),
            history: Vec::new(),
        }
    }

    pub fn handler(&self) -> &Arc<PostgresHandler> {
        &self.handler
    }

    /// IDs for the update/delete scenarios. Enumeration failure degrades to
    /// an empty set so the scenario completes with zero operations.
    async fn ids_or_empty(&self) -> Vec<i32> {
        match self.handler.get_all_review_ids().await {
            Ok(ids) => {
                log::info!("retrieved {} IDs from the reviews table", ids.len());
                ids
            }
            Err(e) => {
                log::warn!("failed to enumerate review IDs: {e}");
                Vec::new()
            }
        }
    }

    fn finish(&mut self, scenario: &str, start: Instant, per_op: Vec<Duration>) -> ScenarioResult {
        let result = ScenarioResult::new(scenario, start.elapsed(), per_op);
        log::info!(
            "{} completed in {:.2}s over {} operations",
            scenario,
            result.secs(),
            result.per_op.len()
        );
        self.history.push(result.clone());
        result
    }
}

#[async_trait]
impl Simulator for PostgresSimulator {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn state(&self) -> &SimulatorState {
        &self.state
    }

    fn history(&self) -> &[ScenarioResult] {
        &self.history
    }

    async fn setup(&mut self) -> Result<(), SimulatorError> {
        log::info!("setting up PostgreSQL database and table...");
        self.handler.create_database().await?;
        self.handler.create_reviews_table().await?;
        self.state.reset();
        log::info!("PostgreSQL setup complete");
        Ok(())
    }

    async fn ensure_empty(&mut self) -> Result<(), SimulatorError> {
        if !self.handler.is_empty().await? {
            log::info!("reviews table is not empty, dropping and recreating");
            self.handler.reset_reviews_table().await?;
        }
        self.state.reset();
        Ok(())
    }

    async fn test_insertion(
        &mut self,
        records: &[RawRecord],
    ) -> Result<ScenarioResult, SimulatorError> {
        self.state.validate_before_executing(Action::Insertion)?;
        log::info!("testing PostgreSQL insertion...");
        let start = Instant::now();
        let mut per_op = Vec::with_capacity(records.len());

        for raw in records {
            let review = Review::normalize(raw);
            let op_start = Instant::now();
            match self.handler.insert_one(&review).await {
                Ok(()) => self.state.inserted += 1,
                Err(e) => log::warn!("insert_one failed, record skipped: {e}"),
            }
            per_op.push(op_start.elapsed());
        }

        Ok(self.finish("postgres_insertion", start, per_op))
    }

    async fn test_insertion_many(
        &mut self,
        records: &[RawRecord],
        bulk_size: i64,
    ) -> Result<ScenarioResult, SimulatorError> {
        self.state.validate_before_executing(Action::Insertion)?;
        log::info!("testing PostgreSQL bulk insertion...");
        let reviews: Vec<Review> = records.iter().map(Review::normalize).collect();
        let start = Instant::now();
        let mut per_op = Vec::new();

        for bulk in batches(&reviews, bulk_size) {
            let bulk_start = Instant::now();
            match self.handler.insert_many(bulk).await {
                Ok(count) => self.state.inserted += count,
                Err(e) => log::warn!("insert_many failed, batch skipped: {e}"),
            }
            per_op.push(bulk_start.elapsed());
        }

        Ok(self.finish("postgres_insertion_many", start, per_op))
    }

    async fn test_update_one(&mut self) -> Result<ScenarioResult, SimulatorError> {
        self.state.validate_before_executing(Action::Update)?;
        log::info!("testing PostgreSQL update one...");
        let ids = self.ids_or_empty().await;
        let start = Instant::now();
        let mut per_op = Vec::with_capacity(ids.len());

        for id in ids {
            let op_start = Instant::now();
            match self.handler.update_one(id).await {
                Ok(count) => self.state.modified += count,
                Err(e) => log::warn!("update_one failed for id {id}: {e}"),
            }
            per_op.push(op_start.elapsed());
        }

        Ok(self.finish("postgres_update_one", start, per_op))
    }

    async fn test_update_many(&mut self, bulk_size: i64) -> Result<ScenarioResult, SimulatorError> {
        self.state.validate_before_executing(Action::Update)?;
        log::info!("testing PostgreSQL update many...");
        let ids = self.ids_or_empty().await;
        let start = Instant::now();
        let mut per_op = Vec::new();

        for bulk in batches(&ids, bulk_size) {
            let bulk_start = Instant::now();
            match self.handler.update_many_bulk(bulk).await {
                Ok(count) => self.state.modified += count,
                Err(e) => log::warn!("update_many_bulk failed, batch skipped: {e}"),
            }
            per_op.push(bulk_start.elapsed());
        }

        Ok(self.finish("postgres_update_many", start, per_op))
    }

    async fn test_delete_one(&mut self) -> Result<ScenarioResult, SimulatorError> {
        self.state.validate_before_executing(Action::Delete)?;
        log::info!("testing PostgreSQL delete one...");
        let ids = self.ids_or_empty().await;
        let start = Instant::now();
        let mut per_op = Vec::with_capacity(ids.len());

        for id in ids {
            let op_start = Instant::now();
            match self.handler.delete_one(id).await {
                Ok(count) => self.state.deleted += count,
                Err(e) => log::warn!("delete_one failed for id {id}: {e}"),
            }
            per_op.push(op_start.elapsed());
        }

        Ok(self.finish("postgres_delete_one", start, per_op))
    }

    async fn test_delete_many(&mut self, bulk_size: i64) -> Result<ScenarioResult, SimulatorError> {
        self.state.validate_before_executing(Action::Delete)?;
        log::info!("testing PostgreSQL delete many...");
        let ids = self.ids_or_empty().await;
        let start = Instant::now();
        let mut per_op = Vec::new();

        for bulk in batches(&ids, bulk_size) {
            let bulk_start = Instant::now();
            match self.handler.delete_many_bulk(bulk).await {
                Ok(count) => self.state.deleted += count,
                Err(e) => log::warn!("delete_many_bulk failed, batch skipped: {e}"),
            }
            per_op.push(bulk_start.elapsed());
        }

        Ok(self.finish("postgres_delete_many", start, per_op))
    }

    async fn test_index_performance(
        &mut self,
        field: &str,
    ) -> Result<(Duration, Duration), SimulatorError> {
        log::info!("testing PostgreSQL index performance on column '{field}'...");

        let start = Instant::now();
        let hits = self.handler.find_by_column(field, "some_value").await?;
        let no_index_time = start.elapsed();
        log::info!("query without index matched {} rows", hits.len());

        self.handler.create_single_column_index(field).await?;
        self.handler.create_compound_index(&[field, "user_id"]).await?;

        let start = Instant::now();
        self.handler.find_by_column(field, "some_value").await?;
        let index_time = start.elapsed();

        log::info!(
            "without index: {:.2}s, with index: {:.2}s",
            no_index_time.as_secs_f64(),
            index_time.as_secs_f64()
        );
        Ok((no_index_time, index_time))
    }

    async fn test_concurrent_operations(
        &mut self,
        concurrency_level: usize,
        num_operations: usize,
    ) -> Result<Duration, SimulatorError> {
        log::info!(
            "testing concurrent operations with {concurrency_level} workers and \
             {num_operations} total operations..."
        );
        let ids = self.ids_or_empty().await;
        if ids.is_empty() {
            log::warn!("no IDs in the reviews table; insert data before the concurrency test");
            return Ok(Duration::ZERO);
        }

        let mix = generate_task_mix(num_operations, &mut rand::thread_rng());
        let ids = Arc::new(ids);
        let permits = Arc::new(Semaphore::new(concurrency_level.max(1)));
        let start = Instant::now();

        let tasks: Vec<_> = mix
            .into_iter()
            .map(|kind| {
                let handler = Arc::clone(&self.handler);
                let ids = Arc::clone(&ids);
                let permits = Arc::clone(&permits);
                tokio::spawn(async move {
                    let _permit = match permits.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };
                    let outcome = match kind {
                        TaskKind::Read => {
                            let id = pick(&ids);
                            handler.get_review_by_id(id).await.map(|_| ())
                        }
                        TaskKind::Write => {
                            let review = synthetic_review(&mut rand::thread_rng());
                            handler.insert_one(&review).await
                        }
                        TaskKind::Update => {
                            let id = pick(&ids);
                            handler.update_one(id).await.map(|_| ())
                        }
                    };
                    if let Err(e) = outcome {
                        log::warn!("concurrent {kind:?} task failed: {e}");
                    }
                })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            if let Err(e) = task {
                log::warn!("concurrent task panicked: {e}");
            }
        }

        let elapsed = start.elapsed();
        log::info!(
            "concurrent operations completed in {:.2}s",
            elapsed.as_secs_f64()
        );
        Ok(elapsed)
    }

    async fn test_transaction_operations(
        &mut self,
        records: &[RawRecord],
        simulate_error: bool,
    ) -> Result<Duration, SimulatorError> {
        log::info!("testing PostgreSQL transactional operations...");
        let reviews: Vec<Review> = records.iter().map(Review::normalize).collect();
        let start = Instant::now();

        match self.handler.run_transaction(&reviews, simulate_error).await {
            Ok(true) => log::info!("transaction committed successfully"),
            Ok(false) => log::info!("transaction rolled back"),
            Err(e) => log::warn!("transaction failed: {e}"),
        }

        let elapsed = start.elapsed();
        log::info!(
            "session ended, total execution time {:.2}s",
            elapsed.as_secs_f64()
        );
        Ok(elapsed)
    }
}

fn pick(ids: &[i32]) -> i32 {
    ids[rand::thread_rng().gen_range(0..ids.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulatorError;

    fn local_simulator(total_records: u64) -> PostgresSimulator {
        let config = DatabaseConfig {
            host: "localhost".into(),
            port: 5432,
            user: Some("postgres".into()),
            password: Some("postgres".into()),
            database: "benchmark".into(),
        };
        PostgresSimulator::new(config, ConnectionPolicy::Ephemeral, total_records)
    }

    // The validation gate fires before any connection is opened, so these
    // run without a server.

    #[tokio::test]
    async fn update_gate_rejects_a_fresh_simulator() {
        let mut sim = local_simulator(10);
        let err = sim.test_update_many(-1).await.unwrap_err();
        assert!(matches!(err, SimulatorError::State(_)));
        assert!(sim.history().is_empty());
    }

    #[tokio::test]
    async fn delete_gate_rejects_partial_insertion() {
        let mut sim = local_simulator(10);
        sim.state.inserted = 5;
        let err = sim.test_delete_one().await.unwrap_err();
        assert!(matches!(err, SimulatorError::State(_)));
    }

    #[tokio::test]
    async fn insertion_gate_rejects_a_dirty_simulator() {
        let mut sim = local_simulator(10);
        sim.state.inserted = 10;
        let err = sim.test_insertion_many(&[], -1).await.unwrap_err();
        assert!(matches!(err, SimulatorError::State(_)));
    }
}
