//! MongoDB benchmark simulator. Mirrors the PostgreSQL simulator's scenario
//! surface against the document store; IDs are driver-assigned ObjectIds.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bson::oid::ObjectId;
use rand::Rng;
use tokio::sync::Semaphore;

use super::state::{Action, SimulatorState};
use super::timing::ScenarioResult;
use super::workload::{generate_task_mix, synthetic_review, TaskKind};
use super::{batches, Simulator};
use crate::config::DatabaseConfig;
use crate::data::{RawRecord, Review};
use crate::databases::{ConnectionPolicy, MongoHandler};
use crate::error::SimulatorError;

pub struct MongoSimulator {
    handler: Arc<MongoHandler>,
    state: SimulatorState,
    history: Vec<ScenarioResult>,
}

impl MongoSimulator {
    pub fn new(config: DatabaseConfig, policy: ConnectionPolicy, total_records: u64) -> Self {
        MongoSimulator {
            handler: Arc::new(MongoHandler::new(config, policy)),
            state: SimulatorState::new(total_records),
            history: Vec::new(),
        }
    }

    pub fn handler(&self) -> &Arc<MongoHandler> {
        &self.handler
    }

    async fn ids_or_empty(&self) -> Vec<ObjectId> {
        match self.handler.get_all_ids().await {
            Ok(ids) => {
                log::info!("retrieved {} IDs from the reviews collection", ids.len());
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
impl Simulator for MongoSimulator {
    fn name(&self) -> &'static str {
        "MongoDB"
    }

    fn state(&self) -> &SimulatorState {
        &self.state
    }

    fn history(&self) -> &[ScenarioResult] {
        &self.history
    }

    async fn setup(&mut self) -> Result<(), SimulatorError> {
        log::info!("setting up MongoDB database and collection...");
        self.handler.create_database().await?;
        self.state.reset();
        log::info!("MongoDB setup complete");
        Ok(())
    }

    async fn ensure_empty(&mut self) -> Result<(), SimulatorError> {
        if !self.handler.is_empty().await? {
            log::info!("reviews collection is not empty, reinitializing");
            self.handler.initialize_collection().await?;
        }
        self.state.reset();
        Ok(())
    }

    async fn test_insertion(
        &mut self,
        records: &[RawRecord],
    ) -> Result<ScenarioResult, SimulatorError> {
        self.state.validate_before_executing(Action::Insertion)?;
        log::info!("testing MongoDB insertion...");
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

        Ok(self.finish("mongo_insertion", start, per_op))
    }

    async fn test_insertion_many(
        &mut self,
        records: &[RawRecord],
        bulk_size: i64,
    ) -> Result<ScenarioResult, SimulatorError> {
        self.state.validate_before_executing(Action::Insertion)?;
        log::info!("testing MongoDB bulk insertion...");
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

        Ok(self.finish("mongo_insertion_many", start, per_op))
    }

    async fn test_update_one(&mut self) -> Result<ScenarioResult, SimulatorError> {
        self.state.validate_before_executing(Action::Update)?;
        log::info!("testing MongoDB update one...");
        let ids = self.ids_or_empty().await;
        let start = Instant::now();
        let mut per_op = Vec::with_capacity(ids.len());

        for id in ids {
            let op_start = Instant::now();
            match self.handler.update_one(id).await {
                Ok(count) => self.state.modified += count,
                Err(e) => log::warn!("update_one failed for {id}: {e}"),
            }
            per_op.push(op_start.elapsed());
        }

        Ok(self.finish("mongo_update_one", start, per_op))
    }

    async fn test_update_many(&mut self, bulk_size: i64) -> Result<ScenarioResult, SimulatorError> {
        self.state.validate_before_executing(Action::Update)?;
        log::info!("testing MongoDB update many...");
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

        Ok(self.finish("mongo_update_many", start, per_op))
    }

    async fn test_delete_one(&mut self) -> Result<ScenarioResult, SimulatorError> {
        self.state.validate_before_executing(Action::Delete)?;
        log::info!("testing MongoDB delete one...");
        let ids = self.ids_or_empty().await;
        let start = Instant::now();
        let mut per_op = Vec::with_capacity(ids.len());

        for id in ids {
            let op_start = Instant::now();
            match self.handler.delete_one(id).await {
                Ok(count) => self.state.deleted += count,
                Err(e) => log::warn!("delete_one failed for {id}: {e}"),
            }
            per_op.push(op_start.elapsed());
        }

        Ok(self.finish("mongo_delete_one", start, per_op))
    }

    async fn test_delete_many(&mut self, bulk_size: i64) -> Result<ScenarioResult, SimulatorError> {
        self.state.validate_before_executing(Action::Delete)?;
        log::info!("testing MongoDB delete many...");
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

        Ok(self.finish("mongo_delete_many", start, per_op))
    }

    async fn test_index_performance(
        &mut self,
        field: &str,
    ) -> Result<(Duration, Duration), SimulatorError> {
        log::info!("testing MongoDB index performance on field '{field}'...");

        let start = Instant::now();
        let hits = self.handler.find_by_field(field, "some_value").await?;
        let no_index_time = start.elapsed();
        log::info!("query without index matched {} documents", hits.len());

        self.handler.create_single_field_index(field).await?;
        self.handler.create_compound_index(&[field, "user_id"]).await?;

        let start = Instant::now();
        self.handler.find_by_field(field, "some_value").await?;
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
            log::warn!("no IDs in the reviews collection; insert data before the concurrency test");
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
        log::info!("testing MongoDB multi-document transactional operations...");
        let reviews: Vec<Review> = records.iter().map(Review::normalize).collect();
        let start = Instant::now();

        match self.handler.run_transaction(&reviews, simulate_error).await {
            Ok(true) => log::info!("transaction committed successfully"),
            Ok(false) => log::info!("transaction aborted"),
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

fn pick(ids: &[ObjectId]) -> ObjectId {
    ids[rand::thread_rng().gen_range(0..ids.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulatorError;

    fn local_simulator(total_records: u64) -> MongoSimulator {
        let config = DatabaseConfig {
            host: "localhost".into(),
            port: 27017,
            user: None,
            password: None,
            database: "benchmark".into(),
        };
        MongoSimulator::new(config, ConnectionPolicy::Ephemeral, total_records)
    }

    // The validation gate fires before any client is built, so these run
    // without a server.

    #[tokio::test]
    async fn update_gate_rejects_a_fresh_simulator() {
        let mut sim = local_simulator(10);
        let err = sim.test_update_many(-1).await.unwrap_err();
        assert!(matches!(err, SimulatorError::State(_)));
        assert!(sim.history().is_empty());
    }

    #[tokio::test]
    async fn insertion_gate_rejects_a_dirty_simulator() {
        let mut sim = local_simulator(10);
        sim.state.deleted = 10;
        let err = sim.test_insertion(&[]).await.unwrap_err();
        assert!(matches!(err, SimulatorError::State(_)));
    }
}
