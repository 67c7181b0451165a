//! Benchmark harness comparing PostgreSQL and MongoDB on a fixed movie
//! review workload, plus statistics fetchers for a live dashboard.

pub mod config;
pub mod data;
pub mod databases;
pub mod error;
pub mod metrics;
pub mod simulator;

pub use config::DatabaseConfig;
pub use databases::{ConnectionPolicy, MongoHandler, PostgresHandler};
pub use error::{HandlerError, SimulatorError, StateError};
pub use simulator::{MongoSimulator, PostgresSimulator, ScenarioResult, Simulator};
