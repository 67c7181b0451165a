//! Backend statistics fetchers and the snapshot file the dashboard
//! collector consumes.

pub mod mongodb;
pub mod postgres;
pub mod snapshot;

pub use mongodb::{MongoMetricsFetcher, MongoMetricsSnapshot};
pub use postgres::{PostgresMetricsFetcher, PostgresMetricsSnapshot};
pub use snapshot::{write_snapshot, SnapshotError};
