//! MongoDB statistics fetcher over the `serverStatus` and `dbStats`
//! commands.

use std::time::{SystemTime, UNIX_EPOCH};

use bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::Client;
use serde::Serialize;

use crate::config::DatabaseConfig;
use crate::error::HandlerError;

/// One poll of the server and database statistics, keyed by metric name
/// when serialized.
#[derive(Debug, Clone, Serialize)]
pub struct MongoMetricsSnapshot {
    pub timestamp: f64,
    pub uptime_seconds: f64,
    pub current_connections: i64,
    pub available_connections: i64,
    pub op_inserts: i64,
    pub op_queries: i64,
    pub op_updates: i64,
    pub op_deletes: i64,
    pub resident_memory_mb: i64,
    pub virtual_memory_mb: i64,
    pub collections: i64,
    pub objects: i64,
    pub data_size_bytes: f64,
    pub storage_size_bytes: f64,
    pub index_count: i64,
    pub index_size_bytes: f64,
}

pub struct MongoMetricsFetcher {
    config: DatabaseConfig,
}

impl MongoMetricsFetcher {
    pub fn new(config: DatabaseConfig) -> Self {
        MongoMetricsFetcher { config }
    }

    /// Poll both commands over a fresh client.
    pub async fn fetch(&self) -> Result<MongoMetricsSnapshot, HandlerError> {
        let options = ClientOptions::parse(self.config.mongo_uri()).await?;
        let client = Client::with_options(options)?;

        let status = client
            .database("admin")
            .run_command(doc! { "serverStatus": 1 }, None)
            .await?;
        let db_stats = client
            .database(&self.config.database)
            .run_command(doc! { "dbStats": 1 }, None)
            .await?;

        Ok(build_snapshot(unix_now(), &status, &db_stats))
    }
}

fn build_snapshot(timestamp: f64, status: &Document, db_stats: &Document) -> MongoMetricsSnapshot {
    let connections = subdoc(status, "connections");
    let opcounters = subdoc(status, "opcounters");
    let mem = subdoc(status, "mem");

    MongoMetricsSnapshot {
        timestamp,
        uptime_seconds: num_f64(status, "uptime"),
        current_connections: num_i64(&connections, "current"),
        available_connections: num_i64(&connections, "available"),
        op_inserts: num_i64(&opcounters, "insert"),
        op_queries: num_i64(&opcounters, "query"),
        op_updates: num_i64(&opcounters, "update"),
        op_deletes: num_i64(&opcounters, "delete"),
        resident_memory_mb: num_i64(&mem, "resident"),
        virtual_memory_mb: num_i64(&mem, "virtual"),
        collections: num_i64(db_stats, "collections"),
        objects: num_i64(db_stats, "objects"),
        data_size_bytes: num_f64(db_stats, "dataSize"),
        storage_size_bytes: num_f64(db_stats, "storageSize"),
        index_count: num_i64(db_stats, "indexes"),
        index_size_bytes: num_f64(db_stats, "indexSize"),
    }
}

fn subdoc(doc: &Document, key: &str) -> Document {
    doc.get_document(key).cloned().unwrap_or_default()
}

/// Server numerics arrive as int32, int64, or double depending on version.
fn num_i64(doc: &Document, key: &str) -> i64 {
    match doc.get(key) {
        Some(Bson::Int32(v)) => *v as i64,
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Double(v)) => *v as i64,
        _ => 0,
    }
}

fn num_f64(doc: &Document, key: &str) -> f64 {
    match doc.get(key) {
        Some(Bson::Int32(v)) => *v as f64,
        Some(Bson::Int64(v)) => *v as f64,
        Some(Bson::Double(v)) => *v,
        _ => 0.0,
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_extracts_nested_counters() {
        let status = doc! {
            "uptime": 120.5,
            "connections": { "current": 4i32, "available": 96i64 },
            "opcounters": { "insert": 10i64, "query": 20i32, "update": 5i32, "delete": 1i32 },
            "mem": { "resident": 180i32, "virtual": 2100i32 },
        };
        let db_stats = doc! {
            "collections": 1i32,
            "objects": 1000i64,
            "dataSize": 12345.0,
            "storageSize": 23456i64,
            "indexes": 2i32,
            "indexSize": 512i32,
        };

        let snapshot = build_snapshot(1.0, &status, &db_stats);
        assert_eq!(snapshot.uptime_seconds, 120.5);
        assert_eq!(snapshot.current_connections, 4);
        assert_eq!(snapshot.available_connections, 96);
        assert_eq!(snapshot.op_inserts, 10);
        assert_eq!(snapshot.op_queries, 20);
        assert_eq!(snapshot.objects, 1000);
        assert_eq!(snapshot.data_size_bytes, 12345.0);
        assert_eq!(snapshot.storage_size_bytes, 23456.0);
        assert_eq!(snapshot.index_size_bytes, 512.0);
    }

    #[test]
    fn missing_sections_default_to_zero() {
        let snapshot = build_snapshot(1.0, &Document::new(), &Document::new());
        assert_eq!(snapshot.current_connections, 0);
        assert_eq!(snapshot.op_inserts, 0);
        assert_eq!(snapshot.data_size_bytes, 0.0);
    }
}
