//! PostgreSQL statistics fetcher over `pg_stat_database`.
//!
//! The commit-rate delta state lives on the fetcher instance, not in
//! process-wide globals; `reset` clears it explicitly.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio_postgres::NoTls;

use crate::config::DatabaseConfig;
use crate::error::HandlerError;

const PG_STAT_DATABASE: &str = "SELECT
    numbackends,
    xact_commit,
    xact_rollback,
    blks_read,
    blks_hit,
    tup_returned,
    tup_fetched,
    tup_inserted,
    tup_updated,
    tup_deleted,
    conflicts,
    temp_files,
    temp_bytes,
    deadlocks
FROM pg_stat_database
WHERE datname = $1";

/// One poll of `pg_stat_database`, keyed by metric name when serialized.
#[derive(Debug, Clone, Serialize)]
pub struct PostgresMetricsSnapshot {
    pub timestamp: f64,
    pub active_connections: i32,
    pub xact_commit: i64,
    pub xact_rollback: i64,
    pub blks_read: i64,
    pub blks_hit: i64,
    pub tup_returned: i64,
    pub tup_fetched: i64,
    pub tup_inserted: i64,
    pub tup_updated: i64,
    pub tup_deleted: i64,
    pub conflicts: i64,
    pub temp_files: i64,
    pub temp_bytes: i64,
    pub deadlocks: i64,
    /// Derived from the previous poll; absent on the first fetch.
    pub commits_per_second: Option<f64>,
}

pub struct PostgresMetricsFetcher {
    config: DatabaseConfig,
    previous_xact_commit: Option<i64>,
    previous_timestamp: Option<f64>,
}

impl PostgresMetricsFetcher {
    pub fn new(config: DatabaseConfig) -> Self {
        PostgresMetricsFetcher {
            config,
            previous_xact_commit: None,
            previous_timestamp: None,
        }
    }

    /// Forget the previous poll; the next fetch reports no commit rate.
    pub fn reset(&mut self) {
        self.previous_xact_commit = None;
        self.previous_timestamp = None;
    }

    /// Poll the statistics view over a fresh connection.
    pub async fn fetch(&mut self) -> Result<PostgresMetricsSnapshot, HandlerError> {
        let (client, connection) =
            tokio_postgres::connect(&self.config.postgres_conn_string(), NoTls).await?;
        let task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::warn!("postgres metrics connection error: {e}");
            }
        });

        let row = client.query_one(PG_STAT_DATABASE, &[&self.config.database]).await?;
        task.abort();

        let timestamp = unix_now();
        let xact_commit: i64 = row.get("xact_commit");
        let commits_per_second = commit_rate(
            self.previous_xact_commit.zip(self.previous_timestamp),
            (xact_commit, timestamp),
        );
        self.previous_xact_commit = Some(xact_commit);
        self.previous_timestamp = Some(timestamp);

        Ok(PostgresMetricsSnapshot {
            timestamp,
            active_connections: row.get("numbackends"),
            xact_commit,
            xact_rollback: row.get("xact_rollback"),
            blks_read: row.get("blks_read"),
            blks_hit: row.get("blks_hit"),
            tup_returned: row.get("tup_returned"),
            tup_fetched: row.get("tup_fetched"),
            tup_inserted: row.get("tup_inserted"),
            tup_updated: row.get("tup_updated"),
            tup_deleted: row.get("tup_deleted"),
            conflicts: row.get("conflicts"),
            temp_files: row.get("temp_files"),
            temp_bytes: row.get("temp_bytes"),
            deadlocks: row.get("deadlocks"),
            commits_per_second,
        })
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn commit_rate(previous: Option<(i64, f64)>, current: (i64, f64)) -> Option<f64> {
    let (prev_commits, prev_ts) = previous?;
    let (commits, ts) = current;
    let dt = ts - prev_ts;
    if dt <= 0.0 {
        return None;
    }
    Some((commits - prev_commits) as f64 / dt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_rate_without_a_previous_poll() {
        assert_eq!(commit_rate(None, (100, 10.0)), None);
    }

    #[test]
    fn rate_is_commit_delta_over_elapsed_time() {
        assert_eq!(commit_rate(Some((100, 10.0)), (150, 20.0)), Some(5.0));
    }

    #[test]
    fn no_rate_for_non_advancing_clock() {
        assert_eq!(commit_rate(Some((100, 10.0)), (150, 10.0)), None);
        assert_eq!(commit_rate(Some((100, 10.0)), (150, 9.0)), None);
    }

    #[test]
    fn reset_clears_delta_state() {
        let config: DatabaseConfig = serde_json::from_str(
            r#"{"host": "localhost", "port": 5432, "database": "benchmark"}"#,
        )
        .unwrap();
        let mut fetcher = PostgresMetricsFetcher::new(config);
        fetcher.previous_xact_commit = Some(10);
        fetcher.previous_timestamp = Some(1.0);
        fetcher.reset();
        assert_eq!(fetcher.previous_xact_commit, None);
        assert_eq!(fetcher.previous_timestamp, None);
    }
}
