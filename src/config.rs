//! Connection configuration, loaded from small JSON files.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found or unreadable: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON in configuration file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Connection parameters for one backend. Immutable once a simulator is
/// built on top of it.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(alias = "dbname")]
    pub database: String,
}

impl DatabaseConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Key/value connection string for tokio-postgres, targeting `dbname`
    /// rather than the configured database. Setup needs this to reach the
    /// maintenance database while dropping/recreating the target.
    pub fn postgres_conn_string_for(&self, dbname: &str) -> String {
        let mut parts = vec![format!("host={}", self.host), format!("port={}", self.port)];
        if let Some(user) = &self.user {
            parts.push(format!("user={user}"));
        }
        if let Some(password) = &self.password {
            parts.push(format!("password={password}"));
        }
        parts.push(format!("dbname={dbname}"));
        parts.join(" ")
    }

    pub fn postgres_conn_string(&self) -> String {
        self.postgres_conn_string_for(&self.database)
    }

    pub fn mongo_uri(&self) -> String {
        match (&self.user, &self.password) {
            (Some(user), Some(password)) => {
                format!("mongodb://{user}:{password}@{}:{}", self.host, self.port)
            }
            _ => format!("mongodb://{}:{}", self.host, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_with_dbname_alias() {
        let config: DatabaseConfig = serde_json::from_str(
            r#"{"host": "localhost", "port": 5432, "user": "postgres",
                "password": "1234", "dbname": "benchmark"}"#,
        )
        .unwrap();
        assert_eq!(config.database, "benchmark");
        assert_eq!(
            config.postgres_conn_string(),
            "host=localhost port=5432 user=postgres password=1234 dbname=benchmark"
        );
    }

    #[test]
    fn mongo_uri_omits_missing_credentials() {
        let config: DatabaseConfig = serde_json::from_str(
            r#"{"host": "localhost", "port": 27017, "database": "benchmark"}"#,
        )
        .unwrap();
        assert_eq!(config.mongo_uri(), "mongodb://localhost:27017");
    }

    #[test]
    fn malformed_json_is_an_error() {
        let result: Result<DatabaseConfig, _> = serde_json::from_str("{not json");
        assert!(result.is_err());
    }
}
