//! Error taxonomy for the benchmark harness.
//!
//! Handlers surface driver failures as `HandlerError` so callers can tell
//! "zero work done because of an error" from "zero work because there was
//! nothing to do". State-invariant violations are always fatal to the
//! scenario that hit them.

use thiserror::Error;

/// A failure at the handler boundary: the underlying driver rejected or
/// could not complete an operation.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("postgres driver error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("mongodb driver error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("bson serialization error: {0}")]
    BsonSer(#[from] bson::ser::Error),

    #[error("bson deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),

    #[error("document missing expected field: {0}")]
    DocumentShape(#[from] bson::document::ValueAccessError),

    #[error("handler is closed")]
    Closed,
}

/// A simulator-state invariant was violated before a scenario could start.
#[derive(Debug, Error)]
pub enum StateError {
    #[error(
        "validation failed for '{action}': expected inserted={expected_inserted}, \
         modified=0, deleted=0, but state is inserted={inserted}, \
         modified={modified}, deleted={deleted}"
    )]
    InvariantViolated {
        action: &'static str,
        expected_inserted: u64,
        inserted: u64,
        modified: u64,
        deleted: u64,
    },
}

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Handler(#[from] HandlerError),
}
