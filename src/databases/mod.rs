//! Thin per-backend CRUD layers over tokio-postgres and the MongoDB driver.

pub mod connection;
pub mod mongodb;
pub mod postgres;

pub use connection::ConnectionPolicy;
pub use mongodb::MongoHandler;
pub use postgres::PostgresHandler;

use crate::error::HandlerError;

/// Score increment applied by the single and bulk update operations.
pub const BULK_SCORE_INCREMENT: f64 = 0.123;
/// Score increment applied inside the transactional test.
pub const TX_SCORE_INCREMENT: f64 = 0.5;
/// Rows/documents at or above this score are updated by the transactional test.
pub const TX_SCORE_THRESHOLD: f64 = 4.0;

/// Why a transaction body stopped: a synthetic error injected to force the
/// rollback path, or a real driver failure.
pub(crate) enum TxAbort {
    Simulated,
    Handler(HandlerError),
}

impl From<tokio_postgres::Error> for TxAbort {
    fn from(e: tokio_postgres::Error) -> Self {
        TxAbort::Handler(e.into())
    }
}

impl From<::mongodb::error::Error> for TxAbort {
    fn from(e: ::mongodb::error::Error) -> Self {
        TxAbort::Handler(e.into())
    }
}

impl From<bson::ser::Error> for TxAbort {
    fn from(e: bson::ser::Error) -> Self {
        TxAbort::Handler(e.into())
    }
}

impl From<bson::document::ValueAccessError> for TxAbort {
    fn from(e: bson::document::ValueAccessError) -> Self {
        TxAbort::Handler(e.into())
    }
}
