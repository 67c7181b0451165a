//! PostgreSQL handler: CRUD, index, and introspection primitives for the
//! `reviews` table behind a uniform connection-acquisition policy.
//!
//! The whole ID set is materialized in memory by `get_all_review_ids`; this
//! layer is meant for small-to-moderate test datasets, not production scans.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row, Transaction};

use super::connection::ConnectionPolicy;
use super::{TxAbort, BULK_SCORE_INCREMENT, TX_SCORE_INCREMENT, TX_SCORE_THRESHOLD};
use crate::config::DatabaseConfig;
use crate::data::Review;
use crate::error::HandlerError;

const CREATE_REVIEWS_TABLE: &str = "CREATE TABLE IF NOT EXISTS reviews (
    id SERIAL PRIMARY KEY,
    product_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    profile_name TEXT NOT NULL,
    helpfulness TEXT NOT NULL,
    score DOUBLE PRECISION NOT NULL,
    review_time BIGINT NOT NULL,
    summary TEXT NOT NULL,
    review_text TEXT NOT NULL
)";

const INSERT_REVIEW: &str = "INSERT INTO reviews (
    product_id, user_id, profile_name, helpfulness, score, review_time, summary, review_text
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

const SELECT_REVIEW_COLUMNS: &str = "SELECT product_id, user_id, profile_name, helpfulness, \
                                     score, review_time, summary, review_text FROM reviews";

const INSERT_PARAMS_PER_ROW: usize = 8;
/// The extended-query protocol caps a statement at 65535 bind parameters.
const MAX_INSERT_ROWS: usize = u16::MAX as usize / INSERT_PARAMS_PER_ROW;

/// An exclusively-owned connection: the client plus the background task
/// driving it.
struct PgConn {
    client: Client,
    task: JoinHandle<()>,
}

impl Drop for PgConn {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The persistent session. The mutex makes the shared session usable from
/// the concurrent harness at the cost of serializing its operations.
struct PgSession {
    client: Mutex<Client>,
    task: JoinHandle<()>,
}

impl Drop for PgSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct PgPool {
    idle: std::sync::Mutex<Vec<PgConn>>,
    permits: Arc<Semaphore>,
}

/// A leased connection. Dropping the lease releases it even on error paths:
/// pooled connections return to the pool, ephemeral ones close, shared ones
/// are untouched.
enum PgLease {
    Shared(Arc<PgSession>),
    Owned(PgConn),
    Pooled {
        conn: Option<PgConn>,
        pool: Arc<PgPool>,
        _permit: OwnedSemaphorePermit,
    },
}

impl Drop for PgLease {
    fn drop(&mut self) {
        if let PgLease::Pooled { conn, pool, .. } = self {
            if let Some(conn) = conn.take() {
                // A closed client means the backend hung up; recycling it
                // would hand the same dead connection to every later lease.
                if !conn.client.is_closed() {
                    pool.idle.lock().expect("pool mutex poisoned").push(conn);
                }
            }
        }
    }
}

enum ClientRef<'a> {
    Guard(MutexGuard<'a, Client>),
    Plain(&'a Client),
}

impl Deref for ClientRef<'_> {
    type Target = Client;
    fn deref(&self) -> &Client {
        match self {
            ClientRef::Guard(guard) => guard,
            ClientRef::Plain(client) => client,
        }
    }
}

enum ClientMut<'a> {
    Guard(MutexGuard<'a, Client>),
    Plain(&'a mut Client),
}

impl Deref for ClientMut<'_> {
    type Target = Client;
    fn deref(&self) -> &Client {
        match self {
            ClientMut::Guard(guard) => guard,
            ClientMut::Plain(client) => client,
        }
    }
}

impl DerefMut for ClientMut<'_> {
    fn deref_mut(&mut self) -> &mut Client {
        match self {
            ClientMut::Guard(guard) => guard,
            ClientMut::Plain(client) => client,
        }
    }
}

impl PgLease {
    async fn client(&self) -> ClientRef<'_> {
        match self {
            PgLease::Shared(session) => ClientRef::Guard(session.client.lock().await),
            PgLease::Owned(conn) => ClientRef::Plain(&conn.client),
            PgLease::Pooled { conn, .. } => {
                // The slot is only emptied by Drop.
                ClientRef::Plain(&conn.as_ref().expect("lease holds a connection").client)
            }
        }
    }

    async fn client_mut(&mut self) -> ClientMut<'_> {
        match self {
            PgLease::Shared(session) => ClientMut::Guard(session.client.lock().await),
            PgLease::Owned(conn) => ClientMut::Plain(&mut conn.client),
            PgLease::Pooled { conn, .. } => {
                ClientMut::Plain(&mut conn.as_mut().expect("lease holds a connection").client)
            }
        }
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, tokio_postgres::Error> {
        self.client().await.execute(sql, params).await
    }

    async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, tokio_postgres::Error> {
        self.client().await.query(sql, params).await
    }

    async fn query_opt(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<Row>, tokio_postgres::Error> {
        self.client().await.query_opt(sql, params).await
    }

    async fn batch_execute(&self, sql: &str) -> Result<(), tokio_postgres::Error> {
        self.client().await.batch_execute(sql).await
    }
}

pub struct PostgresHandler {
    config: DatabaseConfig,
    policy: ConnectionPolicy,
    session: Mutex<Option<Arc<PgSession>>>,
    pool: Option<Arc<PgPool>>,
}

impl PostgresHandler {
    /// The persistent session and pool connections open lazily on first
    /// use, so a handler can be built before its database exists.
    pub fn new(config: DatabaseConfig, policy: ConnectionPolicy) -> Self {
        let pool = match policy {
            ConnectionPolicy::Pooled { size } => Some(Arc::new(PgPool {
                idle: std::sync::Mutex::new(Vec::new()),
                permits: Arc::new(Semaphore::new(size.max(1))),
            })),
            _ => None,
        };
        PostgresHandler {
            config,
            policy,
            session: Mutex::new(None),
            pool,
        }
    }

    pub fn policy(&self) -> ConnectionPolicy {
        self.policy
    }

    async fn open_raw(&self, dbname: &str) -> Result<(Client, JoinHandle<()>), HandlerError> {
        let conn_str = self.config.postgres_conn_string_for(dbname);
        let (client, connection) = tokio_postgres::connect(&conn_str, NoTls).await?;
        let task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::warn!("postgres connection error: {e}");
            }
        });
        Ok((client, task))
    }

    async fn open(&self, dbname: &str) -> Result<PgConn, HandlerError> {
        let (client, task) = self.open_raw(dbname).await?;
        Ok(PgConn { client, task })
    }

    async fn acquire(&self) -> Result<PgLease, HandlerError> {
        match self.policy {
            ConnectionPolicy::Persistent => {
                let mut slot = self.session.lock().await;
                if slot.is_none() {
                    let (client, task) = self.open_raw(&self.config.database).await?;
                    *slot = Some(Arc::new(PgSession {
                        client: Mutex::new(client),
                        task,
                    }));
                }
                Ok(PgLease::Shared(Arc::clone(
                    slot.as_ref().expect("session was just opened"),
                )))
            }
            ConnectionPolicy::Ephemeral => {
                Ok(PgLease::Owned(self.open(&self.config.database).await?))
            }
            ConnectionPolicy::Pooled { .. } => {
                let pool = Arc::clone(self.pool.as_ref().expect("pooled policy has a pool"));
                let permit = Arc::clone(&pool.permits)
                    .acquire_owned()
                    .await
                    .map_err(|_| HandlerError::Closed)?;
                let idle = pool.idle.lock().expect("pool mutex poisoned").pop();
                let conn = match idle {
                    Some(conn) => conn,
                    None => self.open(&self.config.database).await?,
                };
                Ok(PgLease::Pooled {
                    conn: Some(conn),
                    pool,
                    _permit: permit,
                })
            }
        }
    }

    /// Close the persistent session and drain the pool. The next call on
    /// the handler reconnects.
    pub async fn close(&self) {
        self.session.lock().await.take();
        if let Some(pool) = &self.pool {
            pool.idle.lock().expect("pool mutex poisoned").clear();
        }
    }

    /// Drop and recreate the target database. Destructive, no confirmation.
    /// Goes through the maintenance database and closes any held session
    /// first so the drop is not blocked by our own connection.
    pub async fn create_database(&self) -> Result<(), HandlerError> {
        self.close().await;
        let conn = self.open("postgres").await?;
        conn.client
            .execute(
                &format!("DROP DATABASE IF EXISTS \"{}\"", self.config.database),
                &[],
            )
            .await?;
        conn.client
            .execute(&format!("CREATE DATABASE \"{}\"", self.config.database), &[])
            .await?;
        log::info!("database '{}' dropped and recreated", self.config.database);
        Ok(())
    }

    pub async fn create_reviews_table(&self) -> Result<(), HandlerError> {
        let lease = self.acquire().await?;
        lease.batch_execute(CREATE_REVIEWS_TABLE).await?;
        Ok(())
    }

    /// Drop and recreate the `reviews` table.
    pub async fn reset_reviews_table(&self) -> Result<(), HandlerError> {
        let lease = self.acquire().await?;
        lease.batch_execute("DROP TABLE IF EXISTS reviews").await?;
        lease.batch_execute(CREATE_REVIEWS_TABLE).await?;
        Ok(())
    }

    pub async fn insert_one(&self, review: &Review) -> Result<(), HandlerError> {
        let lease = self.acquire().await?;
        lease.execute(INSERT_REVIEW, &review_params(review)).await?;
        Ok(())
    }

    /// Insert a batch as multi-row statements. Returns the count of rows
    /// the server confirmed, never the attempted count. Batches wider than
    /// the protocol's parameter window are split transparently at
    /// `MAX_INSERT_ROWS` rows per statement.
    pub async fn insert_many(&self, reviews: &[Review]) -> Result<u64, HandlerError> {
        if reviews.is_empty() {
            return Ok(0);
        }
        let lease = self.acquire().await?;
        let mut confirmed = 0;
        for chunk in reviews.chunks(MAX_INSERT_ROWS) {
            let sql = multi_row_insert_sql(chunk.len());
            let mut params: Vec<&(dyn ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * INSERT_PARAMS_PER_ROW);
            for review in chunk {
                params.extend_from_slice(&review_params(review));
            }
            confirmed += lease.execute(&sql, &params).await?;
        }
        Ok(confirmed)
    }

    /// Apply the fixed score increment to one row. Returns rows affected.
    pub async fn update_one(&self, id: i32) -> Result<u64, HandlerError> {
        let lease = self.acquire().await?;
        let sql =
            format!("UPDATE reviews SET score = score + {BULK_SCORE_INCREMENT} WHERE id = $1");
        Ok(lease.execute(&sql, &[&id]).await?)
    }

    /// One statement over the whole ID batch via `id = ANY($1)`.
    pub async fn update_many_bulk(&self, ids: &[i32]) -> Result<u64, HandlerError> {
        let lease = self.acquire().await?;
        let sql =
            format!("UPDATE reviews SET score = score + {BULK_SCORE_INCREMENT} WHERE id = ANY($1)");
        Ok(lease.execute(&sql, &[&ids]).await?)
    }

    pub async fn delete_one(&self, id: i32) -> Result<u64, HandlerError> {
        let lease = self.acquire().await?;
        Ok(lease
            .execute("DELETE FROM reviews WHERE id = $1", &[&id])
            .await?)
    }

    pub async fn delete_many_bulk(&self, ids: &[i32]) -> Result<u64, HandlerError> {
        let lease = self.acquire().await?;
        Ok(lease
            .execute("DELETE FROM reviews WHERE id = ANY($1)", &[&ids])
            .await?)
    }

    /// Equality scan on one column. The column name is interpolated, so it
    /// must come from the fixed schema, never from input data.
    pub async fn find_by_column(&self, column: &str, value: &str) -> Result<Vec<Review>, HandlerError> {
        let lease = self.acquire().await?;
        let sql = format!("{SELECT_REVIEW_COLUMNS} WHERE {column} = $1");
        let rows = lease.query(&sql, &[&value]).await?;
        Ok(rows.iter().map(review_from_row).collect())
    }

    pub async fn create_single_column_index(&self, column: &str) -> Result<(), HandlerError> {
        let lease = self.acquire().await?;
        lease
            .batch_execute(&format!(
                "CREATE INDEX IF NOT EXISTS reviews_{column}_idx ON reviews ({column})"
            ))
            .await?;
        Ok(())
    }

    pub async fn create_compound_index(&self, columns: &[&str]) -> Result<(), HandlerError> {
        let lease = self.acquire().await?;
        lease
            .batch_execute(&format!(
                "CREATE INDEX IF NOT EXISTS reviews_{}_idx ON reviews ({})",
                columns.join("_"),
                columns.join(", ")
            ))
            .await?;
        Ok(())
    }

    pub async fn is_empty(&self) -> Result<bool, HandlerError> {
        Ok(self.count_reviews().await? == 0)
    }

    pub async fn count_reviews(&self) -> Result<i64, HandlerError> {
        let lease = self.acquire().await?;
        let rows = lease.query("SELECT COUNT(*) FROM reviews", &[]).await?;
        Ok(rows[0].get(0))
    }

    /// Full primary-key scan, materialized in memory.
    pub async fn get_all_review_ids(&self) -> Result<Vec<i32>, HandlerError> {
        let lease = self.acquire().await?;
        let rows = lease.query("SELECT id FROM reviews", &[]).await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    pub async fn get_review_by_id(&self, id: i32) -> Result<Option<Review>, HandlerError> {
        let lease = self.acquire().await?;
        let sql = format!("{SELECT_REVIEW_COLUMNS} WHERE id = $1");
        let row = lease.query_opt(&sql, &[&id]).await?;
        Ok(row.map(|row| review_from_row(&row)))
    }

    /// Run the transactional scenario: batch insert, then a per-row score
    /// bump for rows at or above the threshold, as one atomic unit. Returns
    /// true on commit, false when the simulated error forced a rollback.
    pub async fn run_transaction(
        &self,
        reviews: &[Review],
        simulate_error: bool,
    ) -> Result<bool, HandlerError> {
        let mut lease = self.acquire().await?;
        let mut client = lease.client_mut().await;
        let tx = client.transaction().await?;

        match transaction_body(&tx, reviews, simulate_error).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(true)
            }
            Err(TxAbort::Simulated) => {
                tx.rollback().await?;
                log::warn!(
                    "transaction failed: simulated error for rollback test; rolled back changes"
                );
                Ok(false)
            }
            // Dropping the transaction rolls it back.
            Err(TxAbort::Handler(e)) => Err(e),
        }
    }
}

async fn transaction_body(
    tx: &Transaction<'_>,
    reviews: &[Review],
    simulate_error: bool,
) -> Result<(), TxAbort> {
    for review in reviews {
        tx.execute(INSERT_REVIEW, &review_params(review)).await?;
    }

    let select = format!("SELECT id FROM reviews WHERE score >= {TX_SCORE_THRESHOLD}");
    let rows = tx.query(&select, &[]).await?;
    let update =
        format!("UPDATE reviews SET score = score + {TX_SCORE_INCREMENT} WHERE id = $1");
    for row in &rows {
        let id: i32 = row.get(0);
        tx.execute(&update, &[&id]).await?;
    }

    if simulate_error {
        return Err(TxAbort::Simulated);
    }
    Ok(())
}

fn multi_row_insert_sql(rows: usize) -> String {
    let mut sql = String::from(
        "INSERT INTO reviews (product_id, user_id, profile_name, helpfulness, \
         score, review_time, summary, review_text) VALUES ",
    );
    for row in 0..rows {
        if row > 0 {
            sql.push(',');
        }
        let base = row * INSERT_PARAMS_PER_ROW;
        sql.push('(');
        for offset in 1..=INSERT_PARAMS_PER_ROW {
            if offset > 1 {
                sql.push(',');
            }
            sql.push_str(&format!("${}", base + offset));
        }
        sql.push(')');
    }
    sql
}

fn review_params(review: &Review) -> [&(dyn ToSql + Sync); 8] {
    [
        &review.product_id,
        &review.user_id,
        &review.profile_name,
        &review.helpfulness,
        &review.score,
        &review.review_time,
        &review.summary,
        &review.review_text,
    ]
}

fn review_from_row(row: &Row) -> Review {
    Review {
        product_id: row.get("product_id"),
        user_id: row.get("user_id"),
        profile_name: row.get("profile_name"),
        helpfulness: row.get("helpfulness"),
        score: row.get("score"),
        review_time: row.get("review_time"),
        summary: row.get("summary"),
        review_text: row.get("review_text"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_chunks_stay_within_the_parameter_window() {
        assert!(MAX_INSERT_ROWS * INSERT_PARAMS_PER_ROW <= u16::MAX as usize);
        let sql = multi_row_insert_sql(MAX_INSERT_ROWS);
        let highest = format!("${})", MAX_INSERT_ROWS * INSERT_PARAMS_PER_ROW);
        assert!(sql.ends_with(&highest));
    }

    #[test]
    fn multi_row_insert_numbers_placeholders_per_row() {
        let sql = multi_row_insert_sql(2);
        assert!(sql.contains("($1,$2,$3,$4,$5,$6,$7,$8)"));
        assert!(sql.ends_with("($9,$10,$11,$12,$13,$14,$15,$16)"));
    }

    #[test]
    fn oversized_batches_split_at_the_ceiling() {
        let total = 10_000;
        let chunks: Vec<usize> = (0..total)
            .collect::<Vec<usize>>()
            .chunks(MAX_INSERT_ROWS)
            .map(|c| c.len())
            .collect();
        assert_eq!(chunks.iter().sum::<usize>(), total);
        assert!(chunks.iter().all(|len| *len <= MAX_INSERT_ROWS));
        assert!(chunks.len() > 1);
    }
}
