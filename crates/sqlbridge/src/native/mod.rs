//! Native driver seam.
//!
//! A [`NativeDriver`] opens physical connections; a [`NativeConnection`] is
//! one of them. Sessions only ever talk to these traits, so the vendor
//! client (tokio-postgres, an in-memory recorder, ...) is swappable.
//!
//! Statements are addressed by [`StatementId`] handles owned by the
//! connection. Parameters use `?` placeholders; drivers that need another
//! placeholder style rewrite them.
//!
//! - [`memory`]: in-memory recording driver
//! - [`pool`]: bb8 pooling of native connections

pub mod memory;
pub mod pool;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::value::{Row, SqlValue};
use crate::error::DbError;
use crate::typemap::NativeColumn;

pub use memory::{MemoryDatabase, MemoryDriver};
pub use pool::{ConnectionLease, ConnectionPools, NativeConnectionManager};

/// Handle of a prepared statement on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(pub u64);

impl StatementId {
    /// Id reported for SQL executed without preparing it. Drivers hand out
    /// prepared ids from 1.
    pub const DIRECT: StatementId = StatementId(0);
}

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stmt#{}", self.0)
    }
}

/// Everything a driver needs to open a connection.
#[derive(Clone, Default)]
pub struct ConnectRequest {
    pub url: String,
    pub username: String,
    /// Clear-text password.
    pub password: String,
    /// Driver properties (pool properties excluded).
    pub properties: BTreeMap<String, String>,
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("properties", &self.properties)
            .finish()
    }
}

/// What went wrong inside a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeErrorKind {
    /// Could not reach or keep the server.
    Connection,
    /// A single statement failed.
    Statement,
    /// A batch failed part way; see `update_counts`.
    Batch,
    /// The driver does not implement the requested feature.
    Unsupported,
    /// The statement was cancelled.
    Cancelled,
}

/// Error reported by a native driver.
///
/// Batch failures carry the per-row update counts and may chain further
/// errors through `next`.
#[derive(Debug, Clone)]
pub struct NativeError {
    pub kind: NativeErrorKind,
    pub message: String,
    pub sql_state: Option<String>,
    pub update_counts: Option<Vec<i64>>,
    pub next: Option<Box<NativeError>>,
}

impl NativeError {
    pub fn new(kind: NativeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sql_state: None,
            update_counts: None,
            next: None,
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(NativeErrorKind::Connection, message)
    }

    pub fn statement(message: impl Into<String>) -> Self {
        Self::new(NativeErrorKind::Statement, message)
    }

    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::new(
            NativeErrorKind::Unsupported,
            format!("{} is not supported by this driver", feature.into()),
        )
    }

    pub fn batch(message: impl Into<String>, update_counts: Vec<i64>) -> Self {
        Self {
            update_counts: Some(update_counts),
            ..Self::new(NativeErrorKind::Batch, message)
        }
    }

    pub fn with_sql_state(mut self, state: impl Into<String>) -> Self {
        self.sql_state = Some(state.into());
        self
    }

    pub fn chain(mut self, next: NativeError) -> Self {
        self.next = Some(Box::new(next));
        self
    }

    pub fn is_unsupported(&self) -> bool {
        self.kind == NativeErrorKind::Unsupported
    }

    /// Messages of this error and every chained error, in order.
    pub fn messages(&self) -> Vec<String> {
        let mut out = vec![self.message.clone()];
        let mut next = self.next.as_deref();
        while let Some(err) = next {
            out.push(err.message.clone());
            next = err.next.as_deref();
        }
        out
    }

    /// Convert into a [`DbError`] for `sql`, preserving batch details.
    pub fn into_db_error(self, sql: &str) -> DbError {
        match self.kind {
            NativeErrorKind::Batch => DbError::BatchExecution {
                message: self.message.clone(),
                causes: self.messages().into_iter().skip(1).collect(),
                update_counts: self.update_counts,
            },
            NativeErrorKind::Connection => DbError::connection(self.message, sql),
            _ => DbError::execution(sql, self.message),
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql_state {
            Some(state) => write!(f, "[{}] {}", state, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for NativeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.next
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Fetch hints for a query.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    /// Driver fetch size; `i32::MIN` asks MySQL-family drivers to stream.
    pub fetch_size: Option<i32>,
    pub max_rows: Option<u64>,
}

/// Rows and their description.
#[derive(Debug, Clone, Default)]
pub struct NativeResultSet {
    pub columns: Vec<NativeColumn>,
    pub rows: Vec<Row>,
}

/// Outcome of executing raw SQL text.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOutcome {
    /// Rows affected, for statements that modify data.
    pub update_count: Option<u64>,
    /// Rows returned, for statements that produce a result.
    pub result: Option<NativeResultSet>,
}

/// Cancels statements without holding the connection.
#[async_trait]
pub trait CancelHandle: Send + Sync {
    async fn cancel(&self, statement: StatementId) -> NativeResult<()>;
}

/// Opens physical connections.
#[async_trait]
pub trait NativeDriver: Send + Sync {
    /// Driver name for logs.
    fn name(&self) -> &str;

    async fn connect(&self, request: &ConnectRequest) -> NativeResult<Box<dyn NativeConnection>>;
}

/// One physical connection.
#[async_trait]
pub trait NativeConnection: Send {
    /// Switch auto-commit; turning it on commits any open transaction.
    async fn set_auto_commit(&mut self, on: bool) -> NativeResult<()>;

    fn auto_commit(&self) -> bool;

    fn supports_batch_updates(&self) -> bool {
        true
    }

    /// Prepare `sql`. With `return_generated_keys`, inserts report generated keys.
    async fn prepare(&mut self, sql: &str, return_generated_keys: bool) -> NativeResult<StatementId>;

    /// Describe the result columns of a prepared statement without executing it.
    async fn describe(&mut self, statement: StatementId) -> NativeResult<Vec<NativeColumn>>;

    async fn execute_update(&mut self, statement: StatementId, params: &[SqlValue]) -> NativeResult<u64>;

    async fn add_batch(&mut self, statement: StatementId, params: &[SqlValue]) -> NativeResult<()>;

    /// Run all queued parameter sets; returns one update count per set.
    async fn execute_batch(&mut self, statement: StatementId) -> NativeResult<Vec<i64>>;

    async fn clear_batch(&mut self, statement: StatementId) -> NativeResult<()>;

    /// Keys generated by the last execution of `statement`.
    async fn generated_keys(&mut self, _statement: StatementId) -> NativeResult<Vec<Row>> {
        Err(NativeError::unsupported("generated keys"))
    }

    async fn query(
        &mut self,
        statement: StatementId,
        params: &[SqlValue],
        options: &QueryOptions,
    ) -> NativeResult<NativeResultSet>;

    /// Execute SQL text directly.
    async fn execute(&mut self, sql: &str) -> NativeResult<ExecuteOutcome>;

    async fn close_statement(&mut self, statement: StatementId) -> NativeResult<()>;

    async fn commit(&mut self) -> NativeResult<()>;

    async fn rollback(&mut self) -> NativeResult<()>;

    async fn set_savepoint(&mut self, name: &str) -> NativeResult<()>;

    async fn release_savepoint(&mut self, name: &str) -> NativeResult<()>;

    async fn rollback_to_savepoint(&mut self, name: &str) -> NativeResult<()>;

    fn cancel_handle(&self) -> Arc<dyn CancelHandle>;

    /// Cheap liveness probe.
    async fn is_valid(&mut self) -> bool;

    fn is_closed(&self) -> bool;

    async fn close(&mut self) -> NativeResult<()>;
}

/// Cancel handle for drivers that cannot cancel.
#[derive(Debug, Default)]
pub struct NoCancel;

#[async_trait]
impl CancelHandle for NoCancel {
    async fn cancel(&self, _statement: StatementId) -> NativeResult<()> {
        Err(NativeError::unsupported("statement cancellation"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_error_conversion() {
        let err = NativeError::batch("row 3 violates unique key", vec![1, 1, -3])
            .chain(NativeError::statement("duplicate key value"));
        assert_eq!(err.messages().len(), 2);

        match err.into_db_error("INSERT INTO t VALUES (?)") {
            DbError::BatchExecution {
                update_counts,
                causes,
                ..
            } => {
                assert_eq!(update_counts, Some(vec![1, 1, -3]));
                assert_eq!(causes, vec!["duplicate key value".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_connect_request_hides_password() {
        let req = ConnectRequest {
            url: "postgresql://h/d".into(),
            username: "u".into(),
            password: "secret".into(),
            properties: BTreeMap::new(),
        };
        assert!(!format!("{:?}", req).contains("secret"));
    }

    #[test]
    fn test_display_with_sql_state() {
        let err = NativeError::statement("boom").with_sql_state("42P01");
        assert_eq!(err.to_string(), "[42P01] boom");
    }
}
