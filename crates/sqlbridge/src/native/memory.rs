//! In-memory recording driver.
//!
//! [`MemoryDatabase`] stands in for a server: it records every statement,
//! keeps written rows pending until commit, and answers queries from canned
//! result sets. Failures (statement errors, partial batches, failing
//! commits) can be injected. All connections opened through one
//! [`MemoryDriver`] share the same database, so committed writes are
//! visible across connections.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::core::value::{Row, SqlValue};
use crate::error::EXECUTE_FAILED;
use crate::typemap::NativeColumn;

use super::{
    CancelHandle, ConnectRequest, ExecuteOutcome, NativeConnection, NativeDriver, NativeError,
    NativeResult, NativeResultSet, QueryOptions, StatementId,
};

/// A write that reached the database.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Counters kept by a [`MemoryDatabase`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub connections_opened: usize,
    pub connections_closed: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub batches_executed: usize,
    pub updates_executed: usize,
    pub queries_executed: usize,
    pub savepoints_set: usize,
    pub savepoints_released: usize,
    pub savepoints_rolled_back: usize,
    pub cancels: usize,
}

#[derive(Debug)]
struct BatchFailure {
    row: usize,
    message: String,
}

#[derive(Debug)]
struct DatabaseState {
    stats: MemoryStats,
    committed: Vec<RecordedWrite>,
    executed: Vec<String>,
    results: Vec<(String, NativeResultSet)>,
    failures: Vec<(String, String)>,
    batch_failure: Option<BatchFailure>,
    commit_failure: Option<String>,
    connect_failure: Option<String>,
    stall: Option<(String, Arc<Notify>)>,
    supports_batch: bool,
    supports_generated_keys: bool,
    next_key: i64,
    open_connections: usize,
    last_connect: Option<ConnectRequest>,
}

impl Default for DatabaseState {
    fn default() -> Self {
        Self {
            stats: MemoryStats::default(),
            committed: Vec::new(),
            executed: Vec::new(),
            results: Vec::new(),
            failures: Vec::new(),
            batch_failure: None,
            commit_failure: None,
            connect_failure: None,
            stall: None,
            supports_batch: true,
            supports_generated_keys: true,
            next_key: 1,
            open_connections: 0,
            last_connect: None,
        }
    }
}

impl DatabaseState {
    fn failure_for(&self, sql: &str) -> Option<NativeError> {
        let lower = sql.to_lowercase();
        self.failures
            .iter()
            .find(|(fragment, _)| lower.contains(fragment.as_str()))
            .map(|(_, message)| NativeError::statement(message.clone()))
    }

    fn result_for(&self, sql: &str) -> NativeResultSet {
        let lower = sql.to_lowercase();
        self.results
            .iter()
            .find(|(fragment, _)| lower.contains(fragment.as_str()))
            .map(|(_, rs)| rs.clone())
            .unwrap_or_default()
    }
}

/// Shared in-memory database.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<DatabaseState>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DatabaseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Driver whose connections use this database.
    pub fn driver(&self) -> MemoryDriver {
        MemoryDriver { db: self.clone() }
    }

    /// Connections report no batch support.
    pub fn without_batch_support(self) -> Self {
        self.state().supports_batch = false;
        self
    }

    /// Preparing with generated keys fails as unsupported.
    pub fn without_generated_keys(self) -> Self {
        self.state().supports_generated_keys = false;
        self
    }

    /// Answer queries whose text contains `fragment` (case-insensitive).
    pub fn on_query(&self, fragment: &str, result: NativeResultSet) {
        self.state().results.push((fragment.to_lowercase(), result));
    }

    /// Fail statements whose text contains `fragment` (case-insensitive).
    pub fn fail_on(&self, fragment: &str, message: &str) {
        self.state()
            .failures
            .push((fragment.to_lowercase(), message.to_string()));
    }

    /// Make the next batch fail at zero-based `row`.
    pub fn fail_batch_at(&self, row: usize, message: &str) {
        self.state().batch_failure = Some(BatchFailure {
            row,
            message: message.to_string(),
        });
    }

    /// Make every commit fail.
    pub fn fail_commits(&self, message: &str) {
        self.state().commit_failure = Some(message.to_string());
    }

    /// Hold statements whose text contains `fragment` until they are
    /// cancelled; a cancelled statement fails.
    pub fn stall_on(&self, fragment: &str) {
        self.state().stall = Some((fragment.to_lowercase(), Arc::new(Notify::new())));
    }

    /// Make every connect attempt fail.
    pub fn fail_connect(&self, message: &str) {
        self.state().connect_failure = Some(message.to_string());
    }

    pub fn stats(&self) -> MemoryStats {
        self.state().stats.clone()
    }

    /// Writes that were committed, in commit order.
    pub fn committed(&self) -> Vec<RecordedWrite> {
        self.state().committed.clone()
    }

    /// Every statement text that was executed, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    pub fn open_connections(&self) -> usize {
        self.state().open_connections
    }

    /// The most recent connect request.
    pub fn last_connect(&self) -> Option<ConnectRequest> {
        self.state().last_connect.clone()
    }
}

/// Driver backed by a [`MemoryDatabase`].
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    db: MemoryDatabase,
}

impl MemoryDriver {
    pub fn new(db: MemoryDatabase) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &MemoryDatabase {
        &self.db
    }
}

#[async_trait]
impl NativeDriver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self, request: &ConnectRequest) -> NativeResult<Box<dyn NativeConnection>> {
        let supports_batch = {
            let mut state = self.db.state();
            state.last_connect = Some(request.clone());
            if let Some(message) = &state.connect_failure {
                return Err(NativeError::connection(message.clone()));
            }
            state.stats.connections_opened += 1;
            state.open_connections += 1;
            state.supports_batch
        };

        Ok(Box::new(MemoryConnection {
            db: self.db.clone(),
            statements: HashMap::new(),
            next_statement: 1,
            auto_commit: true,
            supports_batch,
            pending: Vec::new(),
            savepoints: Vec::new(),
            closed: false,
        }))
    }
}

#[derive(Debug)]
struct MemoryStatement {
    sql: String,
    return_keys: bool,
    batch: Vec<Vec<SqlValue>>,
    last_keys: Vec<Row>,
}

/// Connection to a [`MemoryDatabase`].
#[derive(Debug)]
pub struct MemoryConnection {
    db: MemoryDatabase,
    statements: HashMap<u64, MemoryStatement>,
    next_statement: u64,
    auto_commit: bool,
    supports_batch: bool,
    pending: Vec<RecordedWrite>,
    savepoints: Vec<(String, usize)>,
    closed: bool,
}

impl MemoryConnection {
    fn check_open(&self) -> NativeResult<()> {
        if self.closed {
            Err(NativeError::connection("connection is closed"))
        } else {
            Ok(())
        }
    }

    fn statement(&mut self, id: StatementId) -> NativeResult<&mut MemoryStatement> {
        self.statements
            .get_mut(&id.0)
            .ok_or_else(|| NativeError::statement(format!("unknown statement {}", id)))
    }

    fn write(&mut self, sql: &str, params: Vec<SqlValue>) {
        let record = RecordedWrite {
            sql: sql.to_string(),
            params,
        };
        if self.auto_commit {
            self.db.state().committed.push(record);
        } else {
            self.pending.push(record);
        }
    }
}

fn is_query(sql: &str) -> bool {
    let head = sql.trim_start().to_uppercase();
    head.starts_with("SELECT") || head.starts_with("WITH") || head.starts_with("VALUES")
}

fn is_write(sql: &str) -> bool {
    let head = sql.trim_start().to_uppercase();
    ["INSERT", "UPDATE", "DELETE", "MERGE", "UPSERT"]
        .iter()
        .any(|kw| head.starts_with(kw))
}

#[derive(Debug)]
struct MemoryCancel {
    db: MemoryDatabase,
}

#[async_trait]
impl CancelHandle for MemoryCancel {
    async fn cancel(&self, _statement: StatementId) -> NativeResult<()> {
        let mut state = self.db.state();
        state.stats.cancels += 1;
        if let Some((_, stalled)) = &state.stall {
            stalled.notify_one();
        }
        Ok(())
    }
}

#[async_trait]
impl NativeConnection for MemoryConnection {
    async fn set_auto_commit(&mut self, on: bool) -> NativeResult<()> {
        self.check_open()?;
        if on && !self.auto_commit && !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            self.db.state().committed.extend(pending);
        }
        self.auto_commit = on;
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn supports_batch_updates(&self) -> bool {
        self.supports_batch
    }

    async fn prepare(&mut self, sql: &str, return_generated_keys: bool) -> NativeResult<StatementId> {
        self.check_open()?;
        {
            let state = self.db.state();
            if return_generated_keys && !state.supports_generated_keys {
                return Err(NativeError::unsupported("generated keys"));
            }
            if let Some(err) = state.failure_for(sql) {
                return Err(err);
            }
        }

        let id = self.next_statement;
        self.next_statement += 1;
        self.statements.insert(
            id,
            MemoryStatement {
                sql: sql.to_string(),
                return_keys: return_generated_keys,
                batch: Vec::new(),
                last_keys: Vec::new(),
            },
        );
        Ok(StatementId(id))
    }

    async fn describe(&mut self, statement: StatementId) -> NativeResult<Vec<NativeColumn>> {
        let sql = self.statement(statement)?.sql.clone();
        Ok(self.db.state().result_for(&sql).columns)
    }

    async fn execute_update(&mut self, statement: StatementId, params: &[SqlValue]) -> NativeResult<u64> {
        self.check_open()?;
        let (sql, return_keys) = {
            let stmt = self.statement(statement)?;
            (stmt.sql.clone(), stmt.return_keys)
        };
        {
            let mut state = self.db.state();
            if let Some(err) = state.failure_for(&sql) {
                return Err(err);
            }
            state.stats.updates_executed += 1;
            state.executed.push(sql.clone());
        }
        self.write(&sql, params.to_vec());

        if return_keys {
            let key = {
                let mut state = self.db.state();
                let key = state.next_key;
                state.next_key += 1;
                key
            };
            self.statement(statement)?.last_keys = vec![vec![SqlValue::Integer(key)]];
        }
        Ok(1)
    }

    async fn add_batch(&mut self, statement: StatementId, params: &[SqlValue]) -> NativeResult<()> {
        self.check_open()?;
        if !self.supports_batch {
            return Err(NativeError::unsupported("batch updates"));
        }
        self.statement(statement)?.batch.push(params.to_vec());
        Ok(())
    }

    async fn execute_batch(&mut self, statement: StatementId) -> NativeResult<Vec<i64>> {
        self.check_open()?;
        let (sql, rows) = {
            let stmt = self.statement(statement)?;
            (stmt.sql.clone(), std::mem::take(&mut stmt.batch))
        };

        let failure = {
            let mut state = self.db.state();
            state.executed.push(sql.clone());
            match state.batch_failure.take() {
                Some(f) if f.row < rows.len() => Some(f),
                other => {
                    state.batch_failure = other;
                    state.stats.batches_executed += 1;
                    None
                }
            }
        };

        match failure {
            Some(failure) => {
                let mut counts = vec![1; failure.row];
                counts.resize(rows.len(), EXECUTE_FAILED);
                for params in rows.into_iter().take(failure.row) {
                    self.write(&sql, params);
                }
                Err(NativeError::batch(
                    format!("Batch entry {} failed", failure.row),
                    counts,
                )
                .chain(NativeError::statement(failure.message)))
            }
            None => {
                let counts = vec![1; rows.len()];
                for params in rows {
                    self.write(&sql, params);
                }
                Ok(counts)
            }
        }
    }

    async fn clear_batch(&mut self, statement: StatementId) -> NativeResult<()> {
        self.statement(statement)?.batch.clear();
        Ok(())
    }

    async fn generated_keys(&mut self, statement: StatementId) -> NativeResult<Vec<Row>> {
        let stmt = self.statement(statement)?;
        if !stmt.return_keys {
            return Err(NativeError::statement("statement was not prepared to return keys"));
        }
        Ok(stmt.last_keys.clone())
    }

    async fn query(
        &mut self,
        statement: StatementId,
        _params: &[SqlValue],
        options: &QueryOptions,
    ) -> NativeResult<NativeResultSet> {
        self.check_open()?;
        let sql = self.statement(statement)?.sql.clone();
        let mut state = self.db.state();
        if let Some(err) = state.failure_for(&sql) {
            return Err(err);
        }
        state.stats.queries_executed += 1;
        state.executed.push(sql.clone());
        let mut result = state.result_for(&sql);
        if let Some(max) = options.max_rows {
            result.rows.truncate(max as usize);
        }
        Ok(result)
    }

    async fn execute(&mut self, sql: &str) -> NativeResult<ExecuteOutcome> {
        self.check_open()?;
        let stalled = {
            let state = self.db.state();
            state
                .stall
                .as_ref()
                .filter(|(fragment, _)| sql.to_lowercase().contains(fragment.as_str()))
                .map(|(_, notify)| notify.clone())
        };
        if let Some(stalled) = stalled {
            stalled.notified().await;
            return Err(NativeError::statement("canceling statement due to user request"));
        }

        let result = {
            let mut state = self.db.state();
            if let Some(err) = state.failure_for(sql) {
                return Err(err);
            }
            state.executed.push(sql.to_string());
            if is_query(sql) {
                state.stats.queries_executed += 1;
                Some(state.result_for(sql))
            } else {
                state.stats.updates_executed += 1;
                None
            }
        };

        if let Some(result) = result {
            return Ok(ExecuteOutcome {
                update_count: None,
                result: Some(result),
            });
        }
        let count = if is_write(sql) {
            self.write(sql, Vec::new());
            1
        } else {
            0
        };
        Ok(ExecuteOutcome {
            update_count: Some(count),
            result: None,
        })
    }

    async fn close_statement(&mut self, statement: StatementId) -> NativeResult<()> {
        self.statements.remove(&statement.0);
        Ok(())
    }

    async fn commit(&mut self) -> NativeResult<()> {
        self.check_open()?;
        let mut state = self.db.state();
        if let Some(message) = &state.commit_failure {
            return Err(NativeError::statement(message.clone()));
        }
        state.stats.commits += 1;
        state.committed.append(&mut self.pending);
        self.savepoints.clear();
        Ok(())
    }

    async fn rollback(&mut self) -> NativeResult<()> {
        self.check_open()?;
        self.pending.clear();
        self.savepoints.clear();
        self.db.state().stats.rollbacks += 1;
        Ok(())
    }

    async fn set_savepoint(&mut self, name: &str) -> NativeResult<()> {
        self.check_open()?;
        self.savepoints.push((name.to_string(), self.pending.len()));
        self.db.state().stats.savepoints_set += 1;
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> NativeResult<()> {
        let pos = self
            .savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| NativeError::statement(format!("no savepoint named {}", name)))?;
        self.savepoints.truncate(pos);
        self.db.state().stats.savepoints_released += 1;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> NativeResult<()> {
        let (pos, mark) = self
            .savepoints
            .iter()
            .enumerate()
            .rev()
            .find(|(_, (n, _))| n == name)
            .map(|(i, (_, mark))| (i, *mark))
            .ok_or_else(|| NativeError::statement(format!("no savepoint named {}", name)))?;
        self.pending.truncate(mark);
        self.savepoints.truncate(pos + 1);
        self.db.state().stats.savepoints_rolled_back += 1;
        Ok(())
    }

    fn cancel_handle(&self) -> Arc<dyn CancelHandle> {
        Arc::new(MemoryCancel {
            db: self.db.clone(),
        })
    }

    async fn is_valid(&mut self) -> bool {
        !self.closed
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> NativeResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pending.clear();
        self.statements.clear();
        let mut state = self.db.state();
        state.stats.connections_closed += 1;
        state.open_connections = state.open_connections.saturating_sub(1);
        Ok(())
    }
}
