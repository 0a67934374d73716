//! Row writes, batches and statement execution.

use tracing::{debug, info, warn};

use crate::core::value::{Row, SqlValue};
use crate::dialect::split;
use crate::error::{DbError, Result};
use crate::native::{NativeError, NativeErrorKind, StatementId};

use super::statements::set_direct;
use super::{lock_lease, ExecResult, Session, StatementRole};

impl Session {
    /// Prepare `INSERT INTO t (columns) VALUES (?, ...)` in the insert slot.
    pub async fn prepare_insert(
        &mut self,
        schema: Option<&str>,
        table: &str,
        columns: &[&str],
        return_keys: bool,
    ) -> Result<StatementId> {
        let sql = self.descriptor.insert_statement(schema, table, columns);
        let return_keys = return_keys && self.descriptor.dialect().supports_auto_generated_keys();
        self.prepare(StatementRole::Insert, &sql, return_keys).await
    }

    /// Prepare `UPDATE t SET ... WHERE keys` in the update slot.
    pub async fn prepare_update(
        &mut self,
        schema: Option<&str>,
        table: &str,
        set_columns: &[&str],
        key_columns: &[&str],
    ) -> Result<StatementId> {
        let sql = self
            .descriptor
            .update_statement(schema, table, set_columns, key_columns);
        self.prepare(StatementRole::Update, &sql, false).await
    }

    /// Prepare `DELETE FROM t WHERE keys` in the delete slot.
    pub async fn prepare_delete(
        &mut self,
        schema: Option<&str>,
        table: &str,
        key_columns: &[&str],
    ) -> Result<StatementId> {
        let sql = self.descriptor.delete_statement(schema, table, key_columns);
        self.prepare(StatementRole::Delete, &sql, false).await
    }

    /// Write one row through the statement in `role`.
    ///
    /// The row is queued when batching is effective, executed otherwise.
    /// With `handle_commit`, every `commit_size` rows the queued batch is
    /// flushed and the transaction committed. Returns true when that
    /// happened on this call.
    pub async fn insert_row(
        &mut self,
        role: StatementRole,
        values: &[SqlValue],
        use_batch: bool,
        handle_commit: bool,
    ) -> Result<bool> {
        let (id, sql) = self.slot(role)?;
        let batch = self.batch_effective(use_batch);

        let physical = self.physical()?;
        let queued = {
            let mut lease = lock_lease(&physical, &self.config.name).await?;
            let conn = lease.native();
            if batch {
                match conn.add_batch(id, values).await {
                    Ok(()) => true,
                    Err(e) if e.is_unsupported() => {
                        warn!(
                            "Batch updates unavailable on {}, writing rows one by one: {}",
                            self.config.name, e
                        );
                        self.batch_disabled = true;
                        conn.execute_update(id, values)
                            .await
                            .map_err(|e| e.into_db_error(&sql))?;
                        false
                    }
                    Err(e) => return Err(e.into_db_error(&sql)),
                }
            } else {
                conn.execute_update(id, values)
                    .await
                    .map_err(|e| e.into_db_error(&sql))?;
                false
            }
        };

        if queued {
            if let Some(slot) = self.slots.get_mut(role) {
                slot.pending_batch += 1;
            }
        }
        self.written += 1;

        if handle_commit && self.commit_size > 0 && self.written % self.commit_size as u64 == 0 {
            let flushed = !self.flush_batch(role).await?.is_empty();
            let committed = self.commit_inner(false).await?;
            self.written = 0;
            return Ok(flushed || committed);
        }
        Ok(false)
    }

    /// Same as [`insert_row`](Self::insert_row) for update and delete statements.
    pub async fn update_row(
        &mut self,
        role: StatementRole,
        values: &[SqlValue],
        use_batch: bool,
        handle_commit: bool,
    ) -> Result<bool> {
        self.insert_row(role, values, use_batch, handle_commit).await
    }

    /// Execute the queued batch of `role`; returns its update counts.
    ///
    /// Any failure is reported as [`DbError::BatchExecution`] and the
    /// queue is cleared either way.
    pub async fn flush_batch(&mut self, role: StatementRole) -> Result<Vec<i64>> {
        let Some(slot) = self.slots.get(role) else {
            return Ok(Vec::new());
        };
        if slot.pending_batch == 0 {
            return Ok(Vec::new());
        }
        let (id, sql, pending) = (slot.id, slot.sql.clone(), slot.pending_batch);

        let physical = self.physical()?;
        let outcome = {
            let mut lease = lock_lease(&physical, &self.config.name).await?;
            let conn = lease.native();
            let outcome = conn.execute_batch(id).await;
            if let Err(e) = conn.clear_batch(id).await {
                debug!("Could not clear batch of {} on {}: {}", role, self.config.name, e);
            }
            outcome
        };
        if let Some(slot) = self.slots.get_mut(role) {
            slot.pending_batch = 0;
        }

        match outcome {
            Ok(counts) => {
                debug!("Flushed batch of {} rows on {}", pending, self.config.name);
                Ok(counts)
            }
            Err(e) => Err(batch_error(e, &sql)),
        }
    }

    /// Finish the statement in `role`: flush what is queued, commit when
    /// auto-commit is off, and close the statement.
    pub async fn empty_and_commit(&mut self, role: StatementRole, use_batch: bool, batch_counter: u64) -> Result<()> {
        if self.slots.get(role).is_none() {
            return Ok(());
        }
        if !self.auto_commit {
            if self.batch_effective(use_batch) && batch_counter > 0 {
                self.flush_batch(role).await?;
            }
            self.commit_inner(false).await?;
        }
        self.close_statement(role).await
    }

    /// Keys generated by the last write through `role`. Empty when the
    /// driver cannot report them.
    pub async fn get_generated_keys(&mut self, role: StatementRole) -> Result<Vec<Row>> {
        let (id, sql) = self.slot(role)?;
        let physical = self.physical()?;
        let mut lease = lock_lease(&physical, &self.config.name).await?;
        match lease.native().generated_keys(id).await {
            Ok(keys) => Ok(keys),
            Err(e) if e.is_unsupported() => Ok(Vec::new()),
            Err(e) => Err(DbError::execution(sql, e)),
        }
    }

    /// Execute one statement, with `?` parameters when `params` is non-empty.
    ///
    /// Counts are classified by the leading keyword. Table DDL drops the
    /// cached field layouts of this connection.
    pub async fn exec_statement(&mut self, sql: &str, params: &[SqlValue]) -> Result<ExecResult> {
        let physical = self.physical()?;
        let (count, read) = {
            let mut lease = lock_lease(&physical, &self.config.name).await?;
            let conn = lease.native();
            if params.is_empty() {
                set_direct(&self.active, Some(StatementId::DIRECT));
                let outcome = conn.execute(sql).await;
                set_direct(&self.active, None);
                let outcome = outcome.map_err(|e| e.into_db_error(sql))?;
                let read = outcome.result.map_or(0, |rs| rs.rows.len() as u64);
                (outcome.update_count.unwrap_or(0), read)
            } else {
                let id = conn
                    .prepare(sql, false)
                    .await
                    .map_err(|e| DbError::preparation(sql, e))?;
                set_direct(&self.active, Some(id));
                let outcome = conn.execute_update(id, params).await;
                set_direct(&self.active, None);
                if let Err(e) = conn.close_statement(id).await {
                    debug!("Could not close statement {} on {}: {}", id, self.config.name, e);
                }
                (outcome.map_err(|e| e.into_db_error(sql))?, 0)
            }
        };

        let mut result = ExecResult {
            lines_read: read,
            ..ExecResult::default()
        };
        let head = leading_keywords(sql);
        if head.starts_with("INSERT") {
            result.lines_output = count;
        } else if head.starts_with("UPDATE") {
            result.lines_updated = count;
        } else if head.starts_with("DELETE") {
            result.lines_deleted = count;
        }

        if ["ALTER TABLE", "DROP TABLE", "CREATE TABLE"]
            .iter()
            .any(|ddl| head.starts_with(ddl))
        {
            self.ctx.field_cache().clear_connection(&self.config.name);
        }
        Ok(result)
    }

    /// Split `script` and execute every statement in order, summing counts.
    /// Stops at the first failure.
    pub async fn exec_statements(&mut self, script: &str) -> Result<ExecResult> {
        let mut total = ExecResult::default();
        let statements = split(script);
        for statement in &statements {
            debug!(
                "Executing {} on {}: {}",
                if statement.is_query { "query" } else { "statement" },
                self.config.name,
                statement.text
            );
            total += self.exec_statement(&statement.text, &[]).await?;
        }
        if !statements.is_empty() {
            info!("Executed {} statements on {}", statements.len(), self.config.name);
        }
        Ok(total)
    }

    pub(super) fn slot(&self, role: StatementRole) -> Result<(StatementId, String)> {
        self.slots
            .get(role)
            .map(|s| (s.id, s.sql.clone()))
            .ok_or_else(|| DbError::preparation("", format!("no {} statement prepared", role)))
    }

    /// True when writes through this session should be queued.
    fn batch_effective(&self, use_batch: bool) -> bool {
        use_batch
            && !self.auto_commit
            && !self.batch_disabled
            && !self.is_grouped()
            && self.driver_batch
            && self.descriptor.dialect().supports_batch_updates()
    }
}

fn batch_error(e: NativeError, sql: &str) -> DbError {
    match e.kind {
        NativeErrorKind::Batch => e.into_db_error(sql),
        _ => DbError::BatchExecution {
            message: e.message.clone(),
            causes: e.messages().into_iter().skip(1).collect(),
            update_counts: e.update_counts,
        },
    }
}

/// Upper-cased statement text with comments stripped and whitespace collapsed.
fn leading_keywords(sql: &str) -> String {
    crate::dialect::strip_comments(sql)
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}
