//! Existence probes, sequences, locks and DDL helpers.

use tracing::debug;

use crate::core::schema::{KeyColumns, RowSchema};
use crate::error::{DbError, Result};
use crate::native::QueryOptions;

use super::{Session, StatementRole};

impl Session {
    /// True when `table` can be selected from.
    pub async fn check_table_exists(&mut self, schema: Option<&str>, table: &str) -> Result<bool> {
        let table = self.descriptor.quoted_schema_table(schema, table);
        let sql = self.descriptor.dialect().sql_table_exists(&table);
        self.probe(&sql).await
    }

    /// True when `column` of `table` can be selected.
    pub async fn check_column_exists(&mut self, schema: Option<&str>, table: &str, column: &str) -> Result<bool> {
        let table = self.descriptor.quoted_schema_table(schema, table);
        let column = self.descriptor.quote(column);
        let sql = self.descriptor.dialect().sql_column_exists(&column, &table);
        self.probe(&sql).await
    }

    /// Run `sql` for at most one row; any failure means "does not exist".
    ///
    /// Inside a transaction the probe is fenced by a savepoint so a failed
    /// probe does not abort the transaction.
    async fn probe(&mut self, sql: &str) -> Result<bool> {
        let fenced = !self.auto_commit && self.descriptor.dialect().supports_savepoints();
        let savepoint = if fenced {
            self.set_savepoint(None).await?
        } else {
            None
        };

        let options = QueryOptions {
            fetch_size: None,
            max_rows: Some(1),
        };
        let outcome = self
            .run_query(StatementRole::Query, sql, &[], options)
            .await
            .map(|_| ());
        self.close_statement(StatementRole::Query).await?;

        if let Some(savepoint) = &savepoint {
            match &outcome {
                Ok(()) => self.release_savepoint(savepoint).await?,
                Err(_) => self.rollback_to_savepoint(savepoint).await?,
            }
        }

        match outcome {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!("Probe on {} failed, treating as absent: {}", self.config.name, e);
                Ok(false)
            }
        }
    }

    /// True when the sequence exists. Always false without sequence support.
    pub async fn check_sequence_exists(&mut self, schema: Option<&str>, sequence: &str) -> Result<bool> {
        if !self.descriptor.dialect().supports_sequences() {
            return Ok(false);
        }
        let sequence = self.descriptor.quoted_schema_table(schema, sequence);
        let sql = self.descriptor.dialect().sql_sequence_exists(&sequence);
        Ok(!self.get_rows(&sql, Some(1)).await?.is_empty())
    }

    /// Next value of a sequence; `None` when the dialect has no sequences.
    pub async fn next_sequence_value(&mut self, schema: Option<&str>, sequence: &str) -> Result<Option<i64>> {
        if !self.descriptor.dialect().supports_sequences() {
            return Ok(None);
        }
        let sequence = self.descriptor.quoted_schema_table(schema, sequence);
        let sql = self.descriptor.dialect().sql_next_sequence_value(&sequence);
        self.sequence_value(&sql).await.map(Some)
    }

    /// Current value of a sequence; `None` when the dialect has no sequences.
    pub async fn current_sequence_value(&mut self, schema: Option<&str>, sequence: &str) -> Result<Option<i64>> {
        if !self.descriptor.dialect().supports_sequences() {
            return Ok(None);
        }
        let sequence = self.descriptor.quoted_schema_table(schema, sequence);
        let sql = self.descriptor.dialect().sql_current_sequence_value(&sequence);
        self.sequence_value(&sql).await.map(Some)
    }

    async fn sequence_value(&mut self, sql: &str) -> Result<i64> {
        let options = QueryOptions {
            fetch_size: None,
            max_rows: Some(1),
        };
        let result = self
            .run_query(StatementRole::Sequence, sql, &[], options)
            .await;
        self.close_statement(StatementRole::Sequence).await?;

        result?
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.as_i64())
            .ok_or_else(|| DbError::execution(sql, "sequence returned no value"))
    }

    /// Lock `tables` for the current transaction, where the dialect can.
    pub async fn lock_tables(&mut self, schema: Option<&str>, tables: &[&str]) -> Result<()> {
        let quoted = self.quoted_tables(schema, tables);
        match self.descriptor.dialect().sql_lock_tables(&quoted) {
            Some(sql) => self.exec_statements(&sql).await.map(|_| ()),
            None => Ok(()),
        }
    }

    pub async fn unlock_tables(&mut self, schema: Option<&str>, tables: &[&str]) -> Result<()> {
        let quoted = self.quoted_tables(schema, tables);
        match self.descriptor.dialect().sql_unlock_tables(&quoted) {
            Some(sql) => self.exec_statements(&sql).await.map(|_| ()),
            None => Ok(()),
        }
    }

    fn quoted_tables(&self, schema: Option<&str>, tables: &[&str]) -> Vec<String> {
        tables
            .iter()
            .map(|t| self.descriptor.quoted_schema_table(schema, t))
            .collect()
    }

    /// Empty a table. Grouped sessions use `DELETE FROM` so the work stays
    /// inside the shared transaction.
    pub async fn truncate_table(&mut self, schema: Option<&str>, table: &str) -> Result<()> {
        let sql = if self.is_grouped() {
            format!("DELETE FROM {}", self.descriptor.quoted_schema_table(schema, table))
        } else {
            self.descriptor.truncate_table_statement(schema, table)
        };
        self.exec_statements(&sql).await.map(|_| ())
    }

    /// DDL that makes `table` match `fields`: `ALTER TABLE` statements when
    /// it exists, `CREATE TABLE` otherwise.
    pub async fn ddl(
        &mut self,
        schema: Option<&str>,
        table: &str,
        fields: &RowSchema,
        keys: &KeyColumns<'_>,
        semicolon: bool,
    ) -> Result<String> {
        if self.check_table_exists(schema, table).await? {
            let current = self.get_table_fields(schema, table).await?;
            Ok(self
                .descriptor
                .alter_table_statement(schema, table, &current, fields, keys))
        } else {
            Ok(self
                .descriptor
                .create_table_statement(schema, table, fields, keys, semicolon))
        }
    }
}
