//! Cursors, row fetches and result layouts.

use std::collections::VecDeque;

use tracing::debug;

use crate::core::schema::RowSchema;
use crate::core::value::{Row, SqlValue};
use crate::error::{DbError, Result};
use crate::native::{NativeResultSet, QueryOptions};

use super::{lock_lease, Session, StatementRole};

impl Session {
    /// Run `sql` in the select slot and keep its rows as the open cursor.
    ///
    /// Returns the mapped layout, also available from [`row_schema`](Self::row_schema).
    pub async fn open_query(&mut self, sql: &str, params: &[SqlValue]) -> Result<RowSchema> {
        self.close_query().await?;
        let options = QueryOptions {
            fetch_size: self.descriptor.fetch_size(),
            max_rows: None,
        };
        let result = self
            .run_query(StatementRole::Select, sql, params, options)
            .await?;

        let schema = self.descriptor.row_mapper().map_columns(&result.columns);
        debug!(
            "Opened cursor on {} with {} columns, {} rows",
            self.config.name,
            schema.len(),
            result.rows.len()
        );
        self.row_schema = Some(schema.clone());
        self.cursor = Some(VecDeque::from(result.rows));
        Ok(schema)
    }

    /// Next row of the open cursor; `None` when exhausted or none is open.
    pub fn get_row(&mut self) -> Option<Row> {
        self.cursor.as_mut()?.pop_front()
    }

    /// Close the cursor and its statement.
    pub async fn close_query(&mut self) -> Result<()> {
        self.cursor = None;
        self.close_statement(StatementRole::Select).await
    }

    /// Rows of `sql`, at most `limit` of them.
    pub async fn get_rows(&mut self, sql: &str, limit: Option<usize>) -> Result<Vec<Row>> {
        self.open_query(sql, &[]).await?;
        let rows = match (limit, self.cursor.take()) {
            (Some(limit), Some(rows)) => rows.into_iter().take(limit).collect(),
            (None, Some(rows)) => rows.into_iter().collect(),
            (_, None) => Vec::new(),
        };
        self.close_query().await?;
        Ok(rows)
    }

    pub async fn get_one_row(&mut self, sql: &str) -> Result<Option<Row>> {
        Ok(self.get_rows(sql, Some(1)).await?.into_iter().next())
    }

    /// Prepare a key lookup in the lookup slot.
    pub async fn prepare_lookup(
        &mut self,
        schema: Option<&str>,
        table: &str,
        key_columns: &[&str],
        return_columns: &[&str],
        order_by: Option<&str>,
    ) -> Result<()> {
        let sql = self
            .descriptor
            .lookup_statement(schema, table, key_columns, return_columns, order_by);
        self.prepare(StatementRole::Lookup, &sql, false).await?;
        Ok(())
    }

    /// First row the prepared lookup returns for `keys`.
    pub async fn lookup(&mut self, keys: &[SqlValue]) -> Result<Option<Row>> {
        let (id, sql) = self.slot(StatementRole::Lookup)?;
        let physical = self.physical()?;
        let mut lease = lock_lease(&physical, &self.config.name).await?;
        let options = QueryOptions {
            fetch_size: None,
            max_rows: Some(1),
        };
        let result = lease
            .native()
            .query(id, keys, &options)
            .await
            .map_err(|e| e.into_db_error(&sql))?;
        Ok(result.rows.into_iter().next())
    }

    /// Result layout of `sql`.
    ///
    /// Served from the field cache when possible. Otherwise the statement
    /// is described, and when the driver cannot describe it, executed for
    /// at most one row.
    pub async fn get_query_fields(&mut self, sql: &str) -> Result<RowSchema> {
        let cache = self.ctx.clone();
        if let Some(fields) = cache.field_cache().get(&self.config.name, sql) {
            return Ok(fields);
        }

        let id = self.prepare(StatementRole::Query, sql, false).await?;
        let columns = {
            let physical = self.physical()?;
            let mut lease = lock_lease(&physical, &self.config.name).await?;
            let conn = lease.native();
            match conn.describe(id).await {
                Ok(columns) if !columns.is_empty() => Ok(columns),
                described => {
                    if let Err(e) = described {
                        debug!("Describe failed on {}, running query instead: {}", self.config.name, e);
                    }
                    let options = QueryOptions {
                        fetch_size: None,
                        max_rows: Some(1),
                    };
                    conn.query(id, &[], &options)
                        .await
                        .map(|rs| rs.columns)
                        .map_err(|e| e.into_db_error(sql))
                }
            }
        };
        let closed = self.close_statement(StatementRole::Query).await;
        let columns = columns?;
        closed?;

        let fields = self.descriptor.row_mapper().map_columns(&columns);
        cache.field_cache().put(&self.config.name, sql, fields.clone());
        Ok(fields)
    }

    /// Layout of a table, read through the dialect's field query.
    pub async fn get_table_fields(&mut self, schema: Option<&str>, table: &str) -> Result<RowSchema> {
        let table = self.descriptor.quoted_schema_table(schema, table);
        let sql = self.descriptor.dialect().sql_query_fields(&table);
        self.get_query_fields(&sql).await
    }

    /// Row count of a table.
    pub async fn count_rows(&mut self, schema: Option<&str>, table: &str) -> Result<i64> {
        let sql = self.descriptor.select_count_statement(schema, table);
        let row = self.get_one_row(&sql).await?;
        row.and_then(|r| r.first().and_then(|v| v.as_i64()))
            .ok_or_else(|| DbError::execution(&sql, "count query returned no value"))
    }

    /// Prepare `sql` in `role`, run it and leave the slot occupied while
    /// the caller consumes the result.
    pub(super) async fn run_query(
        &mut self,
        role: StatementRole,
        sql: &str,
        params: &[SqlValue],
        options: QueryOptions,
    ) -> Result<NativeResultSet> {
        let id = self.prepare(role, sql, false).await?;
        let physical = self.physical()?;
        let mut lease = lock_lease(&physical, &self.config.name).await?;
        lease
            .native()
            .query(id, params, &options)
            .await
            .map_err(|e| e.into_db_error(sql))
    }
}
