//! Dialect descriptors: vendor rules combined with one connection's settings.
//!
//! A [`DialectDescriptor`] pairs the immutable [`Dialect`] of a vendor with
//! the per-connection overrides of a [`ConnectionConfig`]: quoting policy,
//! preferred schema, tablespaces, extra URL options and boolean/timestamp
//! support. Every renderer here is pure; nothing touches a live connection.
//!
//! - [`script`]: SQL script splitting and comment stripping
//!
//! # Usage
//!
//! ```rust,ignore
//! let catalog = DriverCatalog::with_builtins();
//! let descriptor = DialectDescriptor::from_catalog(&catalog, &config)?;
//! let sql = descriptor.create_table_statement(None, "orders", &schema, &KeyColumns::default(), true);
//! ```

pub mod script;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::{ConnectionConfig, SessionOptions};
use crate::core::catalog::DriverCatalog;
use crate::core::identifier::{quote_field, QuoteRules};
use crate::core::schema::{ColumnMeta, KeyColumns, RowSchema};
use crate::core::traits::{Dialect, FieldDdl, UrlParts};
use crate::core::variables::VariableSpace;
use crate::error::Result;
use crate::typemap::RowTypeMapper;

pub use script::{split, strip_comments, ScriptStatement};

/// Placeholder some tools store for an option that has no value.
const EMPTY_OPTION: &str = "><EMPTY><";

/// A vendor dialect bound to one connection definition.
#[derive(Clone)]
pub struct DialectDescriptor {
    dialect: Arc<dyn Dialect>,
    connection: String,
    options: SessionOptions,
    servername: Option<String>,
    custom_url: Option<String>,
    data_tablespace: Option<String>,
    index_tablespace: Option<String>,
    extra_options: BTreeMap<String, String>,
}

impl DialectDescriptor {
    /// Bind `dialect` to the settings of `config`.
    pub fn new(dialect: Arc<dyn Dialect>, config: &ConnectionConfig) -> Self {
        Self {
            dialect,
            connection: config.name.clone(),
            options: config.options.clone(),
            servername: config.servername.clone(),
            custom_url: config.custom_url.clone(),
            data_tablespace: config.data_tablespace.clone(),
            index_tablespace: config.index_tablespace.clone(),
            extra_options: config.extra_options.clone(),
        }
    }

    /// Look up the dialect named by `config.type` and bind it.
    pub fn from_catalog(catalog: &DriverCatalog, config: &ConnectionConfig) -> Result<Self> {
        let dialect = catalog.require_dialect(&config.r#type)?;
        Ok(Self::new(dialect, config))
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn plugin_id(&self) -> &'static str {
        self.dialect.plugin_id()
    }

    pub fn connection_name(&self) -> &str {
        &self.connection
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    // ===== Capability overrides =====

    pub fn supports_boolean(&self) -> bool {
        self.options
            .supports_boolean
            .unwrap_or_else(|| self.dialect.supports_boolean_data_type())
    }

    pub fn supports_timestamp(&self) -> bool {
        self.options
            .supports_timestamp
            .unwrap_or_else(|| self.dialect.supports_timestamp_data_type())
    }

    /// Fetch size hint for queries, honouring the streaming option.
    pub fn fetch_size(&self) -> Option<i32> {
        self.dialect.fetch_size(self.options.stream_results)
    }

    /// Row type mapper using this connection's timestamp support.
    pub fn row_mapper(&self) -> RowTypeMapper<'_> {
        RowTypeMapper::new(self.dialect.as_ref(), self.supports_timestamp())
    }

    // ===== Identifiers =====

    fn quote_rules(&self) -> QuoteRules<'static> {
        QuoteRules {
            start_quote: self.dialect.start_quote(),
            end_quote: self.dialect.end_quote(),
            quote_all_fields: self.options.quote_all_fields,
            force_lower_case: self.options.force_lower_case,
            force_upper_case: self.options.force_upper_case,
            quote_reserved_words: self.dialect.quote_reserved_words(),
            preserve_reserved_case: self.options.preserve_reserved_case,
            defaults_to_upper_case: self.dialect.is_defaulting_to_uppercase(),
        }
    }

    /// Quote an identifier for this connection. Idempotent.
    pub fn quote(&self, identifier: &str) -> String {
        quote_field(identifier, &self.quote_rules(), |w| {
            self.dialect.is_reserved_word(w)
        })
    }

    /// Quote each identifier and join with `", "`.
    pub fn quote_list(&self, identifiers: &[&str]) -> String {
        identifiers
            .iter()
            .map(|f| self.quote(f))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Quoted `schema.table`, falling back to the preferred schema.
    ///
    /// Dialects without schemas get the bare quoted table.
    pub fn quoted_schema_table(&self, schema: Option<&str>, table: &str) -> String {
        let schema = schema
            .filter(|s| !s.trim().is_empty())
            .or(self.options.preferred_schema.as_deref())
            .filter(|s| !s.trim().is_empty());

        match schema {
            Some(schema) if self.dialect.supports_schemas() => self
                .dialect
                .schema_table_combination(&self.quote(schema), &self.quote(table)),
            _ => self.quote(table),
        }
    }

    // ===== DDL =====

    fn field_ddl(&self, add_field_name: bool, add_cr: bool) -> FieldDdl {
        FieldDdl {
            add_field_name,
            add_cr,
            supports_boolean: self.supports_boolean(),
            supports_timestamp: self.supports_timestamp(),
        }
    }

    /// Column and key names as they appear in DDL.
    fn quoted_column(&self, column: &ColumnMeta) -> ColumnMeta {
        ColumnMeta {
            name: self.quote(&column.name),
            ..column.clone()
        }
    }

    /// Column DDL with the technical/primary key special-cased.
    pub fn field_definition(
        &self,
        column: &ColumnMeta,
        keys: &KeyColumns<'_>,
        add_field_name: bool,
        add_cr: bool,
    ) -> String {
        let tk = keys.technical_key.map(|k| self.quote(k));
        let pk = keys.primary_key.map(|k| self.quote(k));
        let keys = KeyColumns {
            technical_key: tk.as_deref(),
            primary_key: pk.as_deref(),
            use_autoinc: keys.use_autoinc,
        };
        self.dialect.field_definition(
            &self.quoted_column(column),
            &keys,
            &self.field_ddl(add_field_name, add_cr),
        )
    }

    /// `CREATE TABLE` for `fields`, with data tablespace and optional `;`.
    pub fn create_table_statement(
        &self,
        schema: Option<&str>,
        table: &str,
        fields: &RowSchema,
        keys: &KeyColumns<'_>,
        semicolon: bool,
    ) -> String {
        let mut sql = format!(
            "{}{}\n(\n",
            self.dialect.create_table_prefix(),
            self.quoted_schema_table(schema, table)
        );

        for (i, column) in fields.iter().enumerate() {
            sql.push_str(if i == 0 { "  " } else { ", " });
            sql.push_str(&self.field_definition(column, keys, true, true));
        }

        if self.dialect.requires_create_table_primary_key_append() {
            let key_columns: Vec<&str> = [keys.technical_key, keys.primary_key]
                .into_iter()
                .flatten()
                .collect();
            if !key_columns.is_empty() {
                sql.push_str(&format!(", PRIMARY KEY ({})\n", self.quote_list(&key_columns)));
            }
        }

        sql.push_str(")\n");
        if let Some(tablespace) = self.data_tablespace.as_deref().filter(|t| !t.is_empty()) {
            sql.push_str(&self.dialect.tablespace_ddl(&self.quote(tablespace)));
        }
        if semicolon {
            sql.push(';');
        }
        sql
    }

    /// Statements turning `current` into `desired`, each terminated by `;\n`.
    ///
    /// Missing columns are added, surplus ones dropped, and columns whose
    /// rendered type differs (ignoring case) are modified. Empty when the
    /// layouts already agree.
    pub fn alter_table_statement(
        &self,
        schema: Option<&str>,
        table: &str,
        current: &RowSchema,
        desired: &RowSchema,
        keys: &KeyColumns<'_>,
    ) -> String {
        let table = self.quoted_schema_table(schema, table);
        let ddl = self.field_ddl(true, false);
        let mut statements = Vec::new();

        for column in desired.iter().filter(|c| current.search(&c.name).is_none()) {
            statements.push(self.dialect.add_column_statement(
                &table,
                &self.quoted_column(column),
                keys,
                &ddl,
            ));
        }

        for column in current.iter().filter(|c| desired.search(&c.name).is_none()) {
            statements.push(self.dialect.drop_column_statement(
                &table,
                &self.quoted_column(column),
                keys,
                &ddl,
            ));
        }

        for column in desired.iter() {
            let Some(existing) = current.search(&column.name) else {
                continue;
            };
            let want = self.field_definition(column, keys, false, false);
            let have = self.field_definition(existing, keys, false, false);
            if !want.eq_ignore_ascii_case(&have) {
                statements.push(self.dialect.modify_column_statement(
                    &table,
                    &self.quoted_column(column),
                    keys,
                    &ddl,
                ));
            }
        }

        statements
            .into_iter()
            .map(|s| format!("{};\n", s))
            .collect()
    }

    /// `CREATE [UNIQUE] [BITMAP] INDEX`; empty when the dialect has no indexes.
    pub fn create_index_statement(
        &self,
        schema: Option<&str>,
        table: &str,
        index: &str,
        columns: &[&str],
        unique: bool,
        bitmap: bool,
        semicolon: bool,
    ) -> String {
        if !self.dialect.supports_indexes() || columns.is_empty() {
            return String::new();
        }

        let mut sql = String::from("CREATE ");
        if unique {
            sql.push_str("UNIQUE ");
        }
        if bitmap && self.dialect.supports_bitmap_index() {
            sql.push_str("BITMAP ");
        }
        sql.push_str(&format!(
            "INDEX {} ON {}({})",
            self.quote(index),
            self.quoted_schema_table(schema, table),
            self.quote_list(columns)
        ));
        if let Some(tablespace) = self.index_tablespace.as_deref().filter(|t| !t.is_empty()) {
            let ddl = self.dialect.tablespace_ddl(&self.quote(tablespace));
            if !ddl.is_empty() {
                sql.push(' ');
                sql.push_str(&ddl);
            }
        }
        if semicolon {
            sql.push(';');
        }
        sql
    }

    /// `CREATE SEQUENCE`; `max_value` of `-1` means no maximum.
    ///
    /// Empty when the dialect has no sequences or the name is empty.
    pub fn create_sequence_statement(
        &self,
        schema: Option<&str>,
        sequence: &str,
        start: i64,
        increment: i64,
        max_value: i64,
        semicolon: bool,
    ) -> String {
        if !self.dialect.supports_sequences() || sequence.trim().is_empty() {
            return String::new();
        }

        let mut sql = format!(
            "CREATE SEQUENCE {} START WITH {} INCREMENT BY {}",
            self.quoted_schema_table(schema, sequence),
            start,
            increment
        );
        if max_value == -1 {
            if self.dialect.supports_sequence_no_max_value_option() {
                sql.push(' ');
                sql.push_str(self.dialect.sequence_no_max_value_option());
            }
        } else {
            sql.push_str(&format!(" MAXVALUE {}", max_value));
        }
        if semicolon {
            sql.push(';');
        }
        sql
    }

    pub fn truncate_table_statement(&self, schema: Option<&str>, table: &str) -> String {
        self.dialect
            .truncate_table_statement(&self.quoted_schema_table(schema, table))
    }

    pub fn drop_table_statement(&self, schema: Option<&str>, table: &str) -> String {
        self.dialect
            .drop_table_if_exists_statement(&self.quoted_schema_table(schema, table))
    }

    // ===== DML =====

    /// `INSERT INTO t (a, b) VALUES (?, ?)`.
    pub fn insert_statement(&self, schema: Option<&str>, table: &str, columns: &[&str]) -> String {
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quoted_schema_table(schema, table),
            self.quote_list(columns),
            placeholders
        )
    }

    /// `UPDATE t SET a = ? WHERE k = ?`. Parameters bind set columns first.
    pub fn update_statement(
        &self,
        schema: Option<&str>,
        table: &str,
        set_columns: &[&str],
        key_columns: &[&str],
    ) -> String {
        let assignments = set_columns
            .iter()
            .map(|c| format!("{} = ?", self.quote(c)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE {} SET {}{}",
            self.quoted_schema_table(schema, table),
            assignments,
            self.where_clause(key_columns)
        )
    }

    /// `DELETE FROM t WHERE k = ?`.
    pub fn delete_statement(&self, schema: Option<&str>, table: &str, key_columns: &[&str]) -> String {
        format!(
            "DELETE FROM {}{}",
            self.quoted_schema_table(schema, table),
            self.where_clause(key_columns)
        )
    }

    /// `SELECT r FROM t WHERE k = ?`, optionally ordered.
    pub fn lookup_statement(
        &self,
        schema: Option<&str>,
        table: &str,
        key_columns: &[&str],
        return_columns: &[&str],
        order_by: Option<&str>,
    ) -> String {
        let returns = if return_columns.is_empty() {
            "*".to_string()
        } else {
            self.quote_list(return_columns)
        };
        let mut sql = format!(
            "SELECT {} FROM {}{}",
            returns,
            self.quoted_schema_table(schema, table),
            self.where_clause(key_columns)
        );
        if let Some(order) = order_by.filter(|o| !o.trim().is_empty()) {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        sql
    }

    fn where_clause(&self, key_columns: &[&str]) -> String {
        if key_columns.is_empty() {
            return String::new();
        }
        let conditions = key_columns
            .iter()
            .map(|c| format!("{} = ?", self.quote(c)))
            .collect::<Vec<_>>()
            .join(" AND ");
        format!(" WHERE {}", conditions)
    }

    pub fn select_count_statement(&self, schema: Option<&str>, table: &str) -> String {
        self.dialect
            .select_count_statement(&self.quoted_schema_table(schema, table))
    }

    pub fn quote_sql_string(&self, value: &str) -> String {
        self.dialect.quote_sql_string(value)
    }

    // ===== Connection URL =====

    /// Build the connection URL for the given coordinates.
    ///
    /// Coordinates, server name, custom URL and option values all go
    /// through variable substitution. Extra options tagged with this
    /// dialect's plugin id are appended when the dialect takes options in
    /// the URL.
    pub fn build_url(
        &self,
        host: &str,
        port: &str,
        database: &str,
        variables: &dyn VariableSpace,
    ) -> Result<String> {
        let host = variables.substitute(host);
        let port = variables.substitute(port);
        let database = variables.substitute(database);
        let servername = self.servername.as_deref().map(|s| variables.substitute(s));
        let custom_url = self.custom_url.as_deref().map(|s| variables.substitute(s));

        let mut url = self.dialect.url(&UrlParts {
            host: &host,
            port: &port,
            database: &database,
            servername: servername.as_deref(),
            custom_url: custom_url.as_deref(),
        })?;

        if !self.dialect.supports_options_in_url() {
            return Ok(url);
        }

        let value_separator = self.dialect.extra_option_value_separator();
        let mut first = true;
        for (name, value) in self.url_options(variables) {
            if first && !url.contains(value_separator) {
                url.push_str(self.dialect.extra_option_indicator());
            } else {
                url.push_str(self.dialect.extra_option_separator());
            }
            url.push_str(&name);
            if !value.is_empty() {
                url.push_str(value_separator);
                url.push_str(&value);
            }
            first = false;
        }
        Ok(url)
    }

    /// Options for dialects that take them as driver properties instead of URL text.
    pub fn driver_properties(&self, variables: &dyn VariableSpace) -> BTreeMap<String, String> {
        if self.dialect.supports_options_in_url() {
            return BTreeMap::new();
        }
        self.url_options(variables).into_iter().collect()
    }

    /// Options tagged with this plugin id, dialect defaults underneath.
    fn url_options(&self, variables: &dyn VariableSpace) -> Vec<(String, String)> {
        let plugin = self.dialect.plugin_id();
        let mut merged: BTreeMap<String, String> = self
            .dialect
            .default_options()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        for (key, value) in &self.extra_options {
            let Some((owner, name)) = key.split_once('.') else {
                continue;
            };
            if owner.eq_ignore_ascii_case(plugin) && !name.is_empty() {
                merged.insert(name.to_string(), value.clone());
            }
        }

        merged
            .into_iter()
            .map(|(name, value)| {
                let value = if value == EMPTY_OPTION {
                    String::new()
                } else {
                    variables.substitute(&value)
                };
                (name, value)
            })
            .collect()
    }
}

impl fmt::Debug for DialectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialectDescriptor")
            .field("dialect", &self.dialect.plugin_id())
            .field("connection", &self.connection)
            .field("options", &self.options)
            .field("extra_options", &self.extra_options)
            .finish()
    }
}
