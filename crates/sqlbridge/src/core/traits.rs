//! The dialect contract.
//!
//! A [`Dialect`] is the immutable rule set of one database vendor: what it
//! can do (capability flags) and how its SQL text is spelled (renderers).
//! Every default method here is the behaviour of a plain ANSI database, so a
//! vendor only overrides what differs.
//!
//! Dialects hold no connection state and never perform I/O. Per-connection
//! settings (quoting policy, extra URL options, tablespaces) are layered on
//! top by [`DialectDescriptor`](crate::dialect::DialectDescriptor).
//!
//! # Design Patterns
//!
//! - **Strategy**: the session and the descriptor delegate every vendor
//!   decision to a `dyn Dialect`
//! - **Template Method**: default renderers are built from smaller overridable
//!   pieces (`field_definition`, `schema_table_combination`, ...)

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::typemap::NativeColumn;

use super::identifier::quote_sql_string;
use super::schema::{ColumnMeta, KeyColumns, CLOB_LENGTH};

/// How the engine reaches the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    /// Vendor's native driver.
    #[default]
    Native,
    /// ODBC data source.
    Odbc,
    /// Oracle call interface.
    Oci,
    /// Connection looked up by name from the hosting environment.
    Jndi,
    /// Dialect-specific access method.
    Plugin,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Native => "native",
            AccessType::Odbc => "odbc",
            AccessType::Oci => "oci",
            AccessType::Jndi => "jndi",
            AccessType::Plugin => "plugin",
        }
    }
}

/// Options that shape a single field definition.
#[derive(Debug, Clone, Copy)]
pub struct FieldDdl {
    /// Prefix the definition with the column name.
    pub add_field_name: bool,
    /// Terminate the definition with a newline.
    pub add_cr: bool,
    /// Render BOOLEAN columns with the native boolean type.
    pub supports_boolean: bool,
    /// Render TIMESTAMP columns with the native timestamp type.
    pub supports_timestamp: bool,
}

impl Default for FieldDdl {
    fn default() -> Self {
        Self {
            add_field_name: true,
            add_cr: true,
            supports_boolean: false,
            supports_timestamp: false,
        }
    }
}

impl FieldDdl {
    /// Start a definition: the column name and a space, when requested.
    pub fn begin(&self, column: &ColumnMeta) -> String {
        if self.add_field_name {
            format!("{} ", column.name)
        } else {
            String::new()
        }
    }

    /// Finish a definition: a trailing newline, when requested.
    pub fn end(&self, mut ddl: String) -> String {
        if self.add_cr {
            ddl.push('\n');
        }
        ddl
    }
}

/// Pieces a dialect needs to build its connection URL.
#[derive(Debug, Clone, Default)]
pub struct UrlParts<'a> {
    pub host: &'a str,
    pub port: &'a str,
    pub database: &'a str,
    /// Named server instance (legacy multi-tenant servers).
    pub servername: Option<&'a str>,
    /// Full URL supplied by the user for the generic dialect.
    pub custom_url: Option<&'a str>,
}

/// Vendor rule set: capability flags and SQL text renderers.
///
/// Implementations must be pure: no I/O and no interior state.
pub trait Dialect: Send + Sync {
    // ===== Identity =====

    /// Registry key, e.g. `"postgresql"`.
    fn plugin_id(&self) -> &'static str;

    /// Human readable name.
    fn display_name(&self) -> &'static str;

    /// Supported access methods.
    fn access_types(&self) -> &'static [AccessType] {
        &[AccessType::Native, AccessType::Odbc, AccessType::Jndi]
    }

    /// Default TCP port, if the vendor has one.
    fn default_port(&self) -> Option<u16> {
        None
    }

    /// Options every connection of this vendor starts with, as `(option, value)`.
    fn default_options(&self) -> Vec<(&'static str, &'static str)> {
        Vec::new()
    }

    // ===== Connection URL =====

    /// Base URL without extra options.
    fn url(&self, parts: &UrlParts<'_>) -> Result<String>;

    fn supports_options_in_url(&self) -> bool {
        true
    }

    /// Text between the base URL and the first option.
    fn extra_option_indicator(&self) -> &'static str {
        ";"
    }

    /// Text between two options.
    fn extra_option_separator(&self) -> &'static str {
        ";"
    }

    /// Text between an option name and its value.
    fn extra_option_value_separator(&self) -> &'static str {
        "="
    }

    // ===== Capabilities =====

    fn supports_transactions(&self) -> bool {
        true
    }

    /// False when committing a transaction that did nothing raises an error.
    fn supports_empty_transactions(&self) -> bool {
        true
    }

    fn supports_batch_updates(&self) -> bool {
        true
    }

    fn supports_sequences(&self) -> bool {
        false
    }

    fn supports_sequence_no_max_value_option(&self) -> bool {
        false
    }

    fn sequence_no_max_value_option(&self) -> &'static str {
        "NOMAXVALUE"
    }

    /// Native boolean column type, unless the connection overrides it.
    fn supports_boolean_data_type(&self) -> bool {
        false
    }

    /// Native timestamp column type, unless the connection overrides it.
    fn supports_timestamp_data_type(&self) -> bool {
        false
    }

    fn supports_savepoints(&self) -> bool {
        true
    }

    /// Savepoints must be released explicitly.
    fn release_savepoint(&self) -> bool {
        true
    }

    fn supports_autoinc(&self) -> bool {
        true
    }

    fn supports_auto_generated_keys(&self) -> bool {
        true
    }

    /// An auto-increment column needs an explicit placeholder value on insert.
    fn needs_placeholder(&self) -> bool {
        false
    }

    fn supports_schemas(&self) -> bool {
        true
    }

    fn supports_indexes(&self) -> bool {
        true
    }

    fn supports_bitmap_index(&self) -> bool {
        true
    }

    fn requires_create_table_primary_key_append(&self) -> bool {
        false
    }

    /// Binary columns report a display size of twice their byte length.
    fn is_display_size_twice_the_precision(&self) -> bool {
        false
    }

    /// Fetch size to request when opening a query, by streaming mode.
    fn fetch_size(&self, _streaming: bool) -> Option<i32> {
        None
    }

    fn max_varchar_length(&self) -> i32 {
        CLOB_LENGTH
    }

    // ===== Identifiers =====

    fn start_quote(&self) -> &'static str {
        "\""
    }

    fn end_quote(&self) -> &'static str {
        "\""
    }

    fn quote_reserved_words(&self) -> bool {
        true
    }

    /// Unquoted identifiers fold to upper case.
    fn is_defaulting_to_uppercase(&self) -> bool {
        true
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        &[]
    }

    fn is_reserved_word(&self, word: &str) -> bool {
        self.reserved_words()
            .iter()
            .any(|w| w.eq_ignore_ascii_case(word))
    }

    // ===== DDL =====

    /// Column definition for CREATE/ALTER TABLE.
    ///
    /// The technical or primary key column gets the vendor's key clause.
    fn field_definition(&self, column: &ColumnMeta, keys: &KeyColumns<'_>, ddl: &FieldDdl) -> String;

    fn add_column_statement(&self, table: &str, column: &ColumnMeta, keys: &KeyColumns<'_>, ddl: &FieldDdl) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            table,
            self.field_definition(column, keys, &FieldDdl { add_field_name: true, add_cr: false, ..*ddl })
        )
    }

    fn drop_column_statement(&self, table: &str, column: &ColumnMeta, _keys: &KeyColumns<'_>, _ddl: &FieldDdl) -> String {
        format!("ALTER TABLE {} DROP {}", table, column.name)
    }

    fn modify_column_statement(&self, table: &str, column: &ColumnMeta, keys: &KeyColumns<'_>, ddl: &FieldDdl) -> String {
        format!(
            "ALTER TABLE {} MODIFY {}",
            table,
            self.field_definition(column, keys, &FieldDdl { add_field_name: true, add_cr: false, ..*ddl })
        )
    }

    fn create_table_prefix(&self) -> &'static str {
        "CREATE TABLE "
    }

    /// Storage clause for a tablespace; empty when the vendor has none.
    fn tablespace_ddl(&self, _tablespace: &str) -> String {
        String::new()
    }

    fn truncate_table_statement(&self, table: &str) -> String {
        format!("TRUNCATE TABLE {}", table)
    }

    fn drop_table_if_exists_statement(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", table)
    }

    // ===== Queries =====

    /// Clause limiting a query to `rows` rows; appended after the query.
    fn limit_clause(&self, _rows: u64) -> String {
        String::new()
    }

    fn schema_table_combination(&self, schema: &str, table: &str) -> String {
        format!("{}.{}", schema, table)
    }

    fn sql_query_fields(&self, table: &str) -> String {
        format!("SELECT * FROM {}", table)
    }

    fn sql_table_exists(&self, table: &str) -> String {
        format!("SELECT 1 FROM {}", table)
    }

    fn sql_column_exists(&self, column: &str, table: &str) -> String {
        format!("SELECT {} FROM {}", column, table)
    }

    fn select_count_statement(&self, table: &str) -> String {
        format!("select count(*) FROM {}", table)
    }

    fn quote_sql_string(&self, value: &str) -> String {
        quote_sql_string(value)
    }

    /// Statement locking the given (already quoted) tables, if the vendor has one.
    fn sql_lock_tables(&self, _tables: &[String]) -> Option<String> {
        None
    }

    /// Statement unlocking the given (already quoted) tables, if the vendor has one.
    fn sql_unlock_tables(&self, _tables: &[String]) -> Option<String> {
        None
    }

    // ===== Sequences =====

    fn sql_next_sequence_value(&self, _sequence: &str) -> String {
        String::new()
    }

    fn sql_current_sequence_value(&self, _sequence: &str) -> String {
        String::new()
    }

    fn sql_sequence_exists(&self, _sequence: &str) -> String {
        String::new()
    }

    // ===== Type mapping =====

    /// Vendor correction applied after the generic native-to-semantic mapping.
    fn correct_column(&self, _native: &NativeColumn, _column: &mut ColumnMeta) {}
}
