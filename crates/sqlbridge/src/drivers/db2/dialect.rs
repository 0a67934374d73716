//! IBM DB2 SQL dialect (Strategy pattern).
//!
//! DB2 declares the primary key after the column list, reports binary
//! display sizes as twice the byte length, and empties tables without
//! logging instead of truncating them.

use crate::core::schema::{ColumnMeta, KeyColumns, ValueType};
use crate::core::traits::{Dialect, FieldDdl, UrlParts};
use crate::drivers::common::{sized, SQL92_RESERVED_WORDS};
use crate::error::Result;

/// DB2 dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct Db2Dialect;

impl Db2Dialect {
    /// Create a new DB2 dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for Db2Dialect {
    fn plugin_id(&self) -> &'static str {
        "db2"
    }

    fn display_name(&self) -> &'static str {
        "IBM DB2"
    }

    fn default_port(&self) -> Option<u16> {
        Some(50000)
    }

    fn url(&self, parts: &UrlParts<'_>) -> Result<String> {
        let mut url = format!("db2://{}", parts.host);
        if !parts.port.is_empty() {
            url.push(':');
            url.push_str(parts.port);
        }
        url.push('/');
        url.push_str(parts.database);
        Ok(url)
    }

    fn extra_option_indicator(&self) -> &'static str {
        ":"
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn supports_sequence_no_max_value_option(&self) -> bool {
        true
    }

    fn sequence_no_max_value_option(&self) -> &'static str {
        "NO MAXVALUE"
    }

    fn supports_bitmap_index(&self) -> bool {
        false
    }

    fn requires_create_table_primary_key_append(&self) -> bool {
        true
    }

    fn is_display_size_twice_the_precision(&self) -> bool {
        true
    }

    fn max_varchar_length(&self) -> i32 {
        32_672
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        SQL92_RESERVED_WORDS
    }

    fn field_definition(&self, column: &ColumnMeta, keys: &KeyColumns<'_>, ddl: &FieldDdl) -> String {
        let mut out = ddl.begin(column);
        let length = column.length;
        let precision = column.precision;

        match column.value_type {
            ValueType::Date | ValueType::Timestamp => out.push_str("TIMESTAMP"),
            ValueType::Boolean => out.push_str("CHARACTER(1)"),
            ValueType::Number | ValueType::Integer | ValueType::BigNumber => {
                if keys.is_key(&column.name) {
                    if keys.use_autoinc {
                        out.push_str(
                            "BIGINT NOT NULL GENERATED ALWAYS AS IDENTITY (START WITH 1, INCREMENT BY 1)",
                        );
                    } else {
                        out.push_str("BIGINT NOT NULL");
                    }
                } else if length > 0 {
                    if precision > 0 || length > 18 {
                        out.push_str(&sized("DECIMAL", length, precision));
                    } else if length > 9 {
                        out.push_str("BIGINT");
                    } else {
                        out.push_str("INTEGER");
                    }
                } else {
                    out.push_str("FLOAT");
                }
            }
            ValueType::String => {
                if length > self.max_varchar_length() {
                    out.push_str("CLOB");
                } else if length > 0 {
                    out.push_str(&format!("VARCHAR({})", length));
                } else {
                    out.push_str("VARCHAR(255)");
                }
            }
            ValueType::Binary => out.push_str("BLOB"),
        }

        ddl.end(out)
    }

    fn add_column_statement(&self, table: &str, column: &ColumnMeta, keys: &KeyColumns<'_>, ddl: &FieldDdl) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            table,
            self.field_definition(column, keys, &FieldDdl { add_field_name: true, add_cr: false, ..*ddl })
        )
    }

    fn drop_column_statement(&self, table: &str, column: &ColumnMeta, _keys: &KeyColumns<'_>, _ddl: &FieldDdl) -> String {
        format!("ALTER TABLE {} DROP COLUMN {}", table, column.name)
    }

    fn modify_column_statement(&self, table: &str, column: &ColumnMeta, keys: &KeyColumns<'_>, ddl: &FieldDdl) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} SET DATA TYPE {}",
            table,
            column.name,
            self.field_definition(column, keys, &FieldDdl { add_field_name: false, add_cr: false, ..*ddl })
        )
    }

    fn truncate_table_statement(&self, table: &str) -> String {
        format!("ALTER TABLE {} ACTIVATE NOT LOGGED INITIALLY WITH EMPTY TABLE", table)
    }

    fn limit_clause(&self, rows: u64) -> String {
        format!(" FETCH FIRST {} ROWS ONLY", rows)
    }

    fn sql_query_fields(&self, table: &str) -> String {
        format!("SELECT * FROM {} FETCH FIRST 1 ROWS ONLY", table)
    }

    fn sql_table_exists(&self, table: &str) -> String {
        format!("SELECT 1 FROM {} FETCH FIRST 1 ROWS ONLY", table)
    }

    fn sql_lock_tables(&self, tables: &[String]) -> Option<String> {
        if tables.is_empty() {
            return None;
        }
        Some(
            tables
                .iter()
                .map(|t| format!("LOCK TABLE {} IN EXCLUSIVE MODE;\n", t))
                .collect(),
        )
    }

    fn sql_next_sequence_value(&self, sequence: &str) -> String {
        format!("SELECT NEXT VALUE FOR {} FROM SYSIBM.SYSDUMMY1", sequence)
    }

    fn sql_current_sequence_value(&self, sequence: &str) -> String {
        format!("SELECT PREVIOUS VALUE FOR {} FROM SYSIBM.SYSDUMMY1", sequence)
    }

    fn sql_sequence_exists(&self, sequence: &str) -> String {
        match sequence.split_once('.') {
            Some((schema, name)) => format!(
                "SELECT * FROM SYSCAT.SEQUENCES WHERE SEQSCHEMA = '{}' AND SEQNAME = '{}'",
                schema.replace('"', "").to_uppercase(),
                name.replace('"', "").to_uppercase()
            ),
            None => format!(
                "SELECT * FROM SYSCAT.SEQUENCES WHERE SEQNAME = '{}'",
                sequence.replace('"', "").to_uppercase()
            ),
        }
    }
}
