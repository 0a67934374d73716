//! SQLite SQL dialect (Strategy pattern).
//!
//! SQLite is a single-file database: no host, no schemas and no TRUNCATE.
//! Column types are affinities, so most numeric columns collapse to
//! `INTEGER` or `NUMERIC`.

use crate::core::schema::{ColumnMeta, KeyColumns, ValueType};
use crate::core::traits::{AccessType, Dialect, FieldDdl, UrlParts};
use crate::error::Result;

/// SQLite dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Create a new SQLite dialect instance.
    pub fn new() -> Self {
        Self
    }
}

const RESERVED_WORDS: &[&str] = &[
    "ABORT", "ACTION", "ADD", "AFTER", "ALL", "ALTER", "ANALYZE", "AND", "AS", "ASC", "ATTACH",
    "AUTOINCREMENT", "BEFORE", "BEGIN", "BETWEEN", "BY", "CASCADE", "CASE", "CAST", "CHECK",
    "COLLATE", "COLUMN", "COMMIT", "CONFLICT", "CONSTRAINT", "CREATE", "CROSS", "CURRENT_DATE",
    "CURRENT_TIME", "CURRENT_TIMESTAMP", "DATABASE", "DEFAULT", "DEFERRABLE", "DEFERRED",
    "DELETE", "DESC", "DETACH", "DISTINCT", "DROP", "EACH", "ELSE", "END", "ESCAPE", "EXCEPT",
    "EXCLUSIVE", "EXISTS", "EXPLAIN", "FAIL", "FOR", "FOREIGN", "FROM", "FULL", "GLOB", "GROUP",
    "HAVING", "IF", "IGNORE", "IMMEDIATE", "IN", "INDEX", "INDEXED", "INITIALLY", "INNER",
    "INSERT", "INSTEAD", "INTERSECT", "INTO", "IS", "ISNULL", "JOIN", "KEY", "LEFT", "LIKE",
    "LIMIT", "MATCH", "NATURAL", "NO", "NOT", "NOTNULL", "NULL", "OF", "OFFSET", "ON", "OR",
    "ORDER", "OUTER", "PLAN", "PRAGMA", "PRIMARY", "QUERY", "RAISE", "REFERENCES", "REGEXP",
    "REINDEX", "RELEASE", "RENAME", "REPLACE", "RESTRICT", "RIGHT", "ROLLBACK", "ROW", "SAVEPOINT",
    "SELECT", "SET", "TABLE", "TEMP", "TEMPORARY", "THEN", "TO", "TRANSACTION", "TRIGGER", "UNION",
    "UNIQUE", "UPDATE", "USING", "VACUUM", "VALUES", "VIEW", "VIRTUAL", "WHEN", "WHERE",
];

impl Dialect for SqliteDialect {
    fn plugin_id(&self) -> &'static str {
        "sqlite"
    }

    fn display_name(&self) -> &'static str {
        "SQLite"
    }

    fn access_types(&self) -> &'static [AccessType] {
        &[AccessType::Native, AccessType::Odbc]
    }

    fn url(&self, parts: &UrlParts<'_>) -> Result<String> {
        Ok(format!("sqlite:{}", parts.database))
    }

    fn supports_options_in_url(&self) -> bool {
        false
    }

    fn supports_schemas(&self) -> bool {
        false
    }

    fn supports_bitmap_index(&self) -> bool {
        false
    }

    fn supports_auto_generated_keys(&self) -> bool {
        false
    }

    fn is_defaulting_to_uppercase(&self) -> bool {
        false
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        RESERVED_WORDS
    }

    fn field_definition(&self, column: &ColumnMeta, keys: &KeyColumns<'_>, ddl: &FieldDdl) -> String {
        let mut out = ddl.begin(column);

        match column.value_type {
            ValueType::Date | ValueType::Timestamp => out.push_str("DATETIME"),
            ValueType::Boolean => out.push_str("CHAR(1)"),
            ValueType::Number | ValueType::Integer | ValueType::BigNumber => {
                if keys.is_key(&column.name) {
                    if keys.use_autoinc {
                        out.push_str("INTEGER PRIMARY KEY AUTOINCREMENT");
                    } else {
                        out.push_str("INTEGER PRIMARY KEY");
                    }
                } else if column.precision != 0 || column.length > 18 {
                    out.push_str("NUMERIC");
                } else {
                    out.push_str("INTEGER");
                }
            }
            ValueType::String => out.push_str("TEXT"),
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

    fn truncate_table_statement(&self, table: &str) -> String {
        format!("DELETE FROM {}", table)
    }

    fn limit_clause(&self, rows: u64) -> String {
        format!(" LIMIT {}", rows)
    }

    fn sql_query_fields(&self, table: &str) -> String {
        format!("SELECT * FROM {} LIMIT 0", table)
    }

    fn sql_table_exists(&self, table: &str) -> String {
        format!("SELECT 1 FROM {} LIMIT 1", table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_url() {
        let parts = UrlParts {
            host: "ignored",
            database: "/var/data/app.db",
            ..Default::default()
        };
        assert_eq!(SqliteDialect::new().url(&parts).unwrap(), "sqlite:/var/data/app.db");
    }

    #[test]
    fn test_truncate_is_delete() {
        assert_eq!(SqliteDialect::new().truncate_table_statement("t"), "DELETE FROM t");
    }

    #[test]
    fn test_affinity_types() {
        let d = SqliteDialect::new();
        let ddl = FieldDdl { add_cr: false, ..Default::default() };
        let none = KeyColumns::default();
        let amount = ColumnMeta::new("amount", ValueType::Number).with_length(10, 2);
        assert_eq!(d.field_definition(&amount, &none, &ddl), "amount NUMERIC");
        let n = ColumnMeta::new("n", ValueType::Integer).with_length(9, 0);
        assert_eq!(d.field_definition(&n, &none, &ddl), "n INTEGER");
        assert_eq!(
            d.field_definition(&n, &KeyColumns::technical("n", true), &ddl),
            "n INTEGER PRIMARY KEY AUTOINCREMENT"
        );
    }
}
