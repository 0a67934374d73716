//! Microsoft SQL Server SQL dialect (Strategy pattern).
//!
//! SQL Server quotes identifiers with square brackets, addresses named
//! instances through the `instance` URL property and rejects a commit that
//! has no open transaction.

use crate::core::schema::{ColumnMeta, KeyColumns, ValueType};
use crate::core::traits::{Dialect, FieldDdl, UrlParts};
use crate::error::Result;

/// SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new SQL Server dialect instance.
    pub fn new() -> Self {
        Self
    }
}

const RESERVED_WORDS: &[&str] = &[
    "ADD", "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "AUTHORIZATION", "BACKUP", "BEGIN",
    "BETWEEN", "BREAK", "BROWSE", "BULK", "BY", "CASCADE", "CASE", "CHECK", "CHECKPOINT", "CLOSE",
    "CLUSTERED", "COALESCE", "COLLATE", "COLUMN", "COMMIT", "COMPUTE", "CONSTRAINT", "CONTAINS",
    "CONTAINSTABLE", "CONTINUE", "CONVERT", "CREATE", "CROSS", "CURRENT", "CURRENT_DATE",
    "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER", "CURSOR", "DATABASE", "DBCC",
    "DEALLOCATE", "DECLARE", "DEFAULT", "DELETE", "DENY", "DESC", "DISK", "DISTINCT",
    "DISTRIBUTED", "DOUBLE", "DROP", "DUMMY", "DUMP", "ELSE", "END", "ERRLVL", "ESCAPE", "EXCEPT",
    "EXEC", "EXECUTE", "EXISTS", "EXIT", "FETCH", "FILE", "FILLFACTOR", "FOR", "FOREIGN",
    "FREETEXT", "FREETEXTTABLE", "FROM", "FULL", "FUNCTION", "GOTO", "GRANT", "GROUP", "HAVING",
    "HOLDLOCK", "IDENTITY", "IDENTITYCOL", "IDENTITY_INSERT", "IF", "IN", "INDEX", "INNER",
    "INSERT", "INTERSECT", "INTO", "IS", "JOIN", "KEY", "KILL", "LEFT", "LIKE", "LINENO", "LOAD",
    "NATIONAL", "NOCHECK", "NONCLUSTERED", "NOT", "NULL", "NULLIF", "OF", "OFF", "OFFSETS", "ON",
    "OPEN", "OPENDATASOURCE", "OPENQUERY", "OPENROWSET", "OPENXML", "OPTION", "OR", "ORDER",
    "OUTER", "OVER", "PERCENT", "PLAN", "PRECISION", "PRIMARY", "PRINT", "PROC", "PROCEDURE",
    "PUBLIC", "RAISERROR", "READ", "READTEXT", "RECONFIGURE", "REFERENCES", "REPLICATION",
    "RESTORE", "RESTRICT", "RETURN", "REVOKE", "RIGHT", "ROLLBACK", "ROWCOUNT", "ROWGUIDCOL",
    "RULE", "SAVE", "SCHEMA", "SELECT", "SESSION_USER", "SET", "SETUSER", "SHUTDOWN", "SOME",
    "STATISTICS", "SYSTEM_USER", "TABLE", "TEXTSIZE", "THEN", "TO", "TOP", "TRAN", "TRANSACTION",
    "TRIGGER", "TRUNCATE", "TSEQUAL", "UNION", "UNIQUE", "UPDATE", "UPDATETEXT", "USE", "USER",
    "VALUES", "VARYING", "VIEW", "WAITFOR", "WHEN", "WHERE", "WHILE", "WITH", "WRITETEXT",
];

impl Dialect for MssqlDialect {
    fn plugin_id(&self) -> &'static str {
        "mssql"
    }

    fn display_name(&self) -> &'static str {
        "MS SQL Server"
    }

    fn default_port(&self) -> Option<u16> {
        Some(1433)
    }

    fn url(&self, parts: &UrlParts<'_>) -> Result<String> {
        let mut url = format!("sqlserver://{}", parts.host);
        if !parts.port.is_empty() {
            url.push(':');
            url.push_str(parts.port);
        }
        url.push('/');
        url.push_str(parts.database);
        if let Some(instance) = parts.servername.filter(|s| !s.is_empty()) {
            url.push_str(";instance=");
            url.push_str(instance);
        }
        Ok(url)
    }

    fn supports_empty_transactions(&self) -> bool {
        false
    }

    fn supports_boolean_data_type(&self) -> bool {
        true
    }

    fn supports_bitmap_index(&self) -> bool {
        false
    }

    fn release_savepoint(&self) -> bool {
        false
    }

    fn max_varchar_length(&self) -> i32 {
        8000
    }

    fn start_quote(&self) -> &'static str {
        "["
    }

    fn end_quote(&self) -> &'static str {
        "]"
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        RESERVED_WORDS
    }

    fn field_definition(&self, column: &ColumnMeta, keys: &KeyColumns<'_>, ddl: &FieldDdl) -> String {
        let mut out = ddl.begin(column);
        let length = column.length;
        let precision = column.precision;

        match column.value_type {
            ValueType::Date | ValueType::Timestamp => out.push_str("DATETIME"),
            ValueType::Boolean => {
                out.push_str(if ddl.supports_boolean { "BIT" } else { "CHAR(1)" })
            }
            ValueType::Number | ValueType::Integer | ValueType::BigNumber => {
                if keys.is_key(&column.name) {
                    if keys.use_autoinc {
                        out.push_str("BIGINT PRIMARY KEY IDENTITY(0,1)");
                    } else {
                        out.push_str("BIGINT PRIMARY KEY");
                    }
                } else if precision == 0 {
                    if length > 18 {
                        out.push_str(&format!("DECIMAL({},0)", length));
                    } else if length > 9 {
                        out.push_str("BIGINT");
                    } else {
                        out.push_str("INT");
                    }
                } else if precision > 0 && length > 0 {
                    out.push_str(&format!("DECIMAL({},{})", length, precision));
                } else {
                    out.push_str("FLOAT(53)");
                }
            }
            ValueType::String => {
                if length < self.max_varchar_length() {
                    if length > 0 {
                        out.push_str(&format!("VARCHAR({})", length));
                    } else {
                        out.push_str("VARCHAR(100)");
                    }
                } else {
                    out.push_str("TEXT");
                }
            }
            ValueType::Binary => out.push_str("VARBINARY(MAX)"),
        }

        ddl.end(out)
    }

    fn drop_column_statement(&self, table: &str, column: &ColumnMeta, _keys: &KeyColumns<'_>, _ddl: &FieldDdl) -> String {
        format!("ALTER TABLE {} DROP COLUMN {}", table, column.name)
    }

    fn modify_column_statement(&self, table: &str, column: &ColumnMeta, keys: &KeyColumns<'_>, ddl: &FieldDdl) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {}",
            table,
            self.field_definition(column, keys, &FieldDdl { add_field_name: true, add_cr: false, ..*ddl })
        )
    }

    fn drop_table_if_exists_statement(&self, table: &str) -> String {
        format!("IF OBJECT_ID('{}', 'U') IS NOT NULL DROP TABLE {}", table, table)
    }

    fn sql_query_fields(&self, table: &str) -> String {
        format!("SELECT TOP 1 * FROM {}", table)
    }

    fn sql_table_exists(&self, table: &str) -> String {
        format!("SELECT TOP 1 * FROM {}", table)
    }

    fn sql_column_exists(&self, column: &str, table: &str) -> String {
        format!("SELECT TOP 1 {} FROM {}", column, table)
    }

    fn sql_lock_tables(&self, tables: &[String]) -> Option<String> {
        if tables.is_empty() {
            return None;
        }
        let statements: String = tables
            .iter()
            .map(|t| format!("SELECT top 0 * FROM {} WITH (UPDLOCK, HOLDLOCK);\n", t))
            .collect();
        Some(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_with_instance() {
        let d = MssqlDialect::new();
        let parts = UrlParts {
            host: "sql1",
            port: "1433",
            database: "dw",
            servername: Some("REPORTING"),
            ..Default::default()
        };
        assert_eq!(d.url(&parts).unwrap(), "sqlserver://sql1:1433/dw;instance=REPORTING");

        let parts = UrlParts { servername: None, ..parts };
        assert_eq!(d.url(&parts).unwrap(), "sqlserver://sql1:1433/dw");
    }

    #[test]
    fn test_capabilities() {
        let d = MssqlDialect::new();
        assert!(!d.supports_empty_transactions());
        assert!(!d.supports_sequences());
        assert_eq!(d.start_quote(), "[");
        assert_eq!(d.end_quote(), "]");
    }

    #[test]
    fn test_field_definitions() {
        let d = MssqlDialect::new();
        let ddl = FieldDdl { add_cr: false, ..Default::default() };
        let none = KeyColumns::default();

        let id = ColumnMeta::new("id", ValueType::Integer).with_length(9, 0);
        assert_eq!(
            d.field_definition(&id, &KeyColumns::technical("id", true), &ddl),
            "id BIGINT PRIMARY KEY IDENTITY(0,1)"
        );
        let s = ColumnMeta::new("s", ValueType::String);
        assert_eq!(d.field_definition(&s, &none, &ddl), "s VARCHAR(100)");
        let n = ColumnMeta::new("n", ValueType::Number).with_length(10, 3);
        assert_eq!(d.field_definition(&n, &none, &ddl), "n DECIMAL(10,3)");
    }

    #[test]
    fn test_lock_statement_per_table() {
        let d = MssqlDialect::new();
        let sql = d
            .sql_lock_tables(&["[a]".to_string(), "[b]".to_string()])
            .unwrap();
        assert_eq!(sql.lines().count(), 2);
        assert!(sql.contains("[b] WITH (UPDLOCK, HOLDLOCK)"));
    }
}
