//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! PostgreSQL folds unquoted identifiers to lower case, has real sequences
//! and a native boolean type, and takes table locks only inside a
//! transaction, so there is no explicit unlock statement.

use crate::core::schema::{ColumnMeta, KeyColumns, ValueType};
use crate::core::traits::{Dialect, FieldDdl, UrlParts};
use crate::drivers::common::{integer_type, sized, table_list};
use crate::error::Result;
use crate::typemap::{NativeColumn, NativeType};

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

const RESERVED_WORDS: &[&str] = &[
    "A", "ABORT", "ABS", "ABSOLUTE", "ACCESS", "ACTION", "ADA", "ADD", "ADMIN", "AFTER",
    "AGGREGATE", "ALIAS", "ALL", "ALLOCATE", "ALTER", "ANALYSE", "ANALYZE", "AND", "ANY", "ARE",
    "ARRAY", "AS", "ASC", "ASENSITIVE", "ASSERTION", "ASSIGNMENT", "ASYMMETRIC", "AT", "ATOMIC",
    "AUTHORIZATION", "AVG", "BACKWARD", "BEFORE", "BEGIN", "BETWEEN", "BIGINT", "BINARY", "BIT",
    "BITVAR", "BIT_LENGTH", "BLOB", "BOOLEAN", "BOTH", "BREADTH", "BY", "C", "CACHE", "CALL",
    "CALLED", "CARDINALITY", "CASCADE", "CASCADED", "CASE", "CAST", "CATALOG", "CHAIN", "CHAR",
    "CHARACTER", "CHARACTERISTICS", "CHECK", "CHECKPOINT", "CLASS", "CLOSE", "CLUSTER",
    "COALESCE", "COLLATE", "COLLATION", "COLUMN", "COMMENT", "COMMIT", "COMMITTED", "CONSTRAINT",
    "CONSTRAINTS", "CONVERSION", "CONVERT", "COPY", "CREATE", "CREATEDB", "CREATEUSER", "CROSS",
    "CUBE", "CURRENT", "CURRENT_DATE", "CURRENT_PATH", "CURRENT_ROLE", "CURRENT_TIME",
    "CURRENT_TIMESTAMP", "CURRENT_USER", "CURSOR", "CYCLE", "DATA", "DATABASE", "DATE", "DAY",
    "DEALLOCATE", "DEC", "DECIMAL", "DECLARE", "DEFAULT", "DEFERRABLE", "DEFERRED", "DEFINER",
    "DELETE", "DELIMITER", "DELIMITERS", "DESC", "DISTINCT", "DO", "DOMAIN", "DOUBLE", "DROP",
    "EACH", "ELSE", "ENCODING", "ENCRYPTED", "END", "ESCAPE", "EXCEPT", "EXCLUSIVE", "EXECUTE",
    "EXISTS", "EXPLAIN", "EXTERNAL", "EXTRACT", "FALSE", "FETCH", "FIRST", "FLOAT", "FOR",
    "FORCE", "FOREIGN", "FORWARD", "FREEZE", "FROM", "FULL", "FUNCTION", "GLOBAL", "GRANT",
    "GROUP", "HANDLER", "HAVING", "HOLD", "HOUR", "ILIKE", "IMMEDIATE", "IMMUTABLE", "IMPLICIT",
    "IN", "INCREMENT", "INDEX", "INHERITS", "INITIALLY", "INNER", "INOUT", "INPUT", "INSENSITIVE",
    "INSERT", "INSTEAD", "INT", "INTEGER", "INTERSECT", "INTERVAL", "INTO", "INVOKER", "IS",
    "ISNULL", "ISOLATION", "JOIN", "KEY", "LANCOMPILER", "LANGUAGE", "LAST", "LEADING", "LEFT",
    "LEVEL", "LIKE", "LIMIT", "LISTEN", "LOAD", "LOCAL", "LOCALTIME", "LOCALTIMESTAMP",
    "LOCATION", "LOCK", "MATCH", "MAXVALUE", "MINUTE", "MINVALUE", "MODE", "MONTH", "MOVE",
    "NAMES", "NATIONAL", "NATURAL", "NCHAR", "NEW", "NEXT", "NO", "NOCREATEDB", "NOCREATEUSER",
    "NONE", "NOT", "NOTHING", "NOTIFY", "NOTNULL", "NULL", "NULLIF", "NUMERIC", "OF", "OFF",
    "OFFSET", "OIDS", "OLD", "ON", "ONLY", "OPERATOR", "OPTION", "OR", "ORDER", "OUT", "OUTER",
    "OVERLAPS", "OVERLAY", "OWNER", "PARTIAL", "PASSWORD", "PATH", "PENDANT", "PLACING",
    "POSITION", "PRECISION", "PREPARE", "PRESERVE", "PRIMARY", "PRIOR", "PRIVILEGES",
    "PROCEDURAL", "PROCEDURE", "READ", "REAL", "RECHECK", "REFERENCES", "REINDEX", "RELATIVE",
    "RENAME", "REPLACE", "RESET", "RESTRICT", "RETURNS", "REVOKE", "RIGHT", "ROLLBACK", "ROW",
    "ROWS", "RULE", "SCHEMA", "SCROLL", "SECOND", "SECURITY", "SELECT", "SEQUENCE", "SERIALIZABLE",
    "SESSION", "SESSION_USER", "SET", "SETOF", "SHARE", "SHOW", "SIMILAR", "SIMPLE", "SMALLINT",
    "SOME", "STABLE", "START", "STATEMENT", "STATISTICS", "STDIN", "STDOUT", "STORAGE", "STRICT",
    "SUBSTRING", "SYMMETRIC", "SYSID", "SYSTEM", "TABLE", "TEMP", "TEMPLATE", "TEMPORARY", "THEN",
    "TIME", "TIMESTAMP", "TO", "TOAST", "TRAILING", "TRANSACTION", "TREAT", "TRIGGER", "TRIM",
    "TRUE", "TRUNCATE", "TRUSTED", "TYPE", "UNENCRYPTED", "UNION", "UNIQUE", "UNKNOWN", "UNLISTEN",
    "UNTIL", "UPDATE", "USAGE", "USER", "USING", "VACUUM", "VALID", "VALIDATOR", "VALUES",
    "VARCHAR", "VARYING", "VERBOSE", "VERSION", "VIEW", "VOLATILE", "WHEN", "WHERE", "WITH",
    "WITHOUT", "WORK", "WRITE", "YEAR", "ZONE",
];

impl Dialect for PostgresDialect {
    fn plugin_id(&self) -> &'static str {
        "postgresql"
    }

    fn display_name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn default_port(&self) -> Option<u16> {
        Some(5432)
    }

    fn url(&self, parts: &UrlParts<'_>) -> Result<String> {
        let mut url = format!("postgresql://{}", parts.host);
        if !parts.port.is_empty() {
            url.push(':');
            url.push_str(parts.port);
        }
        url.push('/');
        url.push_str(parts.database);
        Ok(url)
    }

    fn extra_option_indicator(&self) -> &'static str {
        "?"
    }

    fn extra_option_separator(&self) -> &'static str {
        "&"
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn supports_boolean_data_type(&self) -> bool {
        true
    }

    fn supports_timestamp_data_type(&self) -> bool {
        true
    }

    fn is_defaulting_to_uppercase(&self) -> bool {
        false
    }

    fn supports_bitmap_index(&self) -> bool {
        false
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        RESERVED_WORDS
    }

    fn field_definition(&self, column: &ColumnMeta, keys: &KeyColumns<'_>, ddl: &FieldDdl) -> String {
        let mut out = ddl.begin(column);
        let length = column.length;
        let precision = column.precision;

        match column.value_type {
            ValueType::Date | ValueType::Timestamp => out.push_str("TIMESTAMP"),
            ValueType::Boolean => {
                out.push_str(if ddl.supports_boolean { "BOOLEAN" } else { "CHAR(1)" })
            }
            ValueType::Number | ValueType::Integer | ValueType::BigNumber => {
                if keys.is_key(&column.name) {
                    out.push_str("BIGSERIAL");
                } else if length > 0 {
                    if precision > 0 || length > 18 {
                        out.push_str(&sized("NUMERIC", length, precision));
                    } else {
                        out.push_str(integer_type(length, "SMALLINT", "INTEGER", "BIGINT"));
                    }
                } else {
                    out.push_str("DOUBLE PRECISION");
                }
            }
            ValueType::String => {
                if length < 1 || length >= self.max_varchar_length() {
                    out.push_str("TEXT");
                } else {
                    out.push_str(&format!("VARCHAR({})", length));
                }
            }
            ValueType::Binary => out.push_str("BYTEA"),
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
            "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
            table,
            column.name,
            self.field_definition(column, keys, &FieldDdl { add_field_name: false, add_cr: false, ..*ddl })
        )
    }

    fn limit_clause(&self, rows: u64) -> String {
        format!(" limit {}", rows)
    }

    fn sql_query_fields(&self, table: &str) -> String {
        format!("SELECT * FROM {} limit 0", table)
    }

    fn sql_table_exists(&self, table: &str) -> String {
        format!("SELECT 1 FROM {} limit 1", table)
    }

    fn sql_column_exists(&self, column: &str, table: &str) -> String {
        format!("SELECT {} FROM {} limit 1", column, table)
    }

    fn sql_lock_tables(&self, tables: &[String]) -> Option<String> {
        table_list(tables).map(|list| format!("LOCK TABLE {} IN ACCESS EXCLUSIVE MODE;\n", list))
    }

    fn sql_next_sequence_value(&self, sequence: &str) -> String {
        format!("SELECT nextval('{}')", sequence)
    }

    fn sql_current_sequence_value(&self, sequence: &str) -> String {
        format!("SELECT currval('{}')", sequence)
    }

    fn sql_sequence_exists(&self, sequence: &str) -> String {
        let name = sequence.rsplit('.').next().unwrap_or(sequence).replace('"', "");
        format!(
            "SELECT relname AS sequence_name FROM pg_catalog.pg_statio_all_sequences WHERE relname = '{}'",
            name
        )
    }

    fn correct_column(&self, native: &NativeColumn, column: &mut ColumnMeta) {
        if native.native_type == NativeType::Double && column.length >= 16 && column.precision >= 16 {
            column.value_type = ValueType::Number;
            column.length = -1;
            column.precision = -1;
        }
        if native.native_type == NativeType::Numeric && native.precision == 0 && native.scale == 0 {
            column.value_type = ValueType::BigNumber;
            column.length = -1;
            column.precision = -1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url() {
        let d = PostgresDialect::new();
        let parts = UrlParts {
            host: "db1",
            port: "5433",
            database: "sales",
            ..Default::default()
        };
        assert_eq!(d.url(&parts).unwrap(), "postgresql://db1:5433/sales");

        let parts = UrlParts { port: "", ..parts };
        assert_eq!(d.url(&parts).unwrap(), "postgresql://db1/sales");
    }

    #[test]
    fn test_field_definitions() {
        let d = PostgresDialect::new();
        let ddl = FieldDdl { add_cr: false, ..Default::default() };
        let none = KeyColumns::default();

        let col = ColumnMeta::new("id", ValueType::Integer).with_length(9, 0);
        assert_eq!(d.field_definition(&col, &KeyColumns::technical("id", true), &ddl), "id BIGSERIAL");
        assert_eq!(d.field_definition(&col, &none, &ddl), "id INTEGER");

        let col = ColumnMeta::new("amount", ValueType::Number).with_length(12, 2);
        assert_eq!(d.field_definition(&col, &none, &ddl), "amount NUMERIC(12, 2)");

        let col = ColumnMeta::new("ratio", ValueType::Number);
        assert_eq!(d.field_definition(&col, &none, &ddl), "ratio DOUBLE PRECISION");

        let col = ColumnMeta::new("name", ValueType::String).with_length(40, -1);
        assert_eq!(d.field_definition(&col, &none, &ddl), "name VARCHAR(40)");

        let col = ColumnMeta::new("notes", ValueType::String);
        assert_eq!(d.field_definition(&col, &none, &ddl), "notes TEXT");

        let col = ColumnMeta::new("ok", ValueType::Boolean);
        assert_eq!(d.field_definition(&col, &none, &ddl), "ok CHAR(1)");
        let ddl_bool = FieldDdl { supports_boolean: true, ..ddl };
        assert_eq!(d.field_definition(&col, &none, &ddl_bool), "ok BOOLEAN");
    }

    #[test]
    fn test_sequences_and_locks() {
        let d = PostgresDialect::new();
        assert!(d.supports_sequences());
        assert_eq!(d.sql_next_sequence_value("public.seq"), "SELECT nextval('public.seq')");
        assert!(d.sql_sequence_exists("\"public\".\"seq\"").ends_with("relname = 'seq'"));
        assert_eq!(
            d.sql_lock_tables(&["a".to_string(), "b".to_string()]).unwrap(),
            "LOCK TABLE a, b IN ACCESS EXCLUSIVE MODE;\n"
        );
        assert!(d.sql_unlock_tables(&["a".to_string()]).is_none());
    }

    #[test]
    fn test_reserved_words() {
        let d = PostgresDialect::new();
        assert!(d.is_reserved_word("user"));
        assert!(d.is_reserved_word("LIMIT"));
        assert!(!d.is_reserved_word("customer"));
    }
}
