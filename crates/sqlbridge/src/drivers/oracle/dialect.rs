//! Oracle SQL dialect (Strategy pattern).
//!
//! Oracle has sequences and tablespaces but no LIMIT clause, no boolean
//! column type and no auto-generated keys. Unsized NUMBER columns are
//! reported with zero precision and a negative scale.

use crate::core::schema::{ColumnMeta, KeyColumns, ValueType};
use crate::core::traits::{AccessType, Dialect, FieldDdl, UrlParts};
use crate::drivers::common::{sized, table_list};
use crate::error::Result;
use crate::typemap::{NativeColumn, NativeType};

/// Oracle dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct OracleDialect;

impl OracleDialect {
    /// Create a new Oracle dialect instance.
    pub fn new() -> Self {
        Self
    }
}

const RESERVED_WORDS: &[&str] = &[
    "ACCESS", "ADD", "ALL", "ALTER", "AND", "ANY", "ARRAYLEN", "AS", "ASC", "AUDIT", "BETWEEN",
    "BY", "CHAR", "CHECK", "CLUSTER", "COLUMN", "COMMENT", "COMPRESS", "CONNECT", "CREATE",
    "CURRENT", "DATE", "DECIMAL", "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP", "ELSE",
    "EXCLUSIVE", "EXISTS", "FILE", "FLOAT", "FOR", "FROM", "GRANT", "GROUP", "HAVING",
    "IDENTIFIED", "IMMEDIATE", "IN", "INCREMENT", "INDEX", "INITIAL", "INSERT", "INTEGER",
    "INTERSECT", "INTO", "IS", "LEVEL", "LIKE", "LOCK", "LONG", "MAXEXTENTS", "MINUS", "MODE",
    "MODIFY", "NOAUDIT", "NOCOMPRESS", "NOT", "NOTFOUND", "NOWAIT", "NULL", "NUMBER", "OF",
    "OFFLINE", "ON", "ONLINE", "OPTION", "OR", "ORDER", "PCTFREE", "PRIOR", "PRIVILEGES", "PUBLIC",
    "RAW", "RENAME", "RESOURCE", "REVOKE", "ROW", "ROWID", "ROWLABEL", "ROWNUM", "ROWS", "SELECT",
    "SESSION", "SET", "SHARE", "SIZE", "SMALLINT", "SQLBUF", "START", "SUCCESSFUL", "SYNONYM",
    "SYSDATE", "TABLE", "THEN", "TO", "TRIGGER", "UID", "UNION", "UNIQUE", "UPDATE", "USER",
    "VALIDATE", "VALUES", "VARCHAR", "VARCHAR2", "VIEW", "WHENEVER", "WHERE", "WITH",
];

impl Dialect for OracleDialect {
    fn plugin_id(&self) -> &'static str {
        "oracle"
    }

    fn display_name(&self) -> &'static str {
        "Oracle"
    }

    fn access_types(&self) -> &'static [AccessType] {
        &[AccessType::Native, AccessType::Oci, AccessType::Odbc, AccessType::Jndi]
    }

    fn default_port(&self) -> Option<u16> {
        Some(1521)
    }

    fn url(&self, parts: &UrlParts<'_>) -> Result<String> {
        let mut url = format!("oracle://{}", parts.host);
        if !parts.port.is_empty() {
            url.push(':');
            url.push_str(parts.port);
        }
        url.push('/');
        url.push_str(parts.database);
        Ok(url)
    }

    fn supports_options_in_url(&self) -> bool {
        false
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn supports_timestamp_data_type(&self) -> bool {
        true
    }

    fn supports_auto_generated_keys(&self) -> bool {
        false
    }

    fn supports_autoinc(&self) -> bool {
        false
    }

    fn max_varchar_length(&self) -> i32 {
        2000
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        RESERVED_WORDS
    }

    fn field_definition(&self, column: &ColumnMeta, _keys: &KeyColumns<'_>, ddl: &FieldDdl) -> String {
        let mut out = ddl.begin(column);
        let length = column.length;
        let precision = column.precision;

        match column.value_type {
            ValueType::Date => out.push_str("DATE"),
            ValueType::Timestamp => {
                out.push_str(if ddl.supports_timestamp { "TIMESTAMP" } else { "DATE" })
            }
            ValueType::Boolean => out.push_str("CHAR(1)"),
            ValueType::Number | ValueType::Integer | ValueType::BigNumber => {
                if length > 0 {
                    out.push_str(&sized("NUMBER", length, precision));
                } else {
                    out.push_str("NUMBER");
                }
            }
            ValueType::String => {
                if length > 0 && length <= self.max_varchar_length() {
                    out.push_str(&format!("VARCHAR2({})", length));
                } else {
                    out.push_str("CLOB");
                }
            }
            ValueType::Binary => out.push_str("BLOB"),
        }

        ddl.end(out)
    }

    fn add_column_statement(&self, table: &str, column: &ColumnMeta, keys: &KeyColumns<'_>, ddl: &FieldDdl) -> String {
        format!(
            "ALTER TABLE {} ADD ( {} ) ",
            table,
            self.field_definition(column, keys, &FieldDdl { add_field_name: true, add_cr: false, ..*ddl })
        )
    }

    fn drop_column_statement(&self, table: &str, column: &ColumnMeta, _keys: &KeyColumns<'_>, _ddl: &FieldDdl) -> String {
        format!("ALTER TABLE {} DROP ( {} ) ", table, column.name)
    }

    fn modify_column_statement(&self, table: &str, column: &ColumnMeta, keys: &KeyColumns<'_>, ddl: &FieldDdl) -> String {
        format!(
            "ALTER TABLE {} MODIFY ( {} ) ",
            table,
            self.field_definition(column, keys, &FieldDdl { add_field_name: true, add_cr: false, ..*ddl })
        )
    }

    fn tablespace_ddl(&self, tablespace: &str) -> String {
        if tablespace.is_empty() {
            String::new()
        } else {
            format!("TABLESPACE {}", tablespace)
        }
    }

    fn drop_table_if_exists_statement(&self, table: &str) -> String {
        format!("DROP TABLE {}", table)
    }

    fn sql_query_fields(&self, table: &str) -> String {
        format!("SELECT * FROM {} WHERE 1=0", table)
    }

    fn sql_table_exists(&self, table: &str) -> String {
        format!("SELECT 1 FROM {} WHERE ROWNUM <= 1", table)
    }

    fn sql_column_exists(&self, column: &str, table: &str) -> String {
        format!("SELECT {} FROM {} WHERE 1=0", column, table)
    }

    fn sql_lock_tables(&self, tables: &[String]) -> Option<String> {
        table_list(tables).map(|list| format!("LOCK TABLE {} IN EXCLUSIVE MODE;\n", list))
    }

    fn sql_next_sequence_value(&self, sequence: &str) -> String {
        format!("SELECT {}.nextval FROM dual", sequence)
    }

    fn sql_current_sequence_value(&self, sequence: &str) -> String {
        format!("SELECT {}.currval FROM DUAL", sequence)
    }

    fn sql_sequence_exists(&self, sequence: &str) -> String {
        match sequence.split_once('.') {
            Some((owner, name)) => format!(
                "SELECT * FROM ALL_SEQUENCES WHERE SEQUENCE_NAME = '{}' AND SEQUENCE_OWNER = '{}'",
                name.replace('"', "").to_uppercase(),
                owner.replace('"', "").to_uppercase()
            ),
            None => format!(
                "SELECT * FROM USER_SEQUENCES WHERE SEQUENCE_NAME = '{}'",
                sequence.replace('"', "").to_uppercase()
            ),
        }
    }

    fn correct_column(&self, native: &NativeColumn, column: &mut ColumnMeta) {
        let numeric = matches!(native.native_type, NativeType::Numeric | NativeType::Decimal);
        if numeric && native.scale == 0 && native.precision == 38 {
            column.value_type = ValueType::Integer;
        }
        if numeric && column.length <= 0 && column.precision <= 0 {
            column.value_type = ValueType::BigNumber;
            column.length = -1;
            column.precision = -1;
        }
        if matches!(native.native_type, NativeType::VarBinary | NativeType::LongVarBinary) {
            column.value_type = ValueType::String;
            column.length = native.display_size;
            column.precision = -1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tablespace_and_alter() {
        let d = OracleDialect::new();
        assert_eq!(d.tablespace_ddl("USERS"), "TABLESPACE USERS");
        assert_eq!(d.tablespace_ddl(""), "");

        let col = ColumnMeta::new("c", ValueType::String).with_length(20, -1);
        let keys = KeyColumns::default();
        let ddl = FieldDdl::default();
        assert_eq!(
            d.add_column_statement("T", &col, &keys, &ddl),
            "ALTER TABLE T ADD ( c VARCHAR2(20) ) "
        );
        assert_eq!(d.drop_column_statement("T", &col, &keys, &ddl), "ALTER TABLE T DROP ( c ) ");
    }

    #[test]
    fn test_sequence_sql() {
        let d = OracleDialect::new();
        assert_eq!(d.sql_next_sequence_value("S1"), "SELECT S1.nextval FROM dual");
        assert_eq!(
            d.sql_sequence_exists("seq"),
            "SELECT * FROM USER_SEQUENCES WHERE SEQUENCE_NAME = 'SEQ'"
        );
        assert!(d
            .sql_sequence_exists("app.seq")
            .ends_with("SEQUENCE_NAME = 'SEQ' AND SEQUENCE_OWNER = 'APP'"));
    }

    #[test]
    fn test_field_definitions() {
        let d = OracleDialect::new();
        let ddl = FieldDdl { add_cr: false, ..Default::default() };
        let none = KeyColumns::default();
        let n = ColumnMeta::new("n", ValueType::Number).with_length(12, 2);
        assert_eq!(d.field_definition(&n, &none, &ddl), "n NUMBER(12, 2)");
        let s = ColumnMeta::new("s", ValueType::String).with_length(5000, -1);
        assert_eq!(d.field_definition(&s, &none, &ddl), "s CLOB");
        let t = ColumnMeta::new("t", ValueType::Timestamp);
        assert_eq!(d.field_definition(&t, &none, &ddl), "t DATE");
    }

    #[test]
    fn test_no_limit_clause() {
        assert_eq!(OracleDialect::new().limit_clause(5), "");
        assert!(!OracleDialect::new().supports_options_in_url());
    }
}
