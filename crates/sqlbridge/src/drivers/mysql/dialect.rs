//! MySQL and MariaDB SQL dialect (Strategy pattern).
//!
//! Both vendors share one rule set; only the identity and the URL scheme
//! differ. MySQL quotes identifiers with backticks, has no sequences and
//! locks tables with an explicit `LOCK TABLES` / `UNLOCK TABLES` pair.

use crate::core::schema::{ColumnMeta, KeyColumns, ValueType};
use crate::core::traits::{Dialect, FieldDdl, UrlParts};
use crate::drivers::common::table_list;
use crate::error::Result;
use crate::typemap::{NativeColumn, NativeType};

/// Which server flavour the rules are for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MysqlVariant {
    #[default]
    Mysql,
    MariaDb,
}

/// MySQL-family dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect {
    variant: MysqlVariant,
}

impl MysqlDialect {
    pub fn mysql() -> Self {
        Self {
            variant: MysqlVariant::Mysql,
        }
    }

    pub fn mariadb() -> Self {
        Self {
            variant: MysqlVariant::MariaDb,
        }
    }

    pub fn variant(&self) -> MysqlVariant {
        self.variant
    }
}

const RESERVED_WORDS: &[&str] = &[
    "ADD", "ALL", "ALTER", "ANALYZE", "AND", "AS", "ASC", "ASENSITIVE", "BEFORE", "BETWEEN",
    "BIGINT", "BINARY", "BLOB", "BOTH", "BY", "CALL", "CASCADE", "CASE", "CHANGE", "CHAR",
    "CHARACTER", "CHECK", "COLLATE", "COLUMN", "CONDITION", "CONNECTION", "CONSTRAINT",
    "CONTINUE", "CONVERT", "CREATE", "CROSS", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP",
    "CURRENT_USER", "CURSOR", "DATABASE", "DATABASES", "DAY_HOUR", "DAY_MICROSECOND",
    "DAY_MINUTE", "DAY_SECOND", "DEC", "DECIMAL", "DECLARE", "DEFAULT", "DELAYED", "DELETE",
    "DESC", "DESCRIBE", "DETERMINISTIC", "DISTINCT", "DISTINCTROW", "DIV", "DOUBLE", "DROP",
    "DUAL", "EACH", "ELSE", "ELSEIF", "ENCLOSED", "ESCAPED", "EXISTS", "EXIT", "EXPLAIN", "FALSE",
    "FETCH", "FLOAT", "FLOAT4", "FLOAT8", "FOR", "FORCE", "FOREIGN", "FROM", "FULLTEXT", "GOTO",
    "GRANT", "GROUP", "HAVING", "HIGH_PRIORITY", "HOUR_MICROSECOND", "HOUR_MINUTE",
    "HOUR_SECOND", "IF", "IGNORE", "IN", "INDEX", "INFILE", "INNER", "INOUT", "INSENSITIVE",
    "INSERT", "INT", "INT1", "INT2", "INT3", "INT4", "INT8", "INTEGER", "INTERVAL", "INTO", "IS",
    "ITERATE", "JOIN", "KEY", "KEYS", "KILL", "LABEL", "LEADING", "LEAVE", "LEFT", "LIKE", "LIMIT",
    "LINES", "LOAD", "LOCALTIME", "LOCALTIMESTAMP", "LOCK", "LONG", "LONGBLOB", "LONGTEXT", "LOOP",
    "LOW_PRIORITY", "MATCH", "MEDIUMBLOB", "MEDIUMINT", "MEDIUMTEXT", "MIDDLEINT",
    "MINUTE_MICROSECOND", "MINUTE_SECOND", "MOD", "MODIFIES", "NATURAL", "NOT",
    "NO_WRITE_TO_BINLOG", "NULL", "NUMERIC", "ON", "OPTIMIZE", "OPTION", "OPTIONALLY", "OR",
    "ORDER", "OUT", "OUTER", "OUTFILE", "POSITION", "PRECISION", "PRIMARY", "PROCEDURE", "PURGE",
    "RAID0", "READ", "READS", "REAL", "REFERENCES", "REGEXP", "RELEASE", "RENAME", "REPEAT",
    "REPLACE", "REQUIRE", "RESTRICT", "RETURN", "REVOKE", "RIGHT", "RLIKE", "SCHEMA", "SCHEMAS",
    "SECOND_MICROSECOND", "SELECT", "SENSITIVE", "SEPARATOR", "SET", "SHOW", "SMALLINT", "SONAME",
    "SPATIAL", "SPECIFIC", "SQL", "SQLEXCEPTION", "SQLSTATE", "SQLWARNING", "SQL_BIG_RESULT",
    "SQL_CALC_FOUND_ROWS", "SQL_SMALL_RESULT", "SSL", "STARTING", "STRAIGHT_JOIN", "TABLE",
    "TERMINATED", "THEN", "TINYBLOB", "TINYINT", "TINYTEXT", "TO", "TRAILING", "TRIGGER", "TRUE",
    "UNDO", "UNION", "UNIQUE", "UNLOCK", "UNSIGNED", "UPDATE", "USAGE", "USE", "USING", "UTC_DATE",
    "UTC_TIME", "UTC_TIMESTAMP", "VALUES", "VARBINARY", "VARCHAR", "VARCHARACTER", "VARYING",
    "WHEN", "WHERE", "WHILE", "WITH", "WRITE", "X509", "XOR", "YEAR_MONTH", "ZEROFILL",
];

impl Dialect for MysqlDialect {
    fn plugin_id(&self) -> &'static str {
        match self.variant {
            MysqlVariant::Mysql => "mysql",
            MysqlVariant::MariaDb => "mariadb",
        }
    }

    fn display_name(&self) -> &'static str {
        match self.variant {
            MysqlVariant::Mysql => "MySQL",
            MysqlVariant::MariaDb => "MariaDB",
        }
    }

    fn default_port(&self) -> Option<u16> {
        Some(3306)
    }

    fn default_options(&self) -> Vec<(&'static str, &'static str)> {
        vec![("defaultFetchSize", "500"), ("useCursorFetch", "true")]
    }

    fn url(&self, parts: &UrlParts<'_>) -> Result<String> {
        let scheme = match self.variant {
            MysqlVariant::Mysql => "mysql",
            MysqlVariant::MariaDb => "mariadb",
        };
        let mut url = format!("{}://{}", scheme, parts.host);
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

    fn supports_boolean_data_type(&self) -> bool {
        true
    }

    fn supports_bitmap_index(&self) -> bool {
        false
    }

    fn supports_savepoints(&self) -> bool {
        true
    }

    fn fetch_size(&self, streaming: bool) -> Option<i32> {
        streaming.then_some(i32::MIN)
    }

    fn max_varchar_length(&self) -> i32 {
        255
    }

    fn start_quote(&self) -> &'static str {
        "`"
    }

    fn end_quote(&self) -> &'static str {
        "`"
    }

    fn is_defaulting_to_uppercase(&self) -> bool {
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
            ValueType::Date | ValueType::Timestamp => out.push_str("DATETIME"),
            ValueType::Boolean => {
                out.push_str(if ddl.supports_boolean { "BOOLEAN" } else { "CHAR(1)" })
            }
            ValueType::Number | ValueType::Integer | ValueType::BigNumber => {
                if keys.is_key(&column.name) {
                    if keys.use_autoinc {
                        out.push_str("BIGINT AUTO_INCREMENT NOT NULL PRIMARY KEY");
                    } else {
                        out.push_str("BIGINT NOT NULL PRIMARY KEY");
                    }
                } else if column.value_type == ValueType::Integer || (precision == 0 && length > 0) {
                    if length > 9 {
                        if length < 19 {
                            out.push_str("BIGINT");
                        } else {
                            out.push_str(&format!("DECIMAL({})", length));
                        }
                    } else {
                        out.push_str("INT");
                    }
                } else if length > 0 && precision > 0 {
                    out.push_str(&format!("DECIMAL({}, {})", length, precision));
                } else {
                    out.push_str("DOUBLE");
                }
            }
            ValueType::String => {
                if length > 0 {
                    if length == 1 {
                        out.push_str("CHAR(1)");
                    } else if length < 256 {
                        out.push_str(&format!("VARCHAR({})", length));
                    } else if length < 65_536 {
                        out.push_str("TEXT");
                    } else if length < 16_777_216 {
                        out.push_str("MEDIUMTEXT");
                    } else {
                        out.push_str("LONGTEXT");
                    }
                } else {
                    out.push_str("TINYTEXT");
                }
            }
            ValueType::Binary => out.push_str("LONGBLOB"),
        }

        ddl.end(out)
    }

    fn drop_column_statement(&self, table: &str, column: &ColumnMeta, _keys: &KeyColumns<'_>, _ddl: &FieldDdl) -> String {
        format!("ALTER TABLE {} DROP {}", table, column.name)
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

    fn sql_column_exists(&self, column: &str, table: &str) -> String {
        format!("SELECT {} FROM {} LIMIT 0", column, table)
    }

    fn sql_lock_tables(&self, tables: &[String]) -> Option<String> {
        if tables.is_empty() {
            return None;
        }
        let list = tables
            .iter()
            .map(|t| format!("{} WRITE", t))
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!("LOCK TABLES {};\n", list))
    }

    fn sql_unlock_tables(&self, tables: &[String]) -> Option<String> {
        table_list(tables).map(|_| "UNLOCK TABLES".to_string())
    }

    fn quote_sql_string(&self, value: &str) -> String {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('\'', "''")
            .replace('\n', "\\n")
            .replace('\r', "\\r");
        format!("'{}'", escaped)
    }

    fn correct_column(&self, native: &NativeColumn, column: &mut ColumnMeta) {
        if native.native_type.is_floating() && column.precision >= column.length {
            column.value_type = ValueType::Number;
            column.length = -1;
            column.precision = -1;
        }
        if matches!(native.native_type, NativeType::VarBinary | NativeType::LongVarBinary) {
            column.length = -1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants() {
        assert_eq!(MysqlDialect::mysql().plugin_id(), "mysql");
        assert_eq!(MysqlDialect::mariadb().plugin_id(), "mariadb");
        assert_eq!(MysqlDialect::default().variant(), MysqlVariant::Mysql);

        let parts = UrlParts {
            host: "h",
            port: "3306",
            database: "d",
            ..Default::default()
        };
        assert_eq!(MysqlDialect::mariadb().url(&parts).unwrap(), "mariadb://h:3306/d");
    }

    #[test]
    fn test_streaming_fetch_size() {
        let d = MysqlDialect::mysql();
        assert_eq!(d.fetch_size(true), Some(i32::MIN));
        assert_eq!(d.fetch_size(false), None);
    }

    #[test]
    fn test_locks() {
        let d = MysqlDialect::mysql();
        let tables = vec!["`a`".to_string(), "b".to_string()];
        assert_eq!(d.sql_lock_tables(&tables).unwrap(), "LOCK TABLES `a` WRITE, b WRITE;\n");
        assert_eq!(d.sql_unlock_tables(&tables).unwrap(), "UNLOCK TABLES");
    }

    #[test]
    fn test_field_definitions() {
        let d = MysqlDialect::mysql();
        let ddl = FieldDdl { add_cr: false, ..Default::default() };
        let none = KeyColumns::default();

        let id = ColumnMeta::new("id", ValueType::Integer).with_length(9, 0);
        assert_eq!(
            d.field_definition(&id, &KeyColumns::technical("id", true), &ddl),
            "id BIGINT AUTO_INCREMENT NOT NULL PRIMARY KEY"
        );
        assert_eq!(d.field_definition(&id, &none, &ddl), "id INT");

        let big = ColumnMeta::new("n", ValueType::Integer).with_length(15, 0);
        assert_eq!(d.field_definition(&big, &none, &ddl), "n BIGINT");

        let s = ColumnMeta::new("s", ValueType::String).with_length(1000, -1);
        assert_eq!(d.field_definition(&s, &none, &ddl), "s TEXT");

        let dt = ColumnMeta::new("d", ValueType::Date);
        assert_eq!(d.field_definition(&dt, &none, &ddl), "d DATETIME");
    }

    #[test]
    fn test_string_literal_escaping() {
        let d = MysqlDialect::mysql();
        assert_eq!(d.quote_sql_string("a\\b'c"), "'a\\\\b''c'");
    }
}
