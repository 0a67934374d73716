//! H2 SQL dialect (Strategy pattern).
//!
//! H2 runs either embedded (`h2:<path>`) or as a TCP server
//! (`h2:tcp://host:port/<db>`), which is decided by whether a host is set.

use crate::core::schema::{ColumnMeta, KeyColumns, ValueType};
use crate::core::traits::{Dialect, FieldDdl, UrlParts};
use crate::drivers::common::{integer_type, sized, SQL92_RESERVED_WORDS};
use crate::error::Result;

/// H2 dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct H2Dialect;

impl H2Dialect {
    /// Create a new H2 dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for H2Dialect {
    fn plugin_id(&self) -> &'static str {
        "h2"
    }

    fn display_name(&self) -> &'static str {
        "H2"
    }

    fn default_port(&self) -> Option<u16> {
        Some(9092)
    }

    fn url(&self, parts: &UrlParts<'_>) -> Result<String> {
        if parts.host.is_empty() {
            return Ok(format!("h2:{}", parts.database));
        }
        let mut url = format!("h2:tcp://{}", parts.host);
        if !parts.port.is_empty() {
            url.push(':');
            url.push_str(parts.port);
        }
        url.push('/');
        url.push_str(parts.database);
        Ok(url)
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn supports_boolean_data_type(&self) -> bool {
        true
    }

    fn supports_bitmap_index(&self) -> bool {
        false
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
            ValueType::Boolean => {
                out.push_str(if ddl.supports_boolean { "BOOLEAN" } else { "CHAR(1)" })
            }
            ValueType::Number | ValueType::Integer | ValueType::BigNumber => {
                if keys.is_key(&column.name) {
                    if keys.use_autoinc {
                        out.push_str("IDENTITY");
                    } else {
                        out.push_str("BIGINT PRIMARY KEY");
                    }
                } else if length > 0 {
                    if precision > 0 || length > 18 {
                        out.push_str(&sized("DECIMAL", length, precision));
                    } else {
                        out.push_str(integer_type(length, "SMALLINT", "INTEGER", "BIGINT"));
                    }
                } else {
                    out.push_str("DOUBLE");
                }
            }
            ValueType::String => {
                if length >= self.max_varchar_length() {
                    out.push_str("TEXT");
                } else if length > 0 {
                    out.push_str(&format!("VARCHAR({})", length));
                } else {
                    out.push_str("VARCHAR");
                }
            }
            ValueType::Binary => out.push_str("BINARY"),
        }

        ddl.end(out)
    }

    fn modify_column_statement(&self, table: &str, column: &ColumnMeta, keys: &KeyColumns<'_>, ddl: &FieldDdl) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {}",
            table,
            self.field_definition(column, keys, &FieldDdl { add_field_name: true, add_cr: false, ..*ddl })
        )
    }

    fn limit_clause(&self, rows: u64) -> String {
        format!(" LIMIT {}", rows)
    }

    fn sql_query_fields(&self, table: &str) -> String {
        format!("SELECT * FROM {} LIMIT 0", table)
    }

    fn sql_next_sequence_value(&self, sequence: &str) -> String {
        format!("SELECT NEXT VALUE FOR {}", sequence)
    }

    fn sql_current_sequence_value(&self, sequence: &str) -> String {
        format!("SELECT CURRENT VALUE FOR {}", sequence)
    }

    fn sql_sequence_exists(&self, sequence: &str) -> String {
        let name = sequence.rsplit('.').next().unwrap_or(sequence).replace('"', "");
        format!(
            "SELECT * FROM INFORMATION_SCHEMA.SEQUENCES WHERE SEQUENCE_NAME = '{}'",
            name.to_uppercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_and_server_urls() {
        let d = H2Dialect::new();
        let embedded = UrlParts {
            database: "/tmp/warehouse",
            ..Default::default()
        };
        assert_eq!(d.url(&embedded).unwrap(), "h2:/tmp/warehouse");

        let server = UrlParts {
            host: "h2host",
            port: "9092",
            database: "warehouse",
            ..Default::default()
        };
        assert_eq!(d.url(&server).unwrap(), "h2:tcp://h2host:9092/warehouse");
    }

    #[test]
    fn test_identity_key() {
        let d = H2Dialect::new();
        let ddl = FieldDdl { add_cr: false, ..Default::default() };
        let id = ColumnMeta::new("id", ValueType::Integer).with_length(9, 0);
        assert_eq!(d.field_definition(&id, &KeyColumns::technical("id", true), &ddl), "id IDENTITY");
        assert_eq!(
            d.field_definition(&id, &KeyColumns::technical("id", false), &ddl),
            "id BIGINT PRIMARY KEY"
        );
    }

    #[test]
    fn test_sequence_sql() {
        let d = H2Dialect::new();
        assert_eq!(d.sql_next_sequence_value("s"), "SELECT NEXT VALUE FOR s");
        assert!(d.sql_sequence_exists("app.seq").ends_with("SEQUENCE_NAME = 'SEQ'"));
    }
}
