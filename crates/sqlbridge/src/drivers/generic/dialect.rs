//! Generic ANSI dialect (Strategy pattern).
//!
//! Used for databases without a dedicated dialect. The connection URL is
//! taken verbatim from the connection's custom URL.

use crate::core::schema::{ColumnMeta, KeyColumns, ValueType};
use crate::core::traits::{Dialect, FieldDdl, UrlParts};
use crate::drivers::common::{sized, SQL92_RESERVED_WORDS};
use crate::error::{DbError, Result};

/// Generic dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct GenericDialect;

impl GenericDialect {
    /// Create a new generic dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for GenericDialect {
    fn plugin_id(&self) -> &'static str {
        "generic"
    }

    fn display_name(&self) -> &'static str {
        "Generic database"
    }

    fn url(&self, parts: &UrlParts<'_>) -> Result<String> {
        match parts.custom_url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => Ok(url.to_string()),
            None => Err(DbError::Config(
                "The generic dialect requires a custom URL".to_string(),
            )),
        }
    }

    fn supports_options_in_url(&self) -> bool {
        false
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
                    out.push_str("BIGINT NOT NULL PRIMARY KEY");
                } else if length > 0 {
                    if precision > 0 || length > 18 {
                        out.push_str(&sized("NUMERIC", length, precision));
                    } else if length > 9 {
                        out.push_str("BIGINT");
                    } else {
                        out.push_str("INTEGER");
                    }
                } else {
                    out.push_str("DOUBLE PRECISION");
                }
            }
            ValueType::String => {
                if length >= self.max_varchar_length() {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_url_required() {
        let d = GenericDialect::new();
        let err = d.url(&UrlParts::default()).unwrap_err();
        assert!(matches!(err, DbError::Config(_)));

        let parts = UrlParts {
            custom_url: Some("odbc:DSN=warehouse"),
            ..Default::default()
        };
        assert_eq!(d.url(&parts).unwrap(), "odbc:DSN=warehouse");
    }

    #[test]
    fn test_ansi_types() {
        let d = GenericDialect::new();
        let ddl = FieldDdl { add_cr: false, ..Default::default() };
        let none = KeyColumns::default();
        let s = ColumnMeta::new("s", ValueType::String).with_length(30, -1);
        assert_eq!(d.field_definition(&s, &none, &ddl), "s VARCHAR(30)");
        let big = ColumnMeta::new("b", ValueType::BigNumber).with_length(30, 4);
        assert_eq!(d.field_definition(&big, &none, &ddl), "b NUMERIC(30, 4)");
    }
}
