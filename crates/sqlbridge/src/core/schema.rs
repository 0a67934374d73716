//! Column metadata and row schemas.
//!
//! A [`ColumnMeta`] describes one column both ways: as the target of DDL
//! rendering (create/alter table) and as the projection of a native result
//! column produced by the row type mapper. A [`RowSchema`] is an ordered list
//! of them with case-insensitive lookup by name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length used for character large objects.
pub const CLOB_LENGTH: i32 = 9_999_999;

/// Semantic value type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
    Number,
    BigNumber,
    Date,
    Timestamp,
    Boolean,
    Binary,
}

impl ValueType {
    /// Upper-case name, as shown in schema listings.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "STRING",
            ValueType::Integer => "INTEGER",
            ValueType::Number => "NUMBER",
            ValueType::BigNumber => "BIGNUMBER",
            ValueType::Date => "DATE",
            ValueType::Timestamp => "TIMESTAMP",
            ValueType::Boolean => "BOOLEAN",
            ValueType::Binary => "BINARY",
        }
    }

    /// True for the numeric family.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueType::Integer | ValueType::Number | ValueType::BigNumber
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column metadata.
///
/// `length` and `precision` use `-1` for "unknown".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,

    /// Semantic type.
    #[serde(rename = "type")]
    pub value_type: ValueType,

    /// Length (characters for strings, digits for numbers).
    #[serde(default = "unknown")]
    pub length: i32,

    /// Digits after the decimal point.
    #[serde(default = "unknown")]
    pub precision: i32,

    /// Character large object.
    #[serde(default)]
    pub large_text: bool,

    /// Vendor type name reported by the driver, if this column came from a result set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_type_name: Option<String>,
}

fn unknown() -> i32 {
    -1
}

impl ColumnMeta {
    /// Create a column with unknown length and precision.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            length: -1,
            precision: -1,
            large_text: false,
            native_type_name: None,
        }
    }

    /// Builder-style length and precision.
    pub fn with_length(mut self, length: i32, precision: i32) -> Self {
        self.length = length;
        self.precision = precision;
        self
    }

    /// Mark the column as a character large object.
    pub fn large(mut self) -> Self {
        self.large_text = true;
        self
    }
}

/// Ordered column list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowSchema {
    columns: Vec<ColumnMeta>,
}

impl RowSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: ColumnMeta) {
        self.columns.push(column);
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnMeta> {
        self.columns.iter()
    }

    /// Find a column by name, ignoring case.
    pub fn search(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Position of a column by name, ignoring case.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

impl From<Vec<ColumnMeta>> for RowSchema {
    fn from(columns: Vec<ColumnMeta>) -> Self {
        Self { columns }
    }
}

impl FromIterator<ColumnMeta> for RowSchema {
    fn from_iter<I: IntoIterator<Item = ColumnMeta>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a RowSchema {
    type Item = &'a ColumnMeta;
    type IntoIter = std::slice::Iter<'a, ColumnMeta>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

/// Technical/primary key hints passed to field DDL rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyColumns<'a> {
    /// Surrogate key column, rendered as identity/serial where supported.
    pub technical_key: Option<&'a str>,
    /// Natural primary key column.
    pub primary_key: Option<&'a str>,
    /// Use the vendor's auto-increment syntax for the key column.
    pub use_autoinc: bool,
}

impl<'a> KeyColumns<'a> {
    pub fn technical(name: &'a str, use_autoinc: bool) -> Self {
        Self {
            technical_key: Some(name),
            primary_key: None,
            use_autoinc,
        }
    }

    /// True when `column` is the technical or primary key.
    pub fn is_key(&self, column: &str) -> bool {
        self.technical_key
            .is_some_and(|k| k.eq_ignore_ascii_case(column))
            || self.primary_key.is_some_and(|k| k.eq_ignore_ascii_case(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_is_case_insensitive() {
        let schema: RowSchema = vec![
            ColumnMeta::new("Id", ValueType::Integer),
            ColumnMeta::new("name", ValueType::String),
        ]
        .into();

        assert_eq!(schema.index_of("ID"), Some(0));
        assert!(schema.search("NAME").is_some());
        assert!(schema.search("missing").is_none());
    }

    #[test]
    fn test_key_columns() {
        let keys = KeyColumns::technical("id", true);
        assert!(keys.is_key("ID"));
        assert!(!keys.is_key("name"));
        assert!(!KeyColumns::default().is_key("id"));
    }

    #[test]
    fn test_column_yaml_defaults() {
        let col: ColumnMeta = serde_yaml::from_str("name: amount\ntype: number\n").unwrap();
        assert_eq!(col.value_type, ValueType::Number);
        assert_eq!(col.length, -1);
        assert_eq!(col.precision, -1);
    }
}
