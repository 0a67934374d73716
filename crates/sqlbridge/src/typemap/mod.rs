//! Row type mapping: native result-column descriptors to semantic columns.
//!
//! Drivers describe result columns with a [`NativeColumn`] (a vendor-neutral
//! type code plus precision, scale, signedness and display size). The
//! [`RowTypeMapper`] projects each one onto a [`ColumnMeta`] using size-driven
//! rules and then lets the dialect apply its own corrections, so no vendor
//! checks live here.
//!
//! # Numeric rules
//!
//! | native                       | scale | length       | result     |
//! |------------------------------|-------|--------------|------------|
//! | decimal / numeric            | 0     | 1..=18       | INTEGER    |
//! | decimal / numeric            | 0     | > 18         | BIGNUMBER  |
//! | decimal / numeric            | > 0   | > 15         | BIGNUMBER  |
//! | decimal / numeric            | > 0   | <= 15        | NUMBER     |
//! | double / float / real        | any   | > 15         | BIGNUMBER  |
//! | signed bigint                |       |              | INTEGER    |
//! | unsigned bigint              |       |              | BIGNUMBER  |

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::schema::{ColumnMeta, RowSchema, ValueType, CLOB_LENGTH};
use crate::core::traits::Dialect;

/// Vendor-neutral result-column type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeType {
    Char,
    Varchar,
    NVarchar,
    LongVarchar,
    Clob,
    NClob,
    BigInt,
    Integer,
    SmallInt,
    TinyInt,
    Decimal,
    Numeric,
    Double,
    Float,
    Real,
    Date,
    Time,
    Timestamp,
    Boolean,
    Bit,
    Binary,
    VarBinary,
    LongVarBinary,
    Blob,
    Other,
}

impl NativeType {
    /// Approximate numeric types.
    pub fn is_floating(&self) -> bool {
        matches!(self, NativeType::Double | NativeType::Float | NativeType::Real)
    }
}

/// Result-column descriptor reported by a native driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeColumn {
    /// Column label; may be blank for computed expressions.
    pub name: String,
    pub native_type: NativeType,
    /// Vendor type name, e.g. `"int8"` or `"NUMBER"`.
    #[serde(default)]
    pub type_name: String,
    /// Total digits for numerics, byte length for binaries.
    #[serde(default)]
    pub precision: i32,
    /// Digits after the decimal point.
    #[serde(default)]
    pub scale: i32,
    #[serde(default = "signed_default")]
    pub signed: bool,
    /// Display width in characters.
    #[serde(default)]
    pub display_size: i32,
}

fn signed_default() -> bool {
    true
}

impl NativeColumn {
    pub fn new(name: impl Into<String>, native_type: NativeType) -> Self {
        Self {
            name: name.into(),
            native_type,
            type_name: String::new(),
            precision: 0,
            scale: 0,
            signed: true,
            display_size: 0,
        }
    }

    pub fn with_precision(mut self, precision: i32, scale: i32) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    pub fn with_display_size(mut self, display_size: i32) -> Self {
        self.display_size = display_size;
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.signed = false;
        self
    }

    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }
}

/// Projects native column descriptors onto semantic columns.
pub struct RowTypeMapper<'a> {
    dialect: &'a dyn Dialect,
    supports_timestamp: bool,
    ignore_length: bool,
}

impl<'a> RowTypeMapper<'a> {
    pub fn new(dialect: &'a dyn Dialect, supports_timestamp: bool) -> Self {
        Self {
            dialect,
            supports_timestamp,
            ignore_length: false,
        }
    }

    /// Leave string lengths unknown instead of using the display size.
    pub fn ignore_length(mut self, ignore: bool) -> Self {
        self.ignore_length = ignore;
        self
    }

    /// Map a full result description, naming blank and duplicate columns `Field{n}`.
    pub fn map_columns(&self, natives: &[NativeColumn]) -> RowSchema {
        let mut seen: HashSet<String> = HashSet::with_capacity(natives.len());
        natives
            .iter()
            .enumerate()
            .map(|(i, native)| {
                let mut column = self.map_column(native);
                let key = column.name.to_lowercase();
                if column.name.trim().is_empty() || seen.contains(&key) {
                    let mut n = i + 1;
                    column.name = format!("Field{}", n);
                    while seen.contains(&column.name.to_lowercase()) {
                        n += 1;
                        column.name = format!("Field{}", n);
                    }
                }
                seen.insert(column.name.to_lowercase());
                column
            })
            .collect()
    }

    /// Map a single column.
    pub fn map_column(&self, native: &NativeColumn) -> ColumnMeta {
        let mut column = ColumnMeta::new(native.name.clone(), ValueType::String);
        column.native_type_name = if native.type_name.is_empty() {
            None
        } else {
            Some(native.type_name.clone())
        };

        match native.native_type {
            NativeType::Char | NativeType::Varchar | NativeType::NVarchar | NativeType::LongVarchar => {
                if !self.ignore_length {
                    column.length = native.display_size;
                }
            }
            NativeType::Clob | NativeType::NClob => {
                column.length = CLOB_LENGTH;
                column.large_text = true;
            }
            NativeType::BigInt => {
                column.precision = 0;
                if native.signed {
                    column.value_type = ValueType::Integer;
                    column.length = 15;
                } else {
                    column.value_type = ValueType::BigNumber;
                    column.length = 16;
                }
            }
            NativeType::Integer => set_integer(&mut column, 9),
            NativeType::SmallInt => set_integer(&mut column, 4),
            NativeType::TinyInt => set_integer(&mut column, 2),
            NativeType::Decimal
            | NativeType::Numeric
            | NativeType::Double
            | NativeType::Float
            | NativeType::Real => map_numeric(native, &mut column),
            NativeType::Timestamp if self.supports_timestamp => {
                column.value_type = ValueType::Timestamp;
                column.length = native.scale;
            }
            NativeType::Timestamp | NativeType::Date | NativeType::Time => {
                column.value_type = ValueType::Date;
            }
            NativeType::Boolean | NativeType::Bit => {
                column.value_type = ValueType::Boolean;
            }
            NativeType::Binary | NativeType::VarBinary | NativeType::LongVarBinary | NativeType::Blob => {
                column.value_type = ValueType::Binary;
                if self.dialect.is_display_size_twice_the_precision()
                    && native.precision.checked_mul(2) == Some(native.display_size)
                {
                    column.length = native.precision;
                }
            }
            NativeType::Other => {
                column.precision = native.scale;
            }
        }

        self.dialect.correct_column(native, &mut column);
        column
    }
}

fn set_integer(column: &mut ColumnMeta, length: i32) {
    column.value_type = ValueType::Integer;
    column.length = length;
    column.precision = 0;
}

fn map_numeric(native: &NativeColumn, column: &mut ColumnMeta) {
    let mut length = native.precision;
    let mut precision = native.scale;
    if length >= 126 {
        length = -1;
    }
    if precision >= 126 {
        precision = -1;
    }

    let mut value_type = ValueType::Number;
    if native.native_type.is_floating() {
        if precision == 0 {
            precision = -1;
        }
        if length > 15 || precision > 15 {
            value_type = ValueType::BigNumber;
        }
    } else if precision == 0 {
        if length > 18 {
            value_type = ValueType::BigNumber;
        } else if length > 0 {
            value_type = ValueType::Integer;
        }
    } else if length > 15 || precision > 15 {
        value_type = ValueType::BigNumber;
    }

    column.value_type = value_type;
    column.length = length;
    column.precision = precision;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{GenericDialect, MysqlDialect, OracleDialect, PostgresDialect};

    fn map(native: NativeColumn) -> ColumnMeta {
        RowTypeMapper::new(&GenericDialect, false).map_column(&native)
    }

    #[test]
    fn test_decimal_scale_zero_is_integer() {
        let col = map(NativeColumn::new("n", NativeType::Decimal).with_precision(12, 0));
        assert_eq!(col.value_type, ValueType::Integer);
        assert_eq!(col.length, 12);
    }

    #[test]
    fn test_wide_decimal_is_bignumber() {
        let col = map(NativeColumn::new("n", NativeType::Decimal).with_precision(25, 0));
        assert_eq!(col.value_type, ValueType::BigNumber);
    }

    #[test]
    fn test_decimal_with_scale_is_number() {
        let col = map(NativeColumn::new("n", NativeType::Decimal).with_precision(10, 4));
        assert_eq!(col.value_type, ValueType::Number);
        assert_eq!((col.length, col.precision), (10, 4));

        let col = map(NativeColumn::new("n", NativeType::Numeric).with_precision(20, 4));
        assert_eq!(col.value_type, ValueType::BigNumber);
    }

    #[test]
    fn test_bigint_signedness() {
        let signed = map(NativeColumn::new("id", NativeType::BigInt));
        assert_eq!(signed.value_type, ValueType::Integer);
        assert_eq!(signed.length, 15);

        let unsigned = map(NativeColumn::new("id", NativeType::BigInt).unsigned());
        assert_eq!(unsigned.value_type, ValueType::BigNumber);
        assert_eq!(unsigned.length, 16);
    }

    #[test]
    fn test_small_integers() {
        assert_eq!(map(NativeColumn::new("a", NativeType::Integer)).length, 9);
        assert_eq!(map(NativeColumn::new("a", NativeType::SmallInt)).length, 4);
        assert_eq!(map(NativeColumn::new("a", NativeType::TinyInt)).length, 2);
    }

    #[test]
    fn test_strings_and_clobs() {
        let col = map(NativeColumn::new("s", NativeType::Varchar).with_display_size(40));
        assert_eq!(col.value_type, ValueType::String);
        assert_eq!(col.length, 40);

        let col = RowTypeMapper::new(&GenericDialect, false)
            .ignore_length(true)
            .map_column(&NativeColumn::new("s", NativeType::Varchar).with_display_size(40));
        assert_eq!(col.length, -1);

        let col = map(NativeColumn::new("c", NativeType::Clob));
        assert!(col.large_text);
        assert_eq!(col.length, CLOB_LENGTH);
    }

    #[test]
    fn test_float_scale_zero_is_unknown_precision() {
        let col = map(NativeColumn::new("f", NativeType::Float).with_precision(10, 0));
        assert_eq!(col.value_type, ValueType::Number);
        assert_eq!(col.precision, -1);
    }

    #[test]
    fn test_huge_precision_is_unknown() {
        let col = map(NativeColumn::new("n", NativeType::Numeric).with_precision(126, 130));
        assert_eq!((col.length, col.precision), (-1, -1));
    }

    #[test]
    fn test_temporal_and_boolean() {
        assert_eq!(map(NativeColumn::new("d", NativeType::Date)).value_type, ValueType::Date);
        assert_eq!(map(NativeColumn::new("t", NativeType::Timestamp)).value_type, ValueType::Date);
        let ts = RowTypeMapper::new(&GenericDialect, true)
            .map_column(&NativeColumn::new("t", NativeType::Timestamp).with_precision(0, 6));
        assert_eq!(ts.value_type, ValueType::Timestamp);
        assert_eq!(map(NativeColumn::new("b", NativeType::Bit)).value_type, ValueType::Boolean);
        assert_eq!(map(NativeColumn::new("x", NativeType::Other)).value_type, ValueType::String);
    }

    #[test]
    fn test_postgres_double_correction() {
        let native = NativeColumn::new("d", NativeType::Double).with_precision(17, 17);
        assert_eq!(map(native.clone()).value_type, ValueType::BigNumber);

        let col = RowTypeMapper::new(&PostgresDialect, false).map_column(&native);
        assert_eq!(col.value_type, ValueType::Number);
        assert_eq!((col.length, col.precision), (-1, -1));
    }

    #[test]
    fn test_postgres_unbounded_numeric() {
        let native = NativeColumn::new("n", NativeType::Numeric).with_precision(0, 0);
        let col = RowTypeMapper::new(&PostgresDialect, false).map_column(&native);
        assert_eq!(col.value_type, ValueType::BigNumber);
        assert_eq!((col.length, col.precision), (-1, -1));
    }

    #[test]
    fn test_mysql_float_correction() {
        let native = NativeColumn::new("f", NativeType::Double).with_precision(12, 31);
        let col = RowTypeMapper::new(&MysqlDialect::mysql(), false).map_column(&native);
        assert_eq!(col.value_type, ValueType::Number);
        assert_eq!((col.length, col.precision), (-1, -1));
    }

    #[test]
    fn test_oracle_number_corrections() {
        let mapper = OracleDialect;
        let mapper = RowTypeMapper::new(&mapper, false);

        let col = mapper.map_column(&NativeColumn::new("n", NativeType::Numeric).with_precision(38, 0));
        assert_eq!(col.value_type, ValueType::Integer);

        let col = mapper.map_column(&NativeColumn::new("n", NativeType::Numeric).with_precision(0, -127));
        assert_eq!(col.value_type, ValueType::BigNumber);
        assert_eq!((col.length, col.precision), (-1, -1));

        let col = mapper.map_column(
            &NativeColumn::new("r", NativeType::VarBinary)
                .with_precision(16, 0)
                .with_display_size(32),
        );
        assert_eq!(col.value_type, ValueType::String);
        assert_eq!(col.length, 32);
    }

    #[test]
    fn test_binary_display_size_twice_precision() {
        let native = NativeColumn::new("b", NativeType::Binary)
            .with_precision(8, 0)
            .with_display_size(16);
        let generic = map(native.clone());
        assert_eq!(generic.value_type, ValueType::Binary);
        assert_eq!(generic.length, -1);

        let db2 = crate::drivers::Db2Dialect;
        let col = RowTypeMapper::new(&db2, false).map_column(&native);
        assert_eq!(col.length, 8);

        let huge = NativeColumn::new("b", NativeType::Blob)
            .with_precision(i32::MAX, 0)
            .with_display_size(-2);
        let col = RowTypeMapper::new(&db2, false).map_column(&huge);
        assert_eq!(col.length, -1);
    }

    #[test]
    fn test_blank_and_duplicate_names() {
        let mapper = RowTypeMapper::new(&GenericDialect, false);
        let schema = mapper.map_columns(&[
            NativeColumn::new("id", NativeType::Integer),
            NativeColumn::new("", NativeType::Integer),
            NativeColumn::new("ID", NativeType::Integer),
            NativeColumn::new("name", NativeType::Varchar),
        ]);
        assert_eq!(schema.names(), vec!["id", "Field2", "Field3", "name"]);

        let schema = mapper.map_columns(&[
            NativeColumn::new("Field2", NativeType::Integer),
            NativeColumn::new("", NativeType::Integer),
            NativeColumn::new("field3", NativeType::Integer),
        ]);
        assert_eq!(schema.names(), vec!["Field2", "Field3", "Field4"]);
    }
}
