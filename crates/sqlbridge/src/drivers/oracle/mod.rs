//! Oracle driver.

mod dialect;

pub use dialect::OracleDialect;
