//! SQLite driver.

mod dialect;

pub use dialect::SqliteDialect;
