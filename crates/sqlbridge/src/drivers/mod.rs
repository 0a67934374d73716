//! Built-in database dialects and native drivers.
//!
//! - [`generic`]: ANSI dialect for any database reached by a custom URL
//! - [`postgres`]: PostgreSQL dialect and tokio-postgres driver
//! - [`mysql`]: MySQL and MariaDB dialects
//! - [`mssql`]: Microsoft SQL Server dialect
//! - [`oracle`]: Oracle dialect
//! - [`h2`]: H2 dialect
//! - [`sqlite`]: SQLite dialect
//! - [`db2`]: IBM DB2 dialect
//! - [`common`]: DDL helpers shared by the dialects
//!
//! # Adding New Databases
//!
//! 1. Create a module under `drivers/` with a unit struct implementing `Dialect`
//! 2. Register it in `DriverCatalog::with_builtins()`
//! 3. If a native driver exists, implement `NativeDriver` behind a Cargo feature

pub mod common;
pub mod db2;
pub mod generic;
pub mod h2;
pub mod mssql;
pub mod mysql;
pub mod oracle;
pub mod postgres;
pub mod sqlite;

pub use db2::Db2Dialect;
pub use generic::GenericDialect;
pub use h2::H2Dialect;
pub use mssql::MssqlDialect;
pub use mysql::{MysqlDialect, MysqlVariant};
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
