//! MySQL and MariaDB driver.

mod dialect;

pub use dialect::{MysqlDialect, MysqlVariant};
