//! Microsoft SQL Server driver.
//!
//! Only the dialect is provided; sessions reach SQL Server through a
//! registered native driver.

mod dialect;

pub use dialect::MssqlDialect;
