//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PostgresDriver`]: native connections over tokio-postgres (`postgres` feature)

#[cfg(feature = "postgres")]
mod connection;
mod dialect;

#[cfg(feature = "postgres")]
pub use connection::{PostgresConnection, PostgresDriver};
pub use dialect::PostgresDialect;
