//! Generic driver for databases reached through a user-supplied URL.

mod dialect;

pub use dialect::GenericDialect;
