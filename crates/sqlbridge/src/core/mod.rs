//! Core abstractions shared by every dialect and session.
//!
//! - [`traits`]: the [`Dialect`] contract and access types
//! - [`schema`]: typed row schemas and key hints for DDL
//! - [`value`]: SQL value representation
//! - [`identifier`]: data-driven identifier quoting
//! - [`variables`]: `${VAR}` / `%%VAR%%` substitution
//! - [`credentials`]: stored password decoding
//! - [`catalog`]: dialect and driver registry for dependency injection
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` provides interchangeable vendor rules
//! - **Template Method**: default trait methods define the ANSI behaviour

pub mod catalog;
pub mod credentials;
pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;
pub mod variables;

// Re-export commonly used types for convenience
pub use catalog::DriverCatalog;
pub use credentials::{CredentialDecoder, ObfuscatedPasswords, PlainPasswords};
pub use schema::{ColumnMeta, KeyColumns, RowSchema, ValueType};
pub use traits::{AccessType, Dialect, FieldDdl, UrlParts};
pub use value::{Row, SqlValue};
pub use variables::{VariableSpace, Variables};
