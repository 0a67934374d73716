//! # sqlbridge
//!
//! Connection sessions and SQL dialect rules for multi-vendor ETL.
//!
//! This library sits between pipeline steps and database drivers:
//!
//! - **Dialects** describe each vendor's quoting, DDL, URL and capability rules
//! - **Sessions** own a connection, statement slots, batching and commit cadence
//! - **Shared connections** let grouped steps commit or roll back as one unit
//! - **Partitions** route a clustered definition to one of several servers
//! - **Scripts** split multi-statement SQL for sequential execution
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlbridge::{ConnectionsConfig, DriverCatalog, SessionContext, StatementRole, SqlValue};
//!
//! #[tokio::main]
//! async fn main() -> sqlbridge::Result<()> {
//!     let config = ConnectionsConfig::load("connections.yaml")?;
//!     let ctx = SessionContext::new(DriverCatalog::with_builtins());
//!
//!     let mut session = ctx.session(config.require("warehouse")?.clone())?;
//!     session.set_commit_size(1000).await?;
//!     session.connect(None, None).await?;
//!     session.prepare_insert(None, "orders", &["id", "name"], false).await?;
//!     session
//!         .insert_row(StatementRole::Insert, &[SqlValue::Integer(1), SqlValue::Text("a".into())], true, true)
//!         .await?;
//!     session.empty_and_commit(StatementRole::Insert, true, 1).await?;
//!     session.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod native;
pub mod partition;
pub mod registry;
pub mod session;
pub mod typemap;

// Re-exports for convenient access
pub use crate::core::catalog::DriverCatalog;
pub use crate::core::schema::{ColumnMeta, KeyColumns, RowSchema, ValueType};
pub use crate::core::traits::Dialect;
pub use crate::core::value::{Row, SqlValue};
pub use crate::core::variables::{VariableSpace, Variables};
pub use config::{ConnectionConfig, ConnectionsConfig};
pub use dialect::{split, DialectDescriptor, ScriptStatement};
pub use error::{DbError, Result};
pub use native::{MemoryDatabase, NativeConnection, NativeDriver};
pub use partition::PartitionRouter;
pub use registry::{ConnectionRegistry, RegistryKey};
pub use session::{Canceller, ExecResult, Session, SessionContext, SessionState, StatementRole};
