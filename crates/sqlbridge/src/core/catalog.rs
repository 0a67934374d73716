//! Dialect and driver catalog for explicit dependency injection.
//!
//! The [`DriverCatalog`] maps plugin ids to dialects and to the native
//! drivers that open connections for them. It is constructed explicitly and
//! handed to a [`SessionContext`](crate::session::SessionContext); there is
//! no global registry.
//!
//! # Design Rationale
//!
//! - **No global state**: tests build exactly the catalog they need
//! - **Explicit registration**: deterministic lookup, no plugin scanning
//! - **Feature-gated**: real drivers register only when their feature is on

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{DbError, Result};
use crate::native::NativeDriver;

use super::traits::Dialect;

/// Registry of dialects and native drivers keyed by plugin id.
///
/// # Example
///
/// ```rust,ignore
/// let mut catalog = DriverCatalog::with_builtins();
/// catalog.register_driver("postgresql", Arc::new(MemoryDatabase::new().driver()));
///
/// let dialect = catalog.require_dialect("PostgreSQL")?;
/// ```
#[derive(Default)]
pub struct DriverCatalog {
    /// Registered dialects by plugin id.
    dialects: HashMap<String, Arc<dyn Dialect>>,

    /// Native drivers by plugin id.
    drivers: HashMap<String, Arc<dyn NativeDriver>>,
}

impl DriverCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with every built-in dialect registered.
    ///
    /// With the `postgres` feature the tokio-postgres driver is registered
    /// for the `postgresql` plugin id.
    pub fn with_builtins() -> Self {
        use crate::drivers::{
            Db2Dialect, GenericDialect, H2Dialect, MssqlDialect, MysqlDialect, OracleDialect,
            PostgresDialect, SqliteDialect,
        };

        let mut catalog = Self::new();
        catalog.register_dialect(GenericDialect::new());
        catalog.register_dialect(PostgresDialect::new());
        catalog.register_dialect(MysqlDialect::mysql());
        catalog.register_dialect(MysqlDialect::mariadb());
        catalog.register_dialect(MssqlDialect::new());
        catalog.register_dialect(OracleDialect::new());
        catalog.register_dialect(H2Dialect::new());
        catalog.register_dialect(SqliteDialect::new());
        catalog.register_dialect(Db2Dialect::new());

        #[cfg(feature = "postgres")]
        catalog.register_driver(
            "postgresql",
            Arc::new(crate::drivers::postgres::PostgresDriver::new()),
        );

        catalog
    }

    /// Register a dialect under its own plugin id.
    pub fn register_dialect(&mut self, dialect: impl Dialect + 'static) {
        self.register_dialect_arc(Arc::new(dialect));
    }

    /// Register a shared dialect under its own plugin id.
    pub fn register_dialect_arc(&mut self, dialect: Arc<dyn Dialect>) {
        self.dialects
            .insert(dialect.plugin_id().to_lowercase(), dialect);
    }

    /// Get a dialect by plugin id (case-insensitive, common aliases accepted).
    pub fn get_dialect(&self, name: &str) -> Option<Arc<dyn Dialect>> {
        self.dialects.get(&normalize_plugin_id(name)).cloned()
    }

    /// Get a dialect by plugin id, returning `DialectNotFound` if unknown.
    pub fn require_dialect(&self, name: &str) -> Result<Arc<dyn Dialect>> {
        self.get_dialect(name)
            .ok_or_else(|| DbError::DialectNotFound(name.to_string()))
    }

    /// Check if a dialect is registered.
    pub fn has_dialect(&self, name: &str) -> bool {
        self.dialects.contains_key(&normalize_plugin_id(name))
    }

    /// Register the native driver that opens connections for `plugin_id`.
    pub fn register_driver(&mut self, plugin_id: &str, driver: Arc<dyn NativeDriver>) {
        self.drivers.insert(normalize_plugin_id(plugin_id), driver);
    }

    pub fn get_driver(&self, plugin_id: &str) -> Option<Arc<dyn NativeDriver>> {
        self.drivers.get(&normalize_plugin_id(plugin_id)).cloned()
    }

    /// Get the native driver for `plugin_id`.
    pub fn require_driver(&self, plugin_id: &str) -> Result<Arc<dyn NativeDriver>> {
        self.get_driver(plugin_id).ok_or_else(|| {
            DbError::unsupported(plugin_id, "no native driver registered for this dialect")
        })
    }

    /// All registered dialect plugin ids, sorted.
    pub fn dialect_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.dialects.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Plugin ids that have a native driver, sorted.
    pub fn driver_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Canonical plugin id for a user-supplied dialect name.
///
/// - "postgres", "pg" → "postgresql"
/// - "sqlserver", "sql_server" → "mssql"
/// - anything else is lower-cased
pub fn normalize_plugin_id(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.as_str() {
        "postgres" | "pg" => "postgresql".to_string(),
        "sqlserver" | "sql_server" => "mssql".to_string(),
        _ => lower,
    }
}

impl std::fmt::Debug for DriverCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverCatalog")
            .field("dialects", &self.dialect_names())
            .field("drivers", &self.driver_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{ColumnMeta, KeyColumns};
    use crate::core::traits::{FieldDdl, UrlParts};
    use crate::native::MemoryDatabase;

    // Mock dialect for testing
    struct MockDialect;

    impl Dialect for MockDialect {
        fn plugin_id(&self) -> &'static str {
            "Mock"
        }

        fn display_name(&self) -> &'static str {
            "Mock database"
        }

        fn url(&self, parts: &UrlParts<'_>) -> Result<String> {
            Ok(format!("mock://{}", parts.database))
        }

        fn field_definition(&self, column: &ColumnMeta, _keys: &KeyColumns<'_>, ddl: &FieldDdl) -> String {
            ddl.end(ddl.begin(column))
        }
    }

    #[test]
    fn test_catalog_dialect_registration() {
        let mut catalog = DriverCatalog::new();
        assert!(!catalog.has_dialect("mock"));

        catalog.register_dialect(MockDialect);
        assert!(catalog.has_dialect("mock"));
        assert!(catalog.has_dialect("MOCK"));

        let dialect = catalog.get_dialect("mock").unwrap();
        assert_eq!(dialect.display_name(), "Mock database");
    }

    #[test]
    fn test_unknown_dialect_has_no_fallback() {
        let catalog = DriverCatalog::with_builtins();
        match catalog.require_dialect("informix") {
            Err(DbError::DialectNotFound(name)) => assert_eq!(name, "informix"),
            other => panic!("unexpected: {:?}", other.map(|d| d.plugin_id())),
        }
    }

    #[test]
    fn test_builtins() {
        let catalog = DriverCatalog::with_builtins();
        assert_eq!(
            catalog.dialect_names(),
            vec!["db2", "generic", "h2", "mariadb", "mssql", "mysql", "oracle", "postgresql", "sqlite"]
        );
        assert_eq!(catalog.require_dialect("postgres").unwrap().plugin_id(), "postgresql");
        assert_eq!(catalog.require_dialect("SqlServer").unwrap().plugin_id(), "mssql");
    }

    #[test]
    fn test_driver_registration() {
        let mut catalog = DriverCatalog::new();
        assert!(catalog.require_driver("h2").is_err());

        catalog.register_driver("H2", Arc::new(MemoryDatabase::new().driver()));
        assert_eq!(catalog.require_driver("h2").unwrap().name(), "memory");
        assert_eq!(catalog.driver_names(), vec!["h2"]);
    }
}
