//! Connection configuration type definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::traits::AccessType;

/// Root configuration: a set of named connection definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionsConfig {
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

impl ConnectionsConfig {
    /// Find a connection by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&ConnectionConfig> {
        self.connections
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Like [`get`](Self::get) but a missing name is a configuration error.
    pub fn require(&self, name: &str) -> crate::error::Result<&ConnectionConfig> {
        self.get(name)
            .ok_or_else(|| crate::error::DbError::Config(format!("unknown connection '{}'", name)))
    }
}

/// One connection definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Unique connection name.
    pub name: String,

    /// Dialect plugin id, e.g. "postgresql" or "mssql".
    pub r#type: String,

    /// How the database is reached (default: native).
    #[serde(default)]
    pub access: AccessType,

    #[serde(default)]
    pub host: String,

    /// Port as text so it may hold a variable reference.
    #[serde(default)]
    pub port: String,

    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub username: String,

    /// Password, optionally obfuscated as `Encrypted <hex>`.
    #[serde(default)]
    pub password: String,

    /// Named server instance (legacy multi-tenant servers).
    #[serde(default)]
    pub servername: Option<String>,

    /// Full URL for the generic dialect.
    #[serde(default)]
    pub custom_url: Option<String>,

    #[serde(default)]
    pub data_tablespace: Option<String>,

    #[serde(default)]
    pub index_tablespace: Option<String>,

    #[serde(default)]
    pub options: SessionOptions,

    #[serde(default)]
    pub pooling: PoolingConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Extra URL options keyed `pluginId.option`.
    #[serde(default)]
    pub extra_options: BTreeMap<String, String>,
}

impl ConnectionConfig {
    /// Minimal definition for `dialect` with everything else defaulted.
    pub fn new(name: impl Into<String>, dialect: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            r#type: dialect.into(),
            access: AccessType::default(),
            host: String::new(),
            port: String::new(),
            database: String::new(),
            username: String::new(),
            password: String::new(),
            servername: None,
            custom_url: None,
            data_tablespace: None,
            index_tablespace: None,
            options: SessionOptions::default(),
            pooling: PoolingConfig::default(),
            cluster: ClusterConfig::default(),
            extra_options: BTreeMap::new(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>, port: impl Into<String>, database: impl Into<String>) -> Self {
        self.host = host.into();
        self.port = port.into();
        self.database = database.into();
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// True when the definition is clustered into partitions.
    pub fn is_partitioned(&self) -> bool {
        self.cluster.enabled && !self.cluster.partitions.is_empty()
    }
}

/// Typed session options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Stream result rows instead of buffering them in the driver (default: true).
    #[serde(default = "default_true")]
    pub stream_results: bool,

    #[serde(default)]
    pub quote_all_fields: bool,

    #[serde(default)]
    pub force_lower_case: bool,

    #[serde(default)]
    pub force_upper_case: bool,

    /// Keep the case of quoted reserved words (default: true).
    #[serde(default = "default_true")]
    pub preserve_reserved_case: bool,

    /// Schema used when a caller passes none.
    #[serde(default)]
    pub preferred_schema: Option<String>,

    /// Override the dialect's boolean column support.
    #[serde(default)]
    pub supports_boolean: Option<bool>,

    /// Override the dialect's timestamp column support.
    #[serde(default)]
    pub supports_timestamp: Option<bool>,

    /// SQL run right after a direct connect.
    #[serde(default)]
    pub connect_sql: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            stream_results: true,
            quote_all_fields: false,
            force_lower_case: false,
            force_upper_case: false,
            preserve_reserved_case: true,
            preferred_schema: None,
            supports_boolean: None,
            supports_timestamp: None,
            connect_sql: None,
        }
    }
}

/// Connection pooling options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolingConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Connections opened when the pool is created (default: 5).
    #[serde(default = "default_initial_pool_size")]
    pub initial_size: u32,

    /// Upper bound on pooled connections (default: 10).
    #[serde(default = "default_max_pool_size")]
    pub max_size: u32,

    /// Additional pool properties (`maxWait`, `testOnBorrow`, ...).
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Default for PoolingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_size: default_initial_pool_size(),
            max_size: default_max_pool_size(),
            properties: BTreeMap::new(),
        }
    }
}

/// Clustering: the definition fans out to several physical partitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub partitions: Vec<PartitionDescriptor>,
}

/// Coordinates of one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionDescriptor {
    pub id: String,

    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub port: String,

    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub username: String,

    /// Password, optionally obfuscated as `Encrypted <hex>`.
    #[serde(default)]
    pub password: String,
}

impl PartitionDescriptor {
    /// Partition using the definition's credentials.
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        port: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port: port.into(),
            database: database.into(),
            ..Self::default()
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_initial_pool_size() -> u32 {
    5
}

fn default_max_pool_size() -> u32 {
    10
}
