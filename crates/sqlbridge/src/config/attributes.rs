//! Flat attribute-bag codec.
//!
//! Persisted connection definitions keep their options in a string map.
//! Booleans are `"Y"`/`"N"`, indexed cluster fields carry a numeric suffix,
//! extra URL options use `EXTRA_OPTION_{pluginId}.{option}` and pool
//! properties use `POOLING_{property}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};

use super::types::{ConnectionConfig, PartitionDescriptor};

pub const PORT_NUMBER: &str = "PORT_NUMBER";
pub const SQL_CONNECT: &str = "SQL_CONNECT";
pub const USE_POOLING: &str = "USE_POOLING";
pub const MAXIMUM_POOL_SIZE: &str = "MAXIMUM_POOL_SIZE";
pub const INITIAL_POOL_SIZE: &str = "INITIAL_POOL_SIZE";
pub const POOLING_PREFIX: &str = "POOLING_";
pub const EXTRA_OPTION_PREFIX: &str = "EXTRA_OPTION_";
pub const IS_CLUSTERED: &str = "IS_CLUSTERED";
pub const CLUSTER_PARTITION_PREFIX: &str = "CLUSTER_PARTITION_";
pub const CLUSTER_HOSTNAME_PREFIX: &str = "CLUSTER_HOSTNAME_";
pub const CLUSTER_PORT_PREFIX: &str = "CLUSTER_PORT_";
pub const CLUSTER_DBNAME_PREFIX: &str = "CLUSTER_DBNAME_";
pub const CLUSTER_USERNAME_PREFIX: &str = "CLUSTER_USERNAME_";
pub const CLUSTER_PASSWORD_PREFIX: &str = "CLUSTER_PASSWORD_";
pub const STREAM_RESULTS: &str = "STREAM_RESULTS";
pub const QUOTE_ALL_FIELDS: &str = "QUOTE_ALL_FIELDS";
pub const FORCE_IDENTIFIERS_TO_LOWERCASE: &str = "FORCE_IDENTIFIERS_TO_LOWERCASE";
pub const FORCE_IDENTIFIERS_TO_UPPERCASE: &str = "FORCE_IDENTIFIERS_TO_UPPERCASE";
pub const PRESERVE_RESERVED_WORD_CASE: &str = "PRESERVE_RESERVED_WORD_CASE";
pub const PREFERRED_SCHEMA_NAME: &str = "PREFERRED_SCHEMA_NAME";
pub const SUPPORTS_BOOLEAN_DATA_TYPE: &str = "SUPPORTS_BOOLEAN_DATA_TYPE";
pub const SUPPORTS_TIMESTAMP_DATA_TYPE: &str = "SUPPORTS_TIMESTAMP_DATA_TYPE";

/// String-to-string attribute map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeBag(BTreeMap<String, String>);

impl AttributeBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// `"Y"` (any case) is true; a missing key gives `default`.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) if !v.trim().is_empty() => v.trim().eq_ignore_ascii_case("Y"),
            _ => default,
        }
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.set(key, if value { "Y" } else { "N" });
    }

    fn get_u32(&self, key: &str, default: u32) -> Result<u32> {
        match self.get(key).map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => v.parse().map_err(|_| {
                DbError::Config(format!("Attribute {} must be a number, got '{}'", key, v))
            }),
            None => Ok(default),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of partitions: `CLUSTER_HOSTNAME_{n}` is probed from 0 up to
    /// the first missing key.
    pub fn partition_count(&self) -> usize {
        (0..)
            .take_while(|n| self.0.contains_key(&format!("{}{}", CLUSTER_HOSTNAME_PREFIX, n)))
            .count()
    }

    /// Partitions in index order, up to the first gap.
    pub fn partitions(&self) -> Vec<PartitionDescriptor> {
        (0..self.partition_count())
            .map(|n| {
                let field = |prefix: &str| {
                    self.get(&format!("{}{}", prefix, n))
                        .unwrap_or_default()
                        .to_string()
                };
                PartitionDescriptor {
                    id: field(CLUSTER_PARTITION_PREFIX),
                    host: field(CLUSTER_HOSTNAME_PREFIX),
                    port: field(CLUSTER_PORT_PREFIX),
                    database: field(CLUSTER_DBNAME_PREFIX),
                    username: field(CLUSTER_USERNAME_PREFIX),
                    password: field(CLUSTER_PASSWORD_PREFIX),
                }
            })
            .collect()
    }
}

impl FromIterator<(String, String)> for AttributeBag {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl ConnectionConfig {
    /// Overlay the options stored in `bag` onto this definition.
    pub fn apply_attributes(&mut self, bag: &AttributeBag) -> Result<()> {
        if let Some(port) = bag.get(PORT_NUMBER) {
            self.port = port.to_string();
        }
        if let Some(sql) = bag.get(SQL_CONNECT) {
            self.options.connect_sql = Some(sql.to_string());
        }

        self.options.stream_results = bag.get_bool(STREAM_RESULTS, true);
        self.options.quote_all_fields = bag.get_bool(QUOTE_ALL_FIELDS, false);
        self.options.force_lower_case = bag.get_bool(FORCE_IDENTIFIERS_TO_LOWERCASE, false);
        self.options.force_upper_case = bag.get_bool(FORCE_IDENTIFIERS_TO_UPPERCASE, false);
        self.options.preserve_reserved_case = bag.get_bool(PRESERVE_RESERVED_WORD_CASE, true);
        self.options.preferred_schema = bag
            .get(PREFERRED_SCHEMA_NAME)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self.options.supports_boolean = bag
            .get(SUPPORTS_BOOLEAN_DATA_TYPE)
            .map(|_| bag.get_bool(SUPPORTS_BOOLEAN_DATA_TYPE, false));
        self.options.supports_timestamp = bag
            .get(SUPPORTS_TIMESTAMP_DATA_TYPE)
            .map(|_| bag.get_bool(SUPPORTS_TIMESTAMP_DATA_TYPE, false));

        self.pooling.enabled = bag.get_bool(USE_POOLING, false);
        self.pooling.max_size = bag.get_u32(MAXIMUM_POOL_SIZE, self.pooling.max_size)?;
        self.pooling.initial_size = bag.get_u32(INITIAL_POOL_SIZE, self.pooling.initial_size)?;

        for (key, value) in bag.iter() {
            if let Some(prop) = key.strip_prefix(POOLING_PREFIX) {
                self.pooling.properties.insert(prop.to_string(), value.to_string());
            } else if let Some(option) = key.strip_prefix(EXTRA_OPTION_PREFIX) {
                self.extra_options.insert(option.to_string(), value.to_string());
            }
        }

        self.cluster.enabled = bag.get_bool(IS_CLUSTERED, false);
        self.cluster.partitions = bag.partitions();
        Ok(())
    }

    /// Encode this definition's options as an attribute bag.
    pub fn to_attributes(&self) -> AttributeBag {
        let mut bag = AttributeBag::new();
        if !self.port.is_empty() {
            bag.set(PORT_NUMBER, self.port.clone());
        }
        if let Some(sql) = &self.options.connect_sql {
            bag.set(SQL_CONNECT, sql.clone());
        }

        bag.set_bool(STREAM_RESULTS, self.options.stream_results);
        bag.set_bool(QUOTE_ALL_FIELDS, self.options.quote_all_fields);
        bag.set_bool(FORCE_IDENTIFIERS_TO_LOWERCASE, self.options.force_lower_case);
        bag.set_bool(FORCE_IDENTIFIERS_TO_UPPERCASE, self.options.force_upper_case);
        bag.set_bool(PRESERVE_RESERVED_WORD_CASE, self.options.preserve_reserved_case);
        if let Some(schema) = &self.options.preferred_schema {
            bag.set(PREFERRED_SCHEMA_NAME, schema.clone());
        }
        if let Some(b) = self.options.supports_boolean {
            bag.set_bool(SUPPORTS_BOOLEAN_DATA_TYPE, b);
        }
        if let Some(t) = self.options.supports_timestamp {
            bag.set_bool(SUPPORTS_TIMESTAMP_DATA_TYPE, t);
        }

        bag.set_bool(USE_POOLING, self.pooling.enabled);
        bag.set(MAXIMUM_POOL_SIZE, self.pooling.max_size.to_string());
        bag.set(INITIAL_POOL_SIZE, self.pooling.initial_size.to_string());
        for (prop, value) in &self.pooling.properties {
            bag.set(format!("{}{}", POOLING_PREFIX, prop), value.clone());
        }
        for (option, value) in &self.extra_options {
            bag.set(format!("{}{}", EXTRA_OPTION_PREFIX, option), value.clone());
        }

        bag.set_bool(IS_CLUSTERED, self.cluster.enabled);
        for (n, p) in self.cluster.partitions.iter().enumerate() {
            bag.set(format!("{}{}", CLUSTER_PARTITION_PREFIX, n), p.id.clone());
            bag.set(format!("{}{}", CLUSTER_HOSTNAME_PREFIX, n), p.host.clone());
            bag.set(format!("{}{}", CLUSTER_PORT_PREFIX, n), p.port.clone());
            bag.set(format!("{}{}", CLUSTER_DBNAME_PREFIX, n), p.database.clone());
            bag.set(format!("{}{}", CLUSTER_USERNAME_PREFIX, n), p.username.clone());
            bag.set(format!("{}{}", CLUSTER_PASSWORD_PREFIX, n), p.password.clone());
        }
        bag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_bag(indices: &[usize]) -> AttributeBag {
        let mut bag = AttributeBag::new();
        bag.set_bool(IS_CLUSTERED, true);
        for n in indices {
            bag.set(format!("{}{}", CLUSTER_PARTITION_PREFIX, n), format!("p{}", n));
            bag.set(format!("{}{}", CLUSTER_HOSTNAME_PREFIX, n), format!("host{}", n));
            bag.set(format!("{}{}", CLUSTER_PORT_PREFIX, n), "5432");
            bag.set(format!("{}{}", CLUSTER_DBNAME_PREFIX, n), "db");
        }
        bag
    }

    #[test]
    fn test_partition_count_stops_at_gap() {
        let bag = cluster_bag(&[0, 1, 2, 4]);
        assert_eq!(bag.partition_count(), 3);
        let ids: Vec<_> = bag.partitions().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["p0", "p1", "p2"]);
    }

    #[test]
    fn test_booleans() {
        let mut bag = AttributeBag::new();
        assert!(bag.get_bool(STREAM_RESULTS, true));
        bag.set(STREAM_RESULTS, "n");
        assert!(!bag.get_bool(STREAM_RESULTS, true));
        bag.set_bool(QUOTE_ALL_FIELDS, true);
        assert_eq!(bag.get(QUOTE_ALL_FIELDS), Some("Y"));
    }

    #[test]
    fn test_apply_attributes() {
        let mut bag = cluster_bag(&[0, 1]);
        bag.set(PORT_NUMBER, "${PG_PORT}");
        bag.set_bool(USE_POOLING, true);
        bag.set(MAXIMUM_POOL_SIZE, "20");
        bag.set("POOLING_maxWait", "1000");
        bag.set("EXTRA_OPTION_postgresql.sslmode", "require");
        bag.set_bool(FORCE_IDENTIFIERS_TO_LOWERCASE, true);

        let mut config = ConnectionConfig::new("dw", "postgresql");
        config.apply_attributes(&bag).unwrap();

        assert_eq!(config.port, "${PG_PORT}");
        assert!(config.pooling.enabled);
        assert_eq!(config.pooling.max_size, 20);
        assert_eq!(config.pooling.properties.get("maxWait").map(String::as_str), Some("1000"));
        assert_eq!(
            config.extra_options.get("postgresql.sslmode").map(String::as_str),
            Some("require")
        );
        assert!(config.options.force_lower_case);
        assert!(config.options.stream_results);
        assert!(config.is_partitioned());
        assert_eq!(config.cluster.partitions.len(), 2);
    }

    #[test]
    fn test_bad_pool_size() {
        let mut bag = AttributeBag::new();
        bag.set(MAXIMUM_POOL_SIZE, "lots");
        let mut config = ConnectionConfig::new("dw", "postgresql");
        assert!(matches!(config.apply_attributes(&bag), Err(DbError::Config(_))));
    }

    #[test]
    fn test_encode_then_apply_keeps_options() {
        let mut config = ConnectionConfig::new("dw", "postgresql").with_host("h", "5432", "d");
        config.options.preferred_schema = Some("sales".into());
        config.options.supports_boolean = Some(false);
        config.extra_options.insert("postgresql.ssl".into(), "true".into());

        let bag = config.to_attributes();
        let mut restored = ConnectionConfig::new("dw", "postgresql");
        restored.apply_attributes(&bag).unwrap();

        assert_eq!(restored.port, "5432");
        assert_eq!(restored.options.preferred_schema.as_deref(), Some("sales"));
        assert_eq!(restored.options.supports_boolean, Some(false));
        assert_eq!(restored.extra_options, config.extra_options);
        assert!(!restored.cluster.enabled);
    }
}
