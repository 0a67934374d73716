//! Partition routing.
//!
//! A clustered connection definition fans out to several physical
//! databases. The [`PartitionRouter`] maps a partition id to the
//! coordinates and clear-text credentials of one of them.

use std::fmt;

use crate::config::{ConnectionConfig, PartitionDescriptor};
use crate::core::credentials::CredentialDecoder;
use crate::error::{DbError, Result};

/// Coordinates of the database a session actually connects to.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedPartition {
    /// `None` for an unpartitioned connection.
    pub partition_id: Option<String>,
    pub host: String,
    pub port: String,
    pub database: String,
    pub username: String,
    /// Clear-text password.
    pub password: String,
}

impl fmt::Debug for ResolvedPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedPartition")
            .field("partition_id", &self.partition_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Routes partition ids of one connection definition.
pub struct PartitionRouter<'a> {
    config: &'a ConnectionConfig,
    decoder: &'a dyn CredentialDecoder,
}

impl<'a> PartitionRouter<'a> {
    pub fn new(config: &'a ConnectionConfig, decoder: &'a dyn CredentialDecoder) -> Self {
        Self { config, decoder }
    }

    pub fn partition_count(&self) -> usize {
        if self.config.cluster.enabled {
            self.config.cluster.partitions.len()
        } else {
            0
        }
    }

    pub fn partition_ids(&self) -> Vec<&str> {
        if !self.config.cluster.enabled {
            return Vec::new();
        }
        self.config
            .cluster
            .partitions
            .iter()
            .map(|p| p.id.as_str())
            .collect()
    }

    fn find(&self, partition_id: &str) -> Option<&'a PartitionDescriptor> {
        if !self.config.cluster.enabled {
            return None;
        }
        self.config
            .cluster
            .partitions
            .iter()
            .find(|p| p.id == partition_id)
    }

    /// Coordinates of `partition_id`.
    ///
    /// Empty partition credentials fall back to the definition's own.
    pub fn resolve(&self, partition_id: &str) -> Result<ResolvedPartition> {
        let partition = self
            .find(partition_id)
            .ok_or_else(|| DbError::PartitionNotFound {
                connection: self.config.name.clone(),
                partition: partition_id.to_string(),
            })?;

        let (username, stored_password) = if partition.username.is_empty() {
            (&self.config.username, &self.config.password)
        } else {
            (&partition.username, &partition.password)
        };

        Ok(ResolvedPartition {
            partition_id: Some(partition.id.clone()),
            host: partition.host.clone(),
            port: partition.port.clone(),
            database: partition.database.clone(),
            username: username.clone(),
            password: self.decoder.decode(stored_password)?,
        })
    }

    /// Coordinates to connect to: the partition when the definition is
    /// clustered and an id is given, otherwise the definition itself.
    pub fn endpoint(&self, partition_id: Option<&str>) -> Result<ResolvedPartition> {
        match partition_id.filter(|id| !id.is_empty()) {
            Some(id) if self.config.is_partitioned() => self.resolve(id),
            _ => Ok(ResolvedPartition {
                partition_id: None,
                host: self.config.host.clone(),
                port: self.config.port.clone(),
                database: self.config.database.clone(),
                username: self.config.username.clone(),
                password: self.decoder.decode(&self.config.password)?,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttributeBag;
    use crate::core::credentials::ObfuscatedPasswords;

    fn clustered() -> ConnectionConfig {
        let mut bag = AttributeBag::new();
        bag.set("IS_CLUSTERED", "Y");
        for n in [0, 1, 2, 4] {
            bag.set(format!("CLUSTER_PARTITION_{}", n), format!("P{}", n));
            bag.set(format!("CLUSTER_HOSTNAME_{}", n), format!("shard{}", n));
            bag.set(format!("CLUSTER_PORT_{}", n), "5432");
            bag.set(format!("CLUSTER_DBNAME_{}", n), "orders");
        }
        bag.set("CLUSTER_USERNAME_1", "shard_user");
        bag.set("CLUSTER_PASSWORD_1", ObfuscatedPasswords.encode("s3cret"));

        let mut config = ConnectionConfig::new("orders", "postgresql")
            .with_host("main", "5432", "orders")
            .with_credentials("etl", "plain");
        config.apply_attributes(&bag).unwrap();
        config
    }

    #[test]
    fn test_gap_limits_partition_count() {
        let config = clustered();
        let router = PartitionRouter::new(&config, &ObfuscatedPasswords);
        assert_eq!(router.partition_count(), 3);
        assert_eq!(router.partition_ids(), vec!["P0", "P1", "P2"]);
    }

    #[test]
    fn test_resolve_partition() {
        let config = clustered();
        let router = PartitionRouter::new(&config, &ObfuscatedPasswords);

        let p1 = router.resolve("P1").unwrap();
        assert_eq!(p1.host, "shard1");
        assert_eq!(p1.username, "shard_user");
        assert_eq!(p1.password, "s3cret");

        let p0 = router.resolve("P0").unwrap();
        assert_eq!(p0.username, "etl");
        assert_eq!(p0.password, "plain");
    }

    #[test]
    fn test_unknown_partition() {
        let config = clustered();
        let router = PartitionRouter::new(&config, &ObfuscatedPasswords);
        assert!(matches!(
            router.resolve("P4"),
            Err(DbError::PartitionNotFound { .. })
        ));
        assert!(router.endpoint(Some("P9")).is_err());
    }

    #[test]
    fn test_endpoint_without_partition() {
        let config = clustered();
        let router = PartitionRouter::new(&config, &ObfuscatedPasswords);
        let main = router.endpoint(None).unwrap();
        assert_eq!(main.host, "main");
        assert_eq!(main.partition_id, None);

        let plain = ConnectionConfig::new("x", "h2").with_host("", "", "mem");
        let router = PartitionRouter::new(&plain, &ObfuscatedPasswords);
        assert_eq!(router.endpoint(Some("P0")).unwrap().database, "mem");
        assert!(!format!("{:?}", main).contains("plain"));
    }
}
