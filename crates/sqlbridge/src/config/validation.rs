//! Configuration validation.

use std::collections::HashSet;

use super::{ConnectionConfig, ConnectionsConfig};
use crate::error::{DbError, Result};

/// Validate all connection definitions.
pub fn validate(config: &ConnectionsConfig) -> Result<()> {
    let mut names = HashSet::new();
    for conn in &config.connections {
        validate_connection(conn)?;
        if !names.insert(conn.name.to_lowercase()) {
            return Err(DbError::Config(format!(
                "duplicate connection name '{}'",
                conn.name
            )));
        }
    }
    Ok(())
}

/// Validate one connection definition.
pub fn validate_connection(conn: &ConnectionConfig) -> Result<()> {
    if conn.name.trim().is_empty() {
        return Err(DbError::Config("connection name is required".into()));
    }
    if conn.r#type.trim().is_empty() {
        return Err(DbError::Config(format!(
            "connection '{}': type is required",
            conn.name
        )));
    }

    check_port(&conn.name, "port", &conn.port)?;

    if conn.options.force_lower_case && conn.options.force_upper_case {
        return Err(DbError::Config(format!(
            "connection '{}': force_lower_case and force_upper_case are mutually exclusive",
            conn.name
        )));
    }

    // Pooling
    if conn.pooling.enabled {
        if conn.pooling.max_size == 0 {
            return Err(DbError::Config(format!(
                "connection '{}': pooling.max_size must be at least 1",
                conn.name
            )));
        }
        if conn.pooling.initial_size > conn.pooling.max_size {
            return Err(DbError::Config(format!(
                "connection '{}': pooling.initial_size ({}) exceeds pooling.max_size ({})",
                conn.name, conn.pooling.initial_size, conn.pooling.max_size
            )));
        }
    }

    // Cluster
    if conn.cluster.enabled {
        if conn.cluster.partitions.is_empty() {
            return Err(DbError::Config(format!(
                "connection '{}': cluster is enabled but has no partitions",
                conn.name
            )));
        }
        let mut ids = HashSet::new();
        for partition in &conn.cluster.partitions {
            if partition.id.trim().is_empty() {
                return Err(DbError::Config(format!(
                    "connection '{}': partition id is required",
                    conn.name
                )));
            }
            if !ids.insert(partition.id.as_str()) {
                return Err(DbError::Config(format!(
                    "connection '{}': duplicate partition id '{}'",
                    conn.name, partition.id
                )));
            }
            check_port(&conn.name, &format!("partition {} port", partition.id), &partition.port)?;
        }
    }

    Ok(())
}

/// Ports are numeric unless they reference a variable.
fn check_port(name: &str, what: &str, port: &str) -> Result<()> {
    let port = port.trim();
    if port.is_empty() || port.contains("${") || port.contains("%%") {
        return Ok(());
    }
    port.parse::<u16>().map(|_| ()).map_err(|_| {
        DbError::Config(format!(
            "connection '{}': {} must be numeric, got '{}'",
            name, what, port
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartitionDescriptor;

    fn valid_config() -> ConnectionsConfig {
        ConnectionsConfig {
            connections: vec![
                ConnectionConfig::new("source", "mssql")
                    .with_host("localhost", "1433", "source_db")
                    .with_credentials("sa", "password"),
                ConnectionConfig::new("target", "postgresql")
                    .with_host("localhost", "5432", "target_db")
                    .with_credentials("postgres", "password"),
            ],
        }
    }

    fn partition(id: &str) -> PartitionDescriptor {
        PartitionDescriptor {
            id: id.to_string(),
            host: "h".to_string(),
            port: "5432".to_string(),
            database: "d".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_duplicate_names() {
        let mut config = valid_config();
        config.connections[1].name = "SOURCE".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_type() {
        let mut config = valid_config();
        config.connections[0].r#type = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_port_may_hold_variable() {
        let mut config = valid_config();
        config.connections[0].port = "${MSSQL_PORT}".to_string();
        assert!(validate(&config).is_ok());
        config.connections[0].port = "fourteen".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_conflicting_case_forcing() {
        let mut config = valid_config();
        config.connections[0].options.force_lower_case = true;
        config.connections[0].options.force_upper_case = true;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_pool_sizes() {
        let mut config = valid_config();
        config.connections[1].pooling.enabled = true;
        config.connections[1].pooling.max_size = 2;
        config.connections[1].pooling.initial_size = 3;
        assert!(validate(&config).is_err());

        config.connections[1].pooling.initial_size = 1;
        assert!(validate(&config).is_ok());

        config.connections[1].pooling.max_size = 0;
        config.connections[1].pooling.initial_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_cluster_partitions() {
        let mut config = valid_config();
        config.connections[1].cluster.enabled = true;
        assert!(validate(&config).is_err());

        config.connections[1].cluster.partitions = vec![partition("p0"), partition("p0")];
        assert!(validate(&config).is_err());

        config.connections[1].cluster.partitions = vec![partition("p0"), partition("")];
        assert!(validate(&config).is_err());

        config.connections[1].cluster.partitions = vec![partition("p0"), partition("p1")];
        assert!(validate(&config).is_ok());
    }
}
