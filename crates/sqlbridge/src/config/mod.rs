//! Connection configuration loading and validation.

mod attributes;
mod types;
mod validation;

pub use attributes::*;
pub use types::*;

use crate::error::Result;
use std::path::Path;

impl ConnectionsConfig {
    /// Load connection definitions from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse connection definitions from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ConnectionsConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every connection definition.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl ConnectionConfig {
    /// Validate this definition on its own.
    pub fn validate(&self) -> Result<()> {
        validation::validate_connection(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
connections:
  - name: warehouse
    type: postgresql
    host: db.internal
    port: "${PG_PORT}"
    database: dw
    username: etl
    password: "Encrypted 2be98afc86aa7f2e4cb79ce10"
    options:
      force_lower_case: true
    pooling:
      enabled: true
      initial_size: 2
      max_size: 4
      properties:
        maxWait: "5000"
  - name: shards
    type: mysql
    cluster:
      enabled: true
      partitions:
        - id: p0
          host: shard0
          port: "3306"
          database: orders
        - id: p1
          host: shard1
          port: "3306"
          database: orders
"#;

    #[test]
    fn test_from_yaml() {
        let config = ConnectionsConfig::from_yaml(YAML).unwrap();
        assert_eq!(config.connections.len(), 2);

        let dw = config.get("WAREHOUSE").unwrap();
        assert_eq!(dw.r#type, "postgresql");
        assert_eq!(dw.port, "${PG_PORT}");
        assert!(dw.options.force_lower_case);
        assert!(dw.options.stream_results);
        assert_eq!(dw.pooling.max_size, 4);
        assert_eq!(dw.pooling.initial_size, 2);

        let shards = config.get("shards").unwrap();
        assert!(shards.is_partitioned());
        assert_eq!(shards.cluster.partitions[1].host, "shard1");
    }

    #[test]
    fn test_from_yaml_rejects_invalid() {
        let yaml = "connections:\n  - name: a\n    type: ''\n";
        assert!(ConnectionsConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_require_unknown_connection() {
        let config = ConnectionsConfig::from_yaml(YAML).unwrap();
        assert!(config.require("shards").is_ok());
        let err = config.require("missing").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
