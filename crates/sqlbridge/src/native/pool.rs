//! bb8 pooling of native connections.
//!
//! Pools are keyed by connection name and partition and created on first
//! use. A [`ConnectionLease`] is either a dedicated connection or a pooled
//! one; releasing a pooled lease returns it to its pool instead of closing it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::PoolingConfig;
use crate::error::{DbError, Result};

use super::{ConnectRequest, NativeConnection, NativeDriver, NativeError, NativeResult};

/// Connection manager for a bb8 pool over any [`NativeDriver`].
pub struct NativeConnectionManager {
    driver: Arc<dyn NativeDriver>,
    request: ConnectRequest,
}

impl NativeConnectionManager {
    pub fn new(driver: Arc<dyn NativeDriver>, request: ConnectRequest) -> Self {
        Self { driver, request }
    }
}

#[async_trait]
impl bb8::ManageConnection for NativeConnectionManager {
    type Connection = Box<dyn NativeConnection>;
    type Error = NativeError;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        self.driver.connect(&self.request).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        if conn.is_valid().await {
            Ok(())
        } else {
            Err(NativeError::connection("pooled connection failed validation"))
        }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }
}

/// A physical connection held by a session group.
pub enum ConnectionLease {
    /// Opened for this group and closed on release.
    Direct(Box<dyn NativeConnection>),
    /// Borrowed from a pool and returned on release.
    Pooled(PooledConnection<'static, NativeConnectionManager>),
}

impl ConnectionLease {
    pub fn native(&mut self) -> &mut dyn NativeConnection {
        match self {
            ConnectionLease::Direct(conn) => conn.as_mut(),
            ConnectionLease::Pooled(conn) => &mut ***conn,
        }
    }

    pub fn native_ref(&self) -> &dyn NativeConnection {
        match self {
            ConnectionLease::Direct(conn) => conn.as_ref(),
            ConnectionLease::Pooled(conn) => &***conn,
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self, ConnectionLease::Pooled(_))
    }

    /// Close a dedicated connection, or hand a pooled one back.
    pub async fn release(self) -> NativeResult<()> {
        match self {
            ConnectionLease::Direct(mut conn) => conn.close().await,
            ConnectionLease::Pooled(conn) => {
                drop(conn);
                Ok(())
            }
        }
    }
}

/// Pool tuning derived from a [`PoolingConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_size: u32,
    pub min_idle: Option<u32>,
    pub connection_timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
    pub test_on_check_out: bool,
}

impl PoolSettings {
    /// Read sizes and the recognised pool properties.
    ///
    /// Recognised properties: `maxWait`, `minEvictableIdleTimeMillis`,
    /// `maxConnLifetimeMillis` (all milliseconds) and `testOnBorrow`.
    pub fn from_config(config: &PoolingConfig) -> Result<Self> {
        let mut settings = Self {
            max_size: config.max_size.max(1),
            min_idle: Some(config.initial_size.min(config.max_size)),
            connection_timeout: None,
            idle_timeout: None,
            max_lifetime: None,
            test_on_check_out: true,
        };

        for (key, value) in &config.properties {
            match key.as_str() {
                "maxWait" => settings.connection_timeout = Some(millis(key, value)?),
                "minEvictableIdleTimeMillis" => settings.idle_timeout = Some(millis(key, value)?),
                "maxConnLifetimeMillis" => settings.max_lifetime = Some(millis(key, value)?),
                "testOnBorrow" => {
                    settings.test_on_check_out = value.eq_ignore_ascii_case("true")
                        || value.eq_ignore_ascii_case("y")
                }
                other => debug!("Ignoring unrecognised pool property {}", other),
            }
        }

        Ok(settings)
    }
}

fn millis(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| {
            DbError::Config(format!(
                "Pool property {} must be a number of milliseconds, got '{}'",
                key, value
            ))
        })
}

/// Pools shared by all sessions of one [`SessionContext`](crate::session::SessionContext).
#[derive(Default)]
pub struct ConnectionPools {
    pools: Mutex<HashMap<String, Pool<NativeConnectionManager>>>,
}

impl ConnectionPools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow a connection from the pool for `key`, creating the pool on first use.
    pub async fn lease(
        &self,
        key: &str,
        driver: Arc<dyn NativeDriver>,
        request: ConnectRequest,
        config: &PoolingConfig,
    ) -> Result<ConnectionLease> {
        let pool = {
            let mut pools = self.pools.lock().await;
            match pools.get(key) {
                Some(pool) => pool.clone(),
                None => {
                    let settings = PoolSettings::from_config(config)?;
                    let pool = build_pool(driver, request, &settings)
                        .await
                        .map_err(|e| DbError::pool(e, key))?;
                    info!(
                        "Created connection pool {} (max {} connections)",
                        key, settings.max_size
                    );
                    pools.insert(key.to_string(), pool.clone());
                    pool
                }
            }
        };

        let conn = pool.get_owned().await.map_err(|e| DbError::pool(e, key))?;
        Ok(ConnectionLease::Pooled(conn))
    }

    /// Drop the pool for `key`; idle connections close as it is dropped.
    pub async fn remove(&self, key: &str) -> bool {
        self.pools.lock().await.remove(key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.pools.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pools.lock().await.is_empty()
    }

    /// Idle and in-use connection counts of the pool for `key`.
    pub async fn state(&self, key: &str) -> Option<(u32, u32)> {
        self.pools
            .lock()
            .await
            .get(key)
            .map(|pool| {
                let state = pool.state();
                (state.idle_connections, state.connections)
            })
    }
}

async fn build_pool(
    driver: Arc<dyn NativeDriver>,
    request: ConnectRequest,
    settings: &PoolSettings,
) -> std::result::Result<Pool<NativeConnectionManager>, NativeError> {
    let mut builder = Pool::builder()
        .max_size(settings.max_size)
        .min_idle(settings.min_idle)
        .test_on_check_out(settings.test_on_check_out)
        .idle_timeout(settings.idle_timeout)
        .max_lifetime(settings.max_lifetime);
    if let Some(timeout) = settings.connection_timeout {
        builder = builder.connection_timeout(timeout);
    }
    builder
        .build(NativeConnectionManager::new(driver, request))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::MemoryDatabase;
    use std::collections::BTreeMap;

    fn pooling(max: u32) -> PoolingConfig {
        PoolingConfig {
            enabled: true,
            initial_size: 1,
            max_size: max,
            properties: BTreeMap::new(),
        }
    }

    #[test]
    fn test_settings_from_properties() {
        let mut config = pooling(4);
        config.properties.insert("maxWait".into(), "2500".into());
        config.properties.insert("testOnBorrow".into(), "false".into());
        config.properties.insert("validationQuery".into(), "SELECT 1".into());

        let settings = PoolSettings::from_config(&config).unwrap();
        assert_eq!(settings.max_size, 4);
        assert_eq!(settings.connection_timeout, Some(Duration::from_millis(2500)));
        assert!(!settings.test_on_check_out);
    }

    #[test]
    fn test_bad_property_value() {
        let mut config = pooling(4);
        config.properties.insert("maxWait".into(), "soon".into());
        assert!(matches!(
            PoolSettings::from_config(&config),
            Err(DbError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_pooled_lease_returns_to_pool() {
        let db = MemoryDatabase::new();
        let driver: Arc<dyn NativeDriver> = Arc::new(db.driver());
        let pools = ConnectionPools::new();

        let mut lease = pools
            .lease("orders/", driver.clone(), ConnectRequest::default(), &pooling(2))
            .await
            .unwrap();
        assert!(lease.is_pooled());
        assert!(lease.native().is_valid().await);
        lease.release().await.unwrap();

        let _again = pools
            .lease("orders/", driver, ConnectRequest::default(), &pooling(2))
            .await
            .unwrap();
        assert_eq!(pools.len().await, 1);
        assert_eq!(db.stats().connections_closed, 0);
    }
}
