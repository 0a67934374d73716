//! Connection sharing between grouped sessions.
//!
//! Sessions that name the same owner group (and partition) share one
//! physical connection and commit or roll back as one unit. The registry
//! holds a strong reference to each shared connection plus a borrower
//! count; the last borrower to release gets the connection back to commit
//! and close it.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{DbError, Result};
use crate::session::SharedConnection;

/// Registry key: owner group, connection name and partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    pub group: String,
    pub connection: String,
    pub partition: Option<String>,
}

impl RegistryKey {
    pub fn new(group: &str, connection: &str, partition: Option<&str>) -> Self {
        Self {
            group: group.to_string(),
            connection: connection.to_string(),
            partition: partition.filter(|p| !p.is_empty()).map(str::to_string),
        }
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.connection)?;
        if let Some(partition) = &self.partition {
            write!(f, ":{}", partition)?;
        }
        Ok(())
    }
}

/// Result of [`ConnectionRegistry::attach`].
#[derive(Debug, Clone)]
pub struct Attachment {
    pub connection: SharedConnection,
    /// Borrower count after attaching; 1 for the opener.
    pub copy: usize,
}

impl Attachment {
    /// True for the borrower that opened the connection.
    pub fn is_first(&self) -> bool {
        self.copy == 1
    }
}

type Slot = Arc<Mutex<Option<SharedConnection>>>;

struct Entry {
    /// Serializes opening for this key only.
    slot: Slot,
    connection: Option<SharedConnection>,
    borrowers: usize,
}

/// Map of shared connections keyed by [`RegistryKey`].
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<RegistryKey, Entry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the connection for `key`, running `open` only if none exists.
    ///
    /// Concurrent callers for the same key wait on that key's slot and then
    /// share the result; other keys are not held up by a slow `open`. A
    /// failed open leaves no entry behind unless another caller is still
    /// waiting to try.
    pub async fn attach<F, Fut>(&self, key: RegistryKey, open: F) -> Result<Attachment>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SharedConnection>>,
    {
        let mut open = Some(open);
        loop {
            let slot = {
                let mut entries = self.entries.lock().await;
                entries
                    .entry(key.clone())
                    .or_insert_with(|| Entry {
                        slot: Slot::default(),
                        connection: None,
                        borrowers: 0,
                    })
                    .slot
                    .clone()
            };

            let mut opened = slot.lock().await;
            let existing = opened.clone();
            let connection = match existing {
                Some(connection) => connection,
                None => {
                    let Some(open) = open.take() else {
                        return Err(DbError::connection(
                            "shared connection was released while attaching",
                            key.to_string(),
                        ));
                    };
                    match open().await {
                        Ok(connection) => {
                            info!("Opened shared connection {}", key);
                            *opened = Some(connection.clone());
                            connection
                        }
                        Err(e) => {
                            drop(opened);
                            self.discard_unopened(&key, &slot).await;
                            return Err(e);
                        }
                    }
                }
            };

            let mut entries = self.entries.lock().await;
            match entries.get_mut(&key) {
                Some(entry) if Arc::ptr_eq(&entry.slot, &slot) => {
                    entry.borrowers += 1;
                    entry.connection = Some(connection.clone());
                    debug!("Attached to shared connection {} (borrowers: {})", key, entry.borrowers);
                    return Ok(Attachment {
                        connection,
                        copy: entry.borrowers,
                    });
                }
                // The last borrower released it while we waited on the slot.
                _ => continue,
            }
        }
    }

    async fn discard_unopened(&self, key: &RegistryKey, slot: &Slot) {
        let mut entries = self.entries.lock().await;
        let unused = entries.get(key).is_some_and(|entry| {
            Arc::ptr_eq(&entry.slot, slot) && entry.borrowers == 0 && Arc::strong_count(slot) == 2
        });
        if unused {
            entries.remove(key);
        }
    }

    /// Drop one borrower. Returns the connection when it was the last one.
    pub async fn release(&self, key: &RegistryKey) -> Option<SharedConnection> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(key)?;
        if entry.borrowers == 0 {
            return None;
        }
        entry.borrowers -= 1;

        if entry.borrowers > 0 {
            debug!("Released shared connection {} (borrowers: {})", key, entry.borrowers);
            return None;
        }

        info!("Last borrower released shared connection {}", key);
        entries.remove(key).and_then(|e| e.connection)
    }

    /// Current borrower count for `key` (0 when absent).
    pub async fn borrowers(&self, key: &RegistryKey) -> usize {
        self.entries
            .lock()
            .await
            .get(key)
            .map_or(0, |e| e.borrowers)
    }

    /// Number of keys with at least one borrower.
    pub async fn len(&self) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| e.borrowers > 0)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::native::{ConnectRequest, ConnectionLease, MemoryDatabase, NativeDriver};
    use crate::session::PhysicalConnection;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    async fn open(db: &MemoryDatabase) -> Result<SharedConnection> {
        let conn = db
            .driver()
            .connect(&ConnectRequest::default())
            .await
            .map_err(|e| DbError::connection(e.to_string(), "test"))?;
        Ok(PhysicalConnection::shared("test", ConnectionLease::Direct(conn)))
    }

    #[tokio::test]
    async fn test_attach_opens_once() {
        let db = MemoryDatabase::new();
        let registry = ConnectionRegistry::new();
        let key = RegistryKey::new("G", "dw", None);

        let first = registry.attach(key.clone(), || open(&db)).await.unwrap();
        let second = registry.attach(key.clone(), || open(&db)).await.unwrap();

        assert!(first.is_first());
        assert_eq!(second.copy, 2);
        assert!(Arc::ptr_eq(&first.connection, &second.connection));
        assert_eq!(db.stats().connections_opened, 1);

        assert!(registry.release(&key).await.is_none());
        assert_eq!(registry.borrowers(&key).await, 1);
        assert!(registry.release(&key).await.is_some());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_partitions_are_separate_keys() {
        let db = MemoryDatabase::new();
        let registry = ConnectionRegistry::new();

        registry
            .attach(RegistryKey::new("G", "dw", Some("P0")), || open(&db))
            .await
            .unwrap();
        registry
            .attach(RegistryKey::new("G", "dw", Some("P1")), || open(&db))
            .await
            .unwrap();

        assert_eq!(registry.len().await, 2);
        assert_eq!(db.stats().connections_opened, 2);
    }

    #[tokio::test]
    async fn test_failed_open_leaves_no_entry() {
        let db = MemoryDatabase::new();
        db.fail_connect("refused");
        let registry = ConnectionRegistry::new();
        let key = RegistryKey::new("G", "dw", None);

        assert!(registry.attach(key.clone(), || open(&db)).await.is_err());
        assert_eq!(registry.borrowers(&key).await, 0);
        assert!(registry.release(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_attach_shares_one_connection() {
        let db = MemoryDatabase::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let opens = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let db = db.clone();
            let opens = opens.clone();
            tasks.push(tokio::spawn(async move {
                registry
                    .attach(RegistryKey::new("G", "dw", None), || async {
                        opens.fetch_add(1, Ordering::SeqCst);
                        open(&db).await
                    })
                    .await
                    .map(|a| a.copy)
            }));
        }

        let mut copies = Vec::new();
        for task in tasks {
            copies.push(task.await.unwrap().unwrap());
        }
        copies.sort_unstable();

        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(copies, (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_slow_open_does_not_block_other_keys() {
        let db = MemoryDatabase::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let gate = Arc::new(Notify::new());

        let slow = {
            let (registry, db, gate) = (registry.clone(), db.clone(), gate.clone());
            tokio::spawn(async move {
                registry
                    .attach(RegistryKey::new("A", "dw", None), || async {
                        gate.notified().await;
                        open(&db).await
                    })
                    .await
                    .map(|a| a.copy)
            })
        };
        tokio::task::yield_now().await;

        let other = tokio::time::timeout(
            Duration::from_secs(5),
            registry.attach(RegistryKey::new("B", "dw", None), || open(&db)),
        )
        .await
        .expect("attach for B waited on A")
        .unwrap();
        assert!(other.is_first());
        assert_eq!(registry.len().await, 1);

        gate.notify_one();
        assert_eq!(slow.await.unwrap().unwrap(), 1);
        assert_eq!(registry.len().await, 2);
        assert_eq!(db.stats().connections_opened, 2);
    }

    #[tokio::test]
    async fn test_attach_after_last_release_opens_again() {
        let db = MemoryDatabase::new();
        let registry = ConnectionRegistry::new();
        let key = RegistryKey::new("G", "dw", None);

        registry.attach(key.clone(), || open(&db)).await.unwrap();
        assert!(registry.release(&key).await.is_some());

        let again = registry.attach(key.clone(), || open(&db)).await.unwrap();
        assert!(again.is_first());
        assert_eq!(db.stats().connections_opened, 2);
    }
}
