//! A physical connection shared between sessions.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use crate::native::{CancelHandle, ConnectionLease, NativeResult};

/// One open physical connection.
///
/// The lease sits behind an async mutex so grouped sessions on different
/// tasks can share it. The cancel handle is taken at open time and works
/// while another task holds the lease.
pub struct PhysicalConnection {
    label: String,
    lease: Mutex<Option<ConnectionLease>>,
    cancel: Arc<dyn CancelHandle>,
}

/// Reference-counted handle handed out by the registry.
pub type SharedConnection = Arc<PhysicalConnection>;

impl PhysicalConnection {
    pub fn new(label: impl Into<String>, lease: ConnectionLease) -> Self {
        let cancel = lease.native_ref().cancel_handle();
        Self {
            label: label.into(),
            lease: Mutex::new(Some(lease)),
            cancel,
        }
    }

    pub fn shared(label: impl Into<String>, lease: ConnectionLease) -> SharedConnection {
        Arc::new(Self::new(label, lease))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn cancel_handle(&self) -> Arc<dyn CancelHandle> {
        self.cancel.clone()
    }

    /// Exclusive access to the lease; `None` once closed.
    pub async fn lock(&self) -> Option<MappedMutexGuard<'_, ConnectionLease>> {
        MutexGuard::try_map(self.lease.lock().await, Option::as_mut).ok()
    }

    pub async fn is_closed(&self) -> bool {
        self.lease.lock().await.is_none()
    }

    /// Close a dedicated connection or return a pooled one. Idempotent.
    pub async fn close(&self) -> NativeResult<()> {
        let lease = self.lease.lock().await.take();
        match lease {
            Some(lease) => lease.release().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for PhysicalConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalConnection")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
