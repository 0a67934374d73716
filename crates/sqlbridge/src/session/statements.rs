//! Prepared statement slots and cancellation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::error::{DbError, Result};
use crate::native::{CancelHandle, NativeErrorKind, StatementId};

/// Purpose of a prepared statement. A session keeps at most one per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatementRole {
    Select,
    Query,
    Insert,
    Update,
    Lookup,
    Delete,
    Sequence,
    Callable,
}

impl StatementRole {
    pub const ALL: [StatementRole; 8] = [
        StatementRole::Select,
        StatementRole::Query,
        StatementRole::Insert,
        StatementRole::Update,
        StatementRole::Lookup,
        StatementRole::Delete,
        StatementRole::Sequence,
        StatementRole::Callable,
    ];

    /// Roles whose statements can be cancelled while running.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, StatementRole::Select | StatementRole::Query)
    }
}

impl fmt::Display for StatementRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementRole::Select => "select",
            StatementRole::Query => "query",
            StatementRole::Insert => "insert",
            StatementRole::Update => "update",
            StatementRole::Lookup => "lookup",
            StatementRole::Delete => "delete",
            StatementRole::Sequence => "sequence",
            StatementRole::Callable => "callable",
        };
        f.write_str(name)
    }
}

/// A statement occupying a role slot.
#[derive(Debug, Clone)]
pub(crate) struct PreparedSlot {
    pub id: StatementId,
    pub sql: String,
    /// Parameter sets queued but not yet executed.
    pub pending_batch: usize,
}

/// One slot per [`StatementRole`].
#[derive(Debug, Default)]
pub(crate) struct StatementSlots {
    slots: HashMap<StatementRole, PreparedSlot>,
}

impl StatementSlots {
    pub fn get(&self, role: StatementRole) -> Option<&PreparedSlot> {
        self.slots.get(&role)
    }

    pub fn get_mut(&mut self, role: StatementRole) -> Option<&mut PreparedSlot> {
        self.slots.get_mut(&role)
    }

    /// Occupy `role`; returns the previous occupant.
    pub fn insert(&mut self, role: StatementRole, slot: PreparedSlot) -> Option<PreparedSlot> {
        self.slots.insert(role, slot)
    }

    pub fn remove(&mut self, role: StatementRole) -> Option<PreparedSlot> {
        self.slots.remove(&role)
    }

    /// Empty every slot, in role order.
    pub fn drain(&mut self) -> Vec<(StatementRole, PreparedSlot)> {
        let mut all: Vec<_> = self.slots.drain().collect();
        all.sort_by_key(|(role, _)| *role);
        all
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Statements of a session that may be running right now.
#[derive(Debug, Default)]
pub(crate) struct ActiveStatements {
    running: HashMap<StatementRole, StatementId>,
    /// Statement run through `exec_statement`, outside any role slot.
    direct: Option<StatementId>,
}

pub(crate) type SharedActive = Arc<Mutex<ActiveStatements>>;

pub(crate) fn set_active(active: &SharedActive, role: StatementRole, id: Option<StatementId>) {
    if !role.is_cancellable() {
        return;
    }
    let mut guard = active.lock().unwrap_or_else(PoisonError::into_inner);
    match id {
        Some(id) => guard.running.insert(role, id),
        None => guard.running.remove(&role),
    };
}

pub(crate) fn set_direct(active: &SharedActive, id: Option<StatementId>) {
    active.lock().unwrap_or_else(PoisonError::into_inner).direct = id;
}

/// Cancels a session's running select and query statements, and any
/// statement in flight through `exec_statement`, from any task.
#[derive(Clone)]
pub struct Canceller {
    connection: String,
    handle: Option<Arc<dyn CancelHandle>>,
    active: SharedActive,
}

impl Canceller {
    pub(crate) fn new(
        connection: impl Into<String>,
        handle: Option<Arc<dyn CancelHandle>>,
        active: SharedActive,
    ) -> Self {
        Self {
            connection: connection.into(),
            handle,
            active,
        }
    }

    /// Cancel whatever is running. Succeeds when nothing is.
    ///
    /// Drivers that cannot cancel are treated as having nothing to cancel.
    pub async fn cancel(&self) -> Result<()> {
        let Some(handle) = &self.handle else {
            return Ok(());
        };

        let running: Vec<(StatementRole, StatementId)> = {
            let guard = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            let mut running: Vec<_> = guard.running.iter().map(|(r, id)| (*r, *id)).collect();
            running.sort();
            if let Some(id) = guard.direct {
                running.push((StatementRole::Query, id));
            }
            running
        };

        for (role, id) in running {
            match handle.cancel(id).await {
                Ok(()) => debug!("Cancelled {} statement {} on {}", role, id, self.connection),
                Err(e) if e.kind == NativeErrorKind::Unsupported => {
                    debug!("Driver for {} cannot cancel statements: {}", self.connection, e);
                }
                Err(e) => {
                    return Err(DbError::execution(format!("cancel {} statement", role), e));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Canceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canceller")
            .field("connection", &self.connection)
            .field("connected", &self.handle.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{NativeError, NativeResult, NoCancel};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl CancelHandle for Counting {
        async fn cancel(&self, _statement: StatementId) -> NativeResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl CancelHandle for Broken {
        async fn cancel(&self, _statement: StatementId) -> NativeResult<()> {
            Err(NativeError::connection("socket closed"))
        }
    }

    #[tokio::test]
    async fn test_cancel_only_running_statements() {
        let handle = Arc::new(Counting::default());
        let active = SharedActive::default();
        let canceller = Canceller::new("dw", Some(handle.clone()), active.clone());

        canceller.cancel().await.unwrap();
        assert_eq!(handle.0.load(Ordering::SeqCst), 0);

        set_active(&active, StatementRole::Select, Some(StatementId(1)));
        set_active(&active, StatementRole::Insert, Some(StatementId(2)));
        canceller.cancel().await.unwrap();
        assert_eq!(handle.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_without_connection_or_support() {
        let active = SharedActive::default();
        set_active(&active, StatementRole::Query, Some(StatementId(7)));

        assert!(Canceller::new("dw", None, active.clone()).cancel().await.is_ok());
        assert!(Canceller::new("dw", Some(Arc::new(NoCancel)), active.clone())
            .cancel()
            .await
            .is_ok());
        assert!(Canceller::new("dw", Some(Arc::new(Broken)), active)
            .cancel()
            .await
            .is_err());
    }

    #[test]
    fn test_slots_replace_and_drain() {
        let mut slots = StatementSlots::default();
        let slot = |id| PreparedSlot {
            id: StatementId(id),
            sql: String::new(),
            pending_batch: 0,
        };
        assert!(slots.insert(StatementRole::Insert, slot(1)).is_none());
        let previous = slots.insert(StatementRole::Insert, slot(2)).unwrap();
        assert_eq!(previous.id, StatementId(1));
        slots.insert(StatementRole::Select, slot(3));

        let drained: Vec<_> = slots.drain().into_iter().map(|(r, _)| r).collect();
        assert_eq!(drained, vec![StatementRole::Select, StatementRole::Insert]);
        assert!(slots.is_empty());
    }
}
