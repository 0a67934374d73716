//! Connection sessions.
//!
//! A [`Session`] wraps one physical connection for one logical consumer
//! (a pipeline step copy). It owns a statement slot per
//! [`StatementRole`], counts written rows against the commit size, and
//! coordinates commit, rollback and savepoints with the dialect's
//! capabilities.
//!
//! Sessions that connect with an owner group share one physical connection
//! through the [`ConnectionRegistry`](crate::registry::ConnectionRegistry).
//! A grouped session never commits, rolls back or closes the connection on
//! its own; the last one to disconnect does.
//!
//! - [`context`]: collaborators shared by all sessions
//! - [`statements`]: statement slots and cancellation
//! - [`physical`]: the shared physical connection

pub mod context;
pub mod physical;
pub mod statements;

mod metadata;
mod query;
mod write;

use std::collections::VecDeque;
use std::fmt;
use std::ops::AddAssign;
use std::sync::Arc;

use tokio::sync::MappedMutexGuard;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::core::identifier::validate_identifier;
use crate::core::schema::RowSchema;
use crate::core::value::Row;
use crate::dialect::{split, DialectDescriptor};
use crate::error::{DbError, Result};
use crate::native::{CancelHandle, ConnectRequest, ConnectionLease, StatementId};
use crate::partition::PartitionRouter;
use crate::registry::RegistryKey;

pub use context::{SessionContext, SessionContextBuilder};
pub use physical::{PhysicalConnection, SharedConnection};
pub use statements::{Canceller, StatementRole};

use statements::{set_active, PreparedSlot, SharedActive, StatementSlots};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Connecting,
    /// Connected on a connection of its own.
    Open,
    /// Connected on a connection shared through an owner group.
    Shared,
}

/// Row counts of executed statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub lines_input: u64,
    pub lines_output: u64,
    pub lines_updated: u64,
    pub lines_deleted: u64,
    pub lines_read: u64,
}

impl AddAssign for ExecResult {
    fn add_assign(&mut self, other: Self) {
        self.lines_input += other.lines_input;
        self.lines_output += other.lines_output;
        self.lines_updated += other.lines_updated;
        self.lines_deleted += other.lines_deleted;
        self.lines_read += other.lines_read;
    }
}

#[derive(Debug, Clone, Copy)]
enum Transaction {
    Commit,
    Rollback,
}

impl Transaction {
    fn sql(&self) -> &'static str {
        match self {
            Transaction::Commit => "COMMIT",
            Transaction::Rollback => "ROLLBACK",
        }
    }
}

/// Stateful wrapper over one physical connection.
pub struct Session {
    ctx: Arc<SessionContext>,
    config: ConnectionConfig,
    descriptor: DialectDescriptor,
    state: SessionState,
    physical: Option<SharedConnection>,
    cancel_handle: Option<Arc<dyn CancelHandle>>,
    registry_key: Option<RegistryKey>,
    partition_id: Option<String>,
    copy: usize,
    slots: StatementSlots,
    active: SharedActive,
    cursor: Option<VecDeque<Row>>,
    row_schema: Option<RowSchema>,
    written: u64,
    commit_size: i64,
    auto_commit: bool,
    driver_batch: bool,
    batch_disabled: bool,
    commits: u64,
    savepoints: u64,
}

impl Session {
    /// Closed session for `config`. Fails with `DialectNotFound` for an unknown type.
    pub fn new(ctx: Arc<SessionContext>, config: ConnectionConfig) -> Result<Self> {
        let descriptor = DialectDescriptor::from_catalog(ctx.catalog(), &config)?;
        Ok(Self {
            ctx,
            config,
            descriptor,
            state: SessionState::Closed,
            physical: None,
            cancel_handle: None,
            registry_key: None,
            partition_id: None,
            copy: 0,
            slots: StatementSlots::default(),
            active: SharedActive::default(),
            cursor: None,
            row_schema: None,
            written: 0,
            commit_size: 0,
            auto_commit: true,
            driver_batch: false,
            batch_disabled: false,
            commits: 0,
            savepoints: 0,
        })
    }

    // ===== Accessors =====

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn descriptor(&self) -> &DialectDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Open | SessionState::Shared)
    }

    /// True when connected through an owner group.
    pub fn is_grouped(&self) -> bool {
        self.registry_key.is_some()
    }

    pub fn owner_group(&self) -> Option<&str> {
        self.registry_key.as_ref().map(|k| k.group.as_str())
    }

    pub fn partition_id(&self) -> Option<&str> {
        self.partition_id.as_deref()
    }

    /// Borrower number at connect time: 1 for the session that opened the
    /// connection, higher for sessions that joined it.
    pub fn copy(&self) -> usize {
        self.copy
    }

    /// Rows written since the last commit.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn commit_size(&self) -> i64 {
        self.commit_size
    }

    pub fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    /// Physical commits this session has performed.
    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Layout of the last opened cursor.
    pub fn row_schema(&self) -> Option<&RowSchema> {
        self.row_schema.as_ref()
    }

    /// Handle that cancels this session's running queries from another task.
    pub fn canceller(&self) -> Canceller {
        Canceller::new(
            self.config.name.clone(),
            self.cancel_handle.clone(),
            self.active.clone(),
        )
    }

    pub async fn cancel(&self) -> Result<()> {
        self.canceller().cancel().await
    }

    // ===== Connection lifecycle =====

    /// Open the session.
    ///
    /// With an owner group the physical connection is shared with every
    /// other session of the same group, connection and partition; the first
    /// one opens it with auto-commit off. Without a group a connection is
    /// opened directly or borrowed from the pool, the connect SQL runs, and
    /// auto-commit follows the commit size.
    ///
    /// Finish with [`Session::disconnect`]: dropping a connected session
    /// releases its share without committing.
    pub async fn connect(&mut self, owner_group: Option<&str>, partition_id: Option<&str>) -> Result<()> {
        if self.state != SessionState::Closed {
            warn!("Session {} is already connected", self.name());
            return Ok(());
        }

        let group = owner_group.filter(|g| !g.trim().is_empty());
        let partition = partition_id.filter(|p| !p.trim().is_empty());
        if let Some(group) = group {
            validate_identifier(group)?;
        }
        if let Some(partition) = partition {
            validate_identifier(partition)?;
        }

        self.state = SessionState::Connecting;
        let result = match group {
            Some(group) => self.connect_grouped(group, partition).await,
            None => self.connect_direct(partition).await,
        };
        if let Err(e) = result {
            self.state = SessionState::Closed;
            return Err(e);
        }

        self.partition_id = partition.map(str::to_string);
        if let Some(physical) = &self.physical {
            self.cancel_handle = Some(physical.cancel_handle());
            let mut lease = lock_lease(physical, &self.config.name).await?;
            self.driver_batch = lease.native().supports_batch_updates();
        }

        info!(
            "Connected to {} [{}]{}",
            self.name(),
            self.descriptor.plugin_id(),
            match self.owner_group() {
                Some(group) => format!(" in group {} (copy {})", group, self.copy),
                None => String::new(),
            }
        );
        Ok(())
    }

    async fn connect_grouped(&mut self, group: &str, partition: Option<&str>) -> Result<()> {
        let key = RegistryKey::new(group, &self.config.name, partition);
        let ctx = self.ctx.clone();
        let attachment = {
            let this = &*self;
            ctx.registry()
                .attach(key.clone(), || async move {
                    let physical = this.open_physical(partition).await?;
                    if let Err(e) = set_auto_commit(&physical, &this.config.name, false).await {
                        let _ = physical.close().await;
                        return Err(e);
                    }
                    Ok(physical)
                })
                .await?
        };

        self.physical = Some(attachment.connection);
        self.copy = attachment.copy;
        self.registry_key = Some(key);
        self.auto_commit = false;
        self.state = SessionState::Shared;
        Ok(())
    }

    async fn connect_direct(&mut self, partition: Option<&str>) -> Result<()> {
        let physical = self.open_physical(partition).await?;
        let auto_commit = self.commit_size <= 0;
        if let Err(e) = set_auto_commit(&physical, &self.config.name, auto_commit).await {
            let _ = physical.close().await;
            return Err(e);
        }

        self.physical = Some(physical);
        self.copy = 1;
        self.auto_commit = auto_commit;
        self.state = SessionState::Open;
        Ok(())
    }

    /// Resolve coordinates, build the URL and open a physical connection.
    async fn open_physical(&self, partition: Option<&str>) -> Result<SharedConnection> {
        let router = PartitionRouter::new(&self.config, self.ctx.credentials());
        let endpoint = router.endpoint(partition)?;
        let variables = self.ctx.variables();

        let url = self.descriptor.build_url(
            &endpoint.host,
            &endpoint.port,
            &endpoint.database,
            variables,
        )?;
        let request = ConnectRequest {
            url: url.clone(),
            username: variables.substitute(&endpoint.username),
            password: endpoint.password,
            properties: self.descriptor.driver_properties(variables),
        };

        let plugin = self.descriptor.plugin_id();
        let driver = self.ctx.catalog().get_driver(plugin).ok_or_else(|| {
            DbError::connection(
                format!("No native driver registered for dialect '{}'", plugin),
                self.name(),
            )
        })?;

        let label = match &endpoint.partition_id {
            Some(partition) => format!("{}/{}", self.name(), partition),
            None => self.name().to_string(),
        };

        if self.config.pooling.enabled {
            let lease = self
                .ctx
                .pools()
                .lease(&label, driver, request, &self.config.pooling)
                .await?;
            debug!("Borrowed pooled connection for {}", label);
            return Ok(PhysicalConnection::shared(label, lease));
        }

        let conn = driver.connect(&request).await.map_err(|e| {
            DbError::connection(e.to_string(), format!("connecting {} to {}", label, url))
        })?;
        debug!("Opened {} connection for {} ({})", driver.name(), label, url);
        let physical = PhysicalConnection::shared(label, ConnectionLease::Direct(conn));

        if let Err(e) = self.run_connect_sql(&physical).await {
            let _ = physical.close().await;
            return Err(e);
        }
        Ok(physical)
    }

    async fn run_connect_sql(&self, physical: &PhysicalConnection) -> Result<()> {
        let Some(sql) = self.config.options.connect_sql.as_deref() else {
            return Ok(());
        };
        let sql = self.ctx.variables().substitute(sql);
        if sql.trim().is_empty() {
            return Ok(());
        }

        let mut lease = lock_lease(physical, &self.config.name).await?;
        for statement in split(&sql) {
            lease
                .native()
                .execute(&statement.text)
                .await
                .map_err(|e| e.into_db_error(&statement.text))?;
        }
        debug!("Executed connect SQL on {}", physical.label());
        Ok(())
    }

    /// Close statements and release the connection.
    ///
    /// A grouped session only drops its borrow; the last borrower commits
    /// (when auto-commit is off) and closes. An ungrouped session commits
    /// when auto-commit is off and closes. No-op when already closed.
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }

        let mut first_error: Option<DbError> = None;
        self.cursor = None;
        if let Err(e) = self.close_all_statements().await {
            warn!("Error closing statements of {}: {}", self.name(), e);
            first_error.get_or_insert(e);
        }

        let physical = self.physical.take();
        let key = self.registry_key.take();
        let teardown = match (physical, key) {
            (Some(_), Some(key)) => match self.ctx.registry().release(&key).await {
                Some(last) => Some(last),
                None => {
                    debug!("Left shared connection {} open for other borrowers", key);
                    None
                }
            },
            (Some(physical), None) => Some(physical),
            (None, _) => None,
        };

        if let Some(physical) = teardown {
            match self.finish_transaction(&physical, Transaction::Commit).await {
                Ok(true) => self.commits += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Error committing {} on disconnect: {}", physical.label(), e);
                    first_error.get_or_insert(e);
                }
            }
            if let Err(e) = physical.close().await {
                warn!("Error closing {}: {}", physical.label(), e);
                first_error.get_or_insert(e.into_db_error("close"));
            }
        }

        self.state = SessionState::Closed;
        self.cancel_handle = None;
        self.copy = 0;
        self.written = 0;
        info!("Disconnected from {}", self.name());

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Change the commit size. Auto-commit is on iff the size is ≤ 0.
    ///
    /// Grouped sessions keep auto-commit off.
    pub async fn set_commit_size(&mut self, commit_size: i64) -> Result<()> {
        self.commit_size = commit_size;
        if self.state != SessionState::Open {
            return Ok(());
        }
        let auto_commit = commit_size <= 0;
        if auto_commit != self.auto_commit {
            let physical = self.physical()?;
            set_auto_commit(&physical, &self.config.name, auto_commit).await?;
            self.auto_commit = auto_commit;
        }
        Ok(())
    }

    // ===== Transactions =====

    /// Commit. A grouped session defers to its last borrower unless `force`.
    pub async fn commit(&mut self, force: bool) -> Result<()> {
        self.commit_inner(force).await.map(|_| ())
    }

    /// Roll back. A grouped session defers to its last borrower unless `force`.
    pub async fn rollback(&mut self, force: bool) -> Result<()> {
        if self.is_grouped() && !force {
            debug!("Deferring rollback of shared connection {}", self.name());
            return Ok(());
        }
        let physical = self.physical()?;
        self.finish_transaction(&physical, Transaction::Rollback)
            .await
            .map(|_| ())
    }

    /// Returns whether a physical commit happened.
    async fn commit_inner(&mut self, force: bool) -> Result<bool> {
        if self.is_grouped() && !force {
            debug!("Deferring commit of shared connection {}", self.name());
            return Ok(false);
        }
        let physical = self.physical()?;
        let committed = self
            .finish_transaction(&physical, Transaction::Commit)
            .await?;
        if committed {
            self.commits += 1;
        }
        Ok(committed)
    }

    /// Commit or roll back on `physical` if the dialect has transactions
    /// and one can be open.
    ///
    /// A failure is surfaced unless the dialect declares empty
    /// transactions unsupported, in which case it is logged and ignored.
    async fn finish_transaction(&self, physical: &PhysicalConnection, kind: Transaction) -> Result<bool> {
        let dialect = self.descriptor.dialect();
        if !dialect.supports_transactions() {
            debug!("{} skipped on {}: no transaction support", kind.sql(), physical.label());
            return Ok(false);
        }

        let mut lease = lock_lease(physical, &self.config.name).await?;
        let conn = lease.native();
        if conn.auto_commit() {
            return Ok(false);
        }

        let result = match kind {
            Transaction::Commit => conn.commit().await,
            Transaction::Rollback => conn.rollback().await,
        };
        match result {
            Ok(()) => {
                debug!("{} on {}", kind.sql(), physical.label());
                Ok(true)
            }
            Err(e) if !dialect.supports_empty_transactions() => {
                debug!(
                    "Ignoring {} failure on {} (empty transactions unsupported): {}",
                    kind.sql(),
                    physical.label(),
                    e
                );
                Ok(false)
            }
            Err(e) => Err(DbError::execution(kind.sql(), e)),
        }
    }

    /// Set a savepoint, named `SP_{n}` when no name is given.
    ///
    /// Returns `None` without touching the connection when the dialect has
    /// no savepoints.
    pub async fn set_savepoint(&mut self, name: Option<&str>) -> Result<Option<String>> {
        if !self.descriptor.dialect().supports_savepoints() {
            return Ok(None);
        }
        let name = match name {
            Some(name) => name.to_string(),
            None => {
                self.savepoints += 1;
                format!("SP_{}", self.savepoints)
            }
        };

        let physical = self.physical()?;
        let mut lease = lock_lease(&physical, &self.config.name).await?;
        lease
            .native()
            .set_savepoint(&name)
            .await
            .map_err(|e| DbError::execution(format!("SAVEPOINT {}", name), e))?;
        Ok(Some(name))
    }

    /// Release a savepoint; no-op on dialects that do not release savepoints.
    pub async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        let dialect = self.descriptor.dialect();
        if !dialect.supports_savepoints() || !dialect.release_savepoint() {
            return Ok(());
        }
        let physical = self.physical()?;
        let mut lease = lock_lease(&physical, &self.config.name).await?;
        lease
            .native()
            .release_savepoint(name)
            .await
            .map_err(|e| DbError::execution(format!("RELEASE SAVEPOINT {}", name), e))
    }

    pub async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        if !self.descriptor.dialect().supports_savepoints() {
            return Ok(());
        }
        let physical = self.physical()?;
        let mut lease = lock_lease(&physical, &self.config.name).await?;
        lease
            .native()
            .rollback_to_savepoint(name)
            .await
            .map_err(|e| DbError::execution(format!("ROLLBACK TO SAVEPOINT {}", name), e))
    }

    // ===== Statement slots =====

    /// Prepare `sql` into the `role` slot, closing its previous occupant.
    ///
    /// If the driver cannot return generated keys the statement is
    /// prepared without them.
    pub async fn prepare(&mut self, role: StatementRole, sql: &str, return_keys: bool) -> Result<StatementId> {
        self.close_statement(role).await?;

        let physical = self.physical()?;
        let mut lease = lock_lease(&physical, &self.config.name).await?;
        let conn = lease.native();
        let id = match conn.prepare(sql, return_keys).await {
            Ok(id) => id,
            Err(e) if return_keys && e.is_unsupported() => {
                debug!("Preparing without generated keys on {}: {}", self.name(), e);
                conn.prepare(sql, false)
                    .await
                    .map_err(|e| DbError::preparation(sql, e))?
            }
            Err(e) => return Err(DbError::preparation(sql, e)),
        };
        drop(lease);

        self.slots.insert(
            role,
            PreparedSlot {
                id,
                sql: sql.to_string(),
                pending_batch: 0,
            },
        );
        set_active(&self.active, role, Some(id));
        Ok(id)
    }

    /// Close the statement in `role`, if any.
    pub async fn close_statement(&mut self, role: StatementRole) -> Result<()> {
        let Some(slot) = self.slots.remove(role) else {
            return Ok(());
        };
        set_active(&self.active, role, None);
        if role == StatementRole::Select {
            self.cursor = None;
        }

        let physical = self.physical()?;
        let mut lease = lock_lease(&physical, &self.config.name).await?;
        lease
            .native()
            .close_statement(slot.id)
            .await
            .map_err(|e| DbError::execution(&slot.sql, e))
    }

    async fn close_all_statements(&mut self) -> Result<()> {
        let slots = self.slots.drain();
        if slots.is_empty() {
            return Ok(());
        }
        let physical = self.physical()?;
        let mut lease = lock_lease(&physical, &self.config.name).await?;
        let mut first_error = None;
        for (role, slot) in slots {
            set_active(&self.active, role, None);
            if let Err(e) = lease.native().close_statement(slot.id).await {
                first_error.get_or_insert(DbError::execution(&slot.sql, e));
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn physical(&self) -> Result<SharedConnection> {
        self.physical
            .clone()
            .ok_or_else(|| DbError::NotConnected(self.config.name.clone()))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("connection", &self.config.name)
            .field("dialect", &self.descriptor.plugin_id())
            .field("state", &self.state)
            .field("group", &self.registry_key)
            .field("copy", &self.copy)
            .field("written", &self.written)
            .field("commit_size", &self.commit_size)
            .finish()
    }
}

/// A session dropped while connected gives its borrow back from a spawned
/// task. The last borrower's connection is rolled back and closed. Without
/// a runtime the connection is only dropped.
impl Drop for Session {
    fn drop(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        warn!("Session {} dropped without disconnect", self.config.name);

        let Some(physical) = self.physical.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime to release connection {}", physical.label());
            return;
        };
        let ctx = self.ctx.clone();
        let key = self.registry_key.take();
        runtime.spawn(async move {
            let teardown = match key {
                Some(key) => ctx.registry().release(&key).await,
                None => Some(physical),
            };
            if let Some(physical) = teardown {
                abandon(&physical).await;
            }
        });
    }
}

async fn abandon(physical: &PhysicalConnection) {
    if let Some(mut lease) = physical.lock().await {
        let conn = lease.native();
        if !conn.auto_commit() {
            if let Err(e) = conn.rollback().await {
                debug!("Rollback of abandoned {} failed: {}", physical.label(), e);
            }
        }
    }
    if let Err(e) = physical.close().await {
        warn!("Error closing abandoned {}: {}", physical.label(), e);
    }
}

async fn lock_lease<'a>(
    physical: &'a PhysicalConnection,
    connection: &str,
) -> Result<MappedMutexGuard<'a, ConnectionLease>> {
    physical
        .lock()
        .await
        .ok_or_else(|| DbError::NotConnected(connection.to_string()))
}

async fn set_auto_commit(physical: &PhysicalConnection, connection: &str, on: bool) -> Result<()> {
    let mut lease = lock_lease(physical, connection).await?;
    lease
        .native()
        .set_auto_commit(on)
        .await
        .map_err(|e| DbError::execution(format!("SET AUTOCOMMIT {}", if on { "ON" } else { "OFF" }), e))
}
