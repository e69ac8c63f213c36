//! Cross-store transaction group.
//!
//! A [`Group`] owns one open transaction per backend for the duration of a
//! unit of work. Commit runs the handles in registration order; the first
//! failure rolls back every handle and is reported with the backend that
//! failed.
//!
//! ## Atomicity
//!
//! The relational and graph stores share no commit protocol, so atomicity is
//! best effort. If a later handle fails to commit after an earlier one
//! succeeded, the earlier backend keeps its committed data: rolling back an
//! already-committed handle is a no-op. Register the handle most likely to fail
//! (or cheapest to repair) last.
//!
//! ## Lifecycle
//!
//! `Open -> Committed | RolledBack`. Both transitions are terminal and calling
//! `commit` or `rollback` again afterwards is a no-op, so an unconditional
//! rollback on every exit path is safe. A group dropped while still open
//! (cancelled or timed-out request) schedules a rollback on the current Tokio
//! runtime.

use async_trait::async_trait;
use std::{any::Any, fmt};
use tracing::{debug, error, warn};

use crate::error::{Backend, TxError};

pub mod context;
pub mod graph;
pub mod postgres;

pub use context::{current, scope, TxContext};
pub use graph::GraphTx;
pub use postgres::PgTx;

/// A backend transaction handle owned by a [`Group`].
///
/// `rollback` after a successful `commit` must succeed as a no-op.
#[async_trait]
pub trait Tx: Any + Send {
    /// Lookup key, unique within a group.
    fn key(&self) -> &'static str;

    fn backend(&self) -> Backend;

    async fn commit(&mut self) -> anyhow::Result<()>;

    async fn rollback(&mut self) -> anyhow::Result<()>;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Opens a fresh group with one handle per configured backend.
#[async_trait]
pub trait TxSource: Send + Sync {
    async fn begin(&self) -> Result<Group, TxError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupState {
    Open,
    Committed,
    RolledBack,
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GroupState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        }
    }
}

pub struct Group {
    handles: Vec<Box<dyn Tx>>,
    state: GroupState,
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

impl Group {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
            state: GroupState::Open,
        }
    }

    #[must_use]
    pub fn state(&self) -> GroupState {
        self.state
    }

    /// Keys of the registered handles, in commit order.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handles.iter().map(|handle| handle.key())
    }

    /// Add a handle; it is committed after every handle registered before it.
    ///
    /// # Errors
    /// `Finished` once the group is terminal, `DuplicateHandle` if the key is taken.
    pub fn register(&mut self, handle: Box<dyn Tx>) -> Result<(), TxError> {
        if self.state != GroupState::Open {
            return Err(TxError::Finished(self.state.as_str()));
        }
        let key = handle.key();
        if self.handles.iter().any(|existing| existing.key() == key) {
            return Err(TxError::DuplicateHandle(key));
        }
        self.handles.push(handle);
        Ok(())
    }

    /// Borrow the handle registered under `key` as its concrete type.
    ///
    /// # Errors
    /// `MissingHandle` if nothing is registered under `key`,
    /// `WrongHandleType` if it is not a `T`.
    pub fn handle_mut<T: Tx>(&mut self, key: &'static str) -> Result<&mut T, TxError> {
        let handle = self
            .handles
            .iter_mut()
            .find(|handle| handle.key() == key)
            .ok_or(TxError::MissingHandle(key))?;
        handle
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(TxError::WrongHandleType(key))
    }

    /// Commit every handle in registration order.
    ///
    /// On the first failure all handles are rolled back and the commit error
    /// is returned, with any rollback error attached to it.
    ///
    /// Once the group is terminal this does nothing and returns `Ok(())`, also
    /// for a group that was rolled back. `Ok` here does not mean data was
    /// committed; check [`Group::state`] for that.
    ///
    /// # Errors
    /// `TxError::Commit` naming the backend whose commit failed.
    pub async fn commit(&mut self) -> Result<(), TxError> {
        if self.state != GroupState::Open {
            debug!(state = %self.state, "commit ignored, transaction group already finished");
            return Ok(());
        }

        let mut failure = None;
        for handle in &mut self.handles {
            if let Err(source) = handle.commit().await {
                error!(backend = %handle.backend(), "commit failed: {source:#}");
                failure = Some((handle.backend(), source));
                break;
            }
        }

        match failure {
            None => {
                self.state = GroupState::Committed;
                Ok(())
            }
            Some((backend, source)) => {
                let rollback_failure = self.rollback_all().await.err().map(Box::new);
                self.state = GroupState::RolledBack;
                Err(TxError::Commit {
                    backend,
                    source,
                    rollback_failure,
                })
            }
        }
    }

    /// Roll back every handle, continuing past individual failures.
    ///
    /// # Errors
    /// The first `TxError::Rollback` encountered.
    pub async fn rollback(&mut self) -> Result<(), TxError> {
        if self.state != GroupState::Open {
            return Ok(());
        }
        let result = self.rollback_all().await;
        self.state = GroupState::RolledBack;
        result
    }

    async fn rollback_all(&mut self) -> Result<(), TxError> {
        rollback_handles(&mut self.handles).await
    }
}

async fn rollback_handles(handles: &mut [Box<dyn Tx>]) -> Result<(), TxError> {
    let mut first = None;
    for handle in handles.iter_mut() {
        if let Err(source) = handle.rollback().await {
            error!(backend = %handle.backend(), "rollback failed: {source:#}");
            first.get_or_insert(TxError::Rollback {
                backend: handle.backend(),
                source,
            });
        }
    }
    first.map_or(Ok(()), Err)
}

impl Drop for Group {
    fn drop(&mut self) {
        if self.state != GroupState::Open || self.handles.is_empty() {
            return;
        }
        let mut handles = std::mem::take(&mut self.handles);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!("transaction group dropped while open, rolling back");
                runtime.spawn(async move {
                    let _ = rollback_handles(&mut handles).await;
                });
            }
            Err(_) => {
                // Backends abort the transactions when their connections close.
                warn!("transaction group dropped outside a runtime, rollback skipped");
            }
        }
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("handles", &self.keys().collect::<Vec<_>>())
            .field("state", &self.state)
            .finish()
    }
}

/// Relational and graph connection pools; each group opens Postgres first, then the graph.
#[derive(Clone)]
pub struct StoreBackends {
    pool: sqlx::PgPool,
    graph: neo4rs::Graph,
}

impl StoreBackends {
    #[must_use]
    pub fn new(pool: sqlx::PgPool, graph: neo4rs::Graph) -> Self {
        Self { pool, graph }
    }
}

#[async_trait]
impl TxSource for StoreBackends {
    async fn begin(&self) -> Result<Group, TxError> {
        let mut group = Group::new();
        group.register(Box::new(PgTx::begin(&self.pool).await?))?;
        match GraphTx::begin(&self.graph).await {
            Ok(graph) => group.register(Box::new(graph))?,
            Err(err) => {
                let _ = group.rollback().await;
                return Err(err);
            }
        }
        Ok(group)
    }
}
