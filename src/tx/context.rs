//! Request-scoped access to the current transaction group.
//!
//! The unit-of-work middleware installs a [`TxContext`] for the request task
//! with [`scope`]; code several calls deep reaches the group with [`current`]
//! instead of threading it through every signature.

use std::{future::Future, sync::Arc};
use tokio::sync::{Mutex, MutexGuard};

use super::{Group, GroupState};
use crate::error::TxError;

tokio::task_local! {
    static CURRENT: TxContext;
}

/// Shared handle to one request's group.
#[derive(Clone, Debug)]
pub struct TxContext(Arc<Mutex<Group>>);

impl TxContext {
    #[must_use]
    pub fn new(group: Group) -> Self {
        Self(Arc::new(Mutex::new(group)))
    }

    /// Exclusive access to the group, e.g. to borrow a handle with
    /// [`Group::handle_mut`].
    pub async fn lock(&self) -> MutexGuard<'_, Group> {
        self.0.lock().await
    }

    pub async fn state(&self) -> GroupState {
        self.0.lock().await.state()
    }

    /// # Errors
    /// See [`Group::commit`].
    pub async fn commit(&self) -> Result<(), TxError> {
        self.0.lock().await.commit().await
    }

    /// # Errors
    /// See [`Group::rollback`].
    pub async fn rollback(&self) -> Result<(), TxError> {
        self.0.lock().await.rollback().await
    }
}

/// Run `future` with `context` as the task's current group.
pub async fn scope<F: Future>(context: TxContext, future: F) -> F::Output {
    CURRENT.scope(context, future).await
}

/// The group installed by the enclosing [`scope`].
///
/// # Errors
/// `TxError::NoActiveGroup` outside a scope.
pub fn current() -> Result<TxContext, TxError> {
    CURRENT
        .try_with(Clone::clone)
        .map_err(|_| TxError::NoActiveGroup)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn current_outside_scope_is_an_error() {
        assert!(matches!(current(), Err(TxError::NoActiveGroup)));
    }

    #[tokio::test]
    async fn current_inside_scope_shares_the_group() {
        let context = TxContext::new(Group::new());
        scope(context.clone(), async {
            current().unwrap().rollback().await.unwrap();
        })
        .await;
        assert_eq!(context.state().await, GroupState::RolledBack);
    }

    #[tokio::test]
    async fn spawned_tasks_do_not_inherit_the_scope() {
        let context = TxContext::new(Group::new());
        let inherited = scope(context, async {
            tokio::spawn(async { current().is_ok() }).await.unwrap()
        })
        .await;
        assert!(!inherited);
    }
}
