//! Error taxonomy for sessions and transaction groups.
//!
//! Credential and session errors carry no sensitive detail and are safe to hand
//! back to callers as-is. Store failures keep their cause for logs but are only
//! ever surfaced as an opaque internal error.

use std::{fmt, time::Duration};

/// Backend a store operation was talking to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    KeyValue,
    Relational,
    Graph,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::KeyValue => "key/value store",
            Self::Relational => "relational store",
            Self::Graph => "graph store",
        };
        f.write_str(name)
    }
}

/// A round trip to a backing store failed.
#[derive(Debug, thiserror::Error)]
#[error("{backend} {operation} failed")]
pub struct StoreError {
    pub backend: Backend,
    pub operation: &'static str,
    #[source]
    pub source: anyhow::Error,
}

impl StoreError {
    pub fn new(backend: Backend, operation: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self {
            backend,
            operation,
            source: source.into(),
        }
    }
}

/// Sealed cookie failed authentication or was malformed.
///
/// Deliberately carries no detail about which part was at fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unable to decrypt session cookie")]
pub struct DecryptError;

/// Decrypted payload does not describe a valid session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("corrupted session")]
pub struct CorruptedSessionError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Decrypt(#[from] DecryptError),
    #[error(transparent)]
    CorruptedSession(#[from] CorruptedSessionError),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email address not verified")]
    EmailNotVerified,
    #[error("too many login attempts, retry in {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    #[error("authentication required")]
    Unauthenticated,
    #[error("session field {0} cannot be encoded")]
    Unencodable(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl AuthError {
    /// Whether the error describes a server-side failure rather than a caller mistake.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::Internal(_) | Self::Unencodable(_)
        )
    }
}

/// Transaction group failures.
///
/// A commit failure always reports the backend whose commit failed; a rollback
/// failure triggered by it is attached as `rollback_failure` and never replaces it.
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    #[error("{backend} failed to begin a transaction")]
    Begin {
        backend: Backend,
        #[source]
        source: anyhow::Error,
    },
    #[error("{backend} commit failed")]
    Commit {
        backend: Backend,
        #[source]
        source: anyhow::Error,
        rollback_failure: Option<Box<TxError>>,
    },
    #[error("{backend} rollback failed")]
    Rollback {
        backend: Backend,
        #[source]
        source: anyhow::Error,
    },
    #[error("no transaction handle registered under {0:?}")]
    MissingHandle(&'static str),
    #[error("transaction handle {0:?} has a different type than requested")]
    WrongHandleType(&'static str),
    #[error("transaction handle {0:?} is already registered")]
    DuplicateHandle(&'static str),
    #[error("transaction group is already {0}")]
    Finished(&'static str),
    #[error("no transaction group is active for this task")]
    NoActiveGroup,
}

impl TxError {
    /// Backend the failure is attributed to, if any.
    #[must_use]
    pub fn backend(&self) -> Option<Backend> {
        match self {
            Self::Begin { backend, .. }
            | Self::Commit { backend, .. }
            | Self::Rollback { backend, .. } => Some(*backend),
            _ => None,
        }
    }
}
