//! # Tandem (session credentials and cross-store units of work)
//!
//! `tandem` authenticates callers with encrypted, server-revocable session
//! cookies and scopes mutating requests in a transaction group that spans a
//! relational store and a graph store.
//!
//! ## Sessions
//!
//! The `SID` cookie seals a length-prefixed session token with
//! ChaCha20-Poly1305. A decryptable cookie is not enough: the device token it
//! carries must still be registered for the user in the key/value store, so
//! logout and forced sign-out take effect immediately. Failed logins are
//! rate limited per client IP.
//!
//! ## Transaction groups
//!
//! A [`tx::Group`] holds one transaction per backend, commits them in order and
//! rolls all of them back on the first failure. There is no two-phase commit:
//! a backend that already committed stays committed. See [`tx`] for details.

pub mod api;
pub mod cli;
pub mod error;
pub mod session;
pub mod store;
pub mod tx;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
