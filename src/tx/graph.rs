//! Graph store (Bolt) transaction handle.

use anyhow::Context;
use async_trait::async_trait;
use neo4rs::{Graph, Txn};
use std::any::Any;
use tracing::Instrument;

use super::Tx;
use crate::error::{Backend, TxError};

pub struct GraphTx {
    inner: Option<Txn>,
}

impl GraphTx {
    pub const KEY: &'static str = "graph";

    /// # Errors
    /// `TxError::Begin` if the graph store refuses a new transaction.
    pub async fn begin(graph: &Graph) -> Result<Self, TxError> {
        let inner = graph
            .start_txn()
            .instrument(statement_span("BEGIN"))
            .await
            .context("failed to begin graph transaction")
            .map_err(|source| TxError::Begin {
                backend: Backend::Graph,
                source,
            })?;
        Ok(Self { inner: Some(inner) })
    }

    /// The open transaction, for running queries.
    ///
    /// # Errors
    /// `TxError::Finished` after the transaction was committed or rolled back.
    pub fn txn(&mut self) -> Result<&mut Txn, TxError> {
        self.inner.as_mut().ok_or(TxError::Finished("closed"))
    }
}

fn statement_span(operation: &'static str) -> tracing::Span {
    tracing::info_span!("db.query", db.system = "neo4j", db.operation = operation)
}

#[async_trait]
impl Tx for GraphTx {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn backend(&self) -> Backend {
        Backend::Graph
    }

    async fn commit(&mut self) -> anyhow::Result<()> {
        if let Some(txn) = self.inner.take() {
            txn.commit()
                .instrument(statement_span("COMMIT"))
                .await
                .context("failed to commit graph transaction")?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> anyhow::Result<()> {
        if let Some(txn) = self.inner.take() {
            txn.rollback()
                .instrument(statement_span("ROLLBACK"))
                .await
                .context("failed to rollback graph transaction")?;
        }
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
