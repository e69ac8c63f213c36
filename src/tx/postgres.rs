//! Relational transaction handle.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::any::Any;
use tracing::Instrument;

use super::Tx;
use crate::error::{Backend, TxError};

pub struct PgTx {
    inner: Option<Transaction<'static, Postgres>>,
}

impl PgTx {
    pub const KEY: &'static str = "postgres";

    /// Start a transaction on a pooled connection.
    ///
    /// # Errors
    /// `TxError::Begin` if no connection can be acquired or `BEGIN` fails.
    pub async fn begin(pool: &PgPool) -> Result<Self, TxError> {
        let span = statement_span("BEGIN");
        let inner = pool
            .begin()
            .instrument(span)
            .await
            .context("failed to begin postgres transaction")
            .map_err(|source| TxError::Begin {
                backend: Backend::Relational,
                source,
            })?;
        Ok(Self { inner: Some(inner) })
    }

    /// Connection to run queries on inside the transaction.
    ///
    /// # Errors
    /// `TxError::Finished` after the transaction was committed or rolled back.
    pub fn conn(&mut self) -> Result<&mut PgConnection, TxError> {
        self.inner.as_deref_mut().ok_or(TxError::Finished("closed"))
    }
}

fn statement_span(statement: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = statement,
        db.statement = statement
    )
}

#[async_trait]
impl Tx for PgTx {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn backend(&self) -> Backend {
        Backend::Relational
    }

    async fn commit(&mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.inner.take() {
            tx.commit()
                .instrument(statement_span("COMMIT"))
                .await
                .context("failed to commit postgres transaction")?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.inner.take() {
            tx.rollback()
                .instrument(statement_span("ROLLBACK"))
                .await
                .context("failed to rollback postgres transaction")?;
        }
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
