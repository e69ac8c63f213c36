//! Postgres-backed user lookup.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use secrecy::SecretString;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use ulid::Ulid;

use super::{UserRecord, UserStore};
use crate::{
    error::{Backend, StoreError},
    session::UserType,
};

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>, StoreError> {
        let query = r"
            SELECT id, username, email, password_hash, email_verified, user_type
            FROM users
            WHERE username = $1 OR email = $1
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by identifier")
            .map_err(|err| StoreError::new(Backend::Relational, "SELECT", err))?;

        row.map(|row| user_from_row(&row))
            .transpose()
            .map_err(|err| StoreError::new(Backend::Relational, "SELECT", err))
    }
}

fn user_from_row(row: &PgRow) -> anyhow::Result<UserRecord> {
    let id: String = row.try_get("id")?;
    let id = Ulid::from_string(&id).map_err(|err| anyhow!("invalid user id {id}: {err}"))?;
    let user_type: i16 = row.try_get("user_type")?;
    let user_type =
        UserType::try_from(user_type).map_err(|value| anyhow!("unknown user_type {value}"))?;
    let password_hash: String = row.try_get("password_hash")?;

    Ok(UserRecord {
        id,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: SecretString::from(password_hash),
        email_verified: row.try_get("email_verified")?,
        user_type,
    })
}
