//! Handle access token persistence.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::{Result, ServerError};
use crate::token::AccessToken;

/// Port for access token persistence.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Find an access token by its opaque identifier.
    ///
    /// Returns [`ServerError::NotFound`] if no row matches.
    async fn get_by_id(&self, id: &str) -> Result<AccessToken>;

    /// Insert a new access token.
    async fn create(&self, token: &AccessToken) -> Result<()>;

    /// Persist `token.expires` on the row keyed by `token.access_token`.
    async fn update_expiration_time(&self, token: &AccessToken) -> Result<()>;
}

/// PostgreSQL access token repository.
#[derive(Clone)]
pub struct PgTokenRepository {
    pool: PgPool,
}

impl PgTokenRepository {
    /// Create a new [`PgTokenRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    async fn get_by_id(&self, id: &str) -> Result<AccessToken> {
        sqlx::query_as::<_, AccessToken>(
            r#"
            SELECT access_token, user_id, client_id, expires
            FROM access_tokens
            WHERE access_token = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            ServerError::NotFound("no access token found with given id".into())
        })
    }

    async fn create(&self, token: &AccessToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO access_tokens (access_token, user_id, client_id, expires)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&token.access_token)
        .bind(token.user_id)
        .bind(token.client_id)
        .bind(token.expires)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_expiration_time(&self, token: &AccessToken) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE access_tokens
            SET expires = $1
            WHERE access_token = $2
            "#,
        )
        .bind(token.expires)
        .bind(&token.access_token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
