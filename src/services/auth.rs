//! Connection-time authentication.
//!
//! ARCHITECTURE
//! ============
//! The WebSocket upgrade carries a credential in `?token=`. An
//! [`Authenticator`] resolves it to an [`Identity`] once, before the socket
//! accepts any frame; the identity then travels with the connection handle.
//!
//! `SessionAuthenticator` resolves session tokens against the `sessions`
//! table. Issuing those tokens belongs to the HTTP account surface.

use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Who a connection acts as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: Uuid,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("auth backend error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve a credential. `Ok(None)` means the credential is not valid.
    async fn authenticate(&self, token: &str) -> Result<Option<Identity>, AuthError>;
}

pub struct SessionAuthenticator {
    pool: PgPool,
}

impl SessionAuthenticator {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Authenticator for SessionAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Option<Identity>, AuthError> {
        let row = sqlx::query(
            r"SELECT u.id, u.name
              FROM sessions s
              JOIN users u ON u.id = s.user_id
              WHERE s.token = $1 AND s.expires_at > now()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Identity { user_id: r.get("id"), name: r.get("name") }))
    }
}
