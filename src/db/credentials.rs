//! Provider credential storage.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::publisher::{Credential, CredentialStore};
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Store a credential; storing the same secret twice is a no-op
    pub async fn insert_credential(&self, credential: &Credential) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO credentials (secret, created_at)
            VALUES (?, ?)
            ON CONFLICT(secret) DO NOTHING
            "#,
        )
        .bind(credential.secret())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert credential: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// All stored credentials, oldest first
    pub async fn list_credentials(&self) -> Result<Vec<Credential>> {
        let secrets: Vec<String> =
            sqlx::query_scalar("SELECT secret FROM credentials ORDER BY created_at ASC, rowid ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to list credentials: {}",
                        e
                    )))
                })?;

        Ok(secrets.into_iter().map(Credential::new).collect())
    }

    /// Number of stored credentials
    pub async fn count_credentials(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM credentials")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count credentials: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}

#[async_trait]
impl CredentialStore for Database {
    async fn load_all(&self) -> Result<Vec<Credential>> {
        self.list_credentials().await
    }

    async fn append(&self, credential: &Credential) -> Result<()> {
        self.insert_credential(credential).await
    }
}
