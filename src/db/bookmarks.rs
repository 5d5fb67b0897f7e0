//! Bookmark token operations.

use async_trait::async_trait;

use crate::bookmarks::{BookmarkInfo, BookmarkRegistrar, generate_token};
use crate::error::DatabaseError;
use crate::{Error, Result};

use super::{BookmarkRecord, Database};

/// Attempts at finding an unused token before giving up
const TOKEN_ATTEMPTS: usize = 5;

impl Database {
    /// Insert a bookmark under `token`
    ///
    /// Returns false when the token is already taken.
    pub async fn insert_bookmark(
        &self,
        token: &str,
        book_name: &str,
        page_title: &str,
        url: &str,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO bookmark_tokens (token, book_name, page_title, url, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(token) DO NOTHING
            "#,
        )
        .bind(token)
        .bind(book_name)
        .bind(page_title)
        .bind(url)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert bookmark: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() == 1)
    }

    /// Get a bookmark by token
    pub async fn get_bookmark(&self, token: &str) -> Result<Option<BookmarkRecord>> {
        let record = sqlx::query_as::<_, BookmarkRecord>(
            r#"
            SELECT token, book_name, page_title, url, created_at
            FROM bookmark_tokens
            WHERE token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get bookmark: {}",
                e
            )))
        })?;

        Ok(record)
    }

    /// All bookmarks of a book, in issue order
    pub async fn list_bookmarks_for_book(&self, book_name: &str) -> Result<Vec<BookmarkRecord>> {
        let records = sqlx::query_as::<_, BookmarkRecord>(
            r#"
            SELECT token, book_name, page_title, url, created_at
            FROM bookmark_tokens
            WHERE book_name = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(book_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list bookmarks: {}",
                e
            )))
        })?;

        Ok(records)
    }
}

#[async_trait]
impl BookmarkRegistrar for Database {
    async fn issue_token(&self, book_name: &str, page_title: &str, url: &str) -> Result<String> {
        for _ in 0..TOKEN_ATTEMPTS {
            let token = generate_token();
            if self.insert_bookmark(&token, book_name, page_title, url).await? {
                return Ok(token);
            }
            tracing::debug!(token = %token, "bookmark token collision, regenerating");
        }

        Err(Error::Database(DatabaseError::QueryFailed(format!(
            "No free bookmark token after {} attempts",
            TOKEN_ATTEMPTS
        ))))
    }

    async fn resolve(&self, token: &str) -> Result<Option<BookmarkInfo>> {
        Ok(self.get_bookmark(token).await?.map(|record| BookmarkInfo {
            book_name: record.book_name,
            page_title: record.page_title,
            url: record.url,
        }))
    }
}
