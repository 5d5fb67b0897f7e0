//! Database layer for epub-publish
//!
//! SQLite persistence for provider credentials and bookmark tokens.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - `migrations`: Database lifecycle, schema migrations
//! - `credentials`: Credential storage ([`crate::publisher::CredentialStore`])
//! - `bookmarks`: Bookmark tokens ([`crate::bookmarks::BookmarkRegistrar`])

use sqlx::{FromRow, sqlite::SqlitePool};

mod bookmarks;
mod credentials;
mod migrations;

/// Bookmark token record from database
#[derive(Debug, Clone, FromRow)]
pub struct BookmarkRecord {
    /// The token, `bm_` plus 8 hex digits
    pub token: String,
    /// Title of the book
    pub book_name: String,
    /// Title of the page
    pub page_title: String,
    /// Public URL of the page
    pub url: String,
    /// Unix timestamp when the token was issued
    pub created_at: i64,
}

/// Database handle for epub-publish
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
