//! Bookmark tokens
//!
//! Every published page gets a short token that a reader can save and later resolve back
//! to the page. Tokens are issued by a [`BookmarkRegistrar`]; [`crate::db::Database`] is
//! the persistent implementation.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Prefix of every bookmark token
pub const TOKEN_PREFIX: &str = "bm_";

/// What a bookmark token points at
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkInfo {
    /// Title of the book
    pub book_name: String,
    /// Title of the page
    pub page_title: String,
    /// Public URL of the page
    pub url: String,
}

/// Issues and resolves bookmark tokens
#[async_trait]
pub trait BookmarkRegistrar: Send + Sync {
    /// Issue a token for a published page
    async fn issue_token(&self, book_name: &str, page_title: &str, url: &str) -> Result<String>;

    /// Look a token up; `None` when it is unknown
    async fn resolve(&self, token: &str) -> Result<Option<BookmarkInfo>>;
}

/// A fresh random token: `bm_` followed by 8 lowercase hex digits
pub fn generate_token() -> String {
    format!("{TOKEN_PREFIX}{:08x}", rand::thread_rng().r#gen::<u32>())
}

/// Whether `token` has the shape of a bookmark token
pub fn is_token(token: &str) -> bool {
    token.strip_prefix(TOKEN_PREFIX).is_some_and(|hex| {
        hex.len() == 8 && hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    })
}
