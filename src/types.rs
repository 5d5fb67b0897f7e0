//! Core types for epub-publish

use serde::{Deserialize, Serialize};

/// Identifier of the user who submitted a book
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Create a new UserId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<UserId> for i64 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event emitted during a book's lifecycle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookEvent {
    /// Book accepted for processing
    Accepted {
        /// Submitting user
        user: UserId,
        /// Title hint supplied with the upload (usually the file name)
        title_hint: String,
    },

    /// One page went live
    PagePublished {
        /// Submitting user
        user: UserId,
        /// 1-based page sequence within the book
        sequence: usize,
        /// Public URL of the page
        url: String,
    },

    /// Book finished; some pages may have been dropped
    Completed {
        /// Submitting user
        user: UserId,
        /// Resolved book title
        title: String,
        /// URLs of published pages in reading order
        page_urls: Vec<String>,
        /// Number of pages that could not be published
        dropped_pages: usize,
    },

    /// Book failed before any page could be produced
    Failed {
        /// Submitting user
        user: UserId,
        /// Machine-readable error code
        code: String,
        /// Error message
        error: String,
    },

    /// Book processing was cancelled
    Cancelled {
        /// Submitting user
        user: UserId,
    },
}

impl BookEvent {
    /// The user this event concerns
    pub fn user(&self) -> UserId {
        match self {
            BookEvent::Accepted { user, .. }
            | BookEvent::PagePublished { user, .. }
            | BookEvent::Completed { user, .. }
            | BookEvent::Failed { user, .. }
            | BookEvent::Cancelled { user } => *user,
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let event = BookEvent::PagePublished {
            user: UserId(7),
            sequence: 3,
            url: "https://telegra.ph/Book-3".into(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "page_published");
        assert_eq!(json["user"], 7);
        assert_eq!(json["sequence"], 3);
        assert_eq!(event.user(), UserId(7));
    }

    #[test]
    fn user_id_is_transparent() {
        let id: UserId = serde_json::from_str("42").unwrap();
        assert_eq!(id, UserId::new(42));
        assert_eq!(id.to_string(), "42");
        assert_eq!(i64::from(id), 42);
    }
}
