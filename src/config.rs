//! Configuration types for epub-publish

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Page size budget
///
/// Sizes are measured in the same units as [`crate::node::Node::estimated_len`]:
/// Unicode scalar values of visible text, with a small floor for text-free blocks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Target page size; a page is closed before it would exceed this (default: 3000)
    #[serde(default = "default_chars_per_page")]
    pub chars_per_page: usize,

    /// A page is never closed while smaller than this (default: 800)
    #[serde(default = "default_min_page_chars")]
    pub min_page_chars: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            chars_per_page: default_chars_per_page(),
            min_page_chars: default_min_page_chars(),
        }
    }
}

/// Chapter extraction settings (footnote detection, note labels)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Label used in inline notes, rendered as "(<label>: <text>)" (default: "note")
    #[serde(default = "default_note_label")]
    pub note_label: String,

    /// Anchor classes that mark a footnote reference
    #[serde(default = "default_footnote_classes")]
    pub footnote_classes: Vec<String>,

    /// Image attribute holding an inline note's text (default: "zy-footnote")
    #[serde(default = "default_footnote_attribute")]
    pub footnote_attribute: String,

    /// A footnote target with less text than this is deleted after inlining (default: 500)
    #[serde(default = "default_max_target_delete_chars")]
    pub max_target_delete_chars: usize,

    /// An image alt longer than this is treated as note text (default: 5)
    #[serde(default = "default_min_alt_note_chars")]
    pub min_alt_note_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            note_label: default_note_label(),
            footnote_classes: default_footnote_classes(),
            footnote_attribute: default_footnote_attribute(),
            max_target_delete_chars: default_max_target_delete_chars(),
            min_alt_note_chars: default_min_alt_note_chars(),
        }
    }
}

/// Publishing provider settings (endpoints, account identity, rate-limit policy)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Base URL of the page API (default: "https://api.telegra.ph")
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Image upload endpoint (default: "https://telegra.ph/upload")
    #[serde(default = "default_upload_url")]
    pub upload_url: String,

    /// Short name used when creating accounts (default: "reader")
    #[serde(default = "default_short_name")]
    pub short_name: String,

    /// Author name shown on created pages
    #[serde(default = "default_author_name")]
    pub author_name: String,

    /// Credential added to the pool on startup, if any
    #[serde(default)]
    pub initial_credential: Option<String>,

    /// Rate-limit waits below this are slept through (default: 30 seconds)
    #[serde(default = "default_short_wait_threshold", with = "duration_serde")]
    pub short_wait_threshold: Duration,

    /// Extra time added to a long wait when recording a cooldown (default: 2 seconds)
    #[serde(default = "default_cooldown_margin", with = "duration_serde")]
    pub cooldown_margin: Duration,

    /// Extra time added to a short wait before retrying (default: 1 second)
    #[serde(default = "default_short_wait_margin", with = "duration_serde")]
    pub short_wait_margin: Duration,

    /// Maximum provider calls for one page (default: 10)
    #[serde(default = "default_publish_max_attempts")]
    pub max_attempts: u32,

    /// Maximum consecutive transient failures for one page (default: 3)
    #[serde(default = "default_transient_retries")]
    pub transient_retries: u32,

    /// Delay between transient retries (default: 1 second)
    #[serde(default = "default_transient_delay", with = "duration_serde")]
    pub transient_delay: Duration,

    /// Longest an edit waits for its owning credential to cool down (default: 60 seconds)
    #[serde(default = "default_edit_max_cooldown_wait", with = "duration_serde")]
    pub edit_max_cooldown_wait: Duration,

    /// HTTP request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Retry policy for account creation and image uploads
    #[serde(default)]
    pub account_retry: RetryConfig,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            upload_url: default_upload_url(),
            short_name: default_short_name(),
            author_name: default_author_name(),
            initial_credential: None,
            short_wait_threshold: default_short_wait_threshold(),
            cooldown_margin: default_cooldown_margin(),
            short_wait_margin: default_short_wait_margin(),
            max_attempts: default_publish_max_attempts(),
            transient_retries: default_transient_retries(),
            transient_delay: default_transient_delay(),
            edit_max_cooldown_wait: default_edit_max_cooldown_wait(),
            request_timeout: default_request_timeout(),
            account_retry: RetryConfig::default(),
        }
    }
}

/// Page footer settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkerConfig {
    /// Prefix of bookmark links; the token is appended
    #[serde(default = "default_bookmark_link_prefix")]
    pub bookmark_link_prefix: String,

    /// Text of the link to the next page
    #[serde(default = "default_next_label")]
    pub next_label: String,

    /// Text of the bookmark link
    #[serde(default = "default_bookmark_label")]
    pub bookmark_label: String,

    /// Text shown instead of a next link on the last page
    #[serde(default = "default_end_label")]
    pub end_label: String,

    /// Separator between footer items
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            bookmark_link_prefix: default_bookmark_link_prefix(),
            next_label: default_next_label(),
            bookmark_label: default_bookmark_label(),
            end_label: default_end_label(),
            separator: default_separator(),
        }
    }
}

/// Data storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "./epub-publish.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Book service settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Books processed at the same time across all users (default: 4)
    #[serde(default = "default_max_concurrent_books")]
    pub max_concurrent_books: usize,

    /// Capacity of the event broadcast channel (default: 256)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_books: default_max_concurrent_books(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for the publishing service
///
/// Fields are organized into sub-configs:
/// - [`pagination`](PaginationConfig): page size budget
/// - [`extraction`](ExtractionConfig): footnote detection
/// - [`publisher`](PublisherConfig): provider endpoints and rate-limit policy
/// - [`linker`](LinkerConfig): footer labels and bookmark links
/// - [`persistence`](PersistenceConfig): database location
/// - [`service`](ServiceConfig): concurrency and events
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Page size budget
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Chapter extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Publishing provider settings
    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Footer settings
    #[serde(default)]
    pub linker: LinkerConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Book service settings
    #[serde(default)]
    pub service: ServiceConfig,
}

impl Config {
    /// Check that settings are internally consistent
    pub fn validate(&self) -> Result<()> {
        let p = &self.pagination;
        if p.chars_per_page == 0 {
            return Err(config_error(
                "chars_per_page must be greater than zero",
                "pagination.chars_per_page",
            ));
        }
        if p.min_page_chars > p.chars_per_page {
            return Err(config_error(
                format!(
                    "min_page_chars ({}) must not exceed chars_per_page ({})",
                    p.min_page_chars, p.chars_per_page
                ),
                "pagination.min_page_chars",
            ));
        }
        if self.publisher.max_attempts == 0 {
            return Err(config_error(
                "max_attempts must be at least 1",
                "publisher.max_attempts",
            ));
        }
        if self.service.max_concurrent_books == 0 {
            return Err(config_error(
                "max_concurrent_books must be at least 1",
                "service.max_concurrent_books",
            ));
        }
        if self.service.event_capacity == 0 {
            return Err(config_error(
                "event_capacity must be at least 1",
                "service.event_capacity",
            ));
        }
        if url::Url::parse(&self.publisher.api_url).is_err() {
            return Err(config_error(
                format!("invalid api_url: {}", self.publisher.api_url),
                "publisher.api_url",
            ));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>, key: &str) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

fn default_chars_per_page() -> usize {
    3000
}

fn default_min_page_chars() -> usize {
    800
}

fn default_note_label() -> String {
    "note".to_string()
}

fn default_footnote_classes() -> Vec<String> {
    vec!["duokan-footnote".to_string(), "epub-footnote".to_string()]
}

fn default_footnote_attribute() -> String {
    "zy-footnote".to_string()
}

fn default_max_target_delete_chars() -> usize {
    500
}

fn default_min_alt_note_chars() -> usize {
    5
}

fn default_api_url() -> String {
    "https://api.telegra.ph".to_string()
}

fn default_upload_url() -> String {
    "https://telegra.ph/upload".to_string()
}

fn default_short_name() -> String {
    "reader".to_string()
}

fn default_author_name() -> String {
    "epub-publish".to_string()
}

fn default_short_wait_threshold() -> Duration {
    Duration::from_secs(30)
}

fn default_cooldown_margin() -> Duration {
    Duration::from_secs(2)
}

fn default_short_wait_margin() -> Duration {
    Duration::from_secs(1)
}

fn default_publish_max_attempts() -> u32 {
    10
}

fn default_transient_retries() -> u32 {
    3
}

fn default_transient_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_edit_max_cooldown_wait() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_bookmark_link_prefix() -> String {
    "https://t.me/epub_publish_bot?start=".to_string()
}

fn default_next_label() -> String {
    "👉 下一页".to_string()
}

fn default_bookmark_label() -> String {
    "🔖 保存书签".to_string()
}

fn default_end_label() -> String {
    "全书完".to_string()
}

fn default_separator() -> String {
    " | ".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./epub-publish.db")
}

fn default_max_concurrent_books() -> usize {
    4
}

fn default_event_capacity() -> usize {
    256
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (as whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
