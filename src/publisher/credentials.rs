//! Provider credentials and the shared credential pool

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::Result;

/// Opaque provider secret authorizing one account
///
/// `Display` shows only a short prefix so credentials can be logged.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wrap a provider secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The full secret, for provider calls and storage
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "{prefix}…")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({self})")
    }
}

/// Durable storage for credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Every stored credential, oldest first
    async fn load_all(&self) -> Result<Vec<Credential>>;

    /// Persist a newly created credential
    async fn append(&self, credential: &Credential) -> Result<()>;
}

#[derive(Debug, Default)]
struct PoolState {
    credentials: Vec<Credential>,
    cooldowns: HashMap<Credential, Instant>,
    next: usize,
}

/// Process-wide credential registry
///
/// Membership only grows. Selection, cooldown writes and appends happen under one short
/// lock that is never held across an await.
#[derive(Debug, Default)]
pub struct CredentialPool {
    state: Mutex<PoolState>,
}

impl CredentialPool {
    /// Create a pool from initial credentials, dropping duplicates
    pub fn new(credentials: impl IntoIterator<Item = Credential>) -> Self {
        let pool = Self::default();
        for credential in credentials {
            pool.add(credential);
        }
        pool
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Next usable credential in round-robin order, skipping those cooling down at `now`
    pub fn select(&self, now: Instant) -> Option<Credential> {
        let mut state = self.state();
        let len = state.credentials.len();

        for offset in 0..len {
            let index = (state.next + offset) % len;
            let cooling = state
                .cooldowns
                .get(&state.credentials[index])
                .is_some_and(|until| *until > now);
            if !cooling {
                state.next = (index + 1) % len;
                return Some(state.credentials[index].clone());
            }
        }
        None
    }

    /// Add a credential; returns false if it was already present
    pub fn add(&self, credential: Credential) -> bool {
        let mut state = self.state();
        if state.credentials.contains(&credential) {
            return false;
        }
        state.credentials.push(credential);
        true
    }

    /// Mark a credential unusable until `until`
    ///
    /// An existing later cooldown is kept; cooldowns only move forward.
    pub fn record_cooldown(&self, credential: &Credential, until: Instant) {
        let mut state = self.state();
        state
            .cooldowns
            .entry(credential.clone())
            .and_modify(|existing| *existing = (*existing).max(until))
            .or_insert(until);
    }

    /// When the credential's cooldown ends, if it has one
    pub fn cooldown_until(&self, credential: &Credential) -> Option<Instant> {
        self.state().cooldowns.get(credential).copied()
    }

    /// Time left on the credential's cooldown at `now`
    pub fn cooldown_remaining(&self, credential: &Credential, now: Instant) -> Option<Duration> {
        self.cooldown_until(credential)
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Whether the credential belongs to the pool
    pub fn contains(&self, credential: &Credential) -> bool {
        self.state().credentials.contains(credential)
    }

    /// Number of credentials
    pub fn len(&self) -> usize {
        self.state().credentials.len()
    }

    /// Whether the pool has no credentials
    pub fn is_empty(&self) -> bool {
        self.state().credentials.is_empty()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn pool_of(names: &[&str]) -> CredentialPool {
        CredentialPool::new(names.iter().map(|n| Credential::new(*n)))
    }

    #[test]
    fn display_hides_the_secret() {
        let credential = Credential::new("abcdefghijklmnop");
        assert_eq!(credential.to_string(), "abcdefgh…");
        assert!(!format!("{credential:?}").contains("ijklmnop"));
    }

    #[test]
    fn duplicates_are_ignored() {
        let pool = pool_of(&["a", "b", "a"]);
        assert_eq!(pool.len(), 2);
        assert!(!pool.add(Credential::new("b")));
        assert!(pool.add(Credential::new("c")));
        assert_eq!(pool.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn selection_rotates() {
        let pool = pool_of(&["a", "b", "c"]);
        let now = Instant::now();
        let picks: Vec<_> = (0..4)
            .map(|_| pool.select(now).unwrap().secret().to_string())
            .collect();
        assert_eq!(picks, vec!["a", "b", "c", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cooling_credentials_are_skipped() {
        let pool = pool_of(&["a", "b", "c"]);
        let now = Instant::now();
        pool.record_cooldown(&Credential::new("a"), now + Duration::from_secs(60));
        pool.record_cooldown(&Credential::new("c"), now + Duration::from_secs(60));

        for _ in 0..5 {
            assert_eq!(pool.select(now).unwrap(), Credential::new("b"));
        }

        pool.record_cooldown(&Credential::new("b"), now + Duration::from_secs(60));
        assert!(pool.select(now).is_none());

        // cooldowns expire
        let later = now + Duration::from_secs(61);
        assert!(pool.select(later).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldowns_never_move_backwards() {
        let pool = pool_of(&["a"]);
        let a = Credential::new("a");
        let now = Instant::now();

        pool.record_cooldown(&a, now + Duration::from_secs(100));
        pool.record_cooldown(&a, now + Duration::from_secs(10));
        assert_eq!(pool.cooldown_until(&a), Some(now + Duration::from_secs(100)));
        assert_eq!(
            pool.cooldown_remaining(&a, now + Duration::from_secs(40)),
            Some(Duration::from_secs(60))
        );
        assert_eq!(pool.cooldown_remaining(&a, now + Duration::from_secs(100)), None);
    }

    #[tokio::test]
    async fn empty_pool_selects_nothing() {
        let pool = CredentialPool::default();
        assert!(pool.is_empty());
        assert!(pool.select(Instant::now()).is_none());
    }
}
