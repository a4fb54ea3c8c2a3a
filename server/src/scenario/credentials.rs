//! Fixed pool of test identities used by virtual users

use std::sync::Arc;

/// Username/PIN pair accepted by the target's login endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub pin: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            pin: pin.into(),
        }
    }

    /// Parse `username:pin`
    pub fn parse(raw: &str) -> Option<Self> {
        let (username, pin) = raw.trim().split_once(':')?;
        if username.is_empty() || pin.is_empty() {
            return None;
        }
        Some(Self::new(username, pin))
    }
}

/// Round-robin identity pool.
///
/// Virtual user `i` logs in as `pool[i % len]`. When `vus` exceeds the pool
/// size, several users share one account and may hold concurrent sessions.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    credentials: Arc<[Credential]>,
}

const DEFAULT_POOL_SIZE: usize = 10;

impl CredentialPool {
    /// Build a pool; an empty list falls back to the default identities
    pub fn new(credentials: Vec<Credential>) -> Self {
        if credentials.is_empty() {
            return Self::default();
        }
        Self {
            credentials: credentials.into(),
        }
    }

    /// Parse a comma separated `username:pin` list, skipping malformed entries
    pub fn parse(raw: &str) -> Self {
        Self::new(raw.split(',').filter_map(Credential::parse).collect())
    }

    pub fn for_vu(&self, vu_index: u64) -> &Credential {
        let idx = (vu_index % self.credentials.len() as u64) as usize;
        &self.credentials[idx]
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

impl Default for CredentialPool {
    fn default() -> Self {
        let credentials: Vec<Credential> = (1..=DEFAULT_POOL_SIZE)
            .map(|i| Credential::new(format!("loadtest_user_{:02}", i), "1234"))
            .collect();
        Self {
            credentials: credentials.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_wraps() {
        let pool = CredentialPool::new(vec![
            Credential::new("a", "1"),
            Credential::new("b", "2"),
            Credential::new("c", "3"),
        ]);
        assert_eq!(pool.for_vu(0).username, "a");
        assert_eq!(pool.for_vu(2).username, "c");
        assert_eq!(pool.for_vu(3).username, "a");
        assert_eq!(pool.for_vu(301).username, "b");
        assert_eq!(pool.for_vu(302).username, "c");
    }

    #[test]
    fn test_parse_skips_malformed_entries() {
        let pool = CredentialPool::parse("alice:1111, bob:2222,broken,:3333,carol:");
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.for_vu(1), &Credential::new("bob", "2222"));
    }

    #[test]
    fn test_empty_falls_back_to_default_pool() {
        let pool = CredentialPool::parse("");
        assert_eq!(pool.len(), DEFAULT_POOL_SIZE);
        assert_eq!(pool.for_vu(0).username, "loadtest_user_01");
    }
}
