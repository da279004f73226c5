//! Key-value write guard and cookie sweeping.
//!
//! Certain persisted keys let the host replay actions we suppressed live, so
//! writes to them are dropped. Cookies whose names match the configured
//! pattern are purged on every sweep.

use crate::config::StorageConfig;
use crate::notify::Notifier;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

/// Errors raised while building the guard from configuration
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid cookie pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Key-value store with a write blocklist
pub struct StorageGuard {
    blocked_keys: Vec<String>,
    store: HashMap<String, String>,
    notifier: Notifier,
}

impl StorageGuard {
    pub fn new(config: &StorageConfig, notifier: Notifier) -> Self {
        Self {
            blocked_keys: config.blocked_keys.clone(),
            store: HashMap::new(),
            notifier,
        }
    }

    /// Write a key; returns false when the write was dropped
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> bool {
        if self.blocked_keys.iter().any(|k| k == key) {
            debug!(key, "storage write dropped");
            self.notifier.notify(format!("blocked storage write: {key}"));
            return false;
        }
        self.store.insert(key.to_string(), value.into());
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.store.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.store.remove(key)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

/// Purges cookies whose names match the configured pattern
pub struct CookieSentry {
    pattern: Regex,
    notifier: Notifier,
}

impl CookieSentry {
    pub fn new(config: &StorageConfig, notifier: Notifier) -> Result<Self, StorageError> {
        Ok(Self {
            pattern: Regex::new(&config.blocked_cookie_pattern)?,
            notifier,
        })
    }

    /// Apply the purge policy to a single change event; returns true when
    /// the cookie was removed
    pub fn observe_change(&self, name: &str, jar: &mut HashMap<String, String>) -> bool {
        if !self.pattern.is_match(name) {
            return false;
        }
        jar.remove(name);
        debug!(cookie = %name, "cookie purged on change");
        self.notifier.notify(format!("purged cookie: {name}"));
        true
    }

    /// Remove matching cookies from the jar; returns how many were purged
    pub fn sweep(&self, jar: &mut HashMap<String, String>) -> usize {
        let doomed: Vec<String> = jar
            .keys()
            .filter(|name| self.pattern.is_match(name))
            .cloned()
            .collect();
        for name in &doomed {
            jar.remove(name);
            debug!(cookie = %name, "cookie purged");
        }
        if !doomed.is_empty() {
            self.notifier
                .notify(format!("purged {} cookie(s)", doomed.len()));
        }
        doomed.len()
    }
}
