//! Suppression notifications and the transient log queue.
//!
//! `Notifier` is the fire-and-forget handle every interceptor holds; the
//! `LogQueue` is the bounded, time-evicting consumer that preserves the
//! information flow of the transient notification UI without any rendering.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Default queue capacity
const DEFAULT_MAX_ENTRIES: usize = 8;

/// Default time-to-live for an entry
const DEFAULT_TTL: Duration = Duration::from_secs(6);

/// Fire-and-forget notification handle; cheap to clone
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<String>,
}

impl Notifier {
    /// Send a notification; the return value of the sink is ignored
    pub fn notify(&self, message: impl Into<String>) {
        let _ = self.tx.send(message.into());
    }
}

/// Create a notifier and the receiving end of its channel
pub fn notification_channel() -> (Notifier, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Notifier { tx }, rx)
}

/// A queued notification with its eviction deadline
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub text: String,
    pub expiry: Instant,
}

/// Bounded, time-evicting notification queue.
///
/// Ephemeral and non-authoritative: overflow drops the oldest entry, and
/// expired entries are swept on demand.
pub struct LogQueue {
    entries: VecDeque<LogEntry>,
    max_entries: usize,
    ttl: Duration,
}

impl LogQueue {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
            ttl,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }

    pub fn push(&mut self, text: impl Into<String>) {
        self.push_at(text, Instant::now())
    }

    pub fn push_at(&mut self, text: impl Into<String>, now: Instant) {
        self.entries.push_back(LogEntry {
            text: text.into(),
            expiry: now + self.ttl,
        });
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    /// Drop entries whose expiry has passed
    pub fn evict_expired(&mut self, now: Instant) {
        self.entries.retain(|e| e.expiry > now);
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LogQueue {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifier_delivers() {
        let (notifier, mut rx) = notification_channel();
        notifier.notify("ga: pageview");
        assert_eq!(rx.try_recv().unwrap(), "ga: pageview");
    }

    #[test]
    fn test_notify_ignores_closed_receiver() {
        let (notifier, rx) = notification_channel();
        drop(rx);
        // must not panic or error
        notifier.notify("dropped");
    }

    #[test]
    fn test_queue_overflow_drops_oldest() {
        let mut queue = LogQueue::new(3, Duration::from_secs(6));
        for i in 0..5 {
            queue.push(format!("entry {i}"));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.entries().next().unwrap().text, "entry 2");
    }

    #[test]
    fn test_queue_time_eviction() {
        let mut queue = LogQueue::new(8, Duration::from_secs(6));
        let start = Instant::now();
        queue.push_at("old", start);
        queue.push_at("new", start + Duration::from_secs(5));

        queue.evict_expired(start + Duration::from_secs(7));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.entries().next().unwrap().text, "new");
    }
}
