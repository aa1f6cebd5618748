//! Expiration bookkeeping: clocks, stored entries and expiry policies.
//!
//! Timestamps are milliseconds since the Unix epoch. An entry's expiry is
//! computed once, when it is written, and never re-evaluated on read.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// Wall clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for tests and simulations.
///
/// Clones share the same time, so a clone handed to a database can be
/// advanced from the outside.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock frozen at `now_ms`.
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now_ms)),
        }
    }

    /// Create a clock frozen at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(SystemClock.now_ms())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(duration_ms(by), Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A stored value together with its computed expiration.
///
/// Serialized as `{ "value": ..., "expiresAt": <ms> | null }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<V> {
    pub value: V,
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<i64>,
}

impl<V> Entry<V> {
    pub fn new(value: V, expires_at: Option<i64>) -> Self {
        Self { value, expires_at }
    }

    /// An entry is expired once `now` reaches its expiry. Entries without an
    /// expiry never expire.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now_ms)
    }
}

/// Computes the expiry of a value at write time: `(value, now) -> expiresAt`.
pub type ExpiryPolicy<V> = Arc<dyn Fn(&V, i64) -> Option<i64> + Send + Sync>;

/// Policy that expires every value a fixed duration after it was written.
pub fn fixed_ttl<V>(ttl: Duration) -> ExpiryPolicy<V> {
    let ttl_ms = duration_ms(ttl);
    Arc::new(move |_: &V, now: i64| Some(now.saturating_add(ttl_ms)))
}

/// Policy for values that only leave the store when deleted.
pub fn never_expires<V>() -> ExpiryPolicy<V> {
    Arc::new(|_: &V, _: i64| None)
}

/// Policy that asks the value itself.
pub fn from_value<V, F>(f: F) -> ExpiryPolicy<V>
where
    F: Fn(&V) -> Option<i64> + Send + Sync + 'static,
{
    Arc::new(move |value: &V, _: i64| f(value))
}

fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_expiry_never_expires() {
        let entry = Entry::new("v", None);
        assert!(!entry.is_expired(i64::MAX));
    }

    #[test]
    fn test_expired_at_boundary() {
        let entry = Entry::new("v", Some(1_000));
        assert!(!entry.is_expired(999));
        assert!(entry.is_expired(1_000));
        assert!(entry.is_expired(1_001));
    }

    #[test]
    fn test_fixed_ttl_counts_from_write_time() {
        let policy = fixed_ttl::<String>(Duration::from_secs(600));
        assert_eq!(policy(&"nonce".to_string(), 5_000), Some(605_000));
    }

    #[test]
    fn test_fixed_ttl_saturates() {
        let policy = fixed_ttl::<u8>(Duration::from_secs(1));
        assert_eq!(policy(&0, i64::MAX - 10), Some(i64::MAX));
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(0);
        let other = clock.clone();
        clock.advance(Duration::from_millis(1_500));
        assert_eq!(other.now_ms(), 1_500);
        other.set(42);
        assert_eq!(clock.now_ms(), 42);
    }

    #[test]
    fn test_entry_wire_shape() {
        let json = serde_json::to_value(Entry::new("x", None)).unwrap();
        assert_eq!(json, serde_json::json!({ "value": "x", "expiresAt": null }));

        let entry: Entry<String> =
            serde_json::from_str(r#"{"value":"y","expiresAt":123}"#).unwrap();
        assert_eq!(entry.expires_at, Some(123));
    }
}
