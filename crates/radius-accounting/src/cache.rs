//! Expiring key/value caches
//!
//! Used for the request deduplication cache (RFC 2866 Section 3 reply
//! replay for retransmitted Accounting-Requests) and for the ledger's
//! recently-closed session markers.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::time;
use tracing::debug;

/// Request fingerprint for deduplication
///
/// A retransmission carries the same source, Identifier and Request
/// Authenticator as the original.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct RequestFingerprint {
    pub source_ip: IpAddr,
    pub identifier: u8,
    pub authenticator: [u8; 16],
}

impl RequestFingerprint {
    pub fn new(source_ip: IpAddr, identifier: u8, authenticator: &[u8; 16]) -> Self {
        RequestFingerprint {
            source_ip,
            identifier,
            authenticator: *authenticator,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Thread-safe cache whose entries expire `ttl` after insertion
///
/// Expired entries are invisible to readers immediately and are physically
/// removed by a background task running every `ttl / 4`. The task is only
/// started when a Tokio runtime is available.
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    entries: Arc<DashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    max_entries: usize,
    cleanup_running: Arc<AtomicBool>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache holding at most `max_entries` live entries
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        let entries: Arc<DashMap<K, CacheEntry<V>>> = Arc::new(DashMap::new());
        let background = tokio::runtime::Handle::try_current().is_ok();
        let cleanup_running = Arc::new(AtomicBool::new(background));

        if background {
            let entries = Arc::clone(&entries);
            let cleanup_flag = Arc::clone(&cleanup_running);
            let cleanup_interval = (ttl / 4).max(Duration::from_millis(10));

            tokio::spawn(async move {
                let mut interval = time::interval(cleanup_interval);
                interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

                while cleanup_flag.load(Ordering::Relaxed) {
                    interval.tick().await;
                    let removed = purge(&entries, ttl);
                    if removed > 0 {
                        debug!(removed, remaining = entries.len(), "Cache cleanup completed");
                    }
                }
            });
        }

        TtlCache {
            entries,
            ttl,
            max_entries: max_entries.max(1),
            cleanup_running,
        }
    }

    /// Insert or overwrite an entry, restarting its TTL
    pub fn insert(&self, key: K, value: V) {
        self.make_room(&key);
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Insert only if no live entry exists. Returns `true` if inserted.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        self.make_room(&key);
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().inserted_at.elapsed() > self.ttl {
                    occupied.insert(CacheEntry {
                        value,
                        inserted_at: Instant::now(),
                    });
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry {
                    value,
                    inserted_at: Instant::now(),
                });
                true
            }
        }
    }

    /// Live value for `key`, if any
    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Drop every expired entry now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        purge(&self.entries, self.ttl)
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn make_room(&self, incoming: &K) {
        if self.entries.len() < self.max_entries || self.entries.contains_key(incoming) {
            return;
        }
        if purge(&self.entries, self.ttl) > 0 {
            return;
        }
        // Still full: evict the oldest entry
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().inserted_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

fn purge<K, V>(entries: &DashMap<K, CacheEntry<V>>, ttl: Duration) -> usize
where
    K: Eq + Hash,
{
    let before = entries.len();
    entries.retain(|_, entry| entry.inserted_at.elapsed() <= ttl);
    before.saturating_sub(entries.len())
}

impl<K, V> Drop for TtlCache<K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.cleanup_running.store(false, Ordering::Relaxed);
    }
}
