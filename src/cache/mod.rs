//! Read-through cache with TTL expiry and single-flight population.
//!
//! Each key maps to a slot (`Arc<OnceCell<Entry>>`) in a sharded [`DashMap`].
//! Callers that miss on the same key all await the same slot, so exactly one of
//! them runs the computation; callers on other keys touch other slots and
//! never wait on it. The map's shard lock is only held while a slot is looked
//! up or swapped, never across an `.await`.
//!
//! Expired entries are dropped lazily when a caller finds them; a periodic
//! [`CacheLayer::purge_expired`] sweep is optional.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::OnceCell;
use tokio::time::Instant;

/// Default lifetime of a cached read.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// A canonical cache key: a namespace plus named fields.
///
/// Fields are kept sorted by name, so the rendered key does not depend on the
/// order they were added in.
///
/// # Examples
///
/// ```
/// use boardshelf::cache::CacheKey;
///
/// let a = CacheKey::new("list").field("pageSize", 2).field("sortColumn", "Name");
/// let b = CacheKey::new("list").field("sortColumn", "Name").field("pageSize", 2);
/// assert_eq!(a.render(), b.render());
/// assert_eq!(CacheKey::point("entity", 5).render(), "entity:5");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    namespace: &'static str,
    fields: BTreeMap<&'static str, Value>,
    id: Option<i64>,
}

impl CacheKey {
    pub fn new(namespace: &'static str) -> Self {
        Self {
            namespace,
            fields: BTreeMap::new(),
            id: None,
        }
    }

    /// Key for a single entity: `"<namespace>:<id>"`.
    pub fn point(namespace: &'static str, id: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::new(namespace)
        }
    }

    #[must_use]
    pub fn field(mut self, name: &'static str, value: impl Into<Value>) -> Self {
        self.fields.insert(name, value.into());
        self
    }

    pub fn render(&self) -> String {
        match self.id {
            Some(id) => format!("{}:{id}", self.namespace),
            None => format!(
                "{}:{}",
                self.namespace,
                Value::Object(
                    self.fields
                        .iter()
                        .map(|(k, v)| ((*k).to_owned(), v.clone()))
                        .collect()
                )
            ),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

type Slot<V> = Arc<OnceCell<Entry<V>>>;

/// Point-in-time counters for one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub computations: u64,
    pub invalidations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    invalidations: AtomicU64,
}

/// A read-through cache of `V` values with a fixed TTL.
pub struct CacheLayer<V> {
    name: &'static str,
    ttl: Duration,
    slots: DashMap<String, Slot<V>>,
    counters: Counters,
}

impl<V> CacheLayer<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            slots: DashMap::new(),
            counters: Counters::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the live value for `key`, or runs `compute` to populate it.
    ///
    /// Concurrent callers missing on the same key share one `compute` call and
    /// all receive its value. A failed computation stores nothing and its error
    /// goes to the caller that ran it; a waiting caller then runs its own.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &CacheKey, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let key = key.render();

        let slot = loop {
            let slot = self.slot(&key);
            match slot.get() {
                Some(entry) if entry.is_live(Instant::now()) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(cache = self.name, %key, "cache hit");
                    return Ok(entry.value.clone());
                }
                Some(_) => {
                    tracing::debug!(cache = self.name, %key, "cache entry expired");
                    self.slots.remove_if(&key, |_, current| Arc::ptr_eq(current, &slot));
                }
                None => break slot,
            }
        };

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(cache = self.name, %key, "cache miss");

        let ttl = self.ttl;
        let counters = &self.counters;
        let populated = slot
            .get_or_try_init(|| async move {
                counters.computations.fetch_add(1, Ordering::Relaxed);
                let value = compute().await?;
                Ok(Entry {
                    value,
                    expires_at: Instant::now() + ttl,
                })
            })
            .await;

        match populated {
            Ok(entry) => Ok(entry.value.clone()),
            Err(e) => {
                self.slots
                    .remove_if(&key, |_, current| {
                        Arc::ptr_eq(current, &slot) && !current.initialized()
                    });
                Err(e)
            }
        }
    }

    /// Drops the entry for `key`, live or not.
    ///
    /// A computation already in flight for `key` still completes for its
    /// waiters, but its result is not visible to later callers.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let key = key.render();
        let removed = self.slots.remove(&key).is_some();
        if removed {
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(cache = self.name, %key, "cache entry invalidated");
        }
        removed
    }

    /// Removes every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| slot.get().is_none_or(|entry| entry.is_live(now)));
        let purged = before.saturating_sub(self.slots.len());
        if purged > 0 {
            tracing::debug!(cache = self.name, purged, "purged expired cache entries");
        }
        purged
    }

    /// Number of slots, including ones still being populated.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            computations: self.counters.computations.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }

    fn slot(&self, key: &str) -> Slot<V> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot.value());
        }
        Arc::clone(
            self.slots
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        )
    }
}
