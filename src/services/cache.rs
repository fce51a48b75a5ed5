//! Keyed cache of server reads.
//!
//! Each key maps to a slot holding the last value fetched for it, whether
//! that value is still fresh, and the request currently in flight. Reads of
//! a fresh key are answered locally; reads of a stale or missing key join
//! the in-flight request when there is one and start a new one otherwise.
//!
//! Writes never touch cached values. After a successful write the caller
//! invalidates the affected keys: the slot turns stale, its in-flight request
//! is detached, and its version is bumped so that a request started before
//! the invalidation cannot store its (possibly pre-write) result. Clearing
//! the cache bumps an epoch with the same effect for every key.
//!
//! Slots that hold nothing are dropped, and once a cache reaches its
//! capacity, adding a key first evicts every stale slot with no request in
//! flight.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::config::QueryConfig;
use crate::error::ClientResult;

type SharedFetch<V> = Shared<BoxFuture<'static, ClientResult<Arc<V>>>>;

/// Number of keys a cache holds before evicting stale slots
pub const DEFAULT_CAPACITY: usize = 64;

/// Whether a cached value may be served without a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

/// How transient read failures are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            retries: 0,
            delay: Duration::ZERO,
        }
    }
}

impl From<&QueryConfig> for RetryPolicy {
    fn from(config: &QueryConfig) -> Self {
        Self {
            retries: config.read_retries,
            delay: config.retry_delay(),
        }
    }
}

struct Slot<V> {
    value: Option<Arc<V>>,
    freshness: Freshness,
    version: u64,
    in_flight: Option<SharedFetch<V>>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            value: None,
            freshness: Freshness::Stale,
            version: 0,
            in_flight: None,
        }
    }
}

impl<V> Slot<V> {
    fn mark_stale(&mut self) {
        self.freshness = Freshness::Stale;
        self.version += 1;
        self.in_flight = None;
    }
}

struct Entries<K, V> {
    slots: HashMap<K, Slot<V>>,
    epoch: u64,
}

impl<K, V> Entries<K, V> {
    fn evict_stale(&mut self) {
        self.slots
            .retain(|_, slot| slot.freshness == Freshness::Fresh || slot.in_flight.is_some());
    }
}

fn lock<K, V>(entries: &Mutex<Entries<K, V>>) -> MutexGuard<'_, Entries<K, V>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cache of reads of one entity kind, keyed by the read's parameters
pub struct QueryCache<K, V> {
    name: &'static str,
    entries: Arc<Mutex<Entries<K, V>>>,
    retry: RetryPolicy,
    capacity: usize,
}

impl<K, V> Clone for QueryCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            entries: Arc::clone(&self.entries),
            retry: self.retry,
            capacity: self.capacity,
        }
    }
}

impl<K, V> fmt::Debug for QueryCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("name", &self.name)
            .field("retry", &self.retry)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<K, V> QueryCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(name: &'static str, retry: RetryPolicy) -> Self {
        Self {
            name,
            entries: Arc::new(Mutex::new(Entries {
                slots: HashMap::new(),
                epoch: 0,
            })),
            retry,
            capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Read `key`, calling `fetcher` only when no fresh value or in-flight
    /// request exists for it
    pub async fn fetch<F, Fut>(&self, key: K, fetcher: F) -> ClientResult<Arc<V>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ClientResult<V>> + Send + 'static,
    {
        let request = {
            let mut entries = lock(&self.entries);
            let epoch = entries.epoch;
            if !entries.slots.contains_key(&key) && entries.slots.len() >= self.capacity {
                entries.evict_stale();
            }
            let slot = entries.slots.entry(key.clone()).or_default();

            if let (Freshness::Fresh, Some(value)) = (slot.freshness, &slot.value) {
                tracing::trace!("{} cache hit for {:?}", self.name, key);
                return Ok(Arc::clone(value));
            }

            match slot.in_flight.clone() {
                Some(in_flight) => {
                    tracing::debug!("{} read for {:?} joins the request in flight", self.name, key);
                    in_flight
                }
                None => {
                    let request = self.start(key, epoch, slot.version, fetcher);
                    slot.in_flight = Some(request.clone());
                    request
                }
            }
        };

        request.await
    }

    /// Build the shared request for `key`; it stores its own result when the
    /// slot has not been invalidated meanwhile
    fn start<F, Fut>(&self, key: K, epoch: u64, version: u64, fetcher: F) -> SharedFetch<V>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ClientResult<V>> + Send + 'static,
    {
        let entries: Weak<Mutex<Entries<K, V>>> = Arc::downgrade(&self.entries);
        let retry = self.retry;
        let name = self.name;

        async move {
            tracing::debug!("{} fetching {:?}", name, key);
            let result = fetch_with_retry(&fetcher, retry, name).await.map(Arc::new);

            if let Some(entries) = entries.upgrade() {
                let mut entries = lock(&entries);
                let current_epoch = entries.epoch;
                let empty = match entries.slots.get_mut(&key) {
                    Some(slot) if current_epoch == epoch && slot.version == version => {
                        slot.in_flight = None;
                        match &result {
                            Ok(value) => {
                                slot.value = Some(Arc::clone(value));
                                slot.freshness = Freshness::Fresh;
                                false
                            }
                            Err(_) => slot.value.is_none(),
                        }
                    }
                    _ => {
                        tracing::debug!("{} result for {:?} superseded, not cached", name, key);
                        false
                    }
                };
                if empty {
                    entries.slots.remove(&key);
                }
            }

            result
        }
        .boxed()
        .shared()
    }

    /// Mark one key stale
    pub fn invalidate(&self, key: &K) {
        if let Some(slot) = lock(&self.entries).slots.get_mut(key) {
            slot.mark_stale();
        }
    }

    /// Mark every key of this cache stale
    pub fn invalidate_all(&self) {
        let mut entries = lock(&self.entries);
        for slot in entries.slots.values_mut() {
            slot.mark_stale();
        }
        // Detached requests no longer write back, so valueless slots are dead
        entries.slots.retain(|_, slot| slot.value.is_some());
    }

    /// Drop every value and detach every in-flight request
    pub fn clear(&self) {
        let mut entries = lock(&self.entries);
        entries.slots.clear();
        entries.epoch += 1;
    }

    /// Cached value for `key` and whether it is still fresh
    pub fn peek(&self, key: &K) -> Option<(Arc<V>, Freshness)> {
        let entries = lock(&self.entries);
        let slot = entries.slots.get(key)?;
        slot.value.as_ref().map(|v| (Arc::clone(v), slot.freshness))
    }

    pub fn freshness(&self, key: &K) -> Option<Freshness> {
        self.peek(key).map(|(_, freshness)| freshness)
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries)
            .slots
            .values()
            .all(|slot| slot.value.is_none() && slot.in_flight.is_none())
    }
}

async fn fetch_with_retry<F, Fut, V>(fetcher: &F, retry: RetryPolicy, name: &str) -> ClientResult<V>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ClientResult<V>>,
{
    let mut attempt = 0;
    loop {
        match fetcher().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < retry.retries => {
                attempt += 1;
                tracing::warn!(
                    "{} read failed ({}), retrying {}/{}",
                    name,
                    e,
                    attempt,
                    retry.retries
                );
                tokio::time::sleep(retry.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
