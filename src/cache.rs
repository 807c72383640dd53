//! Query Cache
//!
//! Time-boxed cache for backend reads with in-flight de-duplication: callers
//! asking for a key that is already being fetched wait on that fetch instead
//! of starting another one. Failures are handed to every waiter and never
//! stored.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::ApiError;

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, ApiError>>>;

struct Entry<V> {
    value: V,
    fetched_at: Instant,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    in_flight: HashMap<K, (u64, SharedFetch<V>)>,
}

pub struct QueryCache<K, V> {
    name: &'static str,
    ttl: Duration,
    inner: Arc<Mutex<Inner<K, V>>>,
    next_fetch: AtomicU64,
}

impl<K, V> QueryCache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            })),
            next_fetch: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fresh cached value, if any. Never does I/O.
    pub fn peek(&self, key: &K) -> Option<V> {
        let inner = self.lock();
        inner
            .entries
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    pub fn is_fetching(&self, key: &K) -> bool {
        self.lock().in_flight.contains_key(key)
    }

    /// Return the cached value for `key`, joining or starting a fetch when
    /// there is none within the freshness window.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    {
        let (fetch_id, pending) = {
            let mut inner = self.lock();

            match inner.entries.get(&key) {
                Some(entry) if entry.fetched_at.elapsed() < self.ttl => {
                    debug!("{} cache hit", self.name);
                    return Ok(entry.value.clone());
                }
                Some(_) => {
                    inner.entries.remove(&key);
                }
                None => {}
            }

            match inner.in_flight.get(&key) {
                Some((id, pending)) => {
                    debug!("{} cache joining in-flight fetch", self.name);
                    (*id, pending.clone())
                }
                None => {
                    debug!("{} cache miss", self.name);
                    let id = self.next_fetch.fetch_add(1, Ordering::Relaxed);
                    let pending = fetch().boxed().shared();
                    inner.in_flight.insert(key.clone(), (id, pending.clone()));
                    (id, pending)
                }
            }
        };

        let result = pending.await;

        // Whichever waiter finishes first settles the entry
        let mut inner = self.lock();
        if inner.in_flight.get(&key).map(|(id, _)| *id) == Some(fetch_id) {
            inner.in_flight.remove(&key);
            if let Ok(value) = &result {
                let ttl = self.ttl;
                inner.entries.retain(|_, entry| entry.fetched_at.elapsed() < ttl);
                inner.entries.insert(
                    key,
                    Entry {
                        value: value.clone(),
                        fetched_at: Instant::now(),
                    },
                );
            }
        }

        result
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }
}
