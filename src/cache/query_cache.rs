use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use super::QueryKey;
use crate::client::ApiError;
use crate::config::CacheConfig;
use crate::metrics::Metrics;
use crate::utils::clock::Clock;

pub(crate) type Fetch<V> = BoxFuture<'static, Result<V, ApiError>>;
type SharedFetch<V> = Shared<Fetch<V>>;

/// Freshness and retention windows. Retention never ends before freshness.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub fresh_for: Duration,
    pub retain_for: Duration,
}

impl CachePolicy {
    pub fn new(fresh_for: Duration, retain_for: Duration) -> Self {
        CachePolicy {
            fresh_for,
            retain_for: retain_for.max(fresh_for),
        }
    }
}

impl From<&CacheConfig> for CachePolicy {
    fn from(config: &CacheConfig) -> Self {
        let secs = |s: u64| Duration::seconds(s.min(i32::MAX as u64) as i64);
        CachePolicy::new(secs(config.fresh_in_secs), secs(config.retention_in_secs))
    }
}

/// What a read hands back: the best data we have, plus the last fetch error
/// if there was one. A failed refresh leaves earlier data in place.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<V> {
    pub data: Option<V>,
    pub error: Option<ApiError>,
    pub is_stale: bool,
}

impl<V> QueryResult<V> {
    pub fn map<U>(self, f: impl FnOnce(V) -> Option<U>) -> QueryResult<U> {
        QueryResult {
            data: self.data.and_then(f),
            error: self.error,
            is_stale: self.is_stale,
        }
    }

    /// Data if there is any, otherwise the error. A rejected credential is
    /// an error even when older data is at hand.
    pub fn into_result(self) -> Result<V, ApiError> {
        match (self.data, self.error) {
            (_, Some(ApiError::Unauthorized)) => Err(ApiError::Unauthorized),
            (Some(data), _) => Ok(data),
            (None, Some(e)) => Err(e),
            (None, None) => Err(ApiError::Decode("no data for query".to_string())),
        }
    }
}

struct InFlight<V: Clone> {
    seq: u64,
    fetch: SharedFetch<V>,
}

struct Entry<V: Clone> {
    data: Option<V>,
    error: Option<ApiError>,
    updated_at: Option<DateTime<Utc>>,
    invalidated: bool,
    observers: usize,
    last_seen: DateTime<Utc>,
    in_flight: Option<InFlight<V>>,
}

impl<V: Clone> Entry<V> {
    fn new(now: DateTime<Utc>) -> Self {
        Entry {
            data: None,
            error: None,
            updated_at: None,
            invalidated: false,
            observers: 0,
            last_seen: now,
            in_flight: None,
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>, fresh_for: Duration) -> bool {
        !self.invalidated
            && self
                .updated_at
                .is_some_and(|at| now.signed_duration_since(at) < fresh_for)
    }

    fn write(&mut self, data: V, now: DateTime<Utc>) {
        self.data = Some(data);
        self.error = None;
        self.updated_at = Some(now);
        self.invalidated = false;
        // Anything still in flight was issued before this write.
        self.in_flight = None;
    }
}

type Entries<V> = Arc<Mutex<HashMap<QueryKey, Entry<V>>>>;

fn lock<V: Clone>(entries: &Entries<V>) -> MutexGuard<'_, HashMap<QueryKey, Entry<V>>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum Plan<V: Clone> {
    Hit(QueryResult<V>),
    Wait(SharedFetch<V>),
}

/// Keyed memoization of remote reads with stale-while-revalidate,
/// request deduplication and prefix invalidation.
///
/// Time comes from the injected [`Clock`]; fetches run on the tokio runtime.
pub struct QueryCache<V: Clone> {
    entries: Entries<V>,
    clock: Arc<dyn Clock>,
    policy: CachePolicy,
    seq: Arc<AtomicU64>,
    metrics: Option<Metrics>,
}

impl<V: Clone> Clone for QueryCache<V> {
    fn clone(&self) -> Self {
        QueryCache {
            entries: self.entries.clone(),
            clock: self.clock.clone(),
            policy: self.policy,
            seq: self.seq.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<V> QueryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
        QueryCache {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
            policy,
            seq: Arc::new(AtomicU64::new(0)),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_lookup(outcome);
        }
    }

    /// Reads `key`, calling `fetcher` only when needed:
    ///
    /// - fresh entry: returned as is, no remote call;
    /// - stale entry: returned immediately, one background refresh started
    ///   unless one is already running;
    /// - missing or invalidated entry: waits for a fetch, joining the one
    ///   already in flight if there is one.
    pub async fn fetch<F>(&self, key: &QueryKey, fetcher: F) -> QueryResult<V>
    where
        F: FnOnce() -> Fetch<V> + Send,
    {
        let now = self.clock.now();
        let plan = {
            let mut entries = lock(&self.entries);
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(now));
            entry.last_seen = now;

            match entry.data.clone() {
                Some(data) if entry.is_fresh(now, self.policy.fresh_for) => {
                    self.record("fresh");
                    Plan::Hit(QueryResult {
                        data: Some(data),
                        error: entry.error.clone(),
                        is_stale: false,
                    })
                }
                Some(data) if !entry.invalidated => {
                    self.record("stale");
                    if entry.in_flight.is_none() {
                        debug!("Refreshing stale query {} in the background", key);
                        self.start(key, entry, fetcher);
                    }
                    Plan::Hit(QueryResult {
                        data: Some(data),
                        error: entry.error.clone(),
                        is_stale: true,
                    })
                }
                _ => match entry.in_flight.as_ref().map(|f| f.fetch.clone()) {
                    Some(fetch) => {
                        self.record("deduplicated");
                        Plan::Wait(fetch)
                    }
                    None => {
                        self.record("miss");
                        Plan::Wait(self.start(key, entry, fetcher))
                    }
                },
            }
        };

        match plan {
            Plan::Hit(result) => result,
            Plan::Wait(fetch) => {
                let outcome = fetch.await;
                // Report what the cache holds now: a newer write may have
                // superseded this fetch while it ran.
                let current = lock(&self.entries)
                    .get(key)
                    .and_then(|entry| entry.data.clone());
                match outcome {
                    Ok(fetched) => QueryResult {
                        data: current.or(Some(fetched)),
                        error: None,
                        is_stale: false,
                    },
                    Err(e) => QueryResult {
                        is_stale: current.is_some(),
                        data: current,
                        error: Some(e),
                    },
                }
            }
        }
    }

    /// Starts a fetch for `key` and registers it as the entry's current one.
    /// The fetch is driven by its own task so that it completes, and is
    /// applied, even if every caller waiting on it goes away.
    fn start<F>(&self, key: &QueryKey, entry: &mut Entry<V>, fetcher: F) -> SharedFetch<V>
    where
        F: FnOnce() -> Fetch<V>,
    {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let entries = self.entries.clone();
        let clock = self.clock.clone();
        let key = key.clone();
        let request = fetcher();

        let fetch = async move {
            let result = request.await;
            apply(&entries, &key, seq, &result, clock.now());
            result
        }
        .boxed()
        .shared();

        entry.in_flight = Some(InFlight {
            seq,
            fetch: fetch.clone(),
        });
        tokio::spawn(fetch.clone());
        fetch
    }

    /// Current data for `key`, without fetching.
    pub fn get(&self, key: &QueryKey) -> Option<V> {
        lock(&self.entries).get(key).and_then(|e| e.data.clone())
    }

    /// Writes `data` as the fresh value of `key`. Any fetch in flight for the
    /// key is superseded and its result will be dropped.
    pub fn set(&self, key: &QueryKey, data: V) {
        let now = self.clock.now();
        let mut entries = lock(&self.entries);
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(now));
        entry.last_seen = now;
        entry.write(data, now);
    }

    /// Edits the value of `key` in place if there is one. Returns whether it did.
    pub fn update(&self, key: &QueryKey, edit: impl FnOnce(&mut V)) -> bool {
        let now = self.clock.now();
        let mut entries = lock(&self.entries);
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        let Some(mut data) = entry.data.take() else {
            return false;
        };
        edit(&mut data);
        entry.write(data, now);
        true
    }

    /// Marks every key under `prefix` as needing a refetch on its next read.
    /// Their data stays servable in the meantime.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut entries = lock(&self.entries);
        let mut count = 0;
        for (key, entry) in entries.iter_mut() {
            if key.starts_with(prefix) {
                entry.invalidated = true;
                entry.in_flight = None;
                count += 1;
            }
        }
        debug!("Invalidated {} queries under {}", count, prefix);
        count
    }

    /// Drops every key under `prefix` outright.
    pub fn remove(&self, prefix: &QueryKey) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    /// Registers an observer of `key`; the entry is not evicted while the
    /// returned guard is alive.
    pub fn observe(&self, key: &QueryKey) -> Observer<V> {
        let now = self.clock.now();
        lock(&self.entries)
            .entry(key.clone())
            .or_insert_with(|| Entry::new(now))
            .observers += 1;
        Observer {
            entries: self.entries.clone(),
            clock: self.clock.clone(),
            key: key.clone(),
        }
    }

    /// Purges entries nobody observes whose retention window has run out.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let retain_for = self.policy.retain_for;
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, entry| {
            entry.observers > 0
                || entry.in_flight.is_some()
                || now.signed_duration_since(entry.last_seen) < retain_for
        });
        before - entries.len()
    }

    /// Waits for the fetch currently in flight for `key`, if any.
    pub async fn settle(&self, key: &QueryKey) {
        let fetch = lock(&self.entries)
            .get(key)
            .and_then(|e| e.in_flight.as_ref().map(|f| f.fetch.clone()));
        if let Some(fetch) = fetch {
            let _ = fetch.await;
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lands a fetch result, unless a later write or fetch has taken its place.
fn apply<V: Clone>(
    entries: &Entries<V>,
    key: &QueryKey,
    seq: u64,
    result: &Result<V, ApiError>,
    now: DateTime<Utc>,
) {
    let mut entries = lock(entries);
    let Some(entry) = entries.get_mut(key) else {
        debug!("Dropping fetch result for removed query {}", key);
        return;
    };
    if entry.in_flight.as_ref().map(|f| f.seq) != Some(seq) {
        debug!("Dropping superseded fetch result for {}", key);
        return;
    }
    entry.in_flight = None;
    match result {
        Ok(data) => entry.write(data.clone(), now),
        Err(e) => {
            debug!("Fetch for {} failed: {}", key, e);
            entry.error = Some(e.clone());
        }
    }
}

/// Keeps an entry alive. Dropping it starts the entry's retention window.
pub struct Observer<V: Clone> {
    entries: Entries<V>,
    clock: Arc<dyn Clock>,
    key: QueryKey,
}

impl<V: Clone> Drop for Observer<V> {
    fn drop(&mut self) {
        let now = self.clock.now();
        if let Some(entry) = lock(&self.entries).get_mut(&self.key) {
            entry.observers = entry.observers.saturating_sub(1);
            entry.last_seen = now;
        }
    }
}
