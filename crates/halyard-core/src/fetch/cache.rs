use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use halyard_protocol::HalResponse;
use moka::future::Cache;
use moka::Expiry;
use parking_lot::Mutex;
use serde::Serialize;

use super::cache_control::DefaultMaxAgePolicy;
use super::clock::{Clock, SystemClock};
use super::loader::ResourceLoader;
use super::singleflight::Singleflight;
use crate::config::CacheConfig;
use crate::error::ClientFetchError;

/// A stored upstream response and the moment it was retrieved.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry {
    pub response: HalResponse,
    pub retrieved_at: DateTime<Utc>,
}

impl CachedEntry {
    pub fn new(response: HalResponse) -> Self {
        Self {
            retrieved_at: response.retrieved_at,
            response,
        }
    }

    /// Whole seconds of freshness left at `now`, `None` once stale.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<u64> {
        let max_age = self.response.max_age?;
        let elapsed_ms = (now - self.retrieved_at).num_milliseconds().max(0) as u64;
        if elapsed_ms >= max_age.saturating_mul(1000) {
            return None;
        }
        Some(max_age.saturating_sub(elapsed_ms / 1000))
    }
}

/// Storage behind the [`CachingLoader`]. Implementations must tolerate
/// concurrent loads and stores.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self, uri: &str) -> Option<CachedEntry>;
    async fn store(&self, uri: &str, entry: CachedEntry);
    async fn invalidate(&self, uri: &str);
}

struct FreshnessExpiry {
    ceiling: Duration,
}

impl FreshnessExpiry {
    fn lifetime(&self, entry: &CachedEntry) -> Duration {
        let secs = entry.response.max_age.unwrap_or(0).max(1);
        Duration::from_secs(secs).min(self.ceiling)
    }
}

impl Expiry<String, CachedEntry> for FreshnessExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(self.lifetime(value))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.lifetime(value))
    }
}

/// Bounded store on a moka cache; entries are evicted once their max-age (or
/// the TTL ceiling) elapses.
#[derive(Clone)]
pub struct MokaCacheStore {
    cache: Cache<String, CachedEntry>,
}

impl MokaCacheStore {
    pub fn new(capacity: u64, ttl_ceiling: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .expire_after(FreshnessExpiry {
                ceiling: ttl_ceiling.max(Duration::from_secs(1)),
            })
            .build();
        Self { cache }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.capacity,
            Duration::from_secs(config.ttl_ceiling_secs),
        )
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl CacheStore for MokaCacheStore {
    async fn load(&self, uri: &str) -> Option<CachedEntry> {
        self.cache.get(uri).await
    }

    async fn store(&self, uri: &str, entry: CachedEntry) {
        self.cache.insert(uri.to_string(), entry).await;
    }

    async fn invalidate(&self, uri: &str) {
        self.cache.invalidate(uri).await;
    }
}

/// Unbounded map store for tests and tiny setups.
#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<Mutex<HashMap<String, CachedEntry>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.entries.lock().contains_key(uri)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn load(&self, uri: &str) -> Option<CachedEntry> {
        self.entries.lock().get(uri).cloned()
    }

    async fn store(&self, uri: &str, entry: CachedEntry) {
        self.entries.lock().insert(uri.to_string(), entry);
    }

    async fn invalidate(&self, uri: &str) {
        self.entries.lock().remove(uri);
    }
}

#[derive(Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    stale: AtomicU64,
    stored: AtomicU64,
    stored_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub stale: u64,
    pub stored: u64,
    pub stored_errors: u64,
}

type FetchOutcome = Result<HalResponse, ClientFetchError>;

/// Freshness-aware decorator over another [`ResourceLoader`].
///
/// Fresh hits are answered from the store with their remaining max-age and no
/// upstream call. Misses and stale entries go upstream; responses without a
/// max-age get one from the [`DefaultMaxAgePolicy`] and are stored only when
/// that max-age is positive.
pub struct CachingLoader {
    inner: Arc<dyn ResourceLoader>,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    policy: DefaultMaxAgePolicy,
    cache_errors: bool,
    flights: Option<Singleflight<FetchOutcome>>,
    stats: CacheStats,
}

impl CachingLoader {
    pub fn new(inner: Arc<dyn ResourceLoader>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            inner,
            store,
            clock: Arc::new(SystemClock),
            policy: DefaultMaxAgePolicy::default(),
            cache_errors: false,
            flights: Some(Singleflight::default()),
            stats: CacheStats::default(),
        }
    }

    pub fn from_config(
        inner: Arc<dyn ResourceLoader>,
        store: Arc<dyn CacheStore>,
        config: &CacheConfig,
    ) -> Self {
        Self::new(inner, store)
            .with_policy(DefaultMaxAgePolicy {
                success: config.default_max_age_secs,
                not_found: config.not_found_max_age_secs,
                error: config.error_max_age_secs,
            })
            .with_error_caching(config.cache_errors)
            .with_single_flight(config.single_flight)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: DefaultMaxAgePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_error_caching(mut self, enabled: bool) -> Self {
        self.cache_errors = enabled;
        self
    }

    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.flights = enabled.then(Singleflight::default);
        self
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            coalesced: self.stats.coalesced.load(Ordering::Relaxed),
            stale: self.stats.stale.load(Ordering::Relaxed),
            stored: self.stats.stored.load(Ordering::Relaxed),
            stored_errors: self.stats.stored_errors.load(Ordering::Relaxed),
        }
    }

    pub async fn invalidate(&self, uri: &str) {
        self.store.invalidate(uri).await;
    }

    async fn lookup(&self, uri: &str) -> Option<FetchOutcome> {
        let entry = self.store.load(uri).await?;
        let now = self.clock.now();
        let Some(remaining) = entry.remaining(now) else {
            self.stats.stale.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(target: "halyard::cache", %uri, "stale entry");
            return None;
        };
        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(target: "halyard::cache", %uri, remaining, "fresh hit");
        let mut response = entry.response;
        response.max_age = Some(remaining);
        response.retrieved_at = now;
        if response.is_success() {
            Some(Ok(response))
        } else {
            let message = format!("upstream responded with status {} (cached)", response.status);
            Some(Err(ClientFetchError::from_response(response, message)))
        }
    }

    async fn fetch(&self, uri: &str) -> FetchOutcome {
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        match self.inner.get(uri).await {
            Ok(mut response) => {
                let status = response.status;
                let max_age = *response
                    .max_age
                    .get_or_insert_with(|| self.policy.for_status(status));
                if max_age > 0 {
                    self.store.store(uri, CachedEntry::new(response.clone())).await;
                    self.stats.stored.fetch_add(1, Ordering::Relaxed);
                }
                Ok(response)
            }
            Err(mut err) => {
                if let Some(response) = err.response.as_deref_mut() {
                    let status = response.status;
                    let max_age = *response
                        .max_age
                        .get_or_insert_with(|| self.policy.for_status(status));
                    if self.cache_errors && max_age > 0 {
                        self.store.store(uri, CachedEntry::new(response.clone())).await;
                        self.stats.stored_errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl ResourceLoader for CachingLoader {
    async fn get(&self, uri: &str) -> Result<HalResponse, ClientFetchError> {
        if let Some(hit) = self.lookup(uri).await {
            return hit;
        }
        let Some(flights) = &self.flights else {
            return self.fetch(uri).await;
        };
        let mut guard = flights.begin(uri);
        if !guard.is_leader() {
            if let Some(outcome) = guard.wait().await {
                self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(target: "halyard::cache", %uri, "coalesced with in-flight fetch");
                return outcome;
            }
            drop(guard);
            return self.fetch(uri).await;
        }
        let outcome = self.fetch(uri).await;
        guard.complete(outcome.clone());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::clock::ManualClock;
    use crate::fetch::loader::TransportLoader;
    use crate::fetch::transport::{ScriptedTransport, TransportResponse};
    use serde_json::json;

    struct Fixture {
        transport: ScriptedTransport,
        clock: ManualClock,
        store: MemoryCacheStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                transport: ScriptedTransport::new(),
                clock: ManualClock::default(),
                store: MemoryCacheStore::new(),
            }
        }

        fn loader(&self) -> CachingLoader {
            let inner = TransportLoader::with_clock(
                Arc::new(self.transport.clone()),
                Arc::new(self.clock.clone()),
            );
            CachingLoader::new(Arc::new(inner), Arc::new(self.store.clone()))
                .with_clock(Arc::new(self.clock.clone()))
        }
    }

    #[tokio::test]
    async fn fresh_hit_reduces_max_age_without_upstream_call() {
        let fx = Fixture::new();
        fx.transport
            .respond_hal("http://up/a", json!({"v": 1}), Some(60));
        let loader = fx.loader();

        let first = loader.get("http://up/a").await.unwrap();
        assert_eq!(first.max_age, Some(60));

        fx.clock.advance_secs(20);
        let second = loader.get("http://up/a").await.unwrap();
        assert_eq!(second.max_age, Some(40));
        assert_eq!(second.body, first.body);
        assert_eq!(fx.transport.call_count("http://up/a"), 1);
        assert_eq!(loader.stats().hits, 1);
    }

    #[tokio::test]
    async fn stale_entry_is_refetched() {
        let fx = Fixture::new();
        fx.transport
            .respond_hal("http://up/a", json!({"v": 1}), Some(10))
            .respond_hal("http://up/a", json!({"v": 2}), Some(10));
        let loader = fx.loader();

        loader.get("http://up/a").await.unwrap();
        fx.clock.advance_secs(10);
        let refreshed = loader.get("http://up/a").await.unwrap();
        assert_eq!(refreshed.body.unwrap().state["v"], 2);
        assert_eq!(fx.transport.call_count("http://up/a"), 2);
        assert_eq!(loader.stats().stale, 1);
    }

    #[tokio::test]
    async fn zero_max_age_is_never_stored() {
        let fx = Fixture::new();
        fx.transport
            .respond_hal("http://up/a", json!({}), Some(0));
        let loader = fx.loader();
        loader.get("http://up/a").await.unwrap();
        loader.get("http://up/a").await.unwrap();
        assert!(fx.store.is_empty());
        assert_eq!(fx.transport.call_count("http://up/a"), 2);
    }

    #[tokio::test]
    async fn missing_max_age_uses_default_policy() {
        let fx = Fixture::new();
        fx.transport.respond_hal("http://up/a", json!({}), None);
        let loader = fx.loader().with_policy(DefaultMaxAgePolicy {
            success: 15,
            not_found: 0,
            error: 0,
        });
        let response = loader.get("http://up/a").await.unwrap();
        assert_eq!(response.max_age, Some(15));
        assert!(fx.store.contains("http://up/a"));
    }

    #[tokio::test]
    async fn errors_are_replayed_only_when_enabled() {
        let fx = Fixture::new();
        fx.transport.respond(
            "http://up/gone",
            TransportResponse::hal(404, &json!({"message": "gone"}), None),
        );

        let plain = fx.loader();
        plain.get("http://up/gone").await.unwrap_err();
        assert!(fx.store.is_empty());

        let caching = fx.loader().with_error_caching(true);
        let err = caching.get("http://up/gone").await.unwrap_err();
        assert_eq!(err.response.as_ref().unwrap().max_age, Some(30));
        fx.clock.advance_secs(5);
        let replayed = caching.get("http://up/gone").await.unwrap_err();
        assert_eq!(replayed.status, Some(404));
        assert_eq!(replayed.response.as_ref().unwrap().max_age, Some(25));
        assert_eq!(replayed.error_document().unwrap().state["message"], "gone");
        assert_eq!(fx.transport.call_count("http://up/gone"), 2);
        assert_eq!(caching.stats().stored_errors, 1);
    }

    #[tokio::test]
    async fn network_failures_are_not_cached() {
        let fx = Fixture::new();
        fx.transport.fail("http://up/down", "connection refused");
        let loader = fx.loader().with_error_caching(true);
        loader.get("http://up/down").await.unwrap_err();
        loader.get("http://up/down").await.unwrap_err();
        assert_eq!(fx.transport.call_count("http://up/down"), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_upstream_call() {
        let fx = Fixture::new();
        let transport = fx.transport.clone().with_delay(Duration::from_millis(50));
        transport.respond_hal("http://up/slow", json!({"v": 1}), Some(0));
        let loader = Arc::new(fx.loader());

        let calls = (0..5).map(|_| {
            let loader = Arc::clone(&loader);
            async move { loader.get("http://up/slow").await }
        });
        let results = futures_util::future::join_all(calls).await;
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(transport.call_count("http://up/slow"), 1);
        assert_eq!(loader.stats().coalesced, 4);
    }

    #[tokio::test]
    async fn single_flight_can_be_disabled() {
        let fx = Fixture::new();
        let transport = fx.transport.clone().with_delay(Duration::from_millis(20));
        transport.respond_hal("http://up/slow", json!({}), Some(0));
        let loader = Arc::new(fx.loader().with_single_flight(false));
        let calls = (0..3).map(|_| {
            let loader = Arc::clone(&loader);
            async move { loader.get("http://up/slow").await }
        });
        futures_util::future::join_all(calls).await;
        assert_eq!(transport.call_count("http://up/slow"), 3);
    }

    #[tokio::test]
    async fn moka_store_round_trips_entries() {
        let store = MokaCacheStore::new(16, Duration::from_secs(3600));
        let response = HalResponse::new("http://up/a", 200, Utc::now()).with_max_age(Some(60));
        store.store("http://up/a", CachedEntry::new(response.clone())).await;
        assert_eq!(store.load("http://up/a").await.unwrap().response, response);
        store.invalidate("http://up/a").await;
        assert!(store.load("http://up/a").await.is_none());
    }

    #[test]
    fn remaining_floors_partial_seconds() {
        let start = Utc::now();
        let entry = CachedEntry::new(HalResponse::new("u", 200, start).with_max_age(Some(60)));
        assert_eq!(entry.remaining(start), Some(60));
        assert_eq!(
            entry.remaining(start + chrono::Duration::milliseconds(59_500)),
            Some(1)
        );
        assert_eq!(entry.remaining(start + chrono::Duration::seconds(60)), None);
    }
}
