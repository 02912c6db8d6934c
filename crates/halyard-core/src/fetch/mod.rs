//! Upstream access: HTTP transport, response loading and caching.

mod cache;
mod cache_control;
mod clock;
mod loader;
mod singleflight;
mod transport;

pub use cache::{
    CacheStatsSnapshot, CacheStore, CachedEntry, CachingLoader, MemoryCacheStore, MokaCacheStore,
};
pub use cache_control::{parse_max_age, DefaultMaxAgePolicy, IMMUTABLE_MAX_AGE};
pub use clock::{Clock, ManualClock, SystemClock};
pub use loader::{ResourceLoader, TransportLoader};
pub use transport::{HttpTransport, ReqwestTransport, ScriptedTransport, TransportResponse};
