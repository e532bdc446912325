use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::debug;

use crate::clock::{Clock, SystemClock};

pub const DEFAULT_NEWS_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_MARKET_TTL: Duration = Duration::from_secs(2 * 60);
pub const DEFAULT_PRICE_TTL: Duration = Duration::from_secs(30);

/// Data kinds with their own expiry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    News,
    Market,
    Price,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Market => "market",
            Self::Price => "price",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-category time-to-live, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub news: Duration,
    pub market: Duration,
    pub price: Duration,
}

impl CacheTtls {
    pub fn for_category(&self, category: Category) -> Duration {
        match category {
            Category::News => self.news,
            Category::Market => self.market,
            Category::Price => self.price,
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            news: DEFAULT_NEWS_TTL,
            market: DEFAULT_MARKET_TTL,
            price: DEFAULT_PRICE_TTL,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    fetched_at: DateTime<Utc>,
}

/// In-memory store shared by every fetcher.
///
/// Entries are keyed by `"{category}:{id}"`. A stale entry is never evicted; it
/// is ignored on read and replaced on the next `put`. Concurrent writers to the
/// same key are last-writer-wins.
pub struct Cache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttls: CacheTtls,
    clock: Arc<dyn Clock>,
}

impl Cache {
    pub fn new(ttls: CacheTtls) -> Self {
        Self::with_clock(ttls, Arc::new(SystemClock))
    }

    pub fn with_clock(ttls: CacheTtls, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttls,
            clock,
        }
    }

    /// Return the cached value when it is younger than the category TTL.
    ///
    /// Missing, stale and undecodable entries all read as `None`.
    pub async fn get<T: DeserializeOwned>(&self, category: Category, id: &str) -> Option<T> {
        let key = cache_key(category, id);
        let entry = self.entries.read().await.get(&key).cloned()?;

        let age_millis = (self.clock.now() - entry.fetched_at).num_milliseconds();
        let ttl_millis = self.ttls.for_category(category).as_millis();
        if age_millis < 0 || age_millis as u128 >= ttl_millis {
            debug!(key = %key, age_millis, "cache entry is stale");
            return None;
        }

        match serde_json::from_value(entry.value) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(key = %key, error = %err, "cache entry has unexpected shape");
                None
            }
        }
    }

    pub async fn put<T: Serialize>(&self, category: Category, id: &str, value: &T) {
        let key = cache_key(category, id);
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(err) => {
                debug!(key = %key, error = %err, "failed to serialize cache payload");
                return;
            }
        };

        let entry = CacheEntry {
            value,
            fetched_at: self.clock.now(),
        };
        self.entries.write().await.insert(key, entry);
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(CacheTtls::default())
    }
}

fn cache_key(category: Category, id: &str) -> String {
    format!("{}:{}", category, id)
}
