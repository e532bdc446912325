pub mod binance;
pub mod cache;
pub mod coindesk;
pub mod coingecko;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Placeholder rendered for any field the upstream source omitted.
pub const NOT_AVAILABLE: &str = "N/A";

const USER_AGENT: &str = concat!("cryptoask/", env!("CARGO_PKG_VERSION"));

/// One entry of the market-cap ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinRef {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub rank: u32,
}

/// Descriptive and valuation data for one coin.
///
/// Every field besides `id`, `name` and `symbol` may be missing upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub rank: Option<u32>,
    pub market_cap_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub price_change_pct_24h: Option<f64>,
    pub description: String,
    pub homepage_url: String,
}

/// Live exchange price with rolling 24h statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub exchange_symbol: String,
    pub price: f64,
    pub price_change_pct_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub volume_24h: f64,
}

/// A news article relevant to one coin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub source: String,
    pub published_at: String,
    pub description: String,
}

/// Ranked list of coins by market capitalization.
#[async_trait]
pub trait TopCoinsSource: Send + Sync {
    /// Up to `limit` coins, rank 1 first. Empty when the source is unavailable.
    async fn top_coins(&self, limit: usize) -> Vec<CoinRef>;
}

/// Per-coin market detail.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Human-readable source name used for attribution.
    fn name(&self) -> &str;

    async fn market_snapshot(&self, coin_id: &str) -> Option<MarketSnapshot>;
}

/// Per-coin exchange price.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    async fn price_snapshot(&self, coin_id: &str) -> Option<PriceSnapshot>;
}

/// Per-coin news.
#[async_trait]
pub trait NewsSource: Send + Sync {
    fn name(&self) -> &str;

    /// At most `limit` relevant items in feed order.
    async fn news(&self, coin_id: &str, limit: usize) -> Vec<NewsItem>;
}

/// HTTP client shared by the upstream sources.
pub fn http_client() -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .expect("failed to build HTTP client")
}
