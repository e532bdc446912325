use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use super::cache::{Cache, Category};
use super::{CoinRef, MarketDataSource, MarketSnapshot, TopCoinsSource};
use crate::error::{Error, Result};

const BASE_URL: &str = "https://api.coingecko.com/api/v3";
const TOP_COINS_CACHE_ID: &str = "top_coins";

/// Number of coins requested for the ranking page.
pub const DEFAULT_TOP_COINS_LIMIT: usize = 50;

/// CoinGecko market-data source -- public API, key optional.
pub struct CoinGecko {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    top_coins_limit: usize,
    cache: Arc<Cache>,
}

impl CoinGecko {
    /// Create a CoinGecko source using the default production API URL.
    pub fn new(cache: Arc<Cache>) -> Self {
        Self::with_base_url(BASE_URL, cache)
    }

    /// Create a CoinGecko source with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>, cache: Arc<Cache>) -> Self {
        Self {
            client: super::http_client(),
            base_url: base_url.into(),
            api_key: None,
            top_coins_limit: DEFAULT_TOP_COINS_LIMIT,
            cache,
        }
    }

    /// Attach a demo/pro API key, sent as `x_cg_api_key`.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    /// Size of the single ranking page fetched and cached.
    pub fn with_top_coins_limit(mut self, limit: usize) -> Self {
        self.top_coins_limit = limit.max(1);
        self
    }

    /// Map common names and ticker symbols to CoinGecko ids.
    ///
    /// Unknown input passes through lower-cased; CoinGecko may still know it.
    pub fn resolve_id(coin: &str) -> String {
        let lower = coin.trim().to_lowercase();
        let id = match lower.as_str() {
            "btc" | "bitcoin" => "bitcoin",
            "eth" | "ethereum" => "ethereum",
            "bnb" => "binancecoin",
            "sol" | "solana" => "solana",
            "xrp" => "ripple",
            "ada" | "cardano" => "cardano",
            "doge" | "dogecoin" => "dogecoin",
            "dot" | "polkadot" => "polkadot",
            "avax" | "avalanche" => "avalanche-2",
            "link" | "chainlink" => "chainlink",
            "matic" | "polygon" => "matic-network",
            "shib" | "shiba inu" => "shiba-inu",
            _ => return lower,
        };
        id.to_string()
    }

    async fn get_body(&self, path: &str, query: &[(&str, String)]) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url).header("accept", "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(key) = &self.api_key {
            request = request.query(&[("x_cg_api_key", key)]);
        }

        debug!(url = %url, "fetching from CoinGecko");

        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        debug!(status = %status, body_len = body.len(), "CoinGecko response");
        trace!(body = %body, "CoinGecko response body");

        if !status.is_success() {
            return Err(Error::Api(format!("CoinGecko returned {}: {}", status, body)));
        }

        Ok(body)
    }

    async fn fetch_top_coins(&self) -> Result<Vec<CoinRef>> {
        let query = [
            ("vs_currency", "usd".to_string()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", self.top_coins_limit.to_string()),
            ("page", "1".to_string()),
        ];
        let body = self.get_body("/coins/markets", &query).await?;

        let entries: Vec<MarketsEntry> = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("CoinGecko markets JSON: {}", e)))?;

        Ok(rank_coins(entries))
    }

    async fn fetch_market(&self, coin_id: &str) -> Result<MarketSnapshot> {
        let cg_id = Self::resolve_id(coin_id);
        let query = [
            ("localization", "false".to_string()),
            ("tickers", "false".to_string()),
            ("community_data", "false".to_string()),
            ("developer_data", "false".to_string()),
        ];
        let body = self.get_body(&format!("/coins/{}", cg_id), &query).await?;

        let detail: CoinDetail = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("CoinGecko coin JSON: {}", e)))?;

        detail.into_snapshot(&cg_id)
    }
}

#[async_trait]
impl TopCoinsSource for CoinGecko {
    async fn top_coins(&self, limit: usize) -> Vec<CoinRef> {
        if let Some(coins) = self
            .cache
            .get::<Vec<CoinRef>>(Category::Market, TOP_COINS_CACHE_ID)
            .await
        {
            debug!(cached = coins.len(), limit, "using cached top coins");
            return coins.into_iter().take(limit).collect();
        }

        match self.fetch_top_coins().await {
            Ok(coins) => {
                self.cache
                    .put(Category::Market, TOP_COINS_CACHE_ID, &coins)
                    .await;
                coins.into_iter().take(limit).collect()
            }
            Err(err) => {
                warn!(error = %err, "failed to fetch top coins");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl MarketDataSource for CoinGecko {
    fn name(&self) -> &str {
        "CoinGecko"
    }

    async fn market_snapshot(&self, coin_id: &str) -> Option<MarketSnapshot> {
        if let Some(snapshot) = self
            .cache
            .get::<MarketSnapshot>(Category::Market, coin_id)
            .await
        {
            debug!(coin_id = %coin_id, "using cached market data");
            return Some(snapshot);
        }

        match self.fetch_market(coin_id).await {
            Ok(snapshot) => {
                self.cache.put(Category::Market, coin_id, &snapshot).await;
                Some(snapshot)
            }
            Err(err) => {
                warn!(coin_id = %coin_id, error = %err, "failed to fetch market data");
                None
            }
        }
    }
}

/// CoinGecko `/coins/markets` entry.
#[derive(Debug, Deserialize)]
struct MarketsEntry {
    id: String,
    symbol: String,
    name: String,
    market_cap_rank: Option<u32>,
}

/// CoinGecko `/coins/{id}` response, reduced to the fields we read.
#[derive(Debug, Deserialize)]
struct CoinDetail {
    id: Option<String>,
    name: Option<String>,
    symbol: Option<String>,
    market_cap_rank: Option<u32>,
    market_data: Option<CoinMarketData>,
    description: Option<HashMap<String, Option<String>>>,
    links: Option<CoinLinks>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CoinMarketData {
    market_cap: HashMap<String, Option<f64>>,
    total_volume: HashMap<String, Option<f64>>,
    price_change_percentage_24h: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CoinLinks {
    homepage: Vec<Option<String>>,
}

impl CoinDetail {
    fn into_snapshot(self, requested_id: &str) -> Result<MarketSnapshot> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| Error::Parse("CoinGecko coin is missing 'name'".into()))?;
        let symbol = self
            .symbol
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::Parse("CoinGecko coin is missing 'symbol'".into()))?;

        let market = self.market_data.unwrap_or_default();
        let description = self
            .description
            .and_then(|mut d| d.remove("en").flatten())
            .map(|text| first_sentence(&text))
            .unwrap_or_default();
        let homepage_url = self
            .links
            .and_then(|links| links.homepage.into_iter().next().flatten())
            .unwrap_or_default();

        Ok(MarketSnapshot {
            id: self.id.unwrap_or_else(|| requested_id.to_string()),
            name,
            symbol: symbol.to_uppercase(),
            rank: self.market_cap_rank,
            market_cap_usd: market.market_cap.get("usd").copied().flatten(),
            volume_24h_usd: market.total_volume.get("usd").copied().flatten(),
            price_change_pct_24h: market.price_change_percentage_24h,
            description,
            homepage_url,
        })
    }
}

/// Order ranking entries by market-cap rank. Unranked entries keep their page
/// position as rank.
fn rank_coins(entries: Vec<MarketsEntry>) -> Vec<CoinRef> {
    let mut coins: Vec<CoinRef> = entries
        .into_iter()
        .enumerate()
        .map(|(pos, entry)| CoinRef {
            rank: entry.market_cap_rank.unwrap_or(pos as u32 + 1),
            id: entry.id,
            symbol: entry.symbol,
            name: entry.name,
        })
        .collect();
    coins.sort_by_key(|coin| coin.rank);
    coins
}

/// Text up to and including the first period.
pub(crate) fn first_sentence(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let head = text.split('.').next().unwrap_or_default();
    format!("{}.", head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_id_maps_symbols_and_passes_unknown_through() {
        assert_eq!(CoinGecko::resolve_id("BTC"), "bitcoin");
        assert_eq!(CoinGecko::resolve_id("avalanche"), "avalanche-2");
        assert_eq!(CoinGecko::resolve_id("Shiba Inu"), "shiba-inu");
        assert_eq!(CoinGecko::resolve_id("some-coin"), "some-coin");
    }

    #[test]
    fn first_sentence_keeps_text_through_first_period() {
        assert_eq!(
            first_sentence("Bitcoin is the first cryptocurrency. It was created in 2009."),
            "Bitcoin is the first cryptocurrency."
        );
        assert_eq!(first_sentence("No period here"), "No period here.");
        assert_eq!(first_sentence(""), "");
    }

    #[test]
    fn coin_detail_without_market_data_still_builds_snapshot() {
        let json = r#"{"id":"xyz","name":"Xyz Coin","symbol":"xyz"}"#;
        let detail: CoinDetail = serde_json::from_str(json).unwrap();
        let snapshot = detail.into_snapshot("xyz").unwrap();

        assert_eq!(snapshot.symbol, "XYZ");
        assert_eq!(snapshot.rank, None);
        assert_eq!(snapshot.market_cap_usd, None);
        assert_eq!(snapshot.volume_24h_usd, None);
        assert_eq!(snapshot.price_change_pct_24h, None);
        assert_eq!(snapshot.description, "");
        assert_eq!(snapshot.homepage_url, "");
    }

    #[test]
    fn coin_detail_missing_symbol_is_rejected() {
        let json = r#"{"id":"xyz","name":"Xyz Coin"}"#;
        let detail: CoinDetail = serde_json::from_str(json).unwrap();
        assert!(matches!(detail.into_snapshot("xyz"), Err(Error::Parse(_))));
    }

    #[test]
    fn coin_detail_tolerates_null_usd_values() {
        let json = r#"{
            "id": "bitcoin", "name": "Bitcoin", "symbol": "btc", "market_cap_rank": 1,
            "market_data": {
                "market_cap": {"usd": null},
                "total_volume": {"usd": 3.1e10},
                "price_change_percentage_24h": null
            },
            "links": {"homepage": ["https://bitcoin.org", ""]}
        }"#;
        let detail: CoinDetail = serde_json::from_str(json).unwrap();
        let snapshot = detail.into_snapshot("bitcoin").unwrap();

        assert_eq!(snapshot.rank, Some(1));
        assert_eq!(snapshot.market_cap_usd, None);
        assert_eq!(snapshot.volume_24h_usd, Some(3.1e10));
        assert_eq!(snapshot.homepage_url, "https://bitcoin.org");
    }

    #[test]
    fn rank_coins_orders_by_rank_and_fills_missing_ranks() {
        let entries = vec![
            MarketsEntry {
                id: "ethereum".into(),
                symbol: "eth".into(),
                name: "Ethereum".into(),
                market_cap_rank: Some(2),
            },
            MarketsEntry {
                id: "bitcoin".into(),
                symbol: "btc".into(),
                name: "Bitcoin".into(),
                market_cap_rank: Some(1),
            },
            MarketsEntry {
                id: "unranked".into(),
                symbol: "unr".into(),
                name: "Unranked".into(),
                market_cap_rank: None,
            },
        ];

        let coins = rank_coins(entries);
        let ids: Vec<&str> = coins.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["bitcoin", "ethereum", "unranked"]);
        assert_eq!(coins[2].rank, 3);
    }
}
