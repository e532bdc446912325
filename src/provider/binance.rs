use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use super::cache::{Cache, Category};
use super::{MarketDataSource, PriceSnapshot, PriceSource};
use crate::error::{Error, Result};

const BASE_URL: &str = "https://api.binance.com/api/v3";

/// Quote currency appended to every base symbol.
pub const QUOTE_CURRENCY: &str = "USDT";

/// Binance spot ticker source -- public endpoints, no key required.
pub struct Binance {
    client: Client,
    base_url: String,
    cache: Arc<Cache>,
    market: Arc<dyn MarketDataSource>,
}

impl Binance {
    /// Create a Binance source using the default production API URL.
    ///
    /// `market` supplies the base symbol for coins missing from the static table.
    pub fn new(cache: Arc<Cache>, market: Arc<dyn MarketDataSource>) -> Self {
        Self::with_base_url(BASE_URL, cache, market)
    }

    /// Create a Binance source with a custom base URL.
    pub fn with_base_url(
        base_url: impl Into<String>,
        cache: Arc<Cache>,
        market: Arc<dyn MarketDataSource>,
    ) -> Self {
        Self {
            client: super::http_client(),
            base_url: base_url.into(),
            cache,
            market,
        }
    }

    /// Base symbols for the coins we see most often.
    fn known_symbol(coin_id: &str) -> Option<&'static str> {
        let symbol = match coin_id.to_lowercase().as_str() {
            "bitcoin" => "BTC",
            "ethereum" => "ETH",
            "binancecoin" => "BNB",
            "solana" => "SOL",
            "ripple" => "XRP",
            "cardano" => "ADA",
            "dogecoin" => "DOGE",
            "polkadot" => "DOT",
            "avalanche-2" => "AVAX",
            "chainlink" => "LINK",
            "matic-network" => "MATIC",
            "shiba-inu" => "SHIB",
            _ => return None,
        };
        Some(symbol)
    }

    /// Resolve the exchange pair for a coin id, e.g. `bitcoin` -> `BTCUSDT`.
    pub async fn exchange_symbol(&self, coin_id: &str) -> Option<String> {
        let base = match Self::known_symbol(coin_id) {
            Some(symbol) => symbol.to_string(),
            None => {
                let snapshot = self.market.market_snapshot(coin_id).await?;
                snapshot.symbol.trim().to_uppercase()
            }
        };

        if base.is_empty() {
            return None;
        }

        Some(format!("{}{}", base, QUOTE_CURRENCY))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, symbol: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        debug!(url = %url, symbol = %symbol, "fetching from Binance");

        let resp = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;

        debug!(status = %status, body_len = body.len(), symbol = %symbol, "Binance response");
        trace!(body = %body, "Binance response body");

        if !status.is_success() {
            return Err(Error::Api(format!(
                "Binance returned {} for {}: {}",
                status, symbol, body
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("Binance {} JSON: {}", path, e)))
    }

    async fn fetch_price(&self, symbol: &str) -> Result<PriceSnapshot> {
        let (ticker, stats) = tokio::try_join!(
            self.get_json::<TickerPrice>("/ticker/price", symbol),
            self.get_json::<Ticker24h>("/ticker/24hr", symbol),
        )?;

        Ok(PriceSnapshot {
            exchange_symbol: symbol.to_string(),
            price: parse_number("price", Some(&ticker.price))?,
            price_change_pct_24h: parse_number(
                "priceChangePercent",
                stats.price_change_percent.as_deref(),
            )?,
            high_24h: parse_number("highPrice", stats.high_price.as_deref())?,
            low_24h: parse_number("lowPrice", stats.low_price.as_deref())?,
            volume_24h: parse_number("volume", stats.volume.as_deref())?,
        })
    }
}

#[async_trait]
impl PriceSource for Binance {
    fn name(&self) -> &str {
        "Binance"
    }

    async fn price_snapshot(&self, coin_id: &str) -> Option<PriceSnapshot> {
        if let Some(snapshot) = self.cache.get::<PriceSnapshot>(Category::Price, coin_id).await {
            debug!(coin_id = %coin_id, "using cached price data");
            return Some(snapshot);
        }

        let Some(symbol) = self.exchange_symbol(coin_id).await else {
            warn!(coin_id = %coin_id, "no exchange symbol for coin");
            return None;
        };

        match self.fetch_price(&symbol).await {
            Ok(snapshot) => {
                self.cache.put(Category::Price, coin_id, &snapshot).await;
                Some(snapshot)
            }
            Err(err) => {
                warn!(
                    coin_id = %coin_id,
                    symbol = %symbol,
                    error = %err,
                    "failed to fetch price data"
                );
                None
            }
        }
    }
}

/// Binance `/ticker/price` response.
#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

/// Binance `/ticker/24hr` response, reduced to the statistics we read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    price_change_percent: Option<String>,
    high_price: Option<String>,
    low_price: Option<String>,
    volume: Option<String>,
}

/// Parse a Binance decimal string. A missing statistic counts as zero; a value
/// that is present but not a finite number is an error.
fn parse_number(field: &str, raw: Option<&str>) -> Result<f64> {
    let Some(raw) = raw else {
        return Ok(0.0);
    };

    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            Error::Parse(format!(
                "Binance field '{}' is not a number: {:?}",
                field, raw
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_symbol_covers_static_table() {
        assert_eq!(Binance::known_symbol("bitcoin"), Some("BTC"));
        assert_eq!(Binance::known_symbol("avalanche-2"), Some("AVAX"));
        assert_eq!(Binance::known_symbol("shiba-inu"), Some("SHIB"));
        assert_eq!(Binance::known_symbol("some-coin"), None);
    }

    #[test]
    fn parse_number_handles_missing_and_invalid() {
        assert_eq!(parse_number("price", Some("50123.45000000")).unwrap(), 50123.45);
        assert_eq!(parse_number("volume", None).unwrap(), 0.0);
        assert!(matches!(parse_number("price", Some("abc")), Err(Error::Parse(_))));
        assert!(matches!(parse_number("price", Some("NaN")), Err(Error::Parse(_))));
    }

    #[test]
    fn ticker_24h_parsing() {
        let json = r#"{"symbol":"BTCUSDT","priceChangePercent":"-1.250","highPrice":"51000.00","lowPrice":"49000.00","volume":"12345.6"}"#;
        let stats: Ticker24h = serde_json::from_str(json).unwrap();
        assert_eq!(stats.price_change_percent.as_deref(), Some("-1.250"));
        assert_eq!(stats.high_price.as_deref(), Some("51000.00"));
        assert_eq!(stats.volume.as_deref(), Some("12345.6"));
    }
}
