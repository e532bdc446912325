use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::provider::{
    MarketDataSource, MarketSnapshot, NewsItem, NewsSource, PriceSnapshot, PriceSource,
};
use crate::resolver::CoinResolver;

/// Everything known about one coin at question time. Any part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedContext {
    pub coin_id: Option<String>,
    pub market: Option<MarketSnapshot>,
    pub price: Option<PriceSnapshot>,
    pub news: Vec<NewsItem>,
    /// Names of the sources that returned data, in market, price, news order.
    #[serde(default)]
    pub sources: Vec<String>,
}

impl AggregatedContext {
    pub fn is_empty(&self) -> bool {
        self.market.is_none() && self.price.is_none() && self.news.is_empty()
    }
}

/// Gathers market, price and news data for a coin.
pub struct Aggregator {
    market: Arc<dyn MarketDataSource>,
    price: Arc<dyn PriceSource>,
    news: Arc<dyn NewsSource>,
    news_limit: usize,
}

impl Aggregator {
    pub fn new(
        market: Arc<dyn MarketDataSource>,
        price: Arc<dyn PriceSource>,
        news: Arc<dyn NewsSource>,
        news_limit: usize,
    ) -> Self {
        Self {
            market,
            price,
            news,
            news_limit,
        }
    }

    /// Fetch market data, then price and news concurrently. Never fails;
    /// absent parts stay absent.
    ///
    /// Price and news sources look up the market snapshot themselves, so it is
    /// fetched first to let them read it from the cache.
    pub async fn aggregate(&self, coin_id: &str) -> AggregatedContext {
        let market = self.market.market_snapshot(coin_id).await;
        let (price, news) = tokio::join!(
            self.price.price_snapshot(coin_id),
            self.news.news(coin_id, self.news_limit),
        );

        let mut sources = Vec::new();
        if market.is_some() {
            sources.push(self.market.name().to_string());
        }
        if price.is_some() {
            sources.push(self.price.name().to_string());
        }
        if !news.is_empty() {
            sources.push(self.news.name().to_string());
        }

        info!(
            coin_id = %coin_id,
            market = market.is_some(),
            price = price.is_some(),
            news = news.len(),
            "aggregated coin data"
        );

        AggregatedContext {
            coin_id: Some(coin_id.to_string()),
            market,
            price,
            news,
            sources,
        }
    }
}

/// Entry point from free text to grounding data.
pub struct QueryRouter {
    resolver: CoinResolver,
    aggregator: Aggregator,
}

impl QueryRouter {
    pub fn new(resolver: CoinResolver, aggregator: Aggregator) -> Self {
        Self {
            resolver,
            aggregator,
        }
    }

    /// Resolve the coin in `text` and aggregate its data. An unrecognized
    /// question yields an empty context.
    pub async fn route(&self, text: &str) -> AggregatedContext {
        match self.resolver.identify(text).await {
            Some(coin_id) => self.aggregator.aggregate(&coin_id).await,
            None => {
                info!("no coin identified in question");
                AggregatedContext::default()
            }
        }
    }
}
