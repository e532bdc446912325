use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::{AggregatedContext, Aggregator, QueryRouter};
use crate::answer::{self, Answer, AnswerGenerator, Ollama};
use crate::config::Settings;
use crate::provider::binance::Binance;
use crate::provider::cache::Cache;
use crate::provider::coindesk::CoinDesk;
use crate::provider::coingecko::CoinGecko;
use crate::provider::{CoinRef, MarketDataSource, TopCoinsSource};
use crate::resolver::CoinResolver;

/// Answer plus the data it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub question: String,
    pub answer: Answer,
    pub context: AggregatedContext,
}

/// Question-answering facade over the router and the answer generator.
pub struct Assistant {
    router: QueryRouter,
    top_coins: Arc<dyn TopCoinsSource>,
    generator: Arc<dyn AnswerGenerator>,
    answer_timeout: Duration,
}

impl Assistant {
    /// Wire every source around one shared cache.
    pub fn from_config(settings: &Settings) -> Self {
        let cache = Arc::new(Cache::new(settings.cache_ttls));

        let coingecko = match &settings.coingecko_url {
            Some(url) => CoinGecko::with_base_url(url.clone(), cache.clone()),
            None => CoinGecko::new(cache.clone()),
        };
        let coingecko = Arc::new(
            coingecko
                .with_api_key(settings.coingecko_api_key.clone())
                .with_top_coins_limit(settings.top_coins_limit),
        );
        let market: Arc<dyn MarketDataSource> = coingecko.clone();

        let binance = match &settings.binance_url {
            Some(url) => Binance::with_base_url(url.clone(), cache.clone(), market.clone()),
            None => Binance::new(cache.clone(), market.clone()),
        };
        let coindesk = match &settings.news_feed_url {
            Some(url) => CoinDesk::with_feed_url(url.clone(), cache.clone(), market.clone()),
            None => CoinDesk::new(cache, market.clone()),
        };

        let generator: Arc<dyn AnswerGenerator> = match &settings.ollama_url {
            Some(url) => Arc::new(Ollama::with_base_url(url.clone(), settings.model.clone())),
            None => Arc::new(Ollama::new(settings.model.clone())),
        };

        let router = QueryRouter::new(
            CoinResolver::new(coingecko.clone(), settings.top_coins_limit),
            Aggregator::new(
                market,
                Arc::new(binance),
                Arc::new(coindesk),
                settings.news_limit,
            ),
        );

        Self::new(router, coingecko, generator, settings.answer_timeout)
    }

    pub fn new(
        router: QueryRouter,
        top_coins: Arc<dyn TopCoinsSource>,
        generator: Arc<dyn AnswerGenerator>,
        answer_timeout: Duration,
    ) -> Self {
        Self {
            router,
            top_coins,
            generator,
            answer_timeout,
        }
    }

    /// Gather grounding data for `question` without calling the model.
    pub async fn context(&self, question: &str) -> AggregatedContext {
        self.router.route(question).await
    }

    /// Gather data and generate a grounded answer.
    pub async fn ask(&self, question: &str) -> Reply {
        let context = self.router.route(question).await;
        info!(
            coin_id = ?context.coin_id,
            grounded = !context.is_empty(),
            "generating answer"
        );

        let answer =
            answer::answer(self.generator.as_ref(), question, &context, self.answer_timeout).await;

        Reply {
            question: question.to_string(),
            answer,
            context,
        }
    }

    /// Highest-ranked coins by market capitalization.
    pub async fn top_coins(&self, limit: usize) -> Vec<CoinRef> {
        self.top_coins.top_coins(limit).await
    }
}
