use std::sync::Arc;

use tracing::debug;

use crate::provider::{CoinRef, TopCoinsSource};

/// Alternate spellings checked when no ranked coin matches.
const COMMON_NAMES: &[(&str, &str)] = &[
    ("btc", "bitcoin"),
    ("eth", "ethereum"),
    ("xrp", "ripple"),
    ("bnb", "binancecoin"),
];

/// Finds which coin a free-text question is about.
///
/// Matching is a plain substring test against the ranked coin list, so the
/// highest-ranked coin whose id, symbol or name appears anywhere in the text
/// wins.
pub struct CoinResolver {
    top_coins: Arc<dyn TopCoinsSource>,
    limit: usize,
}

impl CoinResolver {
    pub fn new(top_coins: Arc<dyn TopCoinsSource>, limit: usize) -> Self {
        Self { top_coins, limit }
    }

    /// Canonical coin id mentioned in `text`, or `None` when nothing matches.
    pub async fn identify(&self, text: &str) -> Option<String> {
        let query = text.to_lowercase();
        let coins = self.top_coins.top_coins(self.limit).await;

        if let Some(coin) = coins.iter().find(|coin| mentions(&query, coin)) {
            debug!(coin_id = %coin.id, rank = coin.rank, "identified coin from ranking");
            return Some(coin.id.clone());
        }

        let alias = COMMON_NAMES
            .iter()
            .find(|(name, _)| query.contains(name))
            .map(|(_, id)| id.to_string());

        match &alias {
            Some(id) => debug!(coin_id = %id, "identified coin from common names"),
            None => debug!("no coin identified"),
        }
        alias
    }
}

fn mentions(query: &str, coin: &CoinRef) -> bool {
    [&coin.id, &coin.symbol, &coin.name]
        .into_iter()
        .map(|field| field.trim().to_lowercase())
        .any(|field| !field.is_empty() && query.contains(&field))
}
