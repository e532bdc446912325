//! Prompt assembly and the answer-generation boundary.
//!
//! The language model is an external collaborator: anything that turns a
//! prompt into text within a time budget can implement [`AnswerGenerator`].

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::aggregate::AggregatedContext;
use crate::error::{Error, Result};
use crate::provider::NOT_AVAILABLE;

const OLLAMA_URL: &str = "http://localhost:11434";

pub const DEFAULT_MODEL: &str = "llama3";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const TIMEOUT_MESSAGE: &str = "Response timed out. Please try again with a simpler question.";

const PROMPT_NEWS_ITEMS: usize = 3;
const PROMPT_NEWS_DESCRIPTION_CHARS: usize = 200;

/// Turns a prompt into generated text.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String>;
}

/// Generated answer plus the data sources that grounded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<String>,
}

/// Ask `generator` about `question` with `context` as grounding.
///
/// Generation failures become a readable message in `text`; `sources` always
/// lists what contributed data.
pub async fn answer(
    generator: &dyn AnswerGenerator,
    question: &str,
    context: &AggregatedContext,
    timeout: Duration,
) -> Answer {
    let prompt = build_prompt(question, context);
    trace!(prompt = %prompt, "answer prompt");

    let text = match generator.generate(&prompt, timeout).await {
        Ok(text) => text.trim().to_string(),
        Err(Error::Timeout(elapsed)) => {
            warn!(timeout_secs = elapsed.as_secs(), "answer generation timed out");
            TIMEOUT_MESSAGE.to_string()
        }
        Err(err) => {
            warn!(error = %err, "answer generation failed");
            format!("Error generating response: {}", err)
        }
    };

    Answer {
        text,
        sources: sources(context),
    }
}

/// Names of the sources that returned data for `context`.
pub fn sources(context: &AggregatedContext) -> Vec<String> {
    context.sources.clone()
}

/// Render the full model prompt.
pub fn build_prompt(question: &str, context: &AggregatedContext) -> String {
    format!(
        "You are an expert cryptocurrency assistant. Answer the user's question based on the real-time data provided below.\n\
Always respond in the same language the question was asked in. Be concise but thorough, and provide specific data when available.\n\
\n\
DATA:\n\
{}\n\
USER QUESTION: {}\n\
\n\
ANSWER:",
        format_context(context),
        question.trim()
    )
}

/// Market, price and news sections of the prompt.
pub fn format_context(context: &AggregatedContext) -> String {
    let mut out = String::new();

    out.push_str("## MARKET DATA\n");
    if let Some(m) = &context.market {
        let _ = writeln!(out, "Name: {}", m.name);
        let _ = writeln!(out, "Symbol: {}", m.symbol);
        let _ = writeln!(out, "Market Cap Rank: #{}", display_or_na(m.rank));
        let _ = writeln!(out, "Market Cap: ${}", format_optional_number(m.market_cap_usd));
        let _ = writeln!(out, "24h Volume: ${}", format_optional_number(m.volume_24h_usd));
        let _ = writeln!(out, "24h Price Change: {}%", display_or_na(m.price_change_pct_24h));
        let _ = writeln!(out, "Description: {}", text_or_na(&m.description));
        let _ = writeln!(out, "Website: {}", text_or_na(&m.homepage_url));
    }

    out.push_str("\n## PRICE DATA\n");
    if let Some(p) = &context.price {
        let _ = writeln!(out, "Current Price: ${:.2}", p.price);
        let _ = writeln!(out, "24h Price Change: {}%", p.price_change_pct_24h);
        let _ = writeln!(out, "24h High: ${}", p.high_24h);
        let _ = writeln!(out, "24h Low: ${}", p.low_24h);
        let _ = writeln!(out, "24h Volume: {}", format_number(p.volume_24h));
    }

    out.push_str("\n## NEWS\n");
    if context.news.is_empty() {
        out.push_str("No recent news available.\n");
    } else {
        out.push_str("Latest News:\n");
        for (i, item) in context.news.iter().take(PROMPT_NEWS_ITEMS).enumerate() {
            let _ = writeln!(out, "{}. {} - {}", i + 1, item.title, item.source);
            if !item.description.is_empty() {
                let _ = writeln!(
                    out,
                    "   {}...",
                    clip_chars(&item.description, PROMPT_NEWS_DESCRIPTION_CHARS)
                );
            }
            let _ = writeln!(out, "   Published: {}", text_or_na(&item.published_at));
            let _ = writeln!(out, "   URL: {}", text_or_na(&item.url));
            out.push('\n');
        }
    }

    out
}

/// Compact large values with K/M/B suffixes, e.g. `1234567.0` -> `1.23M`.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return NOT_AVAILABLE.to_string();
    }

    if value >= 1_000_000_000.0 {
        format!("{:.2}B", value / 1_000_000_000.0)
    } else if value >= 1_000_000.0 {
        format!("{:.2}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("{:.2}K", value / 1_000.0)
    } else {
        format!("{:.2}", value)
    }
}

fn format_optional_number(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn display_or_na<T: std::fmt::Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn text_or_na(text: &str) -> &str {
    if text.trim().is_empty() {
        NOT_AVAILABLE
    } else {
        text
    }
}

fn clip_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Local Ollama server.
pub struct Ollama {
    client: Client,
    base_url: String,
    model: String,
}

impl Ollama {
    /// Use the Ollama server on localhost.
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_base_url(OLLAMA_URL, model)
    }

    pub fn with_base_url(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: crate::provider::http_client(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    async fn request(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let payload = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        debug!(
            url = %url,
            model = %self.model,
            prompt_len = prompt.len(),
            "requesting answer from Ollama"
        );

        let resp = self.client.post(&url).json(&payload).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        debug!(status = %status, body_len = body.len(), "Ollama response");

        if !status.is_success() {
            return Err(Error::Generation(format!("Ollama returned {}: {}", status, body)));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("Ollama JSON: {}", e)))?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl AnswerGenerator for Ollama {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String> {
        tokio::time::timeout(timeout, self.request(prompt))
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MarketSnapshot, NewsItem, PriceSnapshot};

    struct Canned(std::result::Result<&'static str, fn() -> Error>);

    #[async_trait]
    impl AnswerGenerator for Canned {
        async fn generate(&self, _prompt: &str, _timeout: Duration) -> Result<String> {
            match &self.0 {
                Ok(text) => Ok(text.to_string()),
                Err(make) => Err(make()),
            }
        }
    }

    fn full_context() -> AggregatedContext {
        AggregatedContext {
            coin_id: Some("bitcoin".into()),
            market: Some(MarketSnapshot {
                id: "bitcoin".into(),
                name: "Bitcoin".into(),
                symbol: "BTC".into(),
                rank: Some(1),
                market_cap_usd: Some(1_234_000_000_000.0),
                volume_24h_usd: None,
                price_change_pct_24h: Some(-2.5),
                description: "Bitcoin is digital money.".into(),
                homepage_url: String::new(),
            }),
            price: Some(PriceSnapshot {
                exchange_symbol: "BTCUSDT".into(),
                price: 50_000.126,
                price_change_pct_24h: 1.2,
                high_24h: 51_000.0,
                low_24h: 49_000.0,
                volume_24h: 12_360.0,
            }),
            news: (1..=4)
                .map(|i| NewsItem {
                    title: format!("Story {}", i),
                    url: format!("https://example.com/{}", i),
                    source: "CoinDesk".into(),
                    published_at: "Mon, 01 Jan 2024 10:00:00 +0000".into(),
                    description: "x".repeat(300),
                })
                .collect(),
            sources: vec!["CoinGecko".into(), "Binance".into(), "CoinDesk".into()],
        }
    }

    #[test]
    fn format_number_uses_suffixes() {
        assert_eq!(format_number(1_500_000_000.0), "1.50B");
        assert_eq!(format_number(2_340_000.0), "2.34M");
        assert_eq!(format_number(12_360.0), "12.36K");
        assert_eq!(format_number(12.0), "12.00");
        assert_eq!(format_number(f64::NAN), "N/A");
    }

    #[test]
    fn prompt_contains_all_sections_and_question() {
        let prompt = build_prompt("  What's up with Bitcoin? ", &full_context());

        assert!(prompt.contains("## MARKET DATA"));
        assert!(prompt.contains("Market Cap Rank: #1"));
        assert!(prompt.contains("Market Cap: $1234.00B"));
        assert!(prompt.contains("24h Volume: $N/A"));
        assert!(prompt.contains("Website: N/A"));
        assert!(prompt.contains("Current Price: $50000.13"));
        assert!(prompt.contains("24h Volume: 12.36K"));
        assert!(prompt.contains("3. Story 3 - CoinDesk"));
        assert!(!prompt.contains("Story 4"));
        assert!(prompt.contains(&format!("   {}...\n", "x".repeat(200))));
        assert!(prompt.ends_with("USER QUESTION: What's up with Bitcoin?\n\nANSWER:"));
    }

    #[test]
    fn prompt_for_empty_context_says_no_news() {
        let prompt = build_prompt("hello", &AggregatedContext::default());
        assert!(prompt.contains("No recent news available."));
        assert!(!prompt.contains("Name:"));
    }

    #[test]
    fn sources_come_from_the_aggregated_context() {
        assert_eq!(sources(&full_context()), vec!["CoinGecko", "Binance", "CoinDesk"]);

        let mut partial = full_context();
        partial.sources = vec!["Kraken".into()];
        assert_eq!(sources(&partial), vec!["Kraken"]);

        assert!(sources(&AggregatedContext::default()).is_empty());
    }

    #[tokio::test]
    async fn timeout_becomes_readable_message_and_keeps_sources() {
        let generator = Canned(Err(|| Error::Timeout(Duration::from_secs(30))));
        let reply = answer(&generator, "q", &full_context(), DEFAULT_TIMEOUT).await;

        assert_eq!(reply.text, TIMEOUT_MESSAGE);
        assert_eq!(reply.sources.len(), 3);
    }

    #[tokio::test]
    async fn generator_error_is_reported_in_text() {
        let generator = Canned(Err(|| Error::Generation("model not found".into())));
        let reply = answer(&generator, "q", &AggregatedContext::default(), DEFAULT_TIMEOUT).await;

        assert!(reply.text.starts_with("Error generating response:"));
        assert!(reply.text.contains("model not found"));
        assert!(reply.sources.is_empty());
    }

    #[tokio::test]
    async fn successful_answer_is_trimmed() {
        let generator = Canned(Ok("  Bitcoin is up today.\n"));
        let reply = answer(&generator, "q", &full_context(), DEFAULT_TIMEOUT).await;
        assert_eq!(reply.text, "Bitcoin is up today.");
    }
}
