use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use quick_xml::escape::resolve_html5_entity;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use super::cache::{Cache, Category};
use super::{MarketDataSource, NewsItem, NewsSource};
use crate::error::{Error, Result};

const FEED_URL: &str = "https://www.coindesk.com/arc/outboundfeeds/rss/";
const SOURCE_NAME: &str = "CoinDesk";

/// Default number of news items per coin.
pub const DEFAULT_NEWS_LIMIT: usize = 5;

/// CoinDesk RSS news source.
///
/// The feed is shared by all coins, so relevance is decided locally by matching
/// the coin's name and symbol against each entry.
pub struct CoinDesk {
    client: Client,
    feed_url: String,
    cache: Arc<Cache>,
    market: Arc<dyn MarketDataSource>,
}

impl CoinDesk {
    /// Create a CoinDesk source reading the production RSS feed.
    pub fn new(cache: Arc<Cache>, market: Arc<dyn MarketDataSource>) -> Self {
        Self::with_feed_url(FEED_URL, cache, market)
    }

    /// Create a CoinDesk source reading a custom feed URL.
    pub fn with_feed_url(
        feed_url: impl Into<String>,
        cache: Arc<Cache>,
        market: Arc<dyn MarketDataSource>,
    ) -> Self {
        Self {
            client: super::http_client(),
            feed_url: feed_url.into(),
            cache,
            market,
        }
    }

    async fn fetch_feed(&self) -> Result<Vec<FeedItem>> {
        debug!(url = %self.feed_url, "fetching CoinDesk RSS feed");

        let resp = self.client.get(&self.feed_url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        debug!(status = %status, body_len = body.len(), "CoinDesk response");
        trace!(body = %body, "CoinDesk response body");

        if !status.is_success() {
            return Err(Error::Api(format!("CoinDesk returned {}", status)));
        }

        parse_feed(&body)
    }

    async fn fetch_news(&self, coin_id: &str, limit: usize) -> Result<Vec<NewsItem>> {
        let market = self.market.market_snapshot(coin_id).await.ok_or_else(|| {
            Error::Api(format!("no market data to derive news keywords for '{}'", coin_id))
        })?;

        let entries = self.fetch_feed().await?;
        if entries.is_empty() {
            return Err(Error::NoResults);
        }

        let keywords = [market.symbol.to_lowercase(), market.name.to_lowercase()];
        let items = filter_relevant(entries, &keywords, limit);

        info!(coin_id = %coin_id, found = items.len(), "matched news items");
        Ok(items)
    }
}

#[async_trait]
impl NewsSource for CoinDesk {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn news(&self, coin_id: &str, limit: usize) -> Vec<NewsItem> {
        if let Some(mut items) = self.cache.get::<Vec<NewsItem>>(Category::News, coin_id).await {
            debug!(coin_id = %coin_id, "using cached news");
            items.truncate(limit);
            return items;
        }

        match self.fetch_news(coin_id, limit).await {
            Ok(items) => {
                self.cache.put(Category::News, coin_id, &items).await;
                items
            }
            Err(err) => {
                warn!(coin_id = %coin_id, error = %err, "failed to fetch news");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<FeedItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FeedItem {
    title: String,
    link: String,
    #[serde(rename = "pubDate")]
    pub_date: String,
    description: String,
}

fn parse_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let rss: Rss = quick_xml::de::from_str(xml)
        .map_err(|e| Error::Parse(format!("CoinDesk RSS: {}", e)))?;
    Ok(rss.channel.items)
}

/// Keep entries whose title or raw description mentions any keyword, in feed
/// order, up to `limit`.
fn filter_relevant(entries: Vec<FeedItem>, keywords: &[String], limit: usize) -> Vec<NewsItem> {
    let keywords: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();

    entries
        .into_iter()
        .filter(|entry| {
            let title = entry.title.to_lowercase();
            let description = entry.description.to_lowercase();
            keywords
                .iter()
                .any(|k| title.contains(k) || description.contains(k))
        })
        .take(limit)
        .map(|entry| NewsItem {
            title: entry.title.trim().to_string(),
            url: entry.link.trim().to_string(),
            source: SOURCE_NAME.to_string(),
            published_at: entry.pub_date.trim().to_string(),
            description: strip_html(&entry.description),
        })
        .collect()
}

/// Longest HTML5 named entity, plus the leading `&`.
const MAX_ENTITY_LEN: usize = 33;

/// Reduce an HTML fragment to its text content.
///
/// A `>` inside a quoted attribute value does not close the tag.
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut quote: Option<char> = None;
    for ch in html.chars() {
        if !in_tag {
            if ch == '<' {
                in_tag = true;
            } else {
                text.push(ch);
            }
            continue;
        }

        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '>') => in_tag = false,
            _ => {}
        }
    }

    decode_entities(&text).trim().to_string()
}

/// Decode named and numeric character references. Anything that does not
/// form a known reference is kept as written.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail
            .find(';')
            .filter(|&end| end <= MAX_ENTITY_LEN)
            .and_then(|end| decode_entity(&tail[1..end]).map(|text| (text, end + 1)));
        match decoded {
            Some((decoded, consumed)) => {
                out.push_str(&decoded);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<Cow<'static, str>> {
    let Some(number) = name.strip_prefix('#') else {
        return resolve_html5_entity(name).map(Cow::Borrowed);
    };

    let code = match number.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => number.parse().ok()?,
    };
    char::from_u32(code).map(|ch| Cow::Owned(ch.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_removes_tags_and_decodes_entities() {
        assert_eq!(
            strip_html("<p>Ether <b>rallied</b> &amp; held &#36;3,000</p>"),
            "Ether rallied & held $3,000"
        );
        assert_eq!(strip_html("  plain text  "), "plain text");
        assert_eq!(strip_html("R&D budget"), "R&D budget");
        assert_eq!(strip_html("&#x20AC;5 &unknownentity; left"), "€5 &unknownentity; left");
    }

    #[test]
    fn strip_html_decodes_html5_named_entities() {
        assert_eq!(
            strip_html("Bitcoin&rsquo;s rally &mdash; again&hellip;"),
            "Bitcoin\u{2019}s rally \u{2014} again\u{2026}"
        );
    }

    #[test]
    fn strip_html_keeps_quoted_angle_brackets_inside_tags() {
        assert_eq!(
            strip_html("<p>Bitcoin&rsquo;s rally &mdash; &hellip; <a title=\"a>b\">x</a></p>"),
            "Bitcoin\u{2019}s rally \u{2014} \u{2026} x"
        );
        assert_eq!(strip_html("<img alt='1 > 0'>ok"), "ok");
    }

    #[test]
    fn parse_feed_reads_items_and_ignores_other_channel_elements() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>CoinDesk</title>
    <link>https://www.coindesk.com</link>
    <item>
      <title>Bitcoin tops $100K</title>
      <link>https://www.coindesk.com/a</link>
      <dc:creator>Reporter</dc:creator>
      <pubDate>Mon, 01 Jan 2024 10:00:00 +0000</pubDate>
      <description><![CDATA[<p>BTC <i>rises</i>.</p>]]></description>
    </item>
    <item>
      <title>Markets wrap</title>
      <link>https://www.coindesk.com/b</link>
      <pubDate>Mon, 01 Jan 2024 09:00:00 +0000</pubDate>
    </item>
  </channel>
</rss>"#;

        let items = parse_feed(xml).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Bitcoin tops $100K");
        assert_eq!(items[0].description, "<p>BTC <i>rises</i>.</p>");
        assert_eq!(items[1].description, "");
    }

    #[test]
    fn parse_feed_rejects_garbage() {
        assert!(matches!(parse_feed("not xml at all"), Err(Error::Parse(_))));
    }

    #[test]
    fn filter_relevant_matches_case_insensitively_and_respects_limit() {
        let entry = |title: &str, description: &str| FeedItem {
            title: title.into(),
            link: format!("https://example.com/{}", title.len()),
            pub_date: String::new(),
            description: description.into(),
        };
        let entries = vec![
            entry("SOLANA upgrade", ""),
            entry("Unrelated", "<p>nothing here</p>"),
            entry("Weekly recap", "<p>SOL holders cheer</p>"),
            entry("Another Solana story", ""),
        ];
        let keywords = vec!["sol".to_string(), "solana".to_string()];

        let items = filter_relevant(entries, &keywords, 2);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "SOLANA upgrade");
        assert_eq!(items[1].title, "Weekly recap");
        assert_eq!(items[1].description, "SOL holders cheer");
        assert_eq!(items[1].source, "CoinDesk");
    }
}
