use colored::Colorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::aggregate::AggregatedContext;
use crate::answer::format_number;
use crate::assistant::Reply;
use crate::provider::{CoinRef, MarketSnapshot, NOT_AVAILABLE, NewsItem, PriceSnapshot};

#[derive(Tabled)]
struct CoinRow {
    #[tabled(rename = "Rank")]
    rank: u32,
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Name")]
    name: String,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

/// Print the market-cap ranking as a styled table to stdout.
pub fn print_top_coins(coins: &[CoinRef]) {
    let rows: Vec<CoinRow> = coins
        .iter()
        .map(|c| CoinRow {
            rank: c.rank,
            symbol: c.symbol.to_uppercase().bold().to_string(),
            name: c.name.clone(),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print the answer, its sources and the related news.
pub fn print_reply(reply: &Reply) {
    println!("{}", reply.answer.text);

    if !reply.answer.sources.is_empty() {
        println!();
        println!("{} {}", "Sources:".bold(), reply.answer.sources.join(", ").dimmed());
    }

    if !reply.context.news.is_empty() {
        println!();
        print_news(&reply.context.news);
    }
}

/// Print everything gathered for a question.
pub fn print_context(context: &AggregatedContext) {
    let Some(coin_id) = &context.coin_id else {
        println!("{}", "No coin identified in the question.".dimmed());
        return;
    };

    println!("{} {}", "Coin:".bold(), coin_id);

    match &context.market {
        Some(market) => print_fields("Market data", market_rows(market)),
        None => println!("{}", "Market data unavailable.".dimmed()),
    }
    match &context.price {
        Some(price) => print_fields("Price data", price_rows(price)),
        None => println!("{}", "Price data unavailable.".dimmed()),
    }

    if context.news.is_empty() {
        println!("{}", "No recent news available.".dimmed());
    } else {
        print_news(&context.news);
    }

    if !context.sources.is_empty() {
        println!("{} {}", "Sources:".bold(), context.sources.join(", ").dimmed());
    }
}

fn print_fields(title: &str, rows: Vec<FieldRow>) {
    println!("{}", title.bold());
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

fn print_news(items: &[NewsItem]) {
    println!("{}", "Latest news".bold());
    for item in items {
        println!("- {} ({})", item.title.bold(), item.source);
        if !item.published_at.is_empty() {
            println!("  Published: {}", item.published_at.dimmed());
        }
        println!("  {}", item.url.dimmed());
    }
}

fn market_rows(m: &MarketSnapshot) -> Vec<FieldRow> {
    vec![
        FieldRow {
            field: "Name",
            value: m.name.clone(),
        },
        FieldRow {
            field: "Symbol",
            value: m.symbol.clone(),
        },
        FieldRow {
            field: "Rank",
            value: m
                .rank
                .map(|r| format!("#{}", r))
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        },
        FieldRow {
            field: "Market Cap",
            value: usd_or_na(m.market_cap_usd),
        },
        FieldRow {
            field: "24h Volume",
            value: usd_or_na(m.volume_24h_usd),
        },
        FieldRow {
            field: "24h Change",
            value: m
                .price_change_pct_24h
                .map(format_change)
                .unwrap_or_else(|| NOT_AVAILABLE.dimmed().to_string()),
        },
        FieldRow {
            field: "Website",
            value: if m.homepage_url.is_empty() {
                NOT_AVAILABLE.to_string()
            } else {
                m.homepage_url.clone()
            },
        },
    ]
}

fn price_rows(p: &PriceSnapshot) -> Vec<FieldRow> {
    vec![
        FieldRow {
            field: "Pair",
            value: p.exchange_symbol.clone(),
        },
        FieldRow {
            field: "Price",
            value: format_price(p.price),
        },
        FieldRow {
            field: "24h Change",
            value: format_change(p.price_change_pct_24h),
        },
        FieldRow {
            field: "24h High",
            value: format_price(p.high_24h),
        },
        FieldRow {
            field: "24h Low",
            value: format_price(p.low_24h),
        },
        FieldRow {
            field: "24h Volume",
            value: format_number(p.volume_24h),
        },
    ]
}

fn format_change(change: f64) -> String {
    if change >= 0.0 {
        format!("+{:.2}%", change).green().to_string()
    } else {
        format!("{:.2}%", change).red().to_string()
    }
}

fn usd_or_na(value: Option<f64>) -> String {
    value
        .map(|v| format!("${}", format_number(v)))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn format_price(price: f64) -> String {
    if price >= 1.0 {
        format!("${}", format_with_commas(price, 2))
    } else if price >= 0.01 {
        format!("${:.4}", price)
    } else {
        format!("${:.8}", price)
    }
}

fn format_with_commas(value: f64, decimals: usize) -> String {
    let formatted = format!("{value:.decimals$}");
    let (whole, fraction) = match formatted.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::new();
    for (i, ch) in whole.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let whole: String = grouped.chars().rev().collect();

    match fraction {
        Some(fraction) => format!("{}.{}", whole, fraction),
        None => whole,
    }
}
