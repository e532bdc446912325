use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use clap::builder::RangedU64ValueParser;
use cryptoask::assistant::Assistant;
use cryptoask::error::{Error, Result};
use cryptoask::{config, output};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const APP_VERSION: &str = env!("CRYPTOASK_VERSION");

#[derive(Parser)]
#[command(
    name = "cryptoask",
    version = APP_VERSION,
    about = "Ask questions about cryptocurrencies, answered from live market data"
)]
struct Cli {
    /// Question to answer (e.g. "What's the current price of Bitcoin?")
    question: Vec<String>,

    /// List the top coins by market cap instead of answering a question
    #[arg(
        long,
        num_args = 0..=1,
        default_missing_value = "20",
        conflicts_with = "question",
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    top: Option<usize>,

    /// Print the gathered market, price and news data without calling the model
    #[arg(long)]
    context_only: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Ollama model used to generate answers
    #[arg(long, env = "OLLAMA_MODEL")]
    model: Option<String>,

    /// Ollama server URL
    #[arg(long)]
    ollama_url: Option<String>,

    /// Seconds to wait for the model before giving up
    #[arg(long)]
    timeout: Option<u64>,

    /// CoinGecko API key
    #[arg(long, env = "COINGECKO_API_KEY")]
    api_key: Option<String>,

    /// Number of coins fetched for the ranking used to recognize coins
    #[arg(long, env = "TOP_COINS_LIMIT")]
    top_coins_limit: Option<usize>,

    /// Explicit config file path (overrides XDG lookup)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    // Load .env before CLI parsing so env-backed args (e.g. COINGECKO_API_KEY) pick it up.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!(error = %e, "fatal error");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn resolve_settings(cli: &Cli, app_config: &config::AppConfig) -> config::Settings {
    let mut settings = app_config.settings();

    if let Some(key) = cli.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        settings.coingecko_api_key = Some(key.to_string());
    }
    if let Some(limit) = cli.top_coins_limit {
        settings.top_coins_limit = limit;
    }
    if let Some(model) = cli.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        settings.model = model.to_string();
    }
    if let Some(url) = &cli.ollama_url {
        settings.ollama_url = Some(url.clone());
    }
    if let Some(secs) = cli.timeout {
        settings.answer_timeout = Duration::from_secs(secs);
    }

    settings
}

async fn run(cli: Cli) -> Result<()> {
    let app_config = match cli.config.as_deref() {
        Some(path) => config::load_from_path(path)?,
        None => config::load()?,
    };
    let settings = resolve_settings(&cli, &app_config);
    let assistant = Assistant::from_config(&settings);

    if let Some(limit) = cli.top {
        info!(limit, "listing top coins");

        let coins = assistant.top_coins(limit).await;
        if coins.is_empty() {
            return Err(Error::NoResults);
        }

        if cli.json {
            output::json::print_json(&coins)?;
        } else {
            output::table::print_top_coins(&coins);
        }
        return Ok(());
    }

    let question = cli.question.join(" ").trim().to_string();
    if question.is_empty() {
        return Err(Error::Config(
            "no question provided -- usage: cryptoask \"What's the current price of Bitcoin?\""
                .into(),
        ));
    }

    if cli.context_only {
        info!(question = %question, "gathering context");
        let context = assistant.context(&question).await;
        if cli.json {
            output::json::print_json(&context)?;
        } else {
            output::table::print_context(&context);
        }
        return Ok(());
    }

    info!(question = %question, model = %settings.model, "answering question");
    let reply = assistant.ask(&question).await;

    if cli.json {
        output::json::print_json(&reply)?;
    } else {
        output::table::print_reply(&reply);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_config_file() {
        let cli = Cli::parse_from([
            "cryptoask",
            "--model",
            "mistral",
            "--timeout",
            "5",
            "--top-coins-limit",
            "100",
            "price of btc",
        ]);
        let app_config = config::AppConfig::default();

        let settings = resolve_settings(&cli, &app_config);
        assert_eq!(settings.model, "mistral");
        assert_eq!(settings.answer_timeout, Duration::from_secs(5));
        assert_eq!(settings.top_coins_limit, 100);
        assert_eq!(cli.question, vec!["price of btc"]);
    }

    #[test]
    fn top_flag_defaults_to_twenty() {
        let cli = Cli::parse_from(["cryptoask", "--top"]);
        assert_eq!(cli.top, Some(20));
    }

    #[test]
    fn top_flag_rejects_zero() {
        assert!(Cli::try_parse_from(["cryptoask", "--top", "0"]).is_err());
        let cli = Cli::try_parse_from(["cryptoask", "--top", "3"]).unwrap();
        assert_eq!(cli.top, Some(3));
    }
}
