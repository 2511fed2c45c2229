//! Moonshot TP/SL CLI
//!
//! Runs the exit monitor, lists recorded positions, and places manual trades.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use moonshot_tpsl::ledger::{self, JsonLedgerStore, LedgerHandle};
use moonshot_tpsl::services::exit_policy::thresholds;
use moonshot_tpsl::services::retry::{with_retry, RetryConfig};
use moonshot_tpsl::services::{
    Clock, ExitExecutor, Metrics, MoonshotPriceClient, PositionMonitor, SolanaApisClient, TokioClock, TradeApi,
};
use moonshot_tpsl::{Acquisition, Config, DiscordWebhook, PositionStatus};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "moonshot-tpsl")]
#[command(about = "Take-profit / stop-loss exit engine for Moonshot positions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor open positions until Ctrl+C
    Run,

    /// Show every position in the ledger
    Positions,

    /// Buy a token and start tracking it
    Buy {
        /// SOL to spend
        amount: Decimal,

        /// Token mint address
        mint: String,
    },

    /// Sell tokens outside the monitor (the ledger is not updated)
    Sell {
        /// Tokens to sell
        amount: Decimal,

        /// Token mint address
        mint: String,
    },

    /// Show the wallet's token balance for a mint
    Balance {
        /// Token mint address
        mint: String,

        /// Wallet public key (defaults to WALLET_ADDRESS)
        #[arg(long)]
        wallet: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG overrides the verbosity flag
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = Config::from_env()?;

    match cli.command {
        Commands::Run => run_monitor(&config).await?,
        Commands::Positions => show_positions(&config).await?,
        Commands::Buy { amount, mint } => buy(&config, amount, mint).await?,
        Commands::Sell { amount, mint } => sell(&config, amount, &mint).await?,
        Commands::Balance { mint, wallet } => balance(&config, &mint, wallet).await?,
    }

    Ok(())
}

async fn run_monitor(config: &Config) -> Result<()> {
    let credentials = config.trade_credentials()?;

    println!("\n{}", "=".repeat(70));
    println!("  MOONSHOT TP/SL MONITOR");
    println!(
        "  Take Profit: +{}% | Stop Loss: -{}% | Max Sell Retries: {}",
        config.take_profit, config.stop_loss, config.max_sell_retries
    );
    println!("  Ledger: {}", config.records_path.display());
    println!(
        "  Discord Webhook: {}",
        if config.discord_webhook_url.is_some() { "ENABLED" } else { "DISABLED" }
    );
    println!("{}\n", "=".repeat(70));

    let shutdown = CancellationToken::new();
    let clock: Arc<dyn Clock> = Arc::new(TokioClock);
    let metrics = Metrics::new();

    let ledger = LedgerHandle::spawn(JsonLedgerStore::new(&config.records_path));
    let oracle = Arc::new(MoonshotPriceClient::new(
        &config.price_api_url,
        config.http_timeout,
        clock.clone(),
    )?);
    let trade_api = Arc::new(SolanaApisClient::new(
        &config.trade_api_url,
        credentials,
        config.http_timeout,
    )?);
    let webhook = config
        .discord_webhook_url
        .clone()
        .map(|url| DiscordWebhook::new(url, config.http_timeout));

    let executor = ExitExecutor::new(
        trade_api,
        ledger.clone(),
        clock.clone(),
        config.max_sell_retries,
        shutdown.clone(),
    )
    .with_metrics(metrics.clone())
    .with_webhook(webhook);

    let monitor = PositionMonitor::new(
        ledger,
        oracle,
        executor,
        clock,
        config.monitor_settings(),
        shutdown.clone(),
    )
    .with_metrics(metrics.clone());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, finishing current step...");
                signal_token.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    println!("Monitoring positions (Ctrl+C to stop)...\n");
    monitor.run().await;

    info!("Final metrics: {}", serde_json::to_string(&metrics.snapshot())?);
    Ok(())
}

async fn show_positions(config: &Config) -> Result<()> {
    let ledger = JsonLedgerStore::new(&config.records_path)
        .load()
        .await
        .with_context(|| format!("failed to read {}", config.records_path.display()))?;

    println!("\n{}", "=".repeat(70));
    println!("  POSITIONS ({})", config.records_path.display());
    println!("{}", "=".repeat(70));

    if ledger.is_empty() {
        println!("\nNo positions recorded.\n");
        return Ok(());
    }

    for (i, p) in ledger.iter().enumerate() {
        let status = match p.status {
            PositionStatus::Open => p.status.to_string().green().bold(),
            PositionStatus::Closed => p.status.to_string().blue(),
            PositionStatus::Failed => p.status.to_string().red().bold(),
        };

        println!("\n{}. {} [{}]", i + 1, p.mint, status);
        println!(
            "   Invested: {} SOL | Tokens: {} | Entry: ${}",
            p.base_invested, p.token_quantity, p.entry_price
        );

        match p.status {
            PositionStatus::Open => {
                let (tp, sl) = thresholds(p.entry_price, config.take_profit, config.stop_loss);
                let last = match p.last_observed_price {
                    Some(price) => {
                        let pnl = p.pnl_percent(price).round_dp(1);
                        let pnl = if pnl.is_sign_negative() {
                            format!("{}%", pnl).red()
                        } else {
                            format!("+{}%", pnl).green()
                        };
                        format!("${} ({})", price, pnl)
                    }
                    None => "not yet priced".to_string(),
                };
                let level = |l: Option<Decimal>| l.map(|v| format!("${}", v)).unwrap_or_else(|| "-".to_string());
                println!("   Last: {} | TP at {} | SL at {}", last, level(tp), level(sl));
            }
            PositionStatus::Closed => {
                println!(
                    "   Sold for: {} SOL | Exit: {}",
                    p.proceeds.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
                    p.exit_price.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
                );
            }
            PositionStatus::Failed => {
                println!("   {}", "Sell failed, manual action needed".yellow());
            }
        }
    }

    let open = ledger.open_positions().count();
    println!("\n{}", "-".repeat(70));
    println!("Total: {} positions, {} open\n", ledger.len(), open);

    Ok(())
}

async fn buy(config: &Config, amount: Decimal, mint: String) -> Result<()> {
    if amount <= Decimal::ZERO {
        anyhow::bail!("amount must be positive (got {})", amount);
    }

    let api = SolanaApisClient::new(&config.trade_api_url, config.trade_credentials()?, config.http_timeout)?;

    info!("Buying {} with {} SOL", mint, amount);
    let receipt = api.buy(&mint, amount).await.context("buy failed")?;
    info!(
        "Bought {} tokens of {} at ${} (tx {})",
        receipt.tokens, mint, receipt.price_usd, receipt.txid
    );

    let acquisition = Acquisition {
        mint: mint.clone(),
        base_invested: amount,
        token_quantity: receipt.tokens,
        entry_price: receipt.price_usd,
    };

    // Tokens are already bought, so try hard to get them into the ledger
    let handle = LedgerHandle::spawn(JsonLedgerStore::new(&config.records_path));
    let retry = RetryConfig::fixed(3, ledger::RETRY_DELAY);
    let position = with_retry(&TokioClock, &retry, "record acquisition", |_| {
        handle.record_acquisition(acquisition.clone())
    })
    .await
    .map_err(|exhausted| {
        anyhow::anyhow!(
            "bought {} tokens of {} (tx {}) but could not record them: {}",
            receipt.tokens,
            mint,
            receipt.txid,
            exhausted.last_error
        )
    })?;

    println!(
        "\n{} {} | {} tokens | {} SOL invested | entry ${}\n",
        "Tracking".green().bold(),
        position.mint,
        position.token_quantity,
        position.base_invested,
        position.entry_price
    );

    Ok(())
}

async fn sell(config: &Config, amount: Decimal, mint: &str) -> Result<()> {
    if amount <= Decimal::ZERO {
        anyhow::bail!("amount must be positive (got {})", amount);
    }

    let api = SolanaApisClient::new(&config.trade_api_url, config.trade_credentials()?, config.http_timeout)?;

    info!("Selling {} tokens of {}", amount, mint);
    let receipt = api.sell(mint, amount).await.context("sell failed")?;

    println!(
        "\n{} {} tokens of {} | {} SOL received | tx {}\n",
        "Sold".green().bold(),
        amount,
        mint,
        receipt.proceeds,
        receipt.txid
    );

    Ok(())
}

async fn balance(config: &Config, mint: &str, wallet: Option<String>) -> Result<()> {
    let wallet = wallet
        .or_else(|| config.wallet_address.clone())
        .context("pass --wallet or set WALLET_ADDRESS")?;

    let api = SolanaApisClient::new(&config.trade_api_url, config.trade_credentials()?, config.http_timeout)?
        .with_balance_url(&config.balance_api_url);

    let balance = api
        .token_balance(&wallet, mint)
        .await
        .context("balance check failed")?;

    println!("\n{} {}: {}\n", "Balance".green().bold(), mint, balance);

    Ok(())
}
