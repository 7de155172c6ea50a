use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, EngineCommand, MarketData, ReportSink};
use engine::{BinanceClient, Engine, LogSink};
use strategy::{BotConfig, StrategyRegistry, StrategyRunner};
use telegram_alert::{start_bot, BotDeps, TelegramSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env()?;
    info!(env = %cfg.binance_env, base_url = %cfg.base_url, "Signal bot starting");

    let bot_cfg = BotConfig::load_with_overlays(&cfg.bot_config_path, &cfg.bot_config_overlays)
        .with_context(|| format!("Failed to load bot config '{}'", cfg.bot_config_path))?;

    // ── Strategies ────────────────────────────────────────────────────────────
    // Unknown strategy identifiers fail here, before the exchange is contacted.
    let registry = StrategyRegistry::builtin()?;
    let client = Arc::new(BinanceClient::new(
        cfg.credentials.clone(),
        &cfg.base_url,
        &bot_cfg.exchange,
        bot_cfg.clock_guard.max_offset_ms,
    )?);
    let market: Arc<dyn MarketData> = client.clone();
    let runner = StrategyRunner::new(&registry, market, &bot_cfg.trading)?;

    // ── Exchange ──────────────────────────────────────────────────────────────
    client.ping().await.context("Exchange connectivity check failed")?;
    let offset_ms = client.clock().sync().await.context("Initial clock sync failed")?;
    info!(offset_ms, recv_window_ms = client.recv_window_ms(), "Exchange reachable");

    // ── Report sinks ──────────────────────────────────────────────────────────
    let mut sinks: Vec<Arc<dyn ReportSink>> = vec![Arc::new(LogSink)];
    let telegram = cfg.telegram_token.clone().map(teloxide::Bot::new);
    if let Some(bot) = &telegram {
        if cfg.telegram_allowed_user_ids.is_empty() {
            warn!("TELEGRAM_ALLOWED_USER_IDS is empty: alerts have no recipients and every command is refused");
        }
        sinks.push(Arc::new(TelegramSink::new(
            bot.clone(),
            cfg.telegram_allowed_user_ids.clone(),
            bot_cfg.alerts.notify_wait,
        )));
    }

    // ── Engine ────────────────────────────────────────────────────────────────
    let (engine, handle) = Engine::new(runner, sinks, bot_cfg.trading.cycle_interval());
    let engine = engine.with_clock_resync(client.clock(), Duration::from_secs(bot_cfg.exchange.resync_secs));
    let mut engine_task = tokio::spawn(engine.run());

    // ── Telegram commands ─────────────────────────────────────────────────────
    let bot_task = telegram.map(|bot| {
        let deps = BotDeps {
            engine: handle.clone(),
            allowed_user_ids: Arc::new(cfg.telegram_allowed_user_ids.clone()),
            symbols: Arc::new(bot_cfg.trading.symbols.iter().map(|s| s.symbol.clone()).collect()),
        };
        tokio::spawn(start_bot(bot, deps))
    });

    info!("All subsystems started. Waiting for shutdown signal.");
    let interrupted = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            true
        }
        res = &mut engine_task => {
            res.context("Engine task failed")?;
            false
        }
    };

    if interrupted {
        info!("Shutdown signal received, stopping after the current cycle");
        handle.send(EngineCommand::Stop).await;
        engine_task.await.context("Engine task failed")?;
    }
    if let Some(task) = bot_task {
        task.abort();
    }
    info!("Signal bot stopped");
    Ok(())
}
