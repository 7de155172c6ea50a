use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::prelude::*;

use common::{Error, ReportSink, Result, Signal, SignalReport};

/// Sends BUY/SELL reports (and WAIT when enabled) plus evaluation failures
/// to a fixed set of chats. Each message is sent once; failed deliveries
/// are returned as `Error::Alert` for the caller to log.
pub struct TelegramSink {
    bot: Bot,
    chat_ids: Vec<ChatId>,
    notify_wait: bool,
}

impl TelegramSink {
    pub fn new(bot: Bot, chat_ids: Vec<i64>, notify_wait: bool) -> Self {
        Self {
            bot,
            chat_ids: chat_ids.into_iter().map(ChatId).collect(),
            notify_wait,
        }
    }

    async fn broadcast(&self, text: String) -> Result<()> {
        let mut failed = Vec::new();
        for &chat_id in &self.chat_ids {
            if let Err(e) = self.bot.send_message(chat_id, text.clone()).await {
                failed.push(format!("chat {}: {e}", chat_id.0));
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::Alert(failed.join("; ")))
        }
    }
}

fn should_send(signal: Signal, notify_wait: bool) -> bool {
    signal != Signal::Wait || notify_wait
}

fn stamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `[ts] SIGNAL | SYMBOL SIDE @ price`
fn format_report(report: &SignalReport) -> String {
    format!(
        "[{}] SIGNAL | {} {} @ {}",
        stamp(report.timestamp),
        report.symbol,
        report.signal,
        report.price
    )
}

fn format_failure(ts: DateTime<Utc>, symbol: &str, error: &str) -> String {
    format!("[{}] FAILED | {symbol}: {error}", stamp(ts))
}

#[async_trait]
impl ReportSink for TelegramSink {
    async fn report(&self, report: &SignalReport) -> Result<()> {
        if !should_send(report.signal, self.notify_wait) {
            return Ok(());
        }
        self.broadcast(format_report(report)).await
    }

    async fn report_failure(&self, symbol: &str, error: &str) -> Result<()> {
        self.broadcast(format_failure(Utc::now(), symbol, error)).await
    }
}
