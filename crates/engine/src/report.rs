use async_trait::async_trait;
use tracing::{info, warn};

use common::{ReportSink, Result, Signal, SignalReport};

/// Writes every evaluation to the log. Always installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    async fn report(&self, report: &SignalReport) -> Result<()> {
        match report.signal {
            Signal::Wait => info!(
                symbol = %report.symbol,
                strategy = %report.strategy,
                price = report.price,
                "WAIT"
            ),
            signal => info!(
                symbol = %report.symbol,
                strategy = %report.strategy,
                price = report.price,
                signal = %signal,
                "Signal"
            ),
        }
        Ok(())
    }

    async fn report_failure(&self, symbol: &str, error: &str) -> Result<()> {
        warn!(symbol, error, "No signal this cycle");
        Ok(())
    }
}
