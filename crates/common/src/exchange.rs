use async_trait::async_trait;

use crate::{CandleSeries, Result, SignalReport};

/// Largest candle count a single market data request may ask for.
pub const MAX_CANDLES_PER_FETCH: usize = 1000;

/// Read-only market data access.
///
/// `BinanceClient` implements this over the REST API. The strategy runner
/// only ever sees a `dyn MarketData`, which keeps it testable with a fake.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Fetch up to `limit` candles for `symbol`, oldest first.
    ///
    /// Callers size `limit` from the strategy's minimum history; the
    /// implementation does no strategy-aware sizing.
    async fn get_ohlcv(&self, symbol: &str, interval: &str, limit: usize) -> Result<CandleSeries>;

    /// Latest trade price for a symbol.
    async fn get_price(&self, symbol: &str) -> Result<f64>;
}

/// Destination for per-instrument evaluation results.
///
/// The main loop calls every configured sink once per instrument per cycle.
/// Sinks own delivery; the loop neither retries nor waits on redelivery.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn report(&self, report: &SignalReport) -> Result<()>;

    /// Called when an instrument could not be evaluated this cycle.
    async fn report_failure(&self, symbol: &str, error: &str) -> Result<()>;
}
