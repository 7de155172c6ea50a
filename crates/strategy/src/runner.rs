use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use common::{Error, MarketData, Result, Signal, SignalReport, MAX_CANDLES_PER_FETCH};

use crate::config::TradingConfig;
use crate::params::StrategyParams;
use crate::registry::StrategyRegistry;
use crate::Strategy;

/// One configured instrument, resolved against the registry.
pub struct Instrument {
    symbol: String,
    strategy: Arc<dyn Strategy>,
    /// Validated params, or the reason the instrument cannot be evaluated.
    params: std::result::Result<StrategyParams, String>,
    fetch_limit: usize,
}

impl Instrument {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn strategy_id(&self) -> &'static str {
        self.strategy.identifier()
    }

    /// Candles requested per cycle, including the bar that is still open.
    pub fn fetch_limit(&self) -> usize {
        self.fetch_limit
    }

    /// Whether params passed validation at setup.
    pub fn is_ready(&self) -> bool {
        self.params.is_ok()
    }
}

/// Evaluates every configured instrument once per cycle.
pub struct StrategyRunner {
    market: Arc<dyn MarketData>,
    interval: String,
    interval_ms: i64,
    live_snapshot: bool,
    instruments: Vec<Instrument>,
}

impl StrategyRunner {
    /// Resolve every instrument without touching the network.
    ///
    /// An unknown strategy identifier fails the whole setup. Invalid params
    /// only disable their instrument: it reports `Error::Config` every cycle.
    pub fn new(
        registry: &StrategyRegistry,
        market: Arc<dyn MarketData>,
        trading: &TradingConfig,
    ) -> Result<Self> {
        let mut instruments = Vec::with_capacity(trading.symbols.len());
        for cfg in &trading.symbols {
            let strategy = registry.get(&cfg.strategy)?;
            let params = strategy.validate_params(&cfg.params).and_then(|params| {
                let needed = strategy.minimum_history(&params);
                if needed + 1 > MAX_CANDLES_PER_FETCH {
                    return Err(Error::Config(format!(
                        "{} needs {needed} closed candles, more than one request returns ({MAX_CANDLES_PER_FETCH})",
                        cfg.strategy
                    )));
                }
                Ok(params)
            });
            let fetch_limit = match &params {
                Ok(p) => (trading.lookback.max(strategy.minimum_history(p)) + 1)
                    .min(MAX_CANDLES_PER_FETCH),
                Err(_) => 0,
            };

            match &params {
                Ok(_) => info!(
                    symbol = %cfg.symbol,
                    strategy = %cfg.strategy,
                    fetch_limit,
                    "Instrument ready"
                ),
                Err(e) => warn!(symbol = %cfg.symbol, strategy = %cfg.strategy, error = %e, "Instrument disabled"),
            }

            instruments.push(Instrument {
                symbol: cfg.symbol.clone(),
                strategy,
                params: params.map_err(|e| e.to_string()),
                fetch_limit,
            });
        }

        Ok(Self {
            market,
            interval: trading.interval.clone(),
            interval_ms: trading.interval_ms(),
            live_snapshot: trading.live_snapshot,
            instruments,
        })
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Evaluate all instruments concurrently. One result per instrument,
    /// in configuration order; a failure never affects the others.
    pub async fn run_cycle(&self) -> Vec<(String, Result<SignalReport>)> {
        let evaluations = self.instruments.iter().map(|inst| async move {
            (inst.symbol.clone(), self.evaluate(inst).await)
        });
        join_all(evaluations).await
    }

    /// Fetch, annotate and decide for one instrument.
    ///
    /// Only closed bars are evaluated: the newest kline is still forming and
    /// is dropped. With live snapshots on, the current price takes its place
    /// as a synthetic bar.
    pub async fn evaluate(&self, inst: &Instrument) -> Result<SignalReport> {
        let params = inst.params.as_ref().map_err(|msg| Error::Config(msg.clone()))?;
        let strategy = inst.strategy.as_ref();

        let mut series = self
            .market
            .get_ohlcv(&inst.symbol, &self.interval, inst.fetch_limit)
            .await?
            .closed();

        let mut live_price = None;
        if self.live_snapshot && !series.is_empty() {
            let price = self.market.get_price(&inst.symbol).await?;
            series = series.with_live_price(price, self.interval_ms);
            live_price = Some(price);
        }

        let annotated = strategy.compute_indicators(&series, params);
        let needed = strategy.minimum_history(params);
        let signal = if annotated.len() < needed || annotated.valid_rows() < 2 {
            debug!(
                symbol = %inst.symbol,
                rows = annotated.len(),
                valid = annotated.valid_rows(),
                needed,
                "Warming up"
            );
            Signal::Wait
        } else {
            strategy.generate_signal(&annotated, params)
        };

        let price = match (annotated.last(), live_price) {
            (Some(candle), _) => candle.close,
            (None, Some(price)) => price,
            (None, None) => self.market.get_price(&inst.symbol).await?,
        };

        Ok(SignalReport {
            symbol: inst.symbol.clone(),
            strategy: strategy.identifier().to_string(),
            signal,
            price,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use common::{Candle, CandleSeries};

    use super::*;
    use crate::config::InstrumentConfig;
    use crate::params::ParamSpec;

    /// Serves the newest of `available` rising one-minute candles per
    /// symbol. The newest opens in the current minute, like a live kline
    /// feed. Symbols starting with "BAD" fail with a transient error.
    struct FakeMarket {
        available: usize,
        price: f64,
        ohlcv_calls: AtomicUsize,
        price_calls: AtomicUsize,
        limits: Mutex<Vec<usize>>,
    }

    impl FakeMarket {
        fn new(available: usize) -> Arc<Self> {
            Arc::new(Self {
                available,
                price: 500.0,
                ohlcv_calls: AtomicUsize::new(0),
                price_calls: AtomicUsize::new(0),
                limits: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl MarketData for FakeMarket {
        async fn get_ohlcv(&self, symbol: &str, _interval: &str, limit: usize) -> Result<CandleSeries> {
            self.ohlcv_calls.fetch_add(1, Ordering::SeqCst);
            self.limits.lock().unwrap().push(limit);
            if symbol.starts_with("BAD") {
                return Err(Error::TransientNetwork("connection reset".into()));
            }
            let current_minute = Utc::now().timestamp_millis() / 60_000;
            let first_minute = current_minute - self.available as i64 + 1;
            let candles = (self.available - self.available.min(limit)..self.available)
                .map(|i| {
                    let close = 100.0 + i as f64;
                    Candle {
                        open_time: Utc
                            .timestamp_millis_opt((first_minute + i as i64) * 60_000)
                            .unwrap(),
                        open: close,
                        high: close,
                        low: close,
                        close,
                        volume: 1.0,
                    }
                })
                .collect();
            Ok(CandleSeries::new(candles))
        }

        async fn get_price(&self, _symbol: &str) -> Result<f64> {
            self.price_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.price)
        }
    }

    /// Buys whenever it is allowed to decide.
    struct AlwaysBuy;

    impl Strategy for AlwaysBuy {
        fn identifier(&self) -> &'static str {
            "always_buy"
        }

        fn schema(&self) -> &'static [ParamSpec] {
            const SCHEMA: &[ParamSpec] = &[ParamSpec::int("history", 3)];
            SCHEMA
        }

        fn minimum_history(&self, params: &StrategyParams) -> usize {
            params.get_usize("history").unwrap_or(3)
        }

        fn compute_indicators(&self, series: &CandleSeries, _params: &StrategyParams) -> CandleSeries {
            series.clone()
        }

        fn generate_signal(&self, _series: &CandleSeries, _params: &StrategyParams) -> Signal {
            Signal::Buy
        }
    }

    /// Keeps every series it is asked to decide on.
    struct Recorder {
        seen: Arc<Mutex<Vec<CandleSeries>>>,
    }

    impl Strategy for Recorder {
        fn identifier(&self) -> &'static str {
            "recorder"
        }

        fn schema(&self) -> &'static [ParamSpec] {
            &[]
        }

        fn minimum_history(&self, _params: &StrategyParams) -> usize {
            3
        }

        fn compute_indicators(&self, series: &CandleSeries, _params: &StrategyParams) -> CandleSeries {
            series.clone()
        }

        fn generate_signal(&self, series: &CandleSeries, _params: &StrategyParams) -> Signal {
            self.seen.lock().unwrap().push(series.clone());
            Signal::Wait
        }
    }

    fn registry() -> StrategyRegistry {
        StrategyRegistry::builder()
            .register(AlwaysBuy)
            .unwrap()
            .register(crate::MaRsi)
            .unwrap()
            .build()
    }

    async fn recorded_series(live_snapshot: bool) -> CandleSeries {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registry = StrategyRegistry::builder()
            .register(Recorder { seen: seen.clone() })
            .unwrap()
            .build();
        let mut cfg = trading(vec![instrument("BTCUSDT", "recorder", &[])]);
        cfg.live_snapshot = live_snapshot;
        let runner = StrategyRunner::new(&registry, FakeMarket::new(50), &cfg).unwrap();
        runner.evaluate(&runner.instruments()[0]).await.unwrap();
        let series = seen.lock().unwrap().pop().unwrap();
        series
    }

    fn instrument(symbol: &str, strategy: &str, params: &[(&str, toml::Value)]) -> InstrumentConfig {
        InstrumentConfig {
            symbol: symbol.into(),
            strategy: strategy.into(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<HashMap<_, _>>(),
        }
    }

    fn trading(symbols: Vec<InstrumentConfig>) -> TradingConfig {
        TradingConfig {
            interval: "1m".into(),
            lookback: 10,
            live_snapshot: false,
            cycle_secs: None,
            symbols,
        }
    }

    #[test]
    fn unknown_strategy_fails_before_any_fetch() {
        let market = FakeMarket::new(50);
        let cfg = trading(vec![instrument("BTCUSDT", "no_such_strategy", &[])]);
        let result = StrategyRunner::new(&registry(), market.clone(), &cfg);
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(market.ohlcv_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn fetch_limit_covers_minimum_history() {
        let market = FakeMarket::new(50);
        let cfg = trading(vec![
            instrument("BTCUSDT", "ma_rsi", &[]),
            instrument("ETHUSDT", "always_buy", &[]),
        ]);
        let runner = StrategyRunner::new(&registry(), market, &cfg).unwrap();
        assert_eq!(runner.instruments()[0].fetch_limit(), 27);
        assert_eq!(runner.instruments()[1].fetch_limit(), 11);
    }

    #[tokio::test]
    async fn bad_params_skip_only_that_instrument() {
        let market = FakeMarket::new(50);
        let cfg = trading(vec![
            instrument("BTCUSDT", "always_buy", &[("histroy", toml::Value::Integer(4))]),
            instrument("ETHUSDT", "always_buy", &[]),
        ]);
        let runner = StrategyRunner::new(&registry(), market.clone(), &cfg).unwrap();
        assert!(!runner.instruments()[0].is_ready());

        let results = runner.run_cycle().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "BTCUSDT");
        assert!(matches!(results[0].1, Err(Error::Config(_))));
        assert_eq!(results[1].1.as_ref().unwrap().signal, Signal::Buy);
        assert_eq!(market.ohlcv_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn history_beyond_one_request_disables_instrument() {
        let market = FakeMarket::new(50);
        let cfg = trading(vec![instrument(
            "BTCUSDT",
            "always_buy",
            &[("history", toml::Value::Integer(5_000))],
        )]);
        let runner = StrategyRunner::new(&registry(), market.clone(), &cfg).unwrap();
        let result = runner.evaluate(&runner.instruments()[0]).await;
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(market.ohlcv_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn network_failure_is_isolated() {
        let market = FakeMarket::new(50);
        let cfg = trading(vec![
            instrument("BADUSDT", "always_buy", &[]),
            instrument("ETHUSDT", "always_buy", &[]),
        ]);
        let runner = StrategyRunner::new(&registry(), market, &cfg).unwrap();
        let results = runner.run_cycle().await;
        assert!(matches!(results[0].1, Err(Error::TransientNetwork(_))));
        let report = results[1].1.as_ref().unwrap();
        assert_eq!(report.signal, Signal::Buy);
        assert_eq!(report.price, 148.0);
        assert_eq!(report.strategy, "always_buy");
    }

    #[tokio::test]
    async fn short_history_waits_without_error() {
        let market = FakeMarket::new(2);
        let cfg = trading(vec![
            instrument("BTCUSDT", "always_buy", &[]),
            instrument("ETHUSDT", "ma_rsi", &[]),
        ]);
        let runner = StrategyRunner::new(&registry(), market, &cfg).unwrap();
        for (_, result) in runner.run_cycle().await {
            let report = result.unwrap();
            assert_eq!(report.signal, Signal::Wait);
            assert_eq!(report.price, 100.0);
        }
    }

    #[tokio::test]
    async fn live_snapshot_appends_latest_price() {
        let market = FakeMarket::new(50);
        let mut cfg = trading(vec![instrument("BTCUSDT", "always_buy", &[])]);
        cfg.live_snapshot = true;
        let runner = StrategyRunner::new(&registry(), market.clone(), &cfg).unwrap();
        let report = runner.evaluate(&runner.instruments()[0]).await.unwrap();
        assert_eq!(report.price, 500.0);
        assert_eq!(market.price_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_series_falls_back_to_ticker_price() {
        let market = FakeMarket::new(0);
        let cfg = trading(vec![instrument("BTCUSDT", "always_buy", &[])]);
        let runner = StrategyRunner::new(&registry(), market.clone(), &cfg).unwrap();
        let report = runner.evaluate(&runner.instruments()[0]).await.unwrap();
        assert_eq!(report.signal, Signal::Wait);
        assert_eq!(report.price, 500.0);
        assert_eq!(*market.limits.lock().unwrap(), vec![11]);
    }

    #[tokio::test]
    async fn open_bar_is_never_evaluated() {
        let series = recorded_series(false).await;
        assert_eq!(series.len(), 10);
        let now = Utc::now();
        let last = series.last().unwrap();
        assert_eq!(last.close, 148.0);
        assert!(last.open_time + chrono::Duration::minutes(1) <= now);
    }

    #[tokio::test]
    async fn live_candle_replaces_the_open_bar() {
        let series = recorded_series(true).await;
        assert_eq!(series.len(), 11);
        let candles = series.candles();
        let (prior, live) = (&candles[9], &candles[10]);
        assert_eq!(prior.close, 148.0);
        assert_eq!(live.close, 500.0);
        assert_eq!(live.open, 148.0);
        assert_eq!(live.open_time - prior.open_time, chrono::Duration::minutes(1));
        assert!(live.open_time <= Utc::now());
    }
}
