use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV bar as returned by the klines endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Ordered candles plus derived indicator columns.
///
/// Every column holds exactly one slot per candle. `None` marks a position
/// where the indicator is not yet computable (warm-up). Indicator transforms
/// take `&CandleSeries` and return a new series, so one fetched series can be
/// shared by several strategies in the same cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleSeries {
    candles: Vec<Candle>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl CandleSeries {
    /// Build a series from candles. Candles are sorted by `open_time` and
    /// duplicate open times are dropped, keeping the last one received.
    pub fn new(mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.open_time);
        let mut deduped: Vec<Candle> = Vec::with_capacity(candles.len());
        for candle in candles {
            match deduped.last_mut() {
                Some(last) if last.open_time == candle.open_time => *last = candle,
                _ => deduped.push(candle),
            }
        }
        Self {
            candles: deduped,
            columns: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.low).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    /// Names of all derived columns, in sorted order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Value of column `name` at row `index`, `None` if the column is missing,
    /// the row is out of range, or the value is still in warm-up.
    pub fn value(&self, name: &str, index: usize) -> Option<f64> {
        self.columns.get(name)?.get(index).copied().flatten()
    }

    /// Return a copy of this series with `values` stored under `name`.
    ///
    /// The column is truncated or left-padded with `None` so that it always
    /// lines up with the candles. An existing column of the same name is
    /// replaced.
    pub fn with_column(&self, name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        let mut out = self.clone();
        out.insert_column(name.into(), values);
        out
    }

    fn insert_column(&mut self, name: String, mut values: Vec<Option<f64>>) {
        let n = self.candles.len();
        if values.len() > n {
            values.drain(..values.len() - n);
        } else if values.len() < n {
            let mut padded = vec![None; n - values.len()];
            padded.append(&mut values);
            values = padded;
        }
        self.columns.insert(name, values);
    }

    /// Number of trailing rows where every derived column is defined.
    ///
    /// A series without derived columns counts all of its rows as valid.
    pub fn valid_rows(&self) -> usize {
        (0..self.candles.len())
            .rev()
            .take_while(|&i| self.columns.values().all(|col| col[i].is_some()))
            .count()
    }

    /// Copy of this series without its newest candle, which the exchange
    /// returns while that bar is still open. A single candle is kept.
    pub fn closed(&self) -> Self {
        if self.candles.len() <= 1 {
            return self.clone();
        }
        let mut out = self.clone();
        out.candles.pop();
        for col in out.columns.values_mut() {
            col.pop();
        }
        out
    }

    /// Copy of this series with one synthetic candle appended from a live
    /// trade price: open at the last close, close at `price`, zero volume.
    /// Derived columns get an undefined slot for the new row.
    pub fn with_live_price(&self, price: f64, interval_ms: i64) -> Self {
        let Some(last) = self.candles.last() else {
            return self.clone();
        };
        let synthetic = Candle {
            open_time: last.open_time + Duration::milliseconds(interval_ms),
            open: last.close,
            high: last.close.max(price),
            low: last.close.min(price),
            close: price,
            volume: 0.0,
        };
        let mut out = self.clone();
        out.candles.push(synthetic);
        for col in out.columns.values_mut() {
            col.push(None);
        }
        out
    }
}

/// Trading decision for one instrument at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    /// No action: no crossover, or indicators still warming up.
    #[default]
    Wait,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Wait => write!(f, "WAIT"),
        }
    }
}

/// Side of a (test) order sent to the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Outcome of one instrument evaluation, handed to every report sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalReport {
    pub symbol: String,
    pub strategy: String,
    pub signal: Signal,
    /// Close of the newest row the signal was evaluated on.
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Current state of the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
            EngineState::Paused => write!(f, "paused"),
        }
    }
}

/// Commands sent to the main loop via the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    Pause,
    Resume,
    /// Finish the cycle in flight, then exit.
    Stop,
}

/// Milliseconds per supported bar interval (`1m`, `4h`, ...).
pub fn interval_to_ms(interval: &str) -> Option<i64> {
    let ms = match interval {
        "1s" => 1_000,
        "1m" => 60_000,
        "3m" => 180_000,
        "5m" => 300_000,
        "15m" => 900_000,
        "30m" => 1_800_000,
        "1h" => 3_600_000,
        "2h" => 7_200_000,
        "4h" => 14_400_000,
        "6h" => 21_600_000,
        "8h" => 28_800_000,
        "12h" => 43_200_000,
        "1d" => 86_400_000,
        _ => return None,
    };
    Some(ms)
}
