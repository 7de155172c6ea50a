//! Pure transforms over a `CandleSeries`.
//!
//! Each `add_*` function reads the candle columns it needs and returns a new
//! series with one or more derived columns appended. Inputs are never
//! modified. Positions without enough history are `None`.

pub mod atr;
pub mod bollinger;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod vwap;

pub use atr::{add_atr, add_atr_as, atr, true_range};
pub use bollinger::{add_bollinger, add_bollinger_as, bollinger, Bands};
pub use macd::{add_macd, add_macd_as, macd, MacdLines};
pub use moving_average::{add_ema, add_ema_as, add_sma, add_sma_as, ema, ema_of, sma};
pub use rsi::{add_rsi, add_rsi_as, rsi};
pub use vwap::{add_vwap, add_vwap_as, vwap};

#[cfg(test)]
pub(crate) fn test_series(closes: &[f64]) -> common::CandleSeries {
    use chrono::{TimeZone, Utc};

    let candles = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| common::Candle {
            open_time: Utc.timestamp_millis_opt(i as i64 * 60_000).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        })
        .collect();
    common::CandleSeries::new(candles)
}
