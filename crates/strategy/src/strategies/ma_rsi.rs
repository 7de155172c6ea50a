use common::{CandleSeries, Error, Result, Signal};

use crate::indicators::{add_ema_as, add_rsi_as};
use crate::params::{ParamSpec, StrategyParams};
use crate::Strategy;

pub const EMA_SHORT: &str = "ema_short";
pub const EMA_LONG: &str = "ema_long";
pub const RSI: &str = "rsi";

const SCHEMA: &[ParamSpec] = &[
    ParamSpec::int("short_window", 7),
    ParamSpec::int("long_window", 25),
    ParamSpec::int("rsi_period", 14),
    ParamSpec::float("rsi_buy", 30.0),
    ParamSpec::float("rsi_sell", 70.0),
];

/// EMA crossover filtered by RSI.
///
/// BUY when the short EMA crosses above the long EMA on the newest row and
/// RSI is below `rsi_buy`. SELL when it crosses below and RSI is above
/// `rsi_sell`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaRsi;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Params {
    short_window: usize,
    long_window: usize,
    rsi_period: usize,
    rsi_buy: f64,
    rsi_sell: f64,
}

impl Params {
    fn from(params: &StrategyParams) -> Self {
        Self {
            short_window: params.get_usize("short_window").unwrap_or(7),
            long_window: params.get_usize("long_window").unwrap_or(25),
            rsi_period: params.get_usize("rsi_period").unwrap_or(14),
            rsi_buy: params.get_float("rsi_buy").unwrap_or(30.0),
            rsi_sell: params.get_float("rsi_sell").unwrap_or(70.0),
        }
    }
}

impl Strategy for MaRsi {
    fn identifier(&self) -> &'static str {
        "ma_rsi"
    }

    fn schema(&self) -> &'static [ParamSpec] {
        SCHEMA
    }

    fn check(&self, params: &StrategyParams) -> Result<()> {
        let p = Params::from(params);
        if p.short_window == 0 || p.rsi_period == 0 {
            return Err(Error::Config("ma_rsi: windows must be positive".into()));
        }
        if p.short_window >= p.long_window {
            return Err(Error::Config(format!(
                "ma_rsi: short_window ({}) must be less than long_window ({})",
                p.short_window, p.long_window
            )));
        }
        Ok(())
    }

    fn minimum_history(&self, params: &StrategyParams) -> usize {
        let p = Params::from(params);
        p.long_window.max(p.rsi_period + 1) + 1
    }

    fn compute_indicators(&self, series: &CandleSeries, params: &StrategyParams) -> CandleSeries {
        let p = Params::from(params);
        let out = add_ema_as(series, p.short_window, EMA_SHORT);
        let out = add_ema_as(&out, p.long_window, EMA_LONG);
        add_rsi_as(&out, p.rsi_period, RSI)
    }

    fn generate_signal(&self, series: &CandleSeries, params: &StrategyParams) -> Signal {
        let p = Params::from(params);
        if series.len() < self.minimum_history(params) {
            return Signal::Wait;
        }
        let (prev, curr) = (series.len() - 2, series.len() - 1);
        let (Some(prev_short), Some(prev_long), Some(curr_short), Some(curr_long), Some(rsi)) = (
            series.value(EMA_SHORT, prev),
            series.value(EMA_LONG, prev),
            series.value(EMA_SHORT, curr),
            series.value(EMA_LONG, curr),
            series.value(RSI, curr),
        ) else {
            return Signal::Wait;
        };

        if prev_short <= prev_long && curr_short > curr_long && rsi < p.rsi_buy {
            Signal::Buy
        } else if prev_short >= prev_long && curr_short < curr_long && rsi > p.rsi_sell {
            Signal::Sell
        } else {
            Signal::Wait
        }
    }
}
