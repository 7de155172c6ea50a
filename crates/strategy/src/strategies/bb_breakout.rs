use common::{CandleSeries, Error, Result, Signal};

use crate::indicators::add_bollinger_as;
use crate::params::{ParamSpec, StrategyParams};
use crate::Strategy;

pub const BB_MID: &str = "bb_mid";
pub const BB_UPPER: &str = "bb_up";
pub const BB_LOWER: &str = "bb_dn";

const SCHEMA: &[ParamSpec] = &[ParamSpec::int("period", 20), ParamSpec::float("k", 2.0)];

/// Bollinger band breakout.
///
/// BUY when the close moves above the upper band, having been at or below it
/// on the previous row. SELL on the mirror move through the lower band.
#[derive(Debug, Clone, Copy, Default)]
pub struct BollingerBreakout;

fn period(params: &StrategyParams) -> usize {
    params.get_usize("period").unwrap_or(20)
}

fn width(params: &StrategyParams) -> f64 {
    params.get_float("k").unwrap_or(2.0)
}

impl Strategy for BollingerBreakout {
    fn identifier(&self) -> &'static str {
        "bb_breakout"
    }

    fn schema(&self) -> &'static [ParamSpec] {
        SCHEMA
    }

    fn check(&self, params: &StrategyParams) -> Result<()> {
        if period(params) < 2 {
            return Err(Error::Config("bb_breakout: period must be at least 2".into()));
        }
        let k = width(params);
        if !(k.is_finite() && k > 0.0) {
            return Err(Error::Config(format!("bb_breakout: k must be positive, got {k}")));
        }
        Ok(())
    }

    fn minimum_history(&self, params: &StrategyParams) -> usize {
        period(params) + 2
    }

    fn compute_indicators(&self, series: &CandleSeries, params: &StrategyParams) -> CandleSeries {
        add_bollinger_as(series, period(params), width(params), [BB_MID, BB_UPPER, BB_LOWER])
    }

    fn generate_signal(&self, series: &CandleSeries, params: &StrategyParams) -> Signal {
        if series.len() < self.minimum_history(params) {
            return Signal::Wait;
        }
        let closes = series.closes();
        let (prev, curr) = (series.len() - 2, series.len() - 1);
        let (Some(prev_up), Some(prev_dn), Some(curr_up), Some(curr_dn)) = (
            series.value(BB_UPPER, prev),
            series.value(BB_LOWER, prev),
            series.value(BB_UPPER, curr),
            series.value(BB_LOWER, curr),
        ) else {
            return Signal::Wait;
        };

        if closes[prev] <= prev_up && closes[curr] > curr_up {
            Signal::Buy
        } else if closes[prev] >= prev_dn && closes[curr] < curr_dn {
            Signal::Sell
        } else {
            Signal::Wait
        }
    }
}
