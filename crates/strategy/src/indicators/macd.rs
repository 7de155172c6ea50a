use common::CandleSeries;

use super::moving_average::{ema, ema_of};

/// MACD (Moving Average Convergence/Divergence) lines.
///
/// MACD line = EMA(fast) − EMA(slow), signal = EMA(signal) of the MACD line,
/// histogram = MACD − signal.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdLines {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

/// The MACD line is defined from index `slow - 1` (for `fast <= slow`), the
/// signal and histogram from `slow + signal - 2`.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdLines {
    let fast_ema = ema_of(closes, fast);
    let slow_ema = ema_of(closes, slow);

    let macd_line: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal_line = ema(&macd_line, signal);
    let histogram = macd_line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    MacdLines {
        macd: macd_line,
        signal: signal_line,
        histogram,
    }
}

/// Adds `macd`, `macd_signal` and `macd_hist`.
pub fn add_macd(series: &CandleSeries, fast: usize, slow: usize, signal: usize) -> CandleSeries {
    add_macd_as(series, fast, slow, signal, ["macd", "macd_signal", "macd_hist"])
}

pub fn add_macd_as(
    series: &CandleSeries,
    fast: usize,
    slow: usize,
    signal: usize,
    [macd_col, signal_col, hist_col]: [&str; 3],
) -> CandleSeries {
    let lines = macd(&series.closes(), fast, slow, signal);
    series
        .with_column(macd_col, lines.macd)
        .with_column(signal_col, lines.signal)
        .with_column(hist_col, lines.histogram)
}
