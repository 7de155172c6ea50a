use common::CandleSeries;

/// Simple moving average. Undefined for the first `period - 1` positions.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for (i, window) in values.windows(period).enumerate() {
        out[i + period - 1] = Some(window.iter().sum::<f64>() / period as f64);
    }
    out
}

/// Exponential moving average with smoothing factor `2 / (period + 1)`.
///
/// Leading undefined inputs are skipped. The first output is the simple
/// average of the first `period` defined inputs; an undefined input after
/// that restarts the seeding.
pub fn ema(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut seed: Vec<f64> = Vec::with_capacity(period);
    let mut prev: Option<f64> = None;

    for (i, value) in values.iter().enumerate() {
        match (*value, prev) {
            (None, _) => {
                seed.clear();
                prev = None;
            }
            (Some(x), Some(p)) => {
                let next = x * k + p * (1.0 - k);
                out[i] = Some(next);
                prev = Some(next);
            }
            (Some(x), None) => {
                seed.push(x);
                if seed.len() == period {
                    let first = seed.iter().sum::<f64>() / period as f64;
                    out[i] = Some(first);
                    prev = Some(first);
                    seed.clear();
                }
            }
        }
    }
    out
}

/// `ema` over a column without gaps.
pub fn ema_of(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let defined: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    ema(&defined, period)
}

pub fn add_sma(series: &CandleSeries, period: usize) -> CandleSeries {
    add_sma_as(series, period, &format!("sma_{period}"))
}

pub fn add_sma_as(series: &CandleSeries, period: usize, name: &str) -> CandleSeries {
    series.with_column(name, sma(&series.closes(), period))
}

pub fn add_ema(series: &CandleSeries, period: usize) -> CandleSeries {
    add_ema_as(series, period, &format!("ema_{period}"))
}

pub fn add_ema_as(series: &CandleSeries, period: usize, name: &str) -> CandleSeries {
    series.with_column(name, ema_of(&series.closes(), period))
}
