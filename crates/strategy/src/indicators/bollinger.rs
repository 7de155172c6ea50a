use common::CandleSeries;

use super::moving_average::sma;

#[derive(Debug, Clone, PartialEq)]
pub struct Bands {
    pub mid: Vec<Option<f64>>,
    pub upper: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

/// Bollinger Bands: mid = SMA(period), bands = mid ± k·stddev.
///
/// The standard deviation is the sample deviation (divisor `period - 1`)
/// over the same window, so `period` must be at least 2.
pub fn bollinger(closes: &[f64], period: usize, k: f64) -> Bands {
    let n = closes.len();
    if period < 2 {
        return Bands {
            mid: vec![None; n],
            upper: vec![None; n],
            lower: vec![None; n],
        };
    }

    let mid = sma(closes, period);
    let mut upper = vec![None; n];
    let mut lower = vec![None; n];
    for (i, window) in closes.windows(period).enumerate() {
        let idx = i + period - 1;
        let Some(mean) = mid[idx] else { continue };
        let sd = sample_stddev(window, mean);
        upper[idx] = Some(mean + k * sd);
        lower[idx] = Some(mean - k * sd);
    }
    Bands { mid, upper, lower }
}

fn sample_stddev(window: &[f64], mean: f64) -> f64 {
    let ss: f64 = window.iter().map(|x| (x - mean).powi(2)).sum();
    (ss / (window.len() - 1) as f64).sqrt()
}

/// Adds `bb_mid`, `bb_up` and `bb_dn`.
pub fn add_bollinger(series: &CandleSeries, period: usize, k: f64) -> CandleSeries {
    add_bollinger_as(series, period, k, ["bb_mid", "bb_up", "bb_dn"])
}

pub fn add_bollinger_as(
    series: &CandleSeries,
    period: usize,
    k: f64,
    [mid_col, up_col, dn_col]: [&str; 3],
) -> CandleSeries {
    let bands = bollinger(&series.closes(), period, k);
    series
        .with_column(mid_col, bands.mid)
        .with_column(up_col, bands.upper)
        .with_column(dn_col, bands.lower)
}
