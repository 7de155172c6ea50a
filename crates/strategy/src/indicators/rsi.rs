use common::CandleSeries;

/// RSI (Relative Strength Index) using Wilder's smoothing.
///
/// The first value sits at index `period`: average gain and loss are seeded
/// with the plain mean of the first `period` changes, then smoothed as
/// `avg = (avg * (period - 1) + x) / period`. RSI is 100 when the average
/// loss is zero.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() < period + 1 {
        return out;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let p = period as f64;
    let initial = &changes[..period];

    let mut avg_gain = initial.iter().map(|&c| c.max(0.0)).sum::<f64>() / p;
    let mut avg_loss = initial.iter().map(|&c| (-c).max(0.0)).sum::<f64>() / p;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    // Wilder smoothing over remaining changes
    for (i, &change) in changes.iter().enumerate().skip(period) {
        avg_gain = (avg_gain * (p - 1.0) + change.max(0.0)) / p;
        avg_loss = (avg_loss * (p - 1.0) + (-change).max(0.0)) / p;
        out[i + 1] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

pub fn add_rsi(series: &CandleSeries, period: usize) -> CandleSeries {
    add_rsi_as(series, period, &format!("rsi_{period}"))
}

pub fn add_rsi_as(series: &CandleSeries, period: usize, name: &str) -> CandleSeries {
    series.with_column(name, rsi(&series.closes(), period))
}
