use common::CandleSeries;

/// True range per bar: `max(high − low, |high − prev_close|, |low − prev_close|)`.
/// Undefined for the first bar, which has no previous close.
pub fn true_range(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<Option<f64>> {
    let n = highs.len().min(lows.len()).min(closes.len());
    (0..n)
        .map(|i| {
            let prev_close = *closes.get(i.checked_sub(1)?)?;
            let (h, l) = (highs[i], lows[i]);
            Some((h - l).max((h - prev_close).abs()).max((l - prev_close).abs()))
        })
        .collect()
}

/// Average True Range with Wilder smoothing.
///
/// First value at index `period`: the mean of the first `period` true
/// ranges. After that `atr = (prev * (period - 1) + tr) / period`.
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let tr = true_range(highs, lows, closes);
    let mut out = vec![None; tr.len()];
    if period == 0 || tr.len() < period + 1 {
        return out;
    }

    let p = period as f64;
    let mut value = tr[1..=period].iter().flatten().sum::<f64>() / p;
    out[period] = Some(value);
    for i in period + 1..tr.len() {
        if let Some(range) = tr[i] {
            value = (value * (p - 1.0) + range) / p;
            out[i] = Some(value);
        }
    }
    out
}

pub fn add_atr(series: &CandleSeries, period: usize) -> CandleSeries {
    add_atr_as(series, period, &format!("atr_{period}"))
}

pub fn add_atr_as(series: &CandleSeries, period: usize, name: &str) -> CandleSeries {
    let values = atr(&series.highs(), &series.lows(), &series.closes(), period);
    series.with_column(name, values)
}
